//! Integration tests for attribute inheritance and mapping mutations
//!
//! Drive the engine facade end to end against the in-memory stores.
//! Run with: cargo test --test classification_flow

use jewelry_classification::classification_types::{
    Attribute, AttributeId, AuditAction, Category, DataType, Governance, MappingTarget, NewAttribute,
    NewDomain, NewDomainValue, Subcategory,
};
use jewelry_classification::{Actor, ChangeScope, ClassificationEngine, ClassificationError};

fn admin() -> Actor {
    Actor::in_process("admin", vec!["admin".into()])
}

async fn text_attribute(engine: &ClassificationEngine, name: &str) -> Attribute {
    engine
        .attributes
        .create_attribute(&admin(), NewAttribute::new(name, DataType::Text))
        .await
        .unwrap()
}

async fn ring_taxonomy(engine: &ClassificationEngine) -> (Category, Subcategory) {
    let anillos = engine
        .registry
        .create_category(&admin(), "Anillos", Some("Piezas para el dedo".into()))
        .await
        .unwrap();
    let solitario = engine
        .registry
        .create_subcategory(&admin(), &anillos.id, "Solitario", None)
        .await
        .unwrap();
    (anillos, solitario)
}

fn attribute_ids(effective: &[jewelry_classification::classification_types::EffectiveAttribute]) -> Vec<AttributeId> {
    effective.iter().map(|e| e.attribute_id().clone()).collect()
}

#[tokio::test]
async fn test_end_to_end_ring_scenario() {
    let engine = ClassificationEngine::in_memory();
    let actor = admin();

    let material_domain = engine
        .domains
        .create_domain(&actor, NewDomain::new("Material", Governance::SemiClosed))
        .await
        .unwrap();
    engine
        .domains
        .add_value(&actor, NewDomainValue::normative(material_domain.id.clone(), "Oro", 1))
        .await
        .unwrap();
    let material = engine
        .attributes
        .create_attribute(
            &actor,
            NewAttribute::new("Material", DataType::List).with_domain(material_domain.id.clone()),
        )
        .await
        .unwrap();
    let forma = text_attribute(&engine, "Forma de la piedra").await;

    let anillos = engine
        .registry
        .create_category(&actor, "Anillos", None)
        .await
        .unwrap();
    let on_anillos = MappingTarget::Category(anillos.id.clone());
    engine
        .resolver
        .add_mapping(&actor, &on_anillos, &material.id)
        .await
        .unwrap();
    engine
        .resolver
        .toggle_mandatory(&actor, &on_anillos, &material.id)
        .await
        .unwrap();

    let solitario = engine
        .registry
        .create_subcategory(&actor, &anillos.id, "Solitario", None)
        .await
        .unwrap();
    let effective = engine
        .get_effective_attributes(None, Some(&solitario.id))
        .await
        .unwrap();
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].attribute_id(), &material.id);
    assert!(effective[0].is_inherited);
    assert!(effective[0].is_mandatory());

    let on_solitario = MappingTarget::Subcategory(solitario.id.clone());
    let direct = engine
        .resolver
        .add_mapping(&actor, &on_solitario, &forma.id)
        .await
        .unwrap();
    assert!(!direct.is_mandatory);
    let effective = engine
        .get_effective_attributes(None, Some(&solitario.id))
        .await
        .unwrap();
    assert_eq!(effective.len(), 2);

    engine
        .attributes
        .deactivate_attribute(&actor, &material.id)
        .await
        .unwrap();
    let effective = engine
        .get_effective_attributes(None, Some(&solitario.id))
        .await
        .unwrap();
    assert_eq!(attribute_ids(&effective), vec![forma.id.clone()]);
    assert!(!effective[0].is_inherited);
}

#[tokio::test]
async fn test_subcategory_mapping_takes_precedence() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, solitario) = ring_taxonomy(&engine).await;
    let x = text_attribute(&engine, "Grabado").await;

    engine
        .resolver
        .upsert_mapping(&admin(), &MappingTarget::Category(anillos.id.clone()), &x.id, true, Some(0))
        .await
        .unwrap();
    let own = engine
        .resolver
        .upsert_mapping(&admin(), &MappingTarget::Subcategory(solitario.id.clone()), &x.id, false, Some(3))
        .await
        .unwrap();

    let effective = engine
        .get_effective_attributes(Some(&anillos.id), Some(&solitario.id))
        .await
        .unwrap();
    let for_x: Vec<_> = effective.iter().filter(|e| e.attribute_id() == &x.id).collect();
    assert_eq!(for_x.len(), 1);
    assert_eq!(for_x[0].mapping, own);
    assert!(!for_x[0].is_inherited);
    assert!(!for_x[0].is_mandatory());
}

#[tokio::test]
async fn test_pure_inheritance_keeps_mandatory() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, solitario) = ring_taxonomy(&engine).await;
    let y = text_attribute(&engine, "Peso").await;
    engine
        .resolver
        .upsert_mapping(&admin(), &MappingTarget::Category(anillos.id.clone()), &y.id, true, None)
        .await
        .unwrap();

    let effective = engine
        .get_effective_attributes(None, Some(&solitario.id))
        .await
        .unwrap();
    assert_eq!(effective.len(), 1);
    assert!(effective[0].is_inherited);
    assert!(effective[0].is_mandatory());
}

#[tokio::test]
async fn test_repeated_add_leaves_one_mapping() {
    let engine = ClassificationEngine::in_memory();
    let (_, solitario) = ring_taxonomy(&engine).await;
    let x = text_attribute(&engine, "Grabado").await;
    let target = MappingTarget::Subcategory(solitario.id.clone());

    engine.resolver.add_mapping(&admin(), &target, &x.id).await.unwrap();
    engine.resolver.add_mapping(&admin(), &target, &x.id).await.unwrap();

    assert_eq!(engine.resolver.list_direct_mappings(&target).await.unwrap().len(), 1);
    let logs = engine.get_logs(solitario.id.as_str()).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, AuditAction::Create);
}

#[tokio::test]
async fn test_deactivated_attribute_disappears_everywhere() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, solitario) = ring_taxonomy(&engine).await;
    let alianza = engine
        .registry
        .create_subcategory(&admin(), &anillos.id, "Alianza", None)
        .await
        .unwrap();
    let x = text_attribute(&engine, "Grabado").await;
    let keep = text_attribute(&engine, "Talla").await;

    for target in [
        MappingTarget::Category(anillos.id.clone()),
        MappingTarget::Subcategory(solitario.id.clone()),
        MappingTarget::Subcategory(alianza.id.clone()),
    ] {
        engine.resolver.add_mapping(&admin(), &target, &x.id).await.unwrap();
        engine.resolver.add_mapping(&admin(), &target, &keep.id).await.unwrap();
    }

    assert_eq!(engine.attributes.deactivate_attribute(&admin(), &x.id).await.unwrap(), 3);

    let views = [
        engine.get_effective_attributes(Some(&anillos.id), None).await.unwrap(),
        engine.get_effective_attributes(None, Some(&solitario.id)).await.unwrap(),
        engine.get_effective_attributes(None, Some(&alianza.id)).await.unwrap(),
    ];
    for view in &views {
        assert_eq!(attribute_ids(view), vec![keep.id.clone()]);
    }
    // Each removal is audited against its own target.
    let logs = engine.get_logs(alianza.id.as_str()).await.unwrap();
    assert!(logs.iter().any(|l| l.action == AuditAction::Delete && l.details.contains("cascade")));

    let err = engine
        .resolver
        .add_mapping(&admin(), &MappingTarget::Category(anillos.id.clone()), &x.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ClassificationError::NotFound(_)));
}

#[tokio::test]
async fn test_list_attribute_domain_requirement() {
    let engine = ClassificationEngine::in_memory();
    let err = engine
        .attributes
        .create_attribute(&admin(), NewAttribute::new("Color", DataType::List))
        .await
        .unwrap_err();
    assert!(matches!(err, ClassificationError::Validation { .. }));
    assert_eq!(err.field(), Some("domain_id"));

    let color = engine
        .domains
        .create_domain(&admin(), NewDomain::new("Color", Governance::Closed))
        .await
        .unwrap();
    let attr = engine
        .attributes
        .create_attribute(&admin(), NewAttribute::new("Color", DataType::List).with_domain(color.id.clone()))
        .await
        .unwrap();
    assert_eq!(attr.domain_id, Some(color.id));
}

#[tokio::test]
async fn test_reorder_to_exact_permutation() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, _) = ring_taxonomy(&engine).await;
    let target = MappingTarget::Category(anillos.id.clone());
    let a = text_attribute(&engine, "A").await;
    let b = text_attribute(&engine, "B").await;
    let c = text_attribute(&engine, "C").await;
    for attr in [&a, &b, &c] {
        engine.resolver.add_mapping(&admin(), &target, &attr.id).await.unwrap();
    }

    engine
        .resolver
        .reorder_mappings(&admin(), &target, &[c.id.clone(), a.id.clone(), b.id.clone()])
        .await
        .unwrap();

    let effective = engine.get_effective_attributes(Some(&anillos.id), None).await.unwrap();
    assert_eq!(attribute_ids(&effective), vec![c.id.clone(), a.id.clone(), b.id.clone()]);
    let orders: Vec<u32> = effective.iter().map(|e| e.sort_order()).collect();
    assert_eq!(orders, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_inherited_toggle_reports_category_scope() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, solitario) = ring_taxonomy(&engine).await;
    let y = text_attribute(&engine, "Peso").await;
    engine
        .resolver
        .add_mapping(&admin(), &MappingTarget::Category(anillos.id.clone()), &y.id)
        .await
        .unwrap();

    let change = engine
        .resolver
        .toggle_mandatory(&admin(), &MappingTarget::Subcategory(solitario.id.clone()), &y.id)
        .await
        .unwrap();
    match change.scope {
        ChangeScope::CategoryWide { category_id, affected_subcategories } => {
            assert_eq!(category_id, anillos.id);
            assert_eq!(affected_subcategories, vec![solitario.id.clone()]);
        }
        ChangeScope::Direct => panic!("inherited toggle must act on the category"),
    }
    let effective = engine.get_effective_attributes(None, Some(&solitario.id)).await.unwrap();
    assert!(effective[0].is_mandatory());
}

#[tokio::test]
async fn test_audit_log_newest_first() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, _) = ring_taxonomy(&engine).await;
    let target = MappingTarget::Category(anillos.id.clone());
    let a = text_attribute(&engine, "A").await;
    let b = text_attribute(&engine, "B").await;

    engine.resolver.add_mapping(&admin(), &target, &a.id).await.unwrap();
    engine.resolver.add_mapping(&admin(), &target, &b.id).await.unwrap();
    engine.resolver.toggle_mandatory(&admin(), &target, &a.id).await.unwrap();
    engine
        .resolver
        .reorder_mappings(&admin(), &target, &[b.id.clone(), a.id.clone()])
        .await
        .unwrap();
    engine.resolver.remove_mapping(&admin(), &target, &b.id).await.unwrap();

    let actions: Vec<AuditAction> = engine
        .get_logs(anillos.id.as_str())
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Delete,
            AuditAction::Reorder,
            AuditAction::Update,
            AuditAction::Create,
            AuditAction::Create,
        ]
    );
}

#[tokio::test]
async fn test_deactivated_category_hides_everything_below() {
    let engine = ClassificationEngine::in_memory();
    let (anillos, solitario) = ring_taxonomy(&engine).await;
    let x = text_attribute(&engine, "Grabado").await;
    engine
        .resolver
        .add_mapping(&admin(), &MappingTarget::Category(anillos.id.clone()), &x.id)
        .await
        .unwrap();

    engine.registry.deactivate_category(&admin(), &anillos.id).await.unwrap();

    for result in [
        engine.get_effective_attributes(Some(&anillos.id), None).await,
        engine.get_effective_attributes(None, Some(&solitario.id)).await,
    ] {
        assert!(matches!(result, Err(ClassificationError::NotFound(_))));
    }
    // Mapping rows survive for the audit history.
    assert!(!engine.get_logs(anillos.id.as_str()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deactivated_subcategory_mappings_are_frozen() {
    let engine = ClassificationEngine::in_memory();
    let (_, solitario) = ring_taxonomy(&engine).await;
    let x = text_attribute(&engine, "Grabado").await;
    let target = MappingTarget::Subcategory(solitario.id.clone());
    engine.resolver.add_mapping(&admin(), &target, &x.id).await.unwrap();

    engine.registry.deactivate_subcategory(&admin(), &solitario.id).await.unwrap();

    let toggled = engine.resolver.toggle_mandatory(&admin(), &target, &x.id).await;
    assert!(matches!(toggled, Err(ClassificationError::NotFound(_))));
    let removed = engine.resolver.remove_mapping(&admin(), &target, &x.id).await;
    assert!(matches!(removed, Err(ClassificationError::NotFound(_))));
    assert_eq!(engine.get_logs(solitario.id.as_str()).await.unwrap().len(), 1);
}
