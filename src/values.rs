//! Typed attribute values for inventory items.
//!
//! Items store an open map `attribute id -> JSON value`. At validation time
//! each entry is parsed into an [`AttributeValue`] according to the
//! attribute's data type. Only type and LIST domain membership are checked.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use classification_types::{AttributeId, CategoryId, DataType, DomainValueId, SubcategoryId};

use crate::attributes::AttributeCatalog;
use crate::domains::DomainCatalog;
use crate::error::Result;
use crate::mappings::Resolver;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeValue {
    Text(String),
    Number(Decimal),
    Boolean(bool),
    List(DomainValueId),
    Range { min: Decimal, max: Decimal },
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueKind {
    #[error("attribute is not part of this item's classification")]
    UnknownAttribute,

    #[error("expected {expected}: {message}")]
    TypeMismatch { expected: DataType, message: String },

    #[error("value '{value_id}' is not an active member of the attribute's domain")]
    NotInDomain { value_id: DomainValueId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueIssue {
    pub attribute_id: AttributeId,
    pub kind: IssueKind,
}

impl std::fmt::Display for ValueIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.attribute_id, self.kind)
    }
}

impl AttributeValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Text(_) => DataType::Text,
            Self::Number(_) => DataType::Number,
            Self::Boolean(_) => DataType::Boolean,
            Self::List(_) => DataType::List,
            Self::Range { .. } => DataType::Range,
            Self::Date(_) => DataType::Date,
        }
    }

    /// Parse a raw item value as `data_type`.
    ///
    /// Numbers are accepted as JSON numbers or numeric strings. A RANGE is
    /// `{"min": .., "max": ..}` or `[min, max]` with `min <= max`.
    pub fn parse(data_type: DataType, raw: &Value) -> std::result::Result<Self, IssueKind> {
        let mismatch = |message: String| IssueKind::TypeMismatch {
            expected: data_type,
            message,
        };
        match data_type {
            DataType::Text => raw
                .as_str()
                .map(|s| Self::Text(s.to_string()))
                .ok_or_else(|| mismatch(format!("got {}", json_kind(raw)))),
            DataType::Number => parse_decimal(raw).map(Self::Number).map_err(mismatch),
            DataType::Boolean => match raw {
                Value::Bool(b) => Ok(Self::Boolean(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Self::Boolean(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Self::Boolean(false)),
                other => Err(mismatch(format!("got {}", json_kind(other)))),
            },
            DataType::List => match raw.as_str().map(str::trim) {
                Some(id) if !id.is_empty() => Ok(Self::List(DomainValueId::new(id))),
                _ => Err(mismatch("expected a domain value id".into())),
            },
            DataType::Range => {
                let (min, max) = match raw {
                    Value::Object(obj) => (obj.get("min"), obj.get("max")),
                    Value::Array(items) if items.len() == 2 => (items.first(), items.get(1)),
                    other => return Err(mismatch(format!("got {}", json_kind(other)))),
                };
                let (Some(min), Some(max)) = (min, max) else {
                    return Err(mismatch("range needs both min and max".into()));
                };
                let min = parse_decimal(min).map_err(&mismatch)?;
                let max = parse_decimal(max).map_err(&mismatch)?;
                if min > max {
                    return Err(mismatch(format!("min {min} is greater than max {max}")));
                }
                Ok(Self::Range { min, max })
            }
            DataType::Date => {
                let s = raw
                    .as_str()
                    .ok_or_else(|| mismatch(format!("got {}", json_kind(raw))))?;
                NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .map(Self::Date)
                    .map_err(|e| mismatch(format!("'{s}' is not a YYYY-MM-DD date ({e})")))
            }
        }
    }
}

fn parse_decimal(raw: &Value) -> std::result::Result<Decimal, String> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(format!("got {}", json_kind(other))),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| format!("'{text}' is not a number"))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Outcome of validating one item's value bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedItem {
    pub values: BTreeMap<AttributeId, AttributeValue>,
    pub issues: Vec<ValueIssue>,
}

impl ValidatedItem {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Checks an item's values against the attributes resolved for its node.
#[derive(Clone)]
pub struct ValueValidator {
    resolver: Resolver,
    attributes: AttributeCatalog,
    domains: DomainCatalog,
}

impl ValueValidator {
    pub fn new(resolver: Resolver, attributes: AttributeCatalog, domains: DomainCatalog) -> Self {
        Self {
            resolver,
            attributes,
            domains,
        }
    }

    /// Parse and check every entry of `values`.
    ///
    /// Null entries count as absent. Entries for attributes outside the
    /// effective set are reported as issues, not errors; store failures and
    /// unknown taxonomy nodes are errors.
    pub async fn validate_item(
        &self,
        category_id: Option<&CategoryId>,
        subcategory_id: Option<&SubcategoryId>,
        values: &BTreeMap<AttributeId, Value>,
    ) -> Result<ValidatedItem> {
        let effective = self
            .resolver
            .get_effective_attributes(category_id, subcategory_id)
            .await?;
        let mut out = ValidatedItem::default();

        for (attribute_id, raw) in values {
            if raw.is_null() {
                continue;
            }
            if !effective.iter().any(|e| e.attribute_id() == attribute_id) {
                out.issues.push(ValueIssue {
                    attribute_id: attribute_id.clone(),
                    kind: IssueKind::UnknownAttribute,
                });
                continue;
            }
            let attribute = self.attributes.get_attribute(attribute_id).await?;
            let parsed = match AttributeValue::parse(attribute.data_type, raw) {
                Ok(parsed) => parsed,
                Err(kind) => {
                    out.issues.push(ValueIssue {
                        attribute_id: attribute_id.clone(),
                        kind,
                    });
                    continue;
                }
            };
            if let AttributeValue::List(value_id) = &parsed {
                let member = match &attribute.domain_id {
                    Some(domain_id) => self.domains.contains_value(domain_id, value_id).await?,
                    None => false,
                };
                if !member {
                    out.issues.push(ValueIssue {
                        attribute_id: attribute_id.clone(),
                        kind: IssueKind::NotInDomain {
                            value_id: value_id.clone(),
                        },
                    });
                    continue;
                }
            }
            out.values.insert(attribute_id.clone(), parsed);
        }

        tracing::debug!(
            checked = values.len(),
            issues = out.issues.len(),
            "item values validated"
        );
        Ok(out)
    }
}
