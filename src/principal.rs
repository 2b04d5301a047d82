/// Identity performing a catalog or mapping mutation.
///
/// Authentication happens outside the engine; the caller constructs the actor.
/// Whether an actor is privileged depends on `EngineConfig::privileged_roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub roles: Vec<String>,
}

impl Actor {
    /// Construct explicitly for in-process use.
    /// Caller is responsible for populating roles correctly.
    pub fn in_process(actor_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            roles,
        }
    }

    /// Identity used for seeding and cascades triggered by the engine itself.
    pub fn system() -> Self {
        Self::in_process("system", vec!["admin".into()])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.has_role(r))
    }
}
