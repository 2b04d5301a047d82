//! Identifier newtypes.
//!
//! Ids are opaque strings so that rows seeded with readable ids
//! (`cat_anillos`, `dom_material`) and generated ids share one type.
//! Generated ids carry the entity prefix followed by a simple UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used for generated ids.
            pub const PREFIX: &'static str = $prefix;

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Fresh id of the form `<prefix>_<uuid>`.
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Root taxonomy node id.
    CategoryId,
    "cat"
);
string_id!(
    /// Leaf taxonomy node id.
    SubcategoryId,
    "sub"
);
string_id!(
    /// Global attribute id. Inventory items key their value bags by this.
    AttributeId,
    "attr"
);
string_id!(DomainId, "dom");
string_id!(DomainValueId, "val");
string_id!(AuditEntryId, "log");
