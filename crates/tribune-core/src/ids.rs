//! Cheap-to-clone identifiers.
//!
//! Both wrap `Arc<str>` so fan-out can copy them into every target without
//! reallocating. `Borrow<str>` lets maps keyed by them be queried with `&str`.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! arc_str_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<Arc<str>>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                String::deserialize(deserializer).map(Self::from)
            }
        }
    };
}

arc_str_id!(
    /// Authenticated identity attached to a connection.
    Principal
);

arc_str_id!(
    /// Opaque conversation identifier owned by the conversation store.
    ConversationId
);

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn map_lookup_by_str() {
        let mut m = HashMap::new();
        m.insert(Principal::from("alice"), 1);
        assert_eq!(m.get("alice"), Some(&1));
        assert_eq!(m.get("bob"), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let s = serde_json::to_string(&ConversationId::from("c1")).unwrap_or_default();
        assert_eq!(s, "\"c1\"");
    }
}
