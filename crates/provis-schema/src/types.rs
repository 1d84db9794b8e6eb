//! Newtype wrappers for configuration names, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings and compare by value,
//! so lookups across feature-pack boundaries never depend on identity.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a configuration model, e.g. `standalone`.
    ModelName
);

string_newtype!(
    /// Name of a configuration layer within a model.
    LayerName
);

string_newtype!(
    /// Name of a concrete configuration within a model, e.g. `standalone.xml`.
    ConfigName
);

string_newtype!(
    /// Name of a package shipped by a feature-pack.
    PackageName
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn layer_name_display_and_as_ref() {
        let layer = LayerName::new("web-server");
        assert_eq!(layer.to_string(), "web-server");
        assert_eq!(layer.as_str(), "web-server");
        assert_eq!(AsRef::<str>::as_ref(&layer), "web-server");
    }

    #[test]
    fn model_name_serde_is_transparent() {
        let model = ModelName::new("standalone");
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(json, "\"standalone\"");
        let back: ModelName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn sets_can_be_queried_by_str() {
        let layers: BTreeSet<LayerName> = ["a", "b"].into_iter().map(LayerName::from).collect();
        assert!(layers.contains("a"));
        assert!(!layers.contains("c"));
    }

    #[test]
    fn package_name_into_inner() {
        let p = PackageName::new("docs.examples".to_owned());
        assert_eq!(p.into_inner(), "docs.examples");
    }

    #[test]
    fn config_name_equality() {
        let a = ConfigName::new("standalone.xml");
        assert_eq!(a, ConfigName::from("standalone.xml"));
        assert_ne!(a, ConfigName::from("domain.xml"));
        assert!(a == "standalone.xml");
    }
}
