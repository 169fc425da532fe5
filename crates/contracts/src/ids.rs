//! Cheap-to-clone identifiers for sensors, annotation definitions and metric definitions.
//!
//! Each id uses `Arc<str>` internally so cloning only bumps a reference count. Ids are
//! created once at registration time and cloned into every `PendingId` afterwards.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Default)]
        pub struct $name(Arc<str>);

        impl $name {
            /// Create a new id from a string slice.
            #[inline]
            pub fn new(s: &str) -> Self {
                Self(Arc::from(s))
            }

            /// Get the underlying string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            #[inline]
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(s: &str) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(s: String) -> Self {
                Self(Arc::from(s))
            }
        }

        impl From<Arc<str>> for $name {
            #[inline]
            fn from(s: Arc<str>) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl PartialEq for $name {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl PartialEq<str> for $name {
            #[inline]
            fn eq(&self, other: &str) -> bool {
                self.0.as_ref() == other
            }
        }

        impl PartialEq<&str> for $name {
            #[inline]
            fn eq(&self, other: &&str) -> bool {
                self.0.as_ref() == *other
            }
        }

        impl PartialEq<String> for $name {
            #[inline]
            fn eq(&self, other: &String) -> bool {
                self.0.as_ref() == other
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0.cmp(&other.0)
            }
        }

        // Same as str hash so maps keyed by id can be queried with &str
        impl Hash for $name {
            #[inline]
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from(s))
            }
        }
    };
}

define_id!(
    /// Identifier of a registered sensor.
    ///
    /// # Examples
    /// ```
    /// use contracts::SensorId;
    ///
    /// let id: SensorId = "front_camera".into();
    /// let id2 = id.clone();
    /// assert_eq!(id, id2);
    /// assert_eq!(id.as_str(), "front_camera");
    /// ```
    SensorId
);

define_id!(
    /// Identifier of a registered annotation definition.
    AnnotationId
);

define_id!(
    /// Identifier of a registered metric definition.
    MetricId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_clone_is_cheap() {
        let id1: SensorId = "camera".into();
        let id2 = id1.clone();

        assert_eq!(id1.as_str().as_ptr(), id2.as_str().as_ptr());
    }

    #[test]
    fn test_equality() {
        let id: AnnotationId = "bounding_box".into();
        assert_eq!(id, "bounding_box");
        assert_eq!(id, String::from("bounding_box"));
        assert_eq!(id, AnnotationId::from("bounding_box"));
    }

    #[test]
    fn test_hashmap_key() {
        let mut map: HashMap<MetricId, i32> = HashMap::new();
        map.insert("object_count".into(), 1);
        map.insert("light_intensity".into(), 2);

        assert_eq!(map.get("object_count"), Some(&1));
        assert_eq!(map.get("light_intensity"), Some(&2));
    }

    #[test]
    fn test_empty_default() {
        let id = SensorId::default();
        assert!(id.is_empty());
    }

    #[test]
    fn test_serde() {
        let id: SensorId = "test".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"test\"");

        let parsed: SensorId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_debug_names_the_kind() {
        let id: MetricId = "count".into();
        assert_eq!(format!("{:?}", id), "MetricId(\"count\")");
    }
}
