//! Common types used across the platform

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Composite stockpile key: storage yard plus stack number, serialized as
/// `"{yard}_{stack}"`.
///
/// Equality, ordering and hashing use the serialized key only, so two ids
/// that print the same always join.
#[derive(Debug, Clone)]
pub struct StockpileId {
    key: String,
    yard: String,
    stack: String,
}

impl StockpileId {
    /// Build an id from already-canonical parts.
    ///
    /// Callers reading raw tables go through
    /// [`crate::pipeline::identity::resolve_identity`] instead, which applies
    /// the canonicalization rules.
    pub fn from_parts(yard: impl Into<String>, stack: impl Into<String>) -> Self {
        let yard = yard.into();
        let stack = stack.into();
        Self {
            key: format!("{}_{}", yard, stack),
            yard,
            stack,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn yard(&self) -> &str {
        &self.yard
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }
}

impl PartialEq for StockpileId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for StockpileId {}

impl Hash for StockpileId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for StockpileId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StockpileId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for StockpileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl Serialize for StockpileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

impl<'de> Deserialize<'de> for StockpileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        // yard names may contain '_', stack numbers do not
        match key.rsplit_once('_') {
            Some((yard, stack)) if !yard.is_empty() && !stack.is_empty() => {
                Ok(StockpileId::from_parts(yard, stack))
            }
            _ => Err(serde::de::Error::custom(format!(
                "invalid stockpile id '{}', expected '<yard>_<stack>'",
                key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stockpile_id_key_format() {
        let id = StockpileId::from_parts("6", "4");
        assert_eq!(id.as_str(), "6_4");
        assert_eq!(id.yard(), "6");
        assert_eq!(id.stack(), "4");
        assert_eq!(id.to_string(), "6_4");
    }

    #[test]
    fn test_stockpile_id_serde() {
        let id = StockpileId::from_parts("12", "3");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"12_3\"");

        let back: StockpileId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.yard(), "12");
    }

    #[test]
    fn test_stockpile_id_serde_yard_with_underscore() {
        let id = StockpileId::from_parts("north_6", "4");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"north_6_4\"");

        let back: StockpileId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.yard(), "north_6");
        assert_eq!(back.stack(), "4");
    }

    #[test]
    fn test_stockpile_id_rejects_malformed_key() {
        assert!(serde_json::from_str::<StockpileId>("\"noseparator\"").is_err());
        assert!(serde_json::from_str::<StockpileId>("\"_4\"").is_err());
    }

    #[test]
    fn test_stockpile_id_orders_by_key() {
        let mut ids = vec![
            StockpileId::from_parts("6", "4"),
            StockpileId::from_parts("12", "1"),
            StockpileId::from_parts("6", "10"),
        ];
        ids.sort();
        let keys: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(keys, vec!["12_1", "6_10", "6_4"]);
    }
}
