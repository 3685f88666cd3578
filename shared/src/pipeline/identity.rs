//! Stockpile identity derivation
//!
//! Every source that references a stockpile goes through
//! [`resolve_identity`], so the same yard/stack pair always yields the same
//! key regardless of which export it came from.

use crate::types::StockpileId;

/// Derive the join key from raw yard and stack cells.
///
/// Both parts are trimmed. Integral numeric spellings collapse to plain
/// integers (`"06"`, `"6.0"` and `"6"` all become `"6"`) because the
/// fires, supplies and temperature exports disagree on numeric formatting.
/// Anything else is kept verbatim. Returns `None` when either part is
/// missing, blank or a non-finite number.
pub fn resolve_identity(yard: Option<&str>, stack: Option<&str>) -> Option<StockpileId> {
    let yard = canonical_part(yard?)?;
    let stack = canonical_part(stack?)?;
    Some(StockpileId::from_parts(yard, stack))
}

fn canonical_part(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.replace(',', ".").parse::<f64>() {
        Ok(value) if !value.is_finite() => None,
        Ok(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some(format!("{}", value as i64))
        }
        _ => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_numeric_parts() {
        let id = resolve_identity(Some("6"), Some("4")).unwrap();
        assert_eq!(id.as_str(), "6_4");
    }

    #[test]
    fn test_numeric_spellings_collapse() {
        let a = resolve_identity(Some("06"), Some("4.0")).unwrap();
        let b = resolve_identity(Some(" 6 "), Some("4")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "6_4");
    }

    #[test]
    fn test_text_parts_kept_verbatim() {
        let id = resolve_identity(Some("6"), Some("4А")).unwrap();
        assert_eq!(id.as_str(), "6_4А");
        let id = resolve_identity(Some("6"), Some("4.5")).unwrap();
        assert_eq!(id.as_str(), "6_4.5");
    }

    #[test]
    fn test_missing_or_blank_parts() {
        assert!(resolve_identity(None, Some("4")).is_none());
        assert!(resolve_identity(Some("6"), None).is_none());
        assert!(resolve_identity(Some("  "), Some("4")).is_none());
        assert!(resolve_identity(Some("nan"), Some("4")).is_none());
        assert!(resolve_identity(Some("6"), Some("inf")).is_none());
    }

    proptest! {
        #[test]
        fn prop_identity_same_across_sources(yard in 0u32..1000, stack in 0u32..1000) {
            // integer column vs float column vs zero-padded text
            let from_temperature = resolve_identity(Some(&yard.to_string()), Some(&stack.to_string()));
            let from_fires = resolve_identity(Some(&format!("{}.0", yard)), Some(&format!("{}.0", stack)));
            let from_supplies = resolve_identity(Some(&format!("{:04}", yard)), Some(&format!(" {} ", stack)));
            prop_assert_eq!(from_temperature.as_ref().map(|i| i.as_str().to_string()),
                            from_fires.as_ref().map(|i| i.as_str().to_string()));
            prop_assert_eq!(from_temperature, from_supplies);
        }
    }
}
