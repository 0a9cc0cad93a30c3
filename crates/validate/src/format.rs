//! Structural well-formedness of tool keys and references.

use toolgraph_model::{CheckError, ToolKey, ToolReference, MAX_SCOPE_LEN, MAX_TOOL_NAME_LEN};

/// Every rule `key` violates, in field order.
pub fn key_violations(key: &ToolKey) -> Vec<String> {
    let mut violations = Vec::new();
    for (field, value, max) in [
        ("namespace", &key.namespace, MAX_SCOPE_LEN),
        ("group", &key.group, MAX_SCOPE_LEN),
        ("toolName", &key.tool_name, MAX_TOOL_NAME_LEN),
    ] {
        let len = value.chars().count();
        if value.trim().is_empty() {
            violations.push(format!("{field} must be a non-empty string"));
        } else if len > max {
            violations.push(format!("{field} exceeds {max} characters ({len})"));
        }
    }
    violations
}

/// Every rule `reference` violates, in field order.
pub fn reference_violations(reference: &ToolReference) -> Vec<String> {
    let mut violations = key_violations(&reference.key);
    if let Some(version) = reference.version {
        if version < 1 {
            violations.push(format!("toolVersion must be a positive integer (got {version})"));
        }
    }
    violations
}

/// Check one reference; the error lists every violated field.
///
/// ```
/// use toolgraph_model::{ToolKey, ToolReference};
/// use toolgraph_validate::check_reference;
///
/// let bad = ToolReference::pinned(ToolKey::new("", "g1", ""), 0);
/// let err = check_reference(&bad).unwrap_err();
/// assert!(err.to_string().contains("namespace"));
/// assert!(err.to_string().contains("toolName"));
/// assert!(err.to_string().contains("toolVersion"));
/// ```
pub fn check_reference(reference: &ToolReference) -> Result<(), CheckError> {
    let violations = reference_violations(reference);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CheckError::Format {
            reference: reference.key.to_string(),
            violations,
        })
    }
}

pub fn check_key(key: &ToolKey) -> Result<(), CheckError> {
    let violations = key_violations(key);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CheckError::Format {
            reference: key.to_string(),
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reference_passes() {
        let reference = ToolReference::pinned(ToolKey::new("n1", "g1", "tool1"), 1);
        assert!(check_reference(&reference).is_ok());
        assert!(check_reference(&ToolReference::new(ToolKey::new("n1", "g1", "t"))).is_ok());
    }

    #[test]
    fn length_bounds_are_inclusive() {
        let at_limit = ToolKey::new("n".repeat(50), "g".repeat(50), "t".repeat(100));
        assert!(key_violations(&at_limit).is_empty());

        let over = ToolKey::new("n".repeat(51), "g", "t".repeat(101));
        let violations = key_violations(&over);
        assert_eq!(violations.len(), 2);
        assert!(violations[0].starts_with("namespace exceeds 50"));
        assert!(violations[1].starts_with("toolName exceeds 100"));
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let key = ToolKey::new("ñ".repeat(50), "g", "t");
        assert!(key_violations(&key).is_empty());
    }

    #[test]
    fn negative_pin_and_blank_parts_are_all_reported() {
        let reference = ToolReference::pinned(ToolKey::new(" ", "", "t"), -2);
        let err = check_reference(&reference).unwrap_err();
        match err {
            CheckError::Format { violations, .. } => {
                assert_eq!(
                    violations,
                    vec![
                        "namespace must be a non-empty string".to_string(),
                        "group must be a non-empty string".to_string(),
                        "toolVersion must be a positive integer (got -2)".to_string(),
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
