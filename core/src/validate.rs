use serde_json::Value;

/// Why a raw message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message is not an object")]
    NotAnObject,
    #[error("message has no string type")]
    MissingType,
    #[error("{kind} message missing fields: {}", .fields.join(", "))]
    MissingFields {
        kind: String,
        fields: Vec<&'static str>,
    },
}

impl ValidationError {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::NotAnObject => "not_an_object",
            ValidationError::MissingType => "missing_type",
            ValidationError::MissingFields { .. } => "missing_fields",
        }
    }
}

enum Requirement {
    None,
    All(&'static [&'static str]),
    AnyPair(&'static [[&'static str; 2]]),
}

fn requirement_for(kind: &str) -> Requirement {
    match kind {
        "progress" => Requirement::AnyPair(&[["completed", "total"], ["filledCells", "totalCells"]]),
        "complete" => Requirement::All(&["completionTime", "score"]),
        "hint_used" => Requirement::All(&["hintsUsed"]),
        "word_revealed" => Requirement::All(&["wordIndex"]),
        "letter_validated" => Requirement::All(&["wordIndex", "isCorrect"]),
        "suggest_hint" => Requirement::All(&["wordIndex"]),
        "word_selected" => Requirement::All(&["wordIndex"]),
        "grid_updated" => Requirement::All(&["gridState"]),
        "dimensions" => Requirement::All(&["height"]),
        "cell_update" | "apply_cell_update" => Requirement::All(&["cellId", "value"]),
        "LOAD_STATE" => Requirement::All(&["gridState"]),
        "apply_input" => Requirement::All(&["value"]),
        "set_multiplayer" => Requirement::All(&["enabled"]),
        _ => Requirement::None,
    }
}

fn has_field(raw: &Value, field: &str) -> bool {
    let in_data = raw
        .get("data")
        .and_then(Value::as_object)
        .map(|data| data.get(field).is_some_and(|value| !value.is_null()))
        .unwrap_or(false);
    in_data || raw.get(field).is_some_and(|value| !value.is_null())
}

/// Structural check of an inbound message. Never panics.
///
/// Unknown kinds pass; receivers ignore them. Required fields are looked up in
/// `data` first, then at the top level of the message.
pub fn validate_message(raw: &Value) -> Result<(), ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject);
    }
    let Some(kind) = raw.get("type").and_then(Value::as_str) else {
        return Err(ValidationError::MissingType);
    };
    match requirement_for(kind) {
        Requirement::None => Ok(()),
        Requirement::All(fields) => {
            let missing: Vec<&'static str> = fields
                .iter()
                .copied()
                .filter(|field| !has_field(raw, field))
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(ValidationError::MissingFields {
                    kind: kind.to_string(),
                    fields: missing,
                })
            }
        }
        Requirement::AnyPair(pairs) => {
            if pairs
                .iter()
                .any(|pair| pair.iter().all(|field| has_field(raw, field)))
            {
                return Ok(());
            }
            let first = pairs.first().copied().unwrap_or_default();
            Err(ValidationError::MissingFields {
                kind: kind.to_string(),
                fields: first.iter().copied().filter(|field| !has_field(raw, field)).collect(),
            })
        }
    }
}

/// Same-origin always passes; otherwise the allowlist must contain `*` or the
/// exact origin string.
pub fn is_valid_origin<S: AsRef<str>>(origin: &str, own_origin: &str, allowlist: &[S]) -> bool {
    if !origin.is_empty() && origin == own_origin {
        return true;
    }
    allowlist.iter().any(|entry| {
        let entry = entry.as_ref();
        entry == "*" || entry == origin
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_are_named() {
        let err = validate_message(&json!({"type": "letter_validated", "data": {"wordIndex": 1}}))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingFields {
                kind: "letter_validated".to_string(),
                fields: vec!["isCorrect"],
            }
        );
        assert_eq!(err.code(), "missing_fields");
    }

    #[test]
    fn null_fields_count_as_missing() {
        assert!(validate_message(&json!({"type": "apply_input", "data": {"value": null}})).is_err());
    }
}
