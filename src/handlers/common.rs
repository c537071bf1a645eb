use serde::Deserialize;
use validator::Validate;

use crate::errors::ApiError;

/// Page selection for list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Runs derive-based validation and converts failures into a 400 with
/// per-field messages.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input
        .validate()
        .map_err(|e| ApiError::ValidationError(format_validation_errors(&e)))
}

fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let messages: Vec<String> = errs
                .iter()
                .map(|err| {
                    err.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string())
                })
                .collect();
            format!("{}: {}", field, messages.join(", "))
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(email)]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    #[test]
    fn valid_input_passes() {
        let sample = Sample {
            email: "a@example.com".to_string(),
            password: "longenough".to_string(),
        };
        assert!(validate_input(&sample).is_ok());
    }

    #[test]
    fn invalid_input_names_the_fields() {
        let sample = Sample {
            email: "nope".to_string(),
            password: "short".to_string(),
        };
        let err = validate_input(&sample).unwrap_err();
        let message = format!("{}", err);
        assert!(message.contains("email"));
        assert!(message.contains("password"));
    }
}
