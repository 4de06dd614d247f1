//! Engine error taxonomy.
//!
//! Validation errors are rejected synchronously and never persisted.
//! Not-found errors are fatal to the single operation that raised them.
//! Stale or low-quality samples are not errors; they surface as skipped
//! outcomes. Transient notification failures are data on the event's
//! delivery record, recovered by bounded retry.

use thiserror::Error;

use domain::stores::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{field}: {message}")
                })
            })
            .collect();

        EngineError::Validation(details.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::courier_location::LocationUpdateRequest;
    use domain::models::point::GeoPoint;
    use uuid::Uuid;
    use validator::Validate;

    #[test]
    fn test_display() {
        assert_eq!(
            EngineError::Validation("bad input".into()).to_string(),
            "Validation error: bad input"
        );
        assert_eq!(
            EngineError::NotFound("order 7".into()).to_string(),
            "Not found: order 7"
        );
    }

    #[test]
    fn test_from_store_error() {
        let err: EngineError = StoreError::NotFound("row".into()).into();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_from_validation_errors() {
        let request = LocationUpdateRequest {
            courier_id: Uuid::new_v4(),
            coordinates: GeoPoint::new(-200.0, 0.0),
            accuracy: None,
            heading: None,
            speed: None,
        };
        let err: EngineError = request.validate().unwrap_err().into();
        match err {
            EngineError::Validation(msg) => {
                assert!(msg.contains("coordinates"), "got {msg}");
            }
            other => panic!("expected validation error, got {other}"),
        }
    }
}
