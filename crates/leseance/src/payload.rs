//! Request payload shape validation per session kind
//!
//! Validation covers the minimal shape a pipeline needs to start; richer
//! interpretation (duration clamping, constraint parsing) belongs to the
//! stages themselves.

use serde_json::Value;

use crate::error::ValidationError;
use crate::model::SessionKind;

/// Validate `payload` against the minimal shape required for `kind`.
///
/// Rejection happens before any session is created; the error message is
/// suitable for direct display to the submitting client.
pub fn validate_payload(kind: SessionKind, payload: &Value) -> Result<(), ValidationError> {
    let obj = payload.as_object().ok_or(ValidationError::NotAnObject)?;

    match kind {
        SessionKind::VideoGeneration => {
            require_text(obj, "prompt")?;
            require_text(obj, "image_uri")?;
            require_text(obj, "audio_uri")?;
            if let Some(raw) = obj.get("duration_secs") {
                if !raw.is_u64() {
                    return Err(ValidationError::Invalid {
                        field: "duration_secs",
                        reason: "must be a positive integer number of seconds".to_string(),
                    });
                }
            }
            Ok(())
        }
        SessionKind::VoiceClone => {
            require_text(obj, "text")?;
            require_text(obj, "reference_audio_uri")?;
            Ok(())
        }
        SessionKind::Syllabus => {
            let info = obj
                .get("course_info")
                .ok_or(ValidationError::MissingField("course_info"))?;
            if !info.is_object() {
                return Err(ValidationError::Invalid {
                    field: "course_info",
                    reason: "must be an object".to_string(),
                });
            }
            require_items(obj, "learning_objectives")?;
            Ok(())
        }
        SessionKind::CourseSchedule => {
            require_items(obj, "courses")?;
            require_text(obj, "semester_start")?;
            require_text(obj, "semester_end")?;
            Ok(())
        }
        SessionKind::AnalyticsQuery => {
            require_items(obj, "metrics")?;
            Ok(())
        }
    }
}

/// Require a present, non-empty string field.
fn require_text(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<(), ValidationError> {
    match obj.get(field) {
        None => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::EmptyField(field)),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(ValidationError::Invalid {
            field,
            reason: "must be a string".to_string(),
        }),
    }
}

/// Require a present, non-empty array field.
fn require_items(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<(), ValidationError> {
    match obj.get(field) {
        None => Err(ValidationError::MissingField(field)),
        Some(Value::Array(items)) if items.is_empty() => Err(ValidationError::EmptyField(field)),
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(ValidationError::Invalid {
            field,
            reason: "must be an array".to_string(),
        }),
    }
}
