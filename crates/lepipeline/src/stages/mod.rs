//! Shipped stage implementations per session kind
//!
//! These stages fabricate deterministic artifacts through the collaborator
//! traits; the real generative backends plug in behind the same [`Stage`]
//! contract without the orchestration layers noticing.
//!
//! [`Stage`]: crate::contract::Stage

/// Academic planning stages (syllabus, course schedule).
pub mod academic;
/// Usage aggregation stage.
pub mod analytics;
/// Video generation stages.
pub mod video;
/// Voice cloning stage.
pub mod voice;

pub use academic::{ComposeSyllabusStage, CurriculumOutlineStage, OptimizeScheduleStage, SolveScheduleStage};
pub use analytics::AggregateUsageStage;
pub use video::{AssembleStage, FormatStage, MediaGenerateStage, ResearchStage};
pub use voice::SynthesizeStage;

use serde_json::Value;

use crate::failure::StageError;

/// Fetch a required string field from a stage input object.
pub(crate) fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, StageError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| StageError::domain(format!("missing required field `{field}`")))
}

/// Whether a payload value plausibly references stored media.
pub(crate) fn looks_like_uri(raw: &str) -> bool {
    raw.starts_with('/') || raw.contains("://")
}
