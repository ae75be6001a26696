//! Static kind-to-pipeline resolution
//!
//! The mapping from request kind to its ordered stage list is
//! configuration built once at startup, never computed per request.

use std::collections::HashMap;
use std::sync::Arc;

use lepipeline::stages::{
    AggregateUsageStage, AssembleStage, ComposeSyllabusStage, CurriculumOutlineStage,
    FormatStage, MediaGenerateStage, OptimizeScheduleStage, ResearchStage, SolveScheduleStage,
    SynthesizeStage,
};
use lepipeline::{ObjectStore, Stage};
use leseance::{SessionKind, SessionStore};

/// Ordered stage lists per request kind.
pub struct PipelineSet {
    map: HashMap<SessionKind, Vec<Arc<dyn Stage>>>,
}

impl PipelineSet {
    /// The shipped pipelines, wired to their collaborators.
    pub fn standard(objects: Arc<dyn ObjectStore>, store: Arc<dyn SessionStore>) -> Self {
        let mut map: HashMap<SessionKind, Vec<Arc<dyn Stage>>> = HashMap::new();
        map.insert(
            SessionKind::VideoGeneration,
            vec![
                Arc::new(FormatStage),
                Arc::new(ResearchStage),
                Arc::new(MediaGenerateStage::new(Arc::clone(&objects))),
                Arc::new(AssembleStage::new(Arc::clone(&objects))),
            ],
        );
        map.insert(
            SessionKind::VoiceClone,
            vec![Arc::new(SynthesizeStage::new(objects))],
        );
        map.insert(
            SessionKind::Syllabus,
            vec![
                Arc::new(CurriculumOutlineStage),
                Arc::new(ComposeSyllabusStage),
            ],
        );
        map.insert(
            SessionKind::CourseSchedule,
            vec![
                Arc::new(SolveScheduleStage),
                Arc::new(OptimizeScheduleStage),
            ],
        );
        map.insert(
            SessionKind::AnalyticsQuery,
            vec![Arc::new(AggregateUsageStage::new(store))],
        );
        Self { map }
    }

    /// Build from an explicit mapping (test doubles, alternative stages).
    pub fn custom(map: HashMap<SessionKind, Vec<Arc<dyn Stage>>>) -> Self {
        Self { map }
    }

    /// Ordered stages for `kind`; empty when the kind has no pipeline.
    pub fn for_kind(&self, kind: SessionKind) -> &[Arc<dyn Stage>] {
        self.map.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of stages configured for `kind`.
    pub fn stage_count(&self, kind: SessionKind) -> usize {
        self.for_kind(kind).len()
    }
}
