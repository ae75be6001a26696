//! Voice cloning stage

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use lequota::Capability;

use crate::contract::{Stage, StageContext, StagePolicy};
use crate::failure::StageError;
use crate::object_store::ObjectStore;
use crate::stages::{looks_like_uri, required_str};

/// Synthesizes a cloned-voice clip from text and a reference sample.
pub struct SynthesizeStage {
    objects: Arc<dyn ObjectStore>,
}

impl SynthesizeStage {
    /// Create the stage writing clips through `objects`.
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl Stage for SynthesizeStage {
    fn name(&self) -> &'static str {
        "synthesize"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy {
            timeout: Duration::from_secs(60),
            max_attempts: 2,
            backoff: Duration::from_millis(250),
            quota: Some(Capability::VoiceClone),
            ..StagePolicy::default()
        }
    }

    async fn run(&self, ctx: StageContext) -> Result<Value, StageError> {
        let text = required_str(&ctx.request, "text")?.trim().to_string();
        let reference = required_str(&ctx.request, "reference_audio_uri")?;
        if !looks_like_uri(reference) {
            return Err(StageError::domain(format!(
                "unreadable reference audio `{reference}`"
            )));
        }
        let voice_name = ctx
            .request
            .get("voice_name")
            .and_then(Value::as_str)
            .unwrap_or("default");

        let clip = format!("voice={voice_name} reference={reference} text={text}");
        let name = format!("voice_clone_{}.wav", ctx.session_id);
        let uri = self
            .objects
            .put(&name, clip.as_bytes())
            .await
            .map_err(|e| StageError::infrastructure(format!("media store: {e}")))?;

        info!(session = %ctx.session_id, clip = %uri, "cloned voice synthesized");
        Ok(json!({
            "audio_url": uri,
            "voice_name": voice_name,
            "text_length": text.chars().count(),
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
            SessionId::from_string("s-voice"),
            UserId::from_string("u-1"),
            SessionKind::VoiceClone,
            request,
        )
    }

    #[tokio::test]
    async fn synthesize_writes_a_clip_and_returns_its_url() {
        let dir = tempdir().expect("tempdir");
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::open(dir.path(), "/media").expect("open"));

        let output = SynthesizeStage::new(objects)
            .run(ctx(json!({
                "text": "hello from the clone",
                "reference_audio_uri": "/media/uploads/ref.wav",
                "voice_name": "narrator",
            })))
            .await
            .expect("synthesize");

        let url = output["audio_url"].as_str().expect("url");
        assert!(url.starts_with("/media/voice_clone_"));
        assert_eq!(output["voice_name"], json!("narrator"));
        assert!(dir.path().join(url.trim_start_matches("/media/")).exists());
    }

    #[tokio::test]
    async fn bad_reference_audio_is_a_domain_failure() {
        let dir = tempdir().expect("tempdir");
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::open(dir.path(), "/media").expect("open"));

        let err = SynthesizeStage::new(objects)
            .run(ctx(json!({
                "text": "hello",
                "reference_audio_uri": "no scheme here",
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Domain(_)));
    }

    #[test]
    fn synthesize_is_quota_gated_on_voice_clone() {
        let dir = tempdir().expect("tempdir");
        let objects: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::open(dir.path(), "/media").expect("open"));
        assert_eq!(
            SynthesizeStage::new(objects).policy().quota,
            Some(Capability::VoiceClone)
        );
    }
}
