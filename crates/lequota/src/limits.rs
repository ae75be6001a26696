//! Capability identifiers and configured limits

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A quota-gated capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// One video-generation pipeline admission.
    VideoGeneration,
    /// One voice-synthesis invocation.
    VoiceClone,
}

impl Capability {
    /// Wire name of this capability.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::VideoGeneration => "video_generation",
            Capability::VoiceClone => "voice_clone",
        }
    }

    /// Every gated capability.
    pub fn all() -> [Capability; 2] {
        [Capability::VideoGeneration, Capability::VoiceClone]
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caps for one capability. `None` means the window is uncapped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CapabilityLimits {
    /// Maximum admissions per calendar day (UTC).
    pub per_day: Option<u32>,
    /// Maximum admissions per calendar month (UTC).
    pub per_month: Option<u32>,
}

/// Configured limits per capability.
#[derive(Debug, Clone)]
pub struct QuotaLimits {
    caps: HashMap<Capability, CapabilityLimits>,
}

impl QuotaLimits {
    /// Build from explicit per-capability caps.
    pub fn new(caps: HashMap<Capability, CapabilityLimits>) -> Self {
        Self { caps }
    }

    /// Limits for one capability; absent capabilities are uncapped.
    pub fn for_capability(&self, capability: Capability) -> CapabilityLimits {
        self.caps
            .get(&capability)
            .copied()
            .unwrap_or(CapabilityLimits {
                per_day: None,
                per_month: None,
            })
    }

    /// Override the caps for one capability.
    pub fn set(&mut self, capability: Capability, limits: CapabilityLimits) {
        self.caps.insert(capability, limits);
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        let mut caps = HashMap::new();
        caps.insert(
            Capability::VideoGeneration,
            CapabilityLimits {
                per_day: Some(3),
                per_month: Some(10),
            },
        );
        caps.insert(
            Capability::VoiceClone,
            CapabilityLimits {
                per_day: Some(10),
                per_month: Some(50),
            },
        );
        Self { caps }
    }
}
