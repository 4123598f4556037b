//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data (conversation log)
    pub data_dir: PathBuf,

    /// Default engine settings applied to every new session
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-turn");

        let socket_path = match std::env::var("VOICE_TURN_SOCKET") {
            Ok(path) => PathBuf::from(path),
            Err(_) => data_dir.join("daemon.sock"),
        };

        let engine = EngineConfig::from_env().context("invalid engine configuration")?;

        Ok(Self {
            socket_path,
            data_dir,
            engine,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// How a final transcript event drives the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePolicy {
    /// Keep the schedule measured from the last growth
    #[default]
    OnSchedule,
    /// Collapse the remaining stage delays to zero
    Immediate,
}

impl FromStr for FinalizePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_schedule" => Ok(Self::OnSchedule),
            "immediate" => Ok(Self::Immediate),
            other => Err(ConfigError::Invalid {
                key: "VOICE_TURN_FINALIZE",
                value: other.to_string(),
            }),
        }
    }
}

/// Voice parameters handed to the synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub voice: String,
    /// Speaking rate in words per minute
    pub rate_wpm: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: "default".to_string(),
            rate_wpm: 180,
        }
    }
}

/// Per-session timing and fallback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Generation stage offset from the last growth
    pub t1_ms: u64,
    /// Synthesis stage offset from the last growth
    pub t2_ms: u64,
    /// Delivery stage offset from the last growth
    pub t3_ms: u64,
    /// Largest character delta still treated as a recognizer revision
    pub refinement_threshold_chars: usize,
    /// Bound on waiting for a late stage result
    pub max_extra_wait_ms: u64,
    pub finalize_policy: FinalizePolicy,
    /// Extend the silence window for very short turns
    pub adaptive_delay: bool,
    /// Spoken when the generator fails or times out
    pub fallback_text: String,
    pub voice: VoiceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            t1_ms: 500,
            t2_ms: 1500,
            t3_ms: 2000,
            refinement_threshold_chars: 2,
            max_extra_wait_ms: 5000,
            finalize_policy: FinalizePolicy::OnSchedule,
            adaptive_delay: false,
            fallback_text: "Sorry, I lost my train of thought. Could you say that again?"
                .to_string(),
            voice: VoiceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build engine defaults, letting `VOICE_TURN_*` variables override them
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            t1_ms: env_or("VOICE_TURN_T1_MS", defaults.t1_ms)?,
            t2_ms: env_or("VOICE_TURN_T2_MS", defaults.t2_ms)?,
            t3_ms: env_or("VOICE_TURN_T3_MS", defaults.t3_ms)?,
            refinement_threshold_chars: env_or(
                "VOICE_TURN_REFINEMENT_CHARS",
                defaults.refinement_threshold_chars,
            )?,
            max_extra_wait_ms: env_or("VOICE_TURN_MAX_EXTRA_WAIT_MS", defaults.max_extra_wait_ms)?,
            finalize_policy: match std::env::var("VOICE_TURN_FINALIZE") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.finalize_policy,
            },
            adaptive_delay: env_or("VOICE_TURN_ADAPTIVE_DELAY", defaults.adaptive_delay)?,
            fallback_text: std::env::var("VOICE_TURN_FALLBACK_TEXT")
                .unwrap_or(defaults.fallback_text),
            voice: VoiceConfig {
                voice: std::env::var("VOICE_TURN_VOICE").unwrap_or(defaults.voice.voice),
                rate_wpm: env_or("VOICE_TURN_RATE_WPM", defaults.voice.rate_wpm)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the stage ordering and fallback invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.t1_ms == 0 || self.t1_ms >= self.t2_ms || self.t2_ms >= self.t3_ms {
            return Err(ConfigError::Schedule {
                t1_ms: self.t1_ms,
                t2_ms: self.t2_ms,
                t3_ms: self.t3_ms,
            });
        }
        if self.fallback_text.trim().is_empty() {
            return Err(ConfigError::EmptyFallback);
        }
        if self.voice.rate_wpm == 0 {
            return Err(ConfigError::Invalid {
                key: "rate_wpm",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Apply per-session overrides on top of these settings
    pub fn with_overrides(&self, overrides: &EngineOverrides) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        if let Some(v) = overrides.t1_ms {
            config.t1_ms = v;
        }
        if let Some(v) = overrides.t2_ms {
            config.t2_ms = v;
        }
        if let Some(v) = overrides.t3_ms {
            config.t3_ms = v;
        }
        if let Some(v) = overrides.refinement_threshold_chars {
            config.refinement_threshold_chars = v;
        }
        if let Some(v) = overrides.max_extra_wait_ms {
            config.max_extra_wait_ms = v;
        }
        if let Some(v) = overrides.finalize_policy {
            config.finalize_policy = v;
        }
        if let Some(v) = overrides.adaptive_delay {
            config.adaptive_delay = v;
        }
        if let Some(v) = &overrides.fallback_text {
            config.fallback_text = v.clone();
        }
        if let Some(v) = &overrides.voice {
            config.voice = v.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Optional per-session settings sent with an activation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t1_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t2_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t3_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement_threshold_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_extra_wait_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_policy: Option<FinalizePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive_delay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceConfig>,
}

/// Errors raised while building an engine configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("stage offsets must satisfy 0 < t1 < t2 < t3 (got {t1_ms}/{t2_ms}/{t3_ms})")]
    Schedule { t1_ms: u64, t2_ms: u64, t3_ms: u64 },

    #[error("fallback text must not be empty")]
    EmptyFallback,
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
