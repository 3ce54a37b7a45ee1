//! Configuration layer: typed settings with layered precedence (file → env).

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "skyview";
const DEFAULT_CDN_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_BATCH_DEADLINE_MS: u64 = 2_000;
const DEFAULT_MAX_DEPTH: usize = 25;
const DEFAULT_MAX_PARENT_HEIGHT: usize = 80;
const DEFAULT_MAX_BRANCHING_FACTOR: usize = 50;
const DEFAULT_REPLY_FETCH_LIMIT: usize = 500;

/// Fully-resolved engine settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL blob references resolve against.
    pub cdn_base_url: Url,
    /// Deadline applied to every hydration batch.
    pub batch_deadline: Duration,
    pub thread: ThreadSettings,
    pub cache: CacheConfig,
}

/// Caps on thread assembly. Request parameters are clamped to these, so any
/// stored data yields a finite tree.
#[derive(Debug, Clone)]
pub struct ThreadSettings {
    pub max_depth: usize,
    pub max_parent_height: usize,
    pub max_branching_factor: usize,
    /// Replies fetched per parent per BFS level, before gating and bounding.
    pub reply_fetch_limit: NonZeroUsize,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_parent_height: DEFAULT_MAX_PARENT_HEIGHT,
            max_branching_factor: DEFAULT_MAX_BRANCHING_FACTOR,
            reply_fetch_limit: NonZeroUsize::new(DEFAULT_REPLY_FETCH_LIMIT)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cdn_base_url: Url::parse(DEFAULT_CDN_BASE_URL)
                .expect("default cdn base url is a constant and parses"),
            batch_deadline: Duration::from_millis(DEFAULT_BATCH_DEADLINE_MS),
            thread: ThreadSettings::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SKYVIEW").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    cdn: RawCdnSettings,
    hydration: RawHydrationSettings,
    thread: RawThreadSettings,
    cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCdnSettings {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHydrationSettings {
    batch_deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawThreadSettings {
    max_depth: Option<usize>,
    max_parent_height: Option<usize>,
    max_branching_factor: Option<usize>,
    reply_fetch_limit: Option<usize>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            cdn,
            hydration,
            thread,
            cache,
        } = raw;

        let cdn_base_url = cdn
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_CDN_BASE_URL)
            .parse::<Url>()
            .map_err(|err| LoadError::invalid("cdn.base_url", err.to_string()))?;

        let deadline_ms = hydration
            .batch_deadline_ms
            .unwrap_or(DEFAULT_BATCH_DEADLINE_MS);
        if deadline_ms == 0 {
            return Err(LoadError::invalid(
                "hydration.batch_deadline_ms",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            cdn_base_url,
            batch_deadline: Duration::from_millis(deadline_ms),
            thread: build_thread_settings(thread)?,
            cache,
        })
    }
}

fn build_thread_settings(thread: RawThreadSettings) -> Result<ThreadSettings, LoadError> {
    let max_depth = thread.max_depth.unwrap_or(DEFAULT_MAX_DEPTH);
    let max_parent_height = thread.max_parent_height.unwrap_or(DEFAULT_MAX_PARENT_HEIGHT);
    let max_branching_factor = thread
        .max_branching_factor
        .unwrap_or(DEFAULT_MAX_BRANCHING_FACTOR);
    if max_branching_factor == 0 {
        return Err(LoadError::invalid(
            "thread.max_branching_factor",
            "must be greater than zero",
        ));
    }

    let reply_fetch_limit = thread.reply_fetch_limit.unwrap_or(DEFAULT_REPLY_FETCH_LIMIT);
    let reply_fetch_limit = NonZeroUsize::new(reply_fetch_limit).ok_or_else(|| {
        LoadError::invalid("thread.reply_fetch_limit", "must be greater than zero")
    })?;

    Ok(ThreadSettings {
        max_depth,
        max_parent_height,
        max_branching_factor,
        reply_fetch_limit,
    })
}
