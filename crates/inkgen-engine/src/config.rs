use std::env;
use std::path::{Path, PathBuf};

use crate::client::VARIATIONS_PER_REQUEST;

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

/// Provider credentials and transport settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub request_timeout_s: f64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
        }
    }
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: non_empty_env("GEMINI_API_KEY")
                .or_else(|| non_empty_env("GOOGLE_API_KEY"))
                .or_else(|| non_empty_env("API_KEY")),
            gemini_api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            request_timeout_s: parse_timeout(non_empty_env("INKGEN_REQUEST_TIMEOUT_S").as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    /// Root of the local document store and identity session.
    pub store_dir: PathBuf,
    /// Where generated images are written.
    pub out_dir: PathBuf,
    pub events_path: PathBuf,
    pub image_model: Option<String>,
    pub variations: usize,
    pub provider: ProviderSettings,
}

impl StudioConfig {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        let store_dir = store_dir.into();
        Self {
            out_dir: store_dir.join("generations"),
            events_path: store_dir.join("events.jsonl"),
            store_dir,
            image_model: None,
            variations: VARIATIONS_PER_REQUEST,
            provider: ProviderSettings::default(),
        }
    }

    /// Defaults plus `INKGEN_IMAGE_MODEL` and provider settings from the
    /// environment.
    pub fn from_env(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_model: non_empty_env("INKGEN_IMAGE_MODEL"),
            provider: ProviderSettings::from_env(),
            ..Self::new(store_dir)
        }
    }

    pub fn with_out_dir(mut self, out_dir: impl AsRef<Path>) -> Self {
        self.out_dir = out_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_events_path(mut self, events_path: impl AsRef<Path>) -> Self {
        self.events_path = events_path.as_ref().to_path_buf();
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.image_model = model;
        }
        self
    }
}

fn parse_timeout(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(15.0, 300.0))
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
