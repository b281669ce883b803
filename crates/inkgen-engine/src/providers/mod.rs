use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use inkgen_contracts::upload::UploadedImage;
use serde_json::{Map, Value};

use crate::config::ProviderSettings;

mod dryrun;
mod gemini;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;

/// One call to an image provider: one photo, one instruction, one image back.
#[derive(Debug, Clone, Copy)]
pub struct ProviderGenerateRequest<'a> {
    pub image: &'a UploadedImage,
    pub prompt: &'a str,
    pub model: &'a str,
    /// Position within the fan-out batch.
    pub variation: usize,
    pub request_timeout_s: f64,
}

#[derive(Clone)]
pub struct ProviderImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl std::fmt::Debug for ProviderImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderGenerateResponse {
    pub image: ProviderImage,
    pub provider_response: Map<String, Value>,
    pub warnings: Vec<String>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ProviderGenerateRequest<'_>) -> Result<ProviderGenerateResponse>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(settings: &ProviderSettings) -> ImageProviderRegistry {
    let mut providers = ImageProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(GeminiProvider::new(settings));
    providers
}

pub(crate) fn output_extension_for_mime(mime: Option<&str>) -> &'static str {
    let lowered = mime.unwrap_or_default().trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}
