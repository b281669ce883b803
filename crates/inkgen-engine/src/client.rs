use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use inkgen_contracts::upload::UploadedImage;
use serde_json::{Map, Value};

use crate::providers::{
    output_extension_for_mime, ImageProvider, ProviderGenerateRequest, ProviderGenerateResponse,
};

/// Independent provider calls issued for one generate action.
pub const VARIATIONS_PER_REQUEST: usize = 2;

const REALISM_PREAMBLE: &str = "Extend/update the existing tattoo realistically on the same body part; preserve original lines; blend edges seamlessly; keep skin texture natural; no obvious AI artifacts. ";

pub fn assemble_provider_prompt(prompt: &str) -> String {
    format!("{REALISM_PREAMBLE}{prompt}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Unique within its batch.
    pub id: String,
    pub path: PathBuf,
    pub mime_type: Option<String>,
    /// Provider metadata for the call that produced this image.
    pub provider_response: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBatch {
    pub batch_id: String,
    pub images: Vec<GeneratedImage>,
    pub warnings: Vec<String>,
}

/// Fans one instruction out to a provider and joins the results.
///
/// All-or-nothing: a batch is returned only when every variation produced an
/// image and every image was written to disk.
pub struct GenerationClient {
    provider: Arc<dyn ImageProvider>,
    model: String,
    variations: usize,
    out_dir: PathBuf,
    request_timeout_s: f64,
}

impl GenerationClient {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        model: impl Into<String>,
        out_dir: impl Into<PathBuf>,
        variations: usize,
        request_timeout_s: f64,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            variations: variations.max(1),
            out_dir: out_dir.into(),
            request_timeout_s,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn variations(&self) -> usize {
        self.variations
    }

    pub fn generate(&self, image: &UploadedImage, prompt: &str) -> Result<GeneratedBatch> {
        let full_prompt = assemble_provider_prompt(prompt);
        let responses = self.fan_out(image, &full_prompt)?;

        let batch_id = short_batch_id();
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        let mut images = Vec::with_capacity(responses.len());
        let mut warnings = Vec::new();
        for (idx, response) in responses.into_iter().enumerate() {
            let id = format!("{batch_id}-{:02}", idx + 1);
            let ext = output_extension_for_mime(response.image.mime_type.as_deref());
            let path = self.out_dir.join(format!("{id}.{ext}"));
            write_image(&path, &response.image.bytes)?;
            warnings.extend(response.warnings);
            images.push(GeneratedImage {
                id,
                path,
                mime_type: response.image.mime_type,
                provider_response: response.provider_response,
            });
        }

        Ok(GeneratedBatch {
            batch_id,
            images,
            warnings,
        })
    }

    fn fan_out(
        &self,
        image: &UploadedImage,
        full_prompt: &str,
    ) -> Result<Vec<ProviderGenerateResponse>> {
        let provider: &dyn ImageProvider = self.provider.as_ref();
        let outcomes: Vec<Result<ProviderGenerateResponse>> = thread::scope(|scope| {
            let handles = (0..self.variations)
                .map(|variation| {
                    let request = ProviderGenerateRequest {
                        image,
                        prompt: full_prompt,
                        model: &self.model,
                        variation,
                        request_timeout_s: self.request_timeout_s,
                    };
                    scope.spawn(move || provider.generate(&request))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("generation worker panicked")))
                })
                .collect()
        });

        let mut responses = Vec::with_capacity(outcomes.len());
        for (variation, outcome) in outcomes.into_iter().enumerate() {
            let response = outcome.with_context(|| {
                format!(
                    "{} variation {}/{} failed",
                    provider.name(),
                    variation + 1,
                    self.variations
                )
            })?;
            if response.image.bytes.is_empty() {
                bail!(
                    "{} returned an empty image for variation {}",
                    provider.name(),
                    variation + 1
                );
            }
            responses.push(response);
        }
        Ok(responses)
    }
}

fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn short_batch_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
