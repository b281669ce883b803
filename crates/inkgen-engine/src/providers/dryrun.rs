use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{ImageProvider, ProviderGenerateRequest, ProviderGenerateResponse, ProviderImage};

const DRYRUN_SIZE: u32 = 256;

/// Offline provider: a solid PNG whose colour is derived from the prompt and
/// the variation index. No network access.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ProviderGenerateRequest<'_>) -> Result<ProviderGenerateResponse> {
        let (r, g, b) = color_from_prompt(request.prompt, request.variation as u64);
        let mut image = RgbImage::new(DRYRUN_SIZE, DRYRUN_SIZE);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .context("dryrun image encode failed")?;

        Ok(ProviderGenerateResponse {
            image: ProviderImage {
                bytes: buf.into_inner(),
                mime_type: Some("image/png".to_string()),
            },
            provider_response: crate::map_object(json!({
                "status": "ok",
                "model": request.model,
                "variation": request.variation,
                "color": hex::encode([r, g, b]),
            })),
            warnings: Vec::new(),
        })
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
