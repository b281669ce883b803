use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use super::{ImageProvider, ProviderGenerateRequest, ProviderGenerateResponse, ProviderImage};
use crate::config::ProviderSettings;
use crate::truncate_text;

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            api_base: settings.gemini_api_base.clone(),
            api_key: settings.gemini_api_key.clone(),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ProviderGenerateRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.image.media_type.mime(),
                            "data": BASE64.encode(&request.image.bytes),
                        }
                    },
                    { "text": request.prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }

    /// First inline image of the first candidate.
    fn extract_image(response_payload: &Value) -> Result<Option<ProviderImage>> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for part in parts {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            return Ok(Some(ProviderImage { bytes, mime_type }));
        }
        Ok(None)
    }

    fn text_parts(response_payload: &Value) -> Vec<String> {
        response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.pointer("/content/parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .map(|text| truncate_text(text.trim(), 240))
                    .filter(|text| !text.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, request: &ProviderGenerateRequest<'_>) -> Result<ProviderGenerateResponse> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(request.model);
        let payload = Self::build_payload(request);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(Duration::from_secs_f64(request.request_timeout_s))
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;

        let Some(image) = Self::extract_image(&response_payload)? else {
            bail!(
                "no image was generated (Gemini variation {})",
                request.variation
            );
        };
        let warnings = Self::text_parts(&response_payload)
            .into_iter()
            .map(|text| format!("Gemini note: {text}"))
            .collect();

        Ok(ProviderGenerateResponse {
            image,
            provider_response: crate::map_object(json!({
                "endpoint": endpoint,
                "model": request.model,
                "variation": request.variation,
                "usage_metadata": response_payload
                    .get("usageMetadata")
                    .cloned()
                    .unwrap_or(Value::Null),
            })),
            warnings,
        })
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}
