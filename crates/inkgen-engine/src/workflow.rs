use std::fmt;
use std::fs;
use std::sync::Arc;

use anyhow::Result;
use inkgen_contracts::accounts::{PlanOffer, PLAN_OFFERS};
use inkgen_contracts::events::EventWriter;
use inkgen_contracts::prompt::{compose_prompt, screen_prompt, IdeaMode, SafetyVerdict};
use inkgen_contracts::session::{GenerationResult, SessionContext};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use crate::client::{GeneratedBatch, GenerationClient};
use crate::store::{DebitOutcome, ProfileStore};
use crate::{error_chain_text, map_object};

/// Custom ideas shorter than this, after trimming, are refused.
pub const MIN_CUSTOM_PROMPT_CHARS: usize = 10;

pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate tattoo extension. Please try again.";
pub const RECORD_FAILED_WARNING: &str =
    "Your images were generated but could not be saved to your history.";

/// A precondition that stopped a generate action before any remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotSignedIn,
    UpgradeRequired,
    MissingImage,
    PromptTooShort,
    UnsafePrompt { keyword: &'static str },
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::NotSignedIn => "not_signed_in",
            Rejection::UpgradeRequired => "upgrade_required",
            Rejection::MissingImage => "missing_image",
            Rejection::PromptTooShort => "prompt_too_short",
            Rejection::UnsafePrompt { .. } => "unsafe_prompt",
        }
    }

    /// What the user sees. Never includes the matched keyword.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::NotSignedIn => "You must be signed in to generate.",
            Rejection::UpgradeRequired => "You're out of credits. Upgrade your plan to keep generating.",
            Rejection::MissingImage => "Please upload a photo of your tattoo first.",
            Rejection::PromptTooShort => "Please describe your idea in a bit more detail.",
            Rejection::UnsafePrompt { .. } => {
                "Your prompt seems to contain inappropriate content. Please revise it."
            }
        }
    }

    /// Paid plans to offer alongside an upgrade prompt.
    pub fn offers(&self) -> &'static [PlanOffer] {
        match self {
            Rejection::UpgradeRequired => PLAN_OFFERS,
            _ => &[],
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub batch_id: String,
    pub prompt: String,
    pub results: Vec<GenerationResult>,
    pub credits_remaining: u32,
    /// `None` when the history append failed after the debit.
    pub record_id: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed(GenerationReport),
    Rejected(Rejection),
    Failed { message: String },
}

impl GenerationOutcome {
    fn failed() -> Self {
        GenerationOutcome::Failed {
            message: GENERATION_FAILED_MESSAGE.to_string(),
        }
    }
}

/// One generate action: preconditions, fan-out, debit, history append.
///
/// Only journal writes surface as `Err`; every remote failure becomes an
/// outcome.
pub struct GenerationWorkflow {
    client: GenerationClient,
    store: Arc<dyn ProfileStore>,
    events: EventWriter,
    rng: StdRng,
}

impl GenerationWorkflow {
    pub fn new(client: GenerationClient, store: Arc<dyn ProfileStore>, events: EventWriter) -> Self {
        Self {
            client,
            store,
            events,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    pub fn run(&mut self, ctx: &mut SessionContext) -> Result<GenerationOutcome> {
        let (uid, prompt) = match self.check_preconditions(ctx) {
            Ok(checked) => checked,
            Err(rejection) => {
                self.emit_rejection(&rejection)?;
                return Ok(GenerationOutcome::Rejected(rejection));
            }
        };

        ctx.clear_results();
        self.events.emit(
            "generation_started",
            map_object(json!({
                "uid": uid,
                "prompt": prompt,
                "mode": ctx.form.mode.label(),
                "style": ctx.form.style.as_str(),
                "intensity": ctx.form.intensity.as_str(),
                "provider": self.client.provider_name(),
                "model": self.client.model(),
                "variations": self.client.variations(),
            })),
        )?;

        let generated = match ctx.upload.current() {
            Some(image) => self.client.generate(image, &prompt),
            None => return Ok(GenerationOutcome::Rejected(Rejection::MissingImage)),
        };
        let batch = match generated {
            Ok(batch) => batch,
            Err(err) => {
                self.events.emit(
                    "generation_failed",
                    map_object(json!({
                        "uid": uid,
                        "stage": "generate",
                        "error": error_chain_text(&err, 800),
                    })),
                )?;
                return Ok(GenerationOutcome::failed());
            }
        };
        for image in &batch.images {
            self.events.emit(
                "artifact_created",
                map_object(json!({
                    "batch_id": batch.batch_id,
                    "artifact_id": image.id,
                    "image_path": image.path.to_string_lossy(),
                    "mime_type": image.mime_type,
                    "provider_response": image.provider_response,
                })),
            )?;
        }

        let credits_remaining = match self.store.debit_credit(&uid) {
            Ok(DebitOutcome::Debited { remaining }) => remaining,
            Ok(DebitOutcome::Insufficient) => {
                ctx.set_credits(0);
                discard_batch(&batch);
                self.events.emit(
                    "credit_debit_rejected",
                    map_object(json!({ "uid": uid, "batch_id": batch.batch_id })),
                )?;
                return Ok(GenerationOutcome::Rejected(Rejection::UpgradeRequired));
            }
            Err(err) => {
                discard_batch(&batch);
                self.events.emit(
                    "generation_failed",
                    map_object(json!({
                        "uid": uid,
                        "stage": "debit",
                        "error": error_chain_text(&err, 800),
                    })),
                )?;
                return Ok(GenerationOutcome::failed());
            }
        };

        // The credit is spent: settle the context and history before any
        // journal write can fail.
        ctx.set_credits(credits_remaining);
        let results = batch
            .images
            .iter()
            .map(|image| GenerationResult {
                id: image.id.clone(),
                image_ref: image.path.to_string_lossy().into_owned(),
            })
            .collect::<Vec<_>>();
        let image_refs = results
            .iter()
            .map(|result| result.image_ref.clone())
            .collect::<Vec<_>>();
        let recorded = self.store.append_generation(&uid, &prompt, &image_refs);
        ctx.replace_results(results.clone());

        self.events.emit(
            "credit_debited",
            map_object(json!({ "uid": uid, "remaining": credits_remaining })),
        )?;
        let mut warnings = batch.warnings.clone();
        let record_id = match recorded {
            Ok(record) => {
                self.events.emit(
                    "generation_recorded",
                    map_object(json!({ "uid": uid, "record_id": record.record_id })),
                )?;
                Some(record.record_id)
            }
            Err(err) => {
                warnings.push(RECORD_FAILED_WARNING.to_string());
                self.events.emit(
                    "generation_record_failed",
                    map_object(json!({
                        "uid": uid,
                        "batch_id": batch.batch_id,
                        "prompt": prompt,
                        "image_refs": image_refs,
                        "error": error_chain_text(&err, 800),
                    })),
                )?;
                None
            }
        };

        self.events.emit(
            "generation_completed",
            map_object(json!({
                "uid": uid,
                "batch_id": batch.batch_id,
                "results": results.len(),
                "credits_remaining": credits_remaining,
                "record_id": record_id,
                "warnings": warnings,
            })),
        )?;

        Ok(GenerationOutcome::Completed(GenerationReport {
            batch_id: batch.batch_id,
            prompt,
            results,
            credits_remaining,
            record_id,
            warnings,
        }))
    }

    /// Returns the user id and the composed prompt.
    fn check_preconditions(&mut self, ctx: &SessionContext) -> Result<(String, String), Rejection> {
        let Some((identity, account)) = ctx.signed_in() else {
            return Err(Rejection::NotSignedIn);
        };
        if !account.has_credit() {
            return Err(Rejection::UpgradeRequired);
        }
        if ctx.upload.current().is_none() {
            return Err(Rejection::MissingImage);
        }
        if let IdeaMode::Custom(text) = &ctx.form.mode {
            if text.trim().chars().count() < MIN_CUSTOM_PROMPT_CHARS {
                return Err(Rejection::PromptTooShort);
            }
        }
        let prompt = compose_prompt(&ctx.form, &mut self.rng);
        if let SafetyVerdict::Blocked { keyword } = screen_prompt(&prompt) {
            return Err(Rejection::UnsafePrompt { keyword });
        }
        Ok((identity.uid.clone(), prompt))
    }

    fn emit_rejection(&self, rejection: &Rejection) -> Result<()> {
        let keyword = match rejection {
            Rejection::UnsafePrompt { keyword } => Value::from(*keyword),
            _ => Value::Null,
        };
        self.events.emit(
            "generation_rejected",
            map_object(json!({
                "reason": rejection.reason(),
                "message": rejection.message(),
                "keyword": keyword,
            })),
        )?;
        Ok(())
    }
}

fn discard_batch(batch: &GeneratedBatch) {
    for image in &batch.images {
        let _ = fs::remove_file(&image.path);
    }
}
