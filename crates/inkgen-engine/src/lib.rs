use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use inkgen_contracts::accounts::{Account, GenerationRecord, Identity};
use inkgen_contracts::events::EventWriter;
use inkgen_contracts::models::{ModelSelector, EDIT_CAPABILITY};
use inkgen_contracts::prompt::IdeaForm;
use inkgen_contracts::session::SessionContext;
use inkgen_contracts::upload::{ImagePreview, UploadError};
use serde_json::json;

pub mod client;
pub mod config;
pub mod identity;
pub mod providers;
pub mod session;
pub mod store;
pub mod workflow;

pub(crate) use inkgen_contracts::events::map_object;

use crate::client::GenerationClient;
use crate::config::StudioConfig;
use crate::identity::{IdentityProvider, LocalIdentityProvider};
use crate::providers::default_provider_registry;
use crate::session::{SessionBinder, SIGN_IN_FAILED_MESSAGE};
use crate::store::{FileProfileStore, ProfileStore};
use crate::workflow::{GenerationOutcome, GenerationWorkflow, Rejection};

/// Owns the store, the identity session, the generation workflow and the
/// per-user [`SessionContext`] for one process.
pub struct Studio {
    events: EventWriter,
    store: Arc<dyn ProfileStore>,
    identity: Arc<dyn IdentityProvider>,
    binder: SessionBinder,
    workflow: GenerationWorkflow,
    context: SessionContext,
    fallback_reason: Option<String>,
}

impl Studio {
    pub fn open(config: StudioConfig) -> Result<Self> {
        fs::create_dir_all(&config.store_dir)
            .with_context(|| format!("failed to create {}", config.store_dir.display()))?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(&config.events_path, session_id);
        let store: Arc<dyn ProfileStore> = Arc::new(FileProfileStore::new(&config.store_dir));
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(LocalIdentityProvider::open(&config.store_dir)?);

        let selection = ModelSelector::new(None)
            .select(config.image_model.as_deref(), EDIT_CAPABILITY)
            .map_err(anyhow::Error::msg)?;
        let providers = default_provider_registry(&config.provider);
        let provider = providers.get(&selection.model.provider).ok_or_else(|| {
            anyhow!(
                "no provider '{}' registered for model '{}'",
                selection.model.provider,
                selection.model.name
            )
        })?;
        let client = GenerationClient::new(
            provider,
            selection.model.name.clone(),
            &config.out_dir,
            config.variations,
            config.provider.request_timeout_s,
        );

        Self::with_parts(events, store, identity, client, selection.fallback_reason)
    }

    pub fn with_parts(
        events: EventWriter,
        store: Arc<dyn ProfileStore>,
        identity: Arc<dyn IdentityProvider>,
        client: GenerationClient,
        fallback_reason: Option<String>,
    ) -> Result<Self> {
        events.emit(
            "session_started",
            map_object(json!({
                "provider": client.provider_name(),
                "model": client.model(),
                "variations": client.variations(),
                "fallback_reason": fallback_reason,
            })),
        )?;
        let binder = SessionBinder::new(identity.subscribe()?, store.clone(), events.clone());
        let workflow = GenerationWorkflow::new(client, store.clone(), events.clone());
        let mut studio = Self {
            events,
            store,
            identity,
            binder,
            workflow,
            context: SessionContext::new(),
            fallback_reason,
        };
        if let Err(err) = studio.sync_session() {
            // A stored session that cannot be bound is dropped so the
            // studio still opens signed out.
            studio.identity.sign_out()?;
            studio.sync_session()?;
            studio.events.emit(
                "session_restore_failed",
                map_object(json!({ "error": error_chain_text(&err, 800) })),
            )?;
        }
        Ok(studio)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn account(&self) -> Option<&Account> {
        self.context.account.as_ref()
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn provider_name(&self) -> &str {
        self.workflow.client().provider_name()
    }

    pub fn model(&self) -> &str {
        self.workflow.client().model()
    }

    /// Why the requested image model was not used, if it wasn't.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Applies pending identity transitions to the session.
    pub fn sync_session(&mut self) -> Result<usize> {
        self.binder.sync(&mut self.context)
    }

    pub fn sign_in(&mut self, identity: Identity) -> Result<&Account> {
        self.identity
            .sign_in(identity)
            .context(SIGN_IN_FAILED_MESSAGE)?;
        if let Err(err) = self.sync_session() {
            self.identity
                .sign_out()
                .context("failed to roll back sign-in")?;
            self.sync_session()?;
            return Err(err);
        }
        self.context
            .account
            .as_ref()
            .ok_or_else(|| anyhow!(SIGN_IN_FAILED_MESSAGE))
    }

    pub fn sign_out(&mut self) -> Result<()> {
        self.identity.sign_out()?;
        self.sync_session()?;
        Ok(())
    }

    /// Outer error: journal failure. Inner error: the file was refused and
    /// any previous selection is kept.
    pub fn select_image(&mut self, path: &Path) -> Result<Result<ImagePreview, UploadError>> {
        match self.context.upload.select_path(path) {
            Ok(image) => {
                let preview = image.preview.clone();
                self.events.emit(
                    "upload_selected",
                    map_object(json!({
                        "file_name": preview.file_name,
                        "media_type": image.media_type.mime(),
                        "width": preview.width,
                        "height": preview.height,
                        "bytes": image.bytes.len(),
                    })),
                )?;
                Ok(Ok(preview))
            }
            Err(err) => {
                let detail = match &err {
                    UploadError::Unreadable(detail) => Some(truncate_text(detail, 240)),
                    UploadError::Unsupported => None,
                };
                self.events.emit(
                    "upload_rejected",
                    map_object(json!({
                        "path": path.to_string_lossy(),
                        "message": err.user_message(),
                        "detail": detail,
                    })),
                )?;
                Ok(Err(err))
            }
        }
    }

    pub fn set_form(&mut self, form: IdeaForm) {
        self.context.form = form;
    }

    pub fn generate(&mut self) -> Result<GenerationOutcome> {
        self.sync_session()?;
        self.workflow.run(&mut self.context)
    }

    pub fn history(&self) -> Result<Vec<GenerationRecord>> {
        let Some((identity, _)) = self.context.signed_in() else {
            bail!("{}", Rejection::NotSignedIn);
        };
        self.store.list_generations(&identity.uid)
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().is_some_and(|last| last == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;

    use anyhow::{bail, Result};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use inkgen_contracts::accounts::Identity;
    use inkgen_contracts::events::read_event_types;
    use inkgen_contracts::prompt::{IdeaForm, Intensity, TattooStyle};
    use inkgen_contracts::upload::UploadError;

    use super::{error_chain_text, truncate_text, Studio};
    use crate::config::StudioConfig;
    use crate::workflow::{GenerationOutcome, Rejection};

    fn dryrun_config(root: &Path) -> StudioConfig {
        StudioConfig::new(root).with_image_model(Some("dryrun-edit-1".to_string()))
    }

    fn write_photo(path: &Path) -> Result<()> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 6)).write_to(&mut buf, ImageFormat::Png)?;
        std::fs::write(path, buf.into_inner())?;
        Ok(())
    }

    #[test]
    fn dryrun_studio_generates_end_to_end() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = temp.path().join("arm.png");
        write_photo(&photo)?;

        let mut studio = Studio::open(dryrun_config(temp.path()))?;
        assert_eq!(studio.provider_name(), "dryrun");
        assert!(studio.fallback_reason().is_none());

        let account = studio.sign_in(Identity::new("uid-1"))?;
        assert_eq!(account.credits, 3);

        let preview = match studio.select_image(&photo)? {
            Ok(preview) => preview,
            Err(err) => bail!("upload refused: {err}"),
        };
        assert_eq!((preview.width, preview.height), (8, 6));

        studio.set_form(IdeaForm {
            style: TattooStyle::BlackAndGrey,
            intensity: Intensity::Bold,
            ..IdeaForm::preset("irezumi")
        });
        let GenerationOutcome::Completed(report) = studio.generate()? else {
            bail!("expected a completed generation");
        };
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.credits_remaining, 2);
        assert_eq!(studio.history()?.len(), 1);

        let types = read_event_types(&temp.path().join("events.jsonl"))?;
        assert_eq!(types.first().map(String::as_str), Some("session_started"));
        assert!(types.contains(&"account_created".to_string()));
        assert!(types.contains(&"upload_selected".to_string()));
        assert_eq!(types.last().map(String::as_str), Some("generation_completed"));
        Ok(())
    }

    #[test]
    fn reopened_studio_restores_session_and_balance() -> Result<()> {
        let temp = tempfile::tempdir()?;
        {
            let mut studio = Studio::open(dryrun_config(temp.path()))?;
            studio.sign_in(Identity::new("uid-1"))?;
        }
        let mut studio = Studio::open(dryrun_config(temp.path()))?;
        assert_eq!(studio.account().map(|account| account.credits), Some(3));

        studio.sign_out()?;
        assert!(studio.account().is_none());
        assert!(studio.history().is_err());
        assert_eq!(
            studio.generate()?,
            GenerationOutcome::Rejected(Rejection::NotSignedIn)
        );
        Ok(())
    }

    #[test]
    fn rejected_upload_keeps_previous_selection() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = temp.path().join("arm.png");
        write_photo(&photo)?;
        let notes = temp.path().join("notes.txt");
        std::fs::write(&notes, "not an image")?;

        let mut studio = Studio::open(dryrun_config(temp.path()))?;
        assert!(studio.select_image(&photo)?.is_ok());
        let refused = studio.select_image(&notes)?;
        assert!(matches!(refused, Err(UploadError::Unsupported | UploadError::Unreadable(_))));
        assert_eq!(
            studio
                .context()
                .upload
                .current()
                .map(|image| image.preview.file_name.clone())
                .as_deref(),
            Some("arm.png")
        );
        let types = read_event_types(&temp.path().join("events.jsonl"))?;
        assert_eq!(types.last().map(String::as_str), Some("upload_rejected"));
        Ok(())
    }

    #[test]
    fn unknown_model_falls_back_to_edit_model() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = StudioConfig::new(temp.path()).with_image_model(Some("flux-2".to_string()));
        let studio = Studio::open(config)?;
        assert_eq!(studio.provider_name(), "gemini");
        assert_eq!(studio.model(), "gemini-2.5-flash-image-preview");
        assert!(studio
            .fallback_reason()
            .is_some_and(|reason| reason.contains("flux-2")));
        Ok(())
    }

    #[test]
    fn provider_style_uid_signs_in() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = Studio::open(dryrun_config(temp.path()))?;
        let account = studio.sign_in(Identity::new("google-oauth2|1234"))?;
        assert_eq!(account.uid, "google-oauth2|1234");
        assert_eq!(account.credits, 3);

        let reopened = Studio::open(dryrun_config(temp.path()))?;
        assert_eq!(
            reopened.account().map(|account| account.uid.as_str()),
            Some("google-oauth2|1234")
        );
        Ok(())
    }

    #[test]
    fn failed_account_bind_rolls_back_sign_in() -> Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("users"), "not a directory")?;
        let mut studio = Studio::open(dryrun_config(temp.path()))?;

        assert!(studio.sign_in(Identity::new("uid-1")).is_err());
        assert!(studio.account().is_none());
        assert!(!temp.path().join("session.json").exists());

        std::fs::remove_file(temp.path().join("users"))?;
        let account = studio.sign_in(Identity::new("uid-1"))?;
        assert_eq!(account.credits, 3);
        Ok(())
    }

    #[test]
    fn unbindable_stored_session_opens_signed_out() -> Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("session.json"),
            serde_json::to_string(&Identity::new("uid-1"))?,
        )?;
        std::fs::write(temp.path().join("users"), "not a directory")?;

        let mut studio = Studio::open(dryrun_config(temp.path()))?;

        assert!(studio.account().is_none());
        assert!(!temp.path().join("session.json").exists());
        studio.sign_out()?;
        let types = read_event_types(&temp.path().join("events.jsonl"))?;
        assert_eq!(types.last().map(String::as_str), Some("session_restore_failed"));
        Ok(())
    }

    #[test]
    fn error_chain_text_keeps_nested_contexts() {
        let err = anyhow::anyhow!("socket closed")
            .context("Gemini request failed (https://example.test)")
            .context("gemini variation 1/2 failed");
        let rendered = error_chain_text(&err, 400);
        assert!(rendered.starts_with("gemini variation 1/2 failed | caused by: "));
        assert!(rendered.ends_with("socket closed"));
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
