use serde::{Deserialize, Serialize};

use crate::accounts::{Account, Identity};
use crate::prompt::IdeaForm;
use crate::upload::UploadSlot;

/// One produced variation, valid until the next generate action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub id: String,
    pub image_ref: String,
}

/// Everything a generate action needs to know about the current user.
///
/// Built and mutated only by the session binder (auth transitions) and the
/// generation workflow; nothing else holds identity or account state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: Option<Identity>,
    pub account: Option<Account>,
    pub upload: UploadSlot,
    pub form: IdeaForm,
    results: Vec<GenerationResult>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            identity: None,
            account: None,
            upload: UploadSlot::new(),
            form: IdeaForm::default(),
            results: Vec::new(),
        }
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity and account together, or `None` when either is missing.
    pub fn signed_in(&self) -> Option<(&Identity, &Account)> {
        match (&self.identity, &self.account) {
            (Some(identity), Some(account)) => Some((identity, account)),
            _ => None,
        }
    }

    pub fn credits(&self) -> u32 {
        self.account
            .as_ref()
            .map(|account| account.credits)
            .unwrap_or(0)
    }

    pub fn bind(&mut self, identity: Identity, account: Account) {
        self.identity = Some(identity);
        self.account = Some(account);
    }

    /// Drops the identity and every piece of per-user form state.
    pub fn reset_for_sign_out(&mut self) {
        *self = Self::default();
    }

    pub fn results(&self) -> &[GenerationResult] {
        &self.results
    }

    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    pub fn replace_results(&mut self, results: Vec<GenerationResult>) {
        self.results = results;
    }

    pub fn set_credits(&mut self, credits: u32) {
        if let Some(account) = self.account.as_mut() {
            account.credits = credits;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationResult, SessionContext};
    use crate::accounts::{Account, Identity};
    use crate::prompt::{IdeaForm, IdeaMode, Intensity, TattooStyle};

    #[test]
    fn signed_in_requires_identity_and_account() {
        let mut ctx = SessionContext::new();
        assert!(ctx.signed_in().is_none());
        ctx.identity = Some(Identity::new("uid-1"));
        assert!(ctx.signed_in().is_none());
        ctx.account = Some(Account::for_identity(&Identity::new("uid-1")));
        assert_eq!(ctx.signed_in().map(|(identity, _)| identity.uid.as_str()), Some("uid-1"));
        assert_eq!(ctx.credits(), 3);
    }

    #[test]
    fn sign_out_resets_form_results_and_upload() {
        let identity = Identity::new("uid-1");
        let mut ctx = SessionContext::new();
        ctx.bind(identity.clone(), Account::for_identity(&identity));
        ctx.form = IdeaForm {
            mode: IdeaMode::Custom("koi".to_string()),
            style: TattooStyle::Color,
            intensity: Intensity::Bold,
        };
        ctx.replace_results(vec![GenerationResult {
            id: "b-01".to_string(),
            image_ref: "/tmp/b-01.png".to_string(),
        }]);

        ctx.reset_for_sign_out();

        assert!(ctx.identity.is_none());
        assert!(ctx.account.is_none());
        assert!(ctx.results().is_empty());
        assert!(ctx.upload.current().is_none());
        assert_eq!(ctx.form.mode, IdeaMode::Random);
        assert_eq!(ctx.form.style, TattooStyle::BlackAndGrey);
        assert_eq!(ctx.form.intensity, Intensity::Balanced);
    }

    #[test]
    fn replace_results_never_accumulates() {
        let mut ctx = SessionContext::new();
        let result = |id: &str| GenerationResult {
            id: id.to_string(),
            image_ref: format!("/tmp/{id}.png"),
        };
        ctx.replace_results(vec![result("a-01"), result("a-02")]);
        ctx.replace_results(vec![result("b-01")]);
        assert_eq!(ctx.results().len(), 1);
        assert_eq!(ctx.results()[0].id, "b-01");
    }
}
