use std::sync::Arc;

use anyhow::{Context, Result};
use inkgen_contracts::accounts::Identity;
use inkgen_contracts::events::EventWriter;
use inkgen_contracts::session::SessionContext;
use serde_json::json;

use crate::identity::{AuthChange, AuthSubscription};
use crate::map_object;
use crate::store::ProfileStore;

pub const SIGN_IN_FAILED_MESSAGE: &str = "Failed to sign in. Please try again.";

/// Applies identity transitions to a [`SessionContext`].
pub struct SessionBinder {
    subscription: AuthSubscription,
    store: Arc<dyn ProfileStore>,
    events: EventWriter,
}

impl SessionBinder {
    pub fn new(
        subscription: AuthSubscription,
        store: Arc<dyn ProfileStore>,
        events: EventWriter,
    ) -> Self {
        Self {
            subscription,
            store,
            events,
        }
    }

    /// Drains pending transitions in order. Returns how many were applied.
    pub fn sync(&self, ctx: &mut SessionContext) -> Result<usize> {
        let changes = self.subscription.drain();
        let applied = changes.len();
        for change in changes {
            match change {
                AuthChange::SignedIn(identity) => self.bind(ctx, identity)?,
                AuthChange::SignedOut => self.unbind(ctx)?,
            }
        }
        Ok(applied)
    }

    fn bind(&self, ctx: &mut SessionContext, identity: Identity) -> Result<()> {
        if ctx
            .identity
            .as_ref()
            .is_some_and(|current| current.uid != identity.uid)
        {
            self.unbind(ctx)?;
        }

        let existing = self
            .store
            .fetch_account(&identity.uid)
            .context(SIGN_IN_FAILED_MESSAGE)?;
        let account = match existing {
            Some(account) => account,
            None => {
                let account = self
                    .store
                    .create_account(&identity)
                    .context(SIGN_IN_FAILED_MESSAGE)?;
                self.events.emit(
                    "account_created",
                    map_object(json!({
                        "uid": account.uid,
                        "plan": account.plan.as_str(),
                        "credits": account.credits,
                    })),
                )?;
                account
            }
        };

        self.events.emit(
            "signed_in",
            map_object(json!({
                "uid": identity.uid,
                "email": identity.email,
                "plan": account.plan.as_str(),
                "credits": account.credits,
            })),
        )?;
        ctx.bind(identity, account);
        Ok(())
    }

    fn unbind(&self, ctx: &mut SessionContext) -> Result<()> {
        let Some(identity) = ctx.identity.as_ref() else {
            return Ok(());
        };
        self.events
            .emit("signed_out", map_object(json!({ "uid": identity.uid })))?;
        ctx.reset_for_sign_out();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use inkgen_contracts::accounts::Identity;
    use inkgen_contracts::events::{read_event_types, EventWriter};
    use inkgen_contracts::prompt::{IdeaMode, TattooStyle};
    use inkgen_contracts::session::{GenerationResult, SessionContext};

    use super::SessionBinder;
    use crate::identity::{IdentityProvider, LocalIdentityProvider};
    use crate::store::{FileProfileStore, ProfileStore};

    #[test]
    fn first_sign_in_creates_free_account() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let identity = LocalIdentityProvider::open(temp.path())?;
        let store = Arc::new(FileProfileStore::new(temp.path()));
        let events = EventWriter::new(temp.path().join("events.jsonl"), "s-1");
        let binder = SessionBinder::new(identity.subscribe()?, store.clone(), events);
        let mut ctx = SessionContext::new();

        binder.sync(&mut ctx)?;
        assert!(ctx.signed_in().is_none());

        identity.sign_in(Identity::new("uid-1"))?;
        binder.sync(&mut ctx)?;
        assert_eq!(ctx.credits(), 3);
        assert_eq!(ctx.account.as_ref().map(|a| a.plan.as_str()), Some("free"));
        assert!(store.fetch_account("uid-1")?.is_some());

        assert_eq!(
            read_event_types(&temp.path().join("events.jsonl"))?,
            vec!["account_created", "signed_in"]
        );
        Ok(())
    }

    #[test]
    fn returning_user_keeps_stored_balance() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(FileProfileStore::new(temp.path()));
        store.create_account(&Identity::new("uid-1"))?;
        store.debit_credit("uid-1")?;

        let identity = LocalIdentityProvider::open(temp.path())?;
        identity.sign_in(Identity::new("uid-1"))?;
        let events = EventWriter::new(temp.path().join("events.jsonl"), "s-1");
        let binder = SessionBinder::new(identity.subscribe()?, store, events);
        let mut ctx = SessionContext::new();
        binder.sync(&mut ctx)?;

        assert_eq!(ctx.credits(), 2);
        assert_eq!(
            read_event_types(&temp.path().join("events.jsonl"))?,
            vec!["signed_in"]
        );
        Ok(())
    }

    #[test]
    fn sign_out_clears_per_user_state() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let identity = LocalIdentityProvider::open(temp.path())?;
        let store = Arc::new(FileProfileStore::new(temp.path()));
        let events = EventWriter::new(temp.path().join("events.jsonl"), "s-1");
        let binder = SessionBinder::new(identity.subscribe()?, store, events);
        let mut ctx = SessionContext::new();

        identity.sign_in(Identity::new("uid-1"))?;
        binder.sync(&mut ctx)?;
        ctx.form.mode = IdeaMode::Custom("add koi fish".to_string());
        ctx.form.style = TattooStyle::Color;
        ctx.replace_results(vec![GenerationResult {
            id: "a-01".to_string(),
            image_ref: "/tmp/a-01.png".to_string(),
        }]);

        identity.sign_out()?;
        binder.sync(&mut ctx)?;

        assert!(ctx.identity.is_none());
        assert!(ctx.account.is_none());
        assert!(ctx.results().is_empty());
        assert_eq!(ctx.form.mode, IdeaMode::Random);
        assert_eq!(ctx.form.style, TattooStyle::BlackAndGrey);
        assert_eq!(
            read_event_types(&temp.path().join("events.jsonl"))?.last().map(String::as_str),
            Some("signed_out")
        );
        Ok(())
    }
}
