use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use inkgen_contracts::accounts::Identity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(Identity),
    SignedOut,
}

/// Receiving end of an identity subscription.
///
/// The first message is always the state at subscription time.
#[derive(Debug)]
pub struct AuthSubscription {
    rx: Receiver<AuthChange>,
}

impl AuthSubscription {
    pub fn try_next(&self) -> Option<AuthChange> {
        match self.rx.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Every change queued so far, oldest first.
    pub fn drain(&self) -> Vec<AuthChange> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;
    fn sign_in(&self, identity: Identity) -> Result<()>;
    fn sign_out(&self) -> Result<()>;
    fn subscribe(&self) -> Result<AuthSubscription>;
}

/// Identity session persisted to `<root>/session.json`.
#[derive(Debug)]
pub struct LocalIdentityProvider {
    path: PathBuf,
    state: Mutex<Option<Identity>>,
    subscribers: Mutex<Vec<Sender<AuthChange>>>,
}

impl LocalIdentityProvider {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join("session.json");
        let state = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(
                serde_json::from_str::<Identity>(&raw)
                    .with_context(|| format!("invalid identity session {}", path.display()))?,
            )
        } else {
            None
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn notify(&self, change: AuthChange) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|_| anyhow!("identity subscribers lock poisoned"))?;
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        Ok(())
    }

    fn set_state(&self, next: Option<Identity>) -> Result<Option<Identity>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("identity state lock poisoned"))?;
        Ok(std::mem::replace(&mut *state, next))
    }
}

impl IdentityProvider for LocalIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.state.lock().ok().and_then(|state| state.clone())
    }

    fn sign_in(&self, identity: Identity) -> Result<()> {
        if identity.uid.trim().is_empty() {
            return Err(anyhow!("identity uid must not be empty"));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&identity)?)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.set_state(Some(identity.clone()))?;
        self.notify(AuthChange::SignedIn(identity))
    }

    fn sign_out(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to remove {}", self.path.display()))?;
        }
        if self.set_state(None)?.is_some() {
            self.notify(AuthChange::SignedOut)?;
        }
        Ok(())
    }

    fn subscribe(&self) -> Result<AuthSubscription> {
        let (tx, rx) = mpsc::channel();
        let initial = match self.current() {
            Some(identity) => AuthChange::SignedIn(identity),
            None => AuthChange::SignedOut,
        };
        tx.send(initial)
            .map_err(|_| anyhow!("identity subscription closed"))?;
        self.subscribers
            .lock()
            .map_err(|_| anyhow!("identity subscribers lock poisoned"))?
            .push(tx);
        Ok(AuthSubscription { rx })
    }
}
