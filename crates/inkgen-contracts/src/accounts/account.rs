use serde::{Deserialize, Serialize};

/// Credits granted to a newly created account.
pub const FREE_DAILY_LIMIT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Starter,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Pro => "pro",
        }
    }
}

/// What the identity provider knows about a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            avatar: None,
        }
    }
}

/// Per-identity entitlement document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    pub credits: u32,
}

impl Account {
    /// Fresh free-tier account for a first sign-in.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            name: identity.display_name.clone(),
            picture: identity.avatar.clone(),
            plan: Plan::Free,
            credits: FREE_DAILY_LIMIT,
        }
    }

    pub fn has_credit(&self) -> bool {
        self.credits > 0
    }
}

/// One completed generation, written once and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub record_id: String,
    pub prompt: String,
    pub image_refs: Vec<String>,
    pub created_at: String,
}
