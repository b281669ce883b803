//! Keyword screen applied to composed prompts before any provider call.
//!
//! Best-effort only: a substring denylist catches obvious requests and nothing
//! more. It is not a content-safety boundary.

pub const SAFETY_KEYWORDS: &[&str] = &[
    "nude", "violent", "blood", "hate", "nsfw", "explicit", "gore", "weapon",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    Pass,
    Blocked { keyword: &'static str },
}

impl SafetyVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, SafetyVerdict::Pass)
    }
}

pub fn screen_prompt(prompt: &str) -> SafetyVerdict {
    let lowered = prompt.to_lowercase();
    SAFETY_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| lowered.contains(keyword))
        .map(|keyword| SafetyVerdict::Blocked { keyword })
        .unwrap_or(SafetyVerdict::Pass)
}
