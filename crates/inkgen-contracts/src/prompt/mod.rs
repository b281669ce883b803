mod catalog;
mod composer;
mod safety;

pub use catalog::{find_preset, Preset, DEFAULT_PRESET_ID, PRESETS, RANDOM_IDEAS};
pub use composer::{
    compose_prompt, suggest_idea, IdeaForm, IdeaMode, Intensity, TattooStyle,
    BLACK_AND_GREY_CLAUSE, BOLD_CLAUSE, SUBTLE_CLAUSE,
};
pub use safety::{screen_prompt, SafetyVerdict, SAFETY_KEYWORDS};
