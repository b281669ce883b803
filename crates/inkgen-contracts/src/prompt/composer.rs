use rand::seq::SliceRandom;
use rand::Rng;

use super::catalog::{find_preset, RANDOM_IDEAS};

pub const BLACK_AND_GREY_CLAUSE: &str = " in black and grey only.";
pub const SUBTLE_CLAUSE: &str = " use minimal additions and soft shading.";
pub const BOLD_CLAUSE: &str = " use high contrast and bold new elements.";

/// Where the base idea of a prompt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdeaMode {
    /// A fresh draw from [`RANDOM_IDEAS`] on every composition.
    Random,
    /// The user's own text, used verbatim.
    Custom(String),
    /// A preset id from the catalog.
    Preset(String),
}

impl IdeaMode {
    pub fn label(&self) -> &'static str {
        match self {
            IdeaMode::Random => "random",
            IdeaMode::Custom(_) => "custom",
            IdeaMode::Preset(_) => "preset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TattooStyle {
    #[default]
    BlackAndGrey,
    Color,
}

impl TattooStyle {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "black-and-grey" | "black-grey" | "bw" | "mono" => Some(TattooStyle::BlackAndGrey),
            "color" | "colour" => Some(TattooStyle::Color),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TattooStyle::BlackAndGrey => "black-and-grey",
            TattooStyle::Color => "color",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intensity {
    Subtle,
    #[default]
    Balanced,
    Bold,
}

impl Intensity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "subtle" => Some(Intensity::Subtle),
            "balanced" => Some(Intensity::Balanced),
            "bold" => Some(Intensity::Bold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Subtle => "subtle",
            Intensity::Balanced => "balanced",
            Intensity::Bold => "bold",
        }
    }
}

/// Form state behind one generate action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaForm {
    pub mode: IdeaMode,
    pub style: TattooStyle,
    pub intensity: Intensity,
}

impl Default for IdeaForm {
    fn default() -> Self {
        Self {
            mode: IdeaMode::Random,
            style: TattooStyle::default(),
            intensity: Intensity::default(),
        }
    }
}

impl IdeaForm {
    pub fn preset(id: &str) -> Self {
        Self {
            mode: IdeaMode::Preset(id.to_string()),
            ..Self::default()
        }
    }
}

pub fn compose_prompt<R: Rng + ?Sized>(form: &IdeaForm, rng: &mut R) -> String {
    let mut prompt = match &form.mode {
        IdeaMode::Random => suggest_idea(rng).to_string(),
        IdeaMode::Custom(text) => text.clone(),
        IdeaMode::Preset(id) => find_preset(id)
            .map(|preset| preset.title.to_string())
            .unwrap_or_default(),
    };

    match form.style {
        TattooStyle::BlackAndGrey => prompt.push_str(BLACK_AND_GREY_CLAUSE),
        TattooStyle::Color => {}
    }
    match form.intensity {
        Intensity::Subtle => prompt.push_str(SUBTLE_CLAUSE),
        Intensity::Balanced => {}
        Intensity::Bold => prompt.push_str(BOLD_CLAUSE),
    }
    prompt
}

pub fn suggest_idea<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    RANDOM_IDEAS.choose(rng).copied().unwrap_or_default()
}
