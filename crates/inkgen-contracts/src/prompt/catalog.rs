#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub id: &'static str,
    pub title: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        id: "floral",
        title: "Floral black & grey extension",
    },
    Preset {
        id: "neo",
        title: "Neo-traditional animal wrap",
    },
    Preset {
        id: "geometric",
        title: "Geometric linework + shading",
    },
    Preset {
        id: "irezumi",
        title: "Japanese irezumi wave/peony fill",
    },
    Preset {
        id: "script",
        title: "Script integration + filigree",
    },
    Preset {
        id: "color-splash",
        title: "Color splash (selective color over B&W base)",
    },
];

pub const DEFAULT_PRESET_ID: &str = "floral";

pub const RANDOM_IDEAS: &[&str] = &[
    "extend upward with flowing peonies and soft black & grey shading",
    "wrap a subtle dragon around the existing rose, keep linework clean",
    "add geometric bands that connect and unify the composition",
    "add fine-line filigree to fill empty space, soft gradients only",
    "incorporate a wolf silhouette, integrate seamlessly into current edges",
    "blend watercolor splashes behind existing linework, restrained palette",
    "carry the theme to shoulder with negative-space waves and clouds",
];

pub fn find_preset(id: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|preset| preset.id == id)
}

#[cfg(test)]
mod tests {
    use super::{find_preset, DEFAULT_PRESET_ID, PRESETS};

    #[test]
    fn default_preset_is_first_catalog_entry() {
        assert_eq!(PRESETS[0].id, DEFAULT_PRESET_ID);
    }

    #[test]
    fn preset_ids_are_unique() {
        for (idx, preset) in PRESETS.iter().enumerate() {
            assert!(PRESETS[idx + 1..].iter().all(|other| other.id != preset.id));
        }
    }

    #[test]
    fn find_preset_is_exact_match() {
        assert_eq!(
            find_preset("irezumi").map(|preset| preset.title),
            Some("Japanese irezumi wave/peony fill")
        );
        assert!(find_preset("Irezumi").is_none());
    }
}
