//! Serialized voice presets.
//!
//! A preset is a complete voice description: pitch, formant, and per-effect
//! settings. Effect fields are kept as a flat name/value map so presets
//! saved by older builds keep loading when effects grow new fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectPreset {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub fields: HashMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    #[serde(default)]
    pub pitch_shift: f32,
    #[serde(default = "default_formant_ratio")]
    pub formant_ratio: f32,
    #[serde(default)]
    pub effects: HashMap<String, EffectPreset>,
}

fn default_formant_ratio() -> f32 {
    1.0
}

impl Preset {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            pitch_shift: 0.0,
            formant_ratio: 1.0,
            effects: HashMap::new(),
        }
    }
}
