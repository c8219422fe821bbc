//! Configuration system
//!
//! Typed settings store for the lighting subsystem. Settings files may be
//! TOML or RON; the [`Config`] trait handles loading and saving either
//! format.

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Shader lighting settings
///
/// Raw values as read from disk; the light manager clamps them to engine
/// limits when it consumes them (see `LightManager::update_settings`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingSettings {
    /// Lighting method: "legacy", "shaders compatibility", or "shaders"
    pub lighting_method: String,

    /// Maximum number of lights bound per drawable
    pub max_lights: i32,

    /// Multiplier applied to point light radii when building culling bounds
    pub light_bounds_multiplier: f32,

    /// Distance at which point lights fade out entirely; 0 disables fading
    pub maximum_light_distance: f32,

    /// Fraction of the maximum distance at which fading begins (0-1)
    pub light_fade_start: f32,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            lighting_method: "shaders".to_string(),
            max_lights: 8,
            light_bounds_multiplier: 1.0,
            maximum_light_distance: 8192.0,
            light_fade_start: 0.85,
        }
    }
}

impl Config for LightingSettings {}
