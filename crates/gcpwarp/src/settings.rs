//! User preferences: transform method and preview styling.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::PersistError;
use crate::transform::TransformMethod;

/// RGBA color, 8 bits per channel.
pub type Rgba = [u8; 4];

/// Colors for drawing correspondences and the AOI. Not used by the
/// numerical core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewStyle {
    /// Correspondence arrows, origin to destination.
    pub arrow_color: Rgba,
    /// Area of interest fill.
    pub aoi_fill_color: Rgba,
    /// Corrected-geometry preview.
    pub preview_color: Rgba,
}

impl Default for PreviewStyle {
    fn default() -> Self {
        Self {
            arrow_color: [255, 170, 0, 255],
            aoi_fill_color: [255, 0, 0, 40],
            preview_color: [0, 120, 255, 200],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "lenient_method")]
    pub transform_method: TransformMethod,
    pub preview: PreviewStyle,
}

/// Accept a method key or display name; anything else falls back to the
/// default method.
fn lenient_method<'de, D>(d: D) -> Result<TransformMethod, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(d)?;
    let parsed = match &value {
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(|| {
        let fallback = TransformMethod::default();
        tracing::warn!("unknown transform method {value}, using {fallback}");
        fallback
    }))
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read settings from `path`; a missing file yields defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PersistError> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(Self::from_json_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), PersistError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Persistent key-value access to the active transform method.
pub trait SettingsStore {
    fn get_transform_method(&self) -> TransformMethod;

    fn set_transform_method(&mut self, method: TransformMethod) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    pub settings: Settings,
}

impl SettingsStore for MemorySettingsStore {
    fn get_transform_method(&self) -> TransformMethod {
        self.settings.transform_method
    }

    fn set_transform_method(&mut self, method: TransformMethod) -> Result<(), PersistError> {
        self.settings.transform_method = method;
        Ok(())
    }
}

/// Settings persisted as a JSON document; every change is written through.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl JsonSettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        let settings = Settings::from_json_file(&path)?;
        Ok(Self { path, settings })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_transform_method(&self) -> TransformMethod {
        self.settings.transform_method
    }

    fn set_transform_method(&mut self, method: TransformMethod) -> Result<(), PersistError> {
        self.settings.transform_method = method;
        self.settings.to_json_file(&self.path)
    }
}
