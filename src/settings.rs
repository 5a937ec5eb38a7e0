use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Global library preferences, stored as `settings.json` in the private
/// storage root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Skip code signing for every install (the per-app `dont_sign` flag
    /// still applies when this is off).
    pub dont_sign_app: bool,
    /// Require authentication before the hidden tier is enumerated.
    pub secure_hidden_apps: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dont_sign_app: false,
            secure_hidden_apps: true,
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("settings.json")).unwrap();
        assert!(!settings.dont_sign_app);
        assert!(settings.secure_hidden_apps);
    }

    #[test]
    fn round_trips_through_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("settings.json");
        let settings = Settings {
            dont_sign_app: true,
            secure_hidden_apps: false,
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert!(loaded.dont_sign_app);
        assert!(!loaded.secure_hidden_apps);
    }
}
