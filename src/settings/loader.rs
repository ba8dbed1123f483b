// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Settings file discovery and loading.

use std::path::{Path, PathBuf};

use crate::error::{CepError, Result};

use super::Settings;

/// Environment variable naming a settings file.
pub const ENV_VAR: &str = "CEPCES_CONFIG";

/// Settings loader with discovery and precedence rules.
///
/// # Search Order
///
/// The first file found wins:
///
/// 1. Explicit path (if set via `with_path()`)
/// 2. Environment variable `CEPCES_CONFIG`
/// 3. `/etc/cepces/cepces.toml`
/// 4. `/usr/local/etc/cepces/cepces.toml`
/// 5. `$XDG_CONFIG_HOME/cepces/cepces.toml`
/// 6. Current directory: `./cepces.toml`
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    explicit_path: Option<PathBuf>,
    env_path: Option<PathBuf>,
    expand_variables: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Create a loader that honours `CEPCES_CONFIG`.
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            env_path: std::env::var_os(ENV_VAR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            expand_variables: true,
        }
    }

    /// Set an explicit settings file path.
    ///
    /// When set, only this path will be checked (no discovery).
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Override the path taken from `CEPCES_CONFIG`.
    pub fn with_env_path(mut self, path: Option<PathBuf>) -> Self {
        self.env_path = path;
        self
    }

    /// Enable or disable variable expansion.
    ///
    /// Default: `true`
    pub fn with_expand_variables(mut self, expand: bool) -> Self {
        self.expand_variables = expand;
        self
    }

    /// Load the settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found, it cannot be read, or the TOML
    /// is invalid.
    pub fn load(&self) -> Result<Settings> {
        let path = self.find_settings_file()?;
        tracing::debug!("Reading settings from {}", path.display());

        let content = std::fs::read_to_string(&path)
            .map_err(|e| CepError::config(format!("Failed to read {}: {e}", path.display())))?;
        self.load_from_str(&content)
    }

    /// Load settings from a TOML string.
    pub fn load_from_str(&self, toml_content: &str) -> Result<Settings> {
        let mut settings = Settings::from_toml(toml_content)?;
        if self.expand_variables {
            settings.expand_variables();
        }
        Ok(settings)
    }

    /// Find the settings file path.
    pub fn find_settings_file(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.explicit_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(CepError::config(format!(
                "Settings file not found: {}",
                path.display()
            )));
        }

        if let Some(ref path) = self.env_path {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(CepError::config(format!(
                "Settings file from {} not found: {}",
                ENV_VAR,
                path.display()
            )));
        }

        let paths = self.get_search_paths();
        if let Some(path) = paths.iter().find(|p| p.is_file()) {
            return Ok(path.clone());
        }

        Err(CepError::config(format!(
            "No settings file found. Searched:\n  - {}",
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n  - ")
        )))
    }

    /// Get the list of paths searched when nothing is set explicitly.
    pub fn get_search_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("/etc/cepces/cepces.toml"),
            PathBuf::from("/usr/local/etc/cepces/cepces.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let mut path = config_dir;
            path.push("cepces");
            path.push("cepces.toml");
            paths.push(path);
        }

        paths.push(PathBuf::from("cepces.toml"));
        paths
    }
}
