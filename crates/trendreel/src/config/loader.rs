/*
 *  Copyright 2025-2026 Trendreel Developers
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Locating and reading `trendreel.toml`.
//!
//! Resolution order: an explicit path, then `TRENDREEL_CONFIG`, then the first
//! search path that exists. With none of those the built-in defaults apply.
//! `${VAR}`, `${VAR:-default}` and `${VAR:?message}` are expanded before the
//! TOML is parsed, so secrets can stay in the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::config::{AppConfig, ConfigError};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "TRENDREEL_CONFIG";

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env reference pattern is valid"));

/// Where [`ConfigLoader::resolve`] found the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Passed on the command line.
    Explicit(PathBuf),
    /// Named by [`CONFIG_ENV_VAR`].
    Environment(PathBuf),
    SearchPath(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(p) | ConfigSource::Environment(p) | ConfigSource::SearchPath(p) => {
                Some(p)
            }
            ConfigSource::Defaults => None,
        }
    }
}

pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Searches `./trendreel.toml`, the user config directory and `/etc/trendreel`.
    pub fn new() -> Self {
        let user = dirs::config_dir().map(|dir| dir.join("trendreel").join("config.toml"));
        let search_paths = std::iter::once(PathBuf::from("./trendreel.toml"))
            .chain(user)
            .chain(std::iter::once(PathBuf::from("/etc/trendreel/config.toml")))
            .collect();
        Self { search_paths }
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Decides which file, if any, supplies the configuration.
    pub fn resolve(&self, config_file: Option<&Path>) -> ConfigSource {
        if let Some(path) = config_file {
            return ConfigSource::Explicit(path.to_path_buf());
        }
        if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            return ConfigSource::Environment(PathBuf::from(path));
        }
        self.find_config_file()
            .map(ConfigSource::SearchPath)
            .unwrap_or(ConfigSource::Defaults)
    }

    /// Resolves and reads the configuration. A missing file is only an error
    /// when it was asked for explicitly or through the environment.
    pub fn load_config(&self, config_file: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let source = self.resolve(config_file);
        match source.path() {
            Some(path) => {
                info!(path = %path.display(), ?source, "Loading configuration");
                self.load_config_from_file(path)
            }
            None => {
                debug!(searched = ?self.search_paths, "No configuration file found, using defaults");
                Ok(AppConfig::default())
            }
        }
    }

    pub fn load_config_from_file(&self, path: &Path) -> Result<AppConfig, ConfigError> {
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            if extension != "toml" {
                return Err(ConfigError::UnsupportedFormat {
                    extension: extension.to_string(),
                });
            }
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&content)
    }

    /// Expands environment references in `content` and parses it.
    pub fn parse(&self, content: &str) -> Result<AppConfig, ConfigError> {
        let expanded = expand_env_references(content)?;
        Ok(toml::from_str(&expanded)?)
    }

    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.is_file()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Replaces every `${...}` reference. The first unresolvable one is returned
/// as the error.
fn expand_env_references(content: &str) -> Result<String, ConfigError> {
    let mut failure = None;
    let expanded = ENV_REFERENCE.replace_all(content, |caps: &Captures| {
        match resolve_reference(&caps[1]) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

/// Resolves `NAME`, `NAME:-default` or `NAME:?message`. Like the shell, a
/// default also replaces a variable that is set but empty.
fn resolve_reference(reference: &str) -> Result<String, ConfigError> {
    if let Some((name, default)) = reference.split_once(":-") {
        return Ok(env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()));
    }
    let (name, message) = match reference.split_once(":?") {
        Some((name, message)) => (name, Some(message.to_string())),
        None => (reference, None),
    };
    env::var(name).map_err(|_| ConfigError::MissingEnvVar {
        name: name.to_string(),
        message,
    })
}
