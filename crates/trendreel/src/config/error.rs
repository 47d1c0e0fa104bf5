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

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed trendreel.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable {name} is not set{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    MissingEnvVar {
        name: String,
        message: Option<String>,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Configuration files must be TOML, got .{extension}")]
    UnsupportedFormat { extension: String },
}

/// One problem found by [`crate::AppConfig::validate`].
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("database.url '{url}' does not name a supported backend")]
    InvalidDatabaseUrl { url: String },

    #[error("database.pool_size must be between 1 and 100, got {size}")]
    InvalidPoolSize { size: u32 },

    #[error("{field} must be greater than zero, got {value}")]
    NotPositive { field: &'static str, value: u64 },

    #[error("Unknown dispatch mode '{mode}', expected two_tier or single_tier")]
    InvalidMode { mode: String },

    #[error("{field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("Cannot parse duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("gcp.api_endpoint '{endpoint}' is not usable: {reason}")]
    InvalidApiEndpoint { endpoint: String, reason: String },

    #[error("server.bind_address '{address}' is not a socket address")]
    InvalidBindAddress { address: String },

    #[error("{} configuration problems: {}", .errors.len(), .errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Multiple { errors: Vec<ValidationError> },
}
