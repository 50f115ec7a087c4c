//! Analytics settings loaded from an optional TOML file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::PALETTE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Size of the top-diagnoses ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Rows shown in the recent-diagnoses list.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Disease names that flag a scan as critical (substring match).
    #[serde(default = "default_critical_diseases")]
    pub critical_diseases: Vec<String>,

    /// Rows requested from Postgres per fetch.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: i64,

    /// Chart colours assigned to diseases in first-seen order. An empty list
    /// falls back to the built-in palette.
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            recent_limit: default_recent_limit(),
            critical_diseases: default_critical_diseases(),
            fetch_limit: default_fetch_limit(),
            palette: default_palette(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

fn default_recent_limit() -> usize {
    5
}

fn default_critical_diseases() -> Vec<String> {
    ["Lung Cancer", "COVID-19", "Tuberculosis", "Pneumonia"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_fetch_limit() -> i64 {
    100
}

fn default_palette() -> Vec<String> {
    PALETTE.iter().map(|color| color.to_string()).collect()
}

impl AnalyticsConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid analytics config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Loads `path` when given, otherwise falls back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
