// src/sources.rs
// Source registry: the static list of feed endpoints polled on every pass.
// Loaded once at startup from TOML or JSON; immutable afterwards.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::category::Category;

const ENV_PATH: &str = "NEWS_SOURCES_PATH";

/// One external feed endpoint with its category and origin label.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub endpoint: String,
    pub category: Category,
    #[serde(default)]
    pub origin: String,
}

impl FeedSource {
    /// Origin label for items from this source: the explicit name when
    /// configured, else the endpoint's hostname.
    pub fn origin_label(&self) -> String {
        if !self.origin.trim().is_empty() {
            return self.origin.trim().to_string();
        }
        url::Url::parse(&self.endpoint)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| self.endpoint.clone())
    }
}

/// Load the registry from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<FeedSource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load the registry using env var + fallbacks:
/// 1) $NEWS_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<Vec<FeedSource>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("NEWS_SOURCES_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<FeedSource>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedSource>> {
    #[derive(Deserialize)]
    struct TomlRegistry {
        sources: Vec<FeedSource>,
    }
    let v: TomlRegistry = toml::from_str(s)?;
    Ok(clean_list(v.sources))
}

fn parse_json(s: &str) -> Result<Vec<FeedSource>> {
    let v: Vec<FeedSource> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

fn clean_list(items: Vec<FeedSource>) -> Vec<FeedSource> {
    let mut out: Vec<FeedSource> = Vec::with_capacity(items.len());
    for it in items {
        let endpoint = it.endpoint.trim().to_string();
        if endpoint.is_empty() {
            continue;
        }
        if out.iter().any(|s| s.endpoint == endpoint) {
            continue;
        }
        out.push(FeedSource {
            endpoint,
            category: it.category,
            origin: it.origin,
        });
    }
    out
}
