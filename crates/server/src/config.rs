use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    /// Capacity of the change broadcast; slow subscribers past this lag out.
    pub event_buffer: usize,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8787".into(),
            database_url: "sqlite://./data/clubs.db".into(),
            event_buffer: 256,
            max_body_bytes: 256 * 1024,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, &file_cfg),
            Err(error) => warn!(%error, "ignoring malformed server.toml"),
        }
    }

    apply_env_settings(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("event_buffer").and_then(|v| v.parse().ok()) {
        settings.event_buffer = v;
    }
    if let Some(v) = file_cfg.get("max_body_bytes").and_then(|v| v.parse().ok()) {
        settings.max_body_bytes = v;
    }
}

fn apply_env_settings(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__EVENT_BUFFER").and_then(|v| v.parse().ok()) {
        settings.event_buffer = v;
    }
    if let Some(v) = env("APP__MAX_BODY_BYTES").and_then(|v| v.parse().ok()) {
        settings.max_body_bytes = v;
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
