use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use cabinet_client::QueryOptions;
use serde::{Deserialize, Serialize};
use shared::domain::{LengthBounds, DEFAULT_MAX_TEXT_LENGTH, DEFAULT_MIN_TEXT_LENGTH};
use tracing::{info, warn};

pub const DEFAULT_SETTINGS_FILE: &str = "contextcaddy.toml";
const ENV_PREFIX: &str = "CADDY__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaddySettings {
    pub server_url: String,
    pub request_timeout_ms: u64,
    pub min_text_length: usize,
    pub max_text_length: usize,
    pub default_top_k: u32,
    pub similarity_threshold: f64,
    pub readiness_timeout_ms: u64,
    pub dedup_window_ms: u64,
}

impl Default for CaddySettings {
    fn default() -> Self {
        Self {
            server_url: cabinet_client::DEFAULT_BASE_URL.into(),
            request_timeout_ms: 10_000,
            min_text_length: DEFAULT_MIN_TEXT_LENGTH,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            default_top_k: 5,
            similarity_threshold: 0.3,
            readiness_timeout_ms: 1_500,
            dedup_window_ms: 500,
        }
    }
}

impl CaddySettings {
    /// Falls back to the default bounds when the stored pair is unusable.
    pub fn bounds(&self) -> LengthBounds {
        LengthBounds::new(self.min_text_length, self.max_text_length).unwrap_or_else(|err| {
            warn!(error = %err, "stored length bounds rejected; using defaults");
            LengthBounds::default()
        })
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            top_k: self.default_top_k,
            similarity_threshold: self.similarity_threshold,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |field: &str| lookup(&format!("{ENV_PREFIX}{}", field.to_ascii_uppercase()));

        if let Some(v) = var("server_url") {
            self.server_url = v;
        }
        override_parsed(
            &mut self.request_timeout_ms,
            "request_timeout_ms",
            var("request_timeout_ms"),
        );
        override_parsed(&mut self.min_text_length, "min_text_length", var("min_text_length"));
        override_parsed(&mut self.max_text_length, "max_text_length", var("max_text_length"));
        override_parsed(&mut self.default_top_k, "default_top_k", var("default_top_k"));
        override_parsed(
            &mut self.similarity_threshold,
            "similarity_threshold",
            var("similarity_threshold"),
        );
        override_parsed(
            &mut self.readiness_timeout_ms,
            "readiness_timeout_ms",
            var("readiness_timeout_ms"),
        );
        override_parsed(&mut self.dedup_window_ms, "dedup_window_ms", var("dedup_window_ms"));
    }
}

fn override_parsed<T: std::str::FromStr>(slot: &mut T, field: &str, raw: Option<String>) {
    let Some(raw) = raw else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(field, value = %raw, "ignoring unparseable environment override"),
    }
}

/// Settings plus the file they were loaded from.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: CaddySettings,
}

impl SettingsStore {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        let mut settings = read_settings_file(&path)?;
        settings.apply_env(lookup);
        Ok(Self { path, settings })
    }

    pub fn in_memory(settings: CaddySettings) -> Self {
        Self {
            path: PathBuf::new(),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &CaddySettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CaddySettings {
        &mut self.settings
    }

    pub fn update_bounds(&mut self, bounds: LengthBounds) -> anyhow::Result<()> {
        self.settings.min_text_length = bounds.min();
        self.settings.max_text_length = bounds.max();
        self.save()
    }

    /// Rewrites the settings file. A store without a path only keeps the
    /// values in memory.
    pub fn save(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        let raw = toml::to_string_pretty(&self.settings).context("failed to encode settings")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write settings to '{}'", self.path.display()))?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

fn read_settings_file(path: &Path) -> anyhow::Result<CaddySettings> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CaddySettings::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    };
    match toml::from_str::<CaddySettings>(&raw) {
        Ok(settings) => Ok(settings),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unparseable settings file");
            Ok(CaddySettings::default())
        }
    }
}
