// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use clusterview_app::{
    DEFAULT_KEYWORD, DEFAULT_MAX_ROWS, DEFAULT_PAGE_SIZE, DisplayMode, IndexSetId, PatternLevel,
};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::runtime::QuerySettings;

pub const APP_NAME: &str = "clusterview";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOOKBACK: &str = "15m";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub clustering: Clustering,
    #[serde(default)]
    pub view: View,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            clustering: Clustering::default(),
            view: View::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub index_set_id: Option<i64>,
    pub timeout: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            index_set_id: None,
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Clustering {
    pub keyword: Option<String>,
    pub pattern_level: Option<String>,
    pub group_by: Option<Vec<String>>,
    pub year_on_year_hour: Option<i64>,
    pub size: Option<i64>,
    pub lookback: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct View {
    pub page_size: Option<i64>,
    pub display_mode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub file: Option<String>,
    pub filter: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("CLUSTERVIEW_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!(
                "cannot resolve config directory; set CLUSTERVIEW_CONFIG_PATH to the config file"
            )
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [api], [clustering], [view], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(id) = self.api.index_set_id
            && id <= 0
        {
            bail!(
                "api.index_set_id in {} must be positive, got {}",
                path.display(),
                id
            );
        }

        if let Some(timeout) = &self.api.timeout
            && parse_duration(timeout)? <= Duration::ZERO
        {
            bail!(
                "api.timeout in {} must be positive, got {}",
                path.display(),
                timeout
            );
        }

        if let Some(level) = &self.clustering.pattern_level
            && PatternLevel::parse(level).is_none()
        {
            bail!(
                "clustering.pattern_level in {} must be one of 01, 03, 05, 07, 09, got {:?}",
                path.display(),
                level
            );
        }

        if let Some(group_by) = &self.clustering.group_by {
            for (index, field) in group_by.iter().enumerate() {
                if field.trim().is_empty() {
                    bail!(
                        "clustering.group_by[{index}] in {} is empty; remove it or name a field",
                        path.display()
                    );
                }
                if group_by[..index].contains(field) {
                    bail!(
                        "clustering.group_by in {} lists {:?} twice",
                        path.display(),
                        field
                    );
                }
            }
        }

        if let Some(hours) = self.clustering.year_on_year_hour
            && !(0..=i64::from(u32::MAX)).contains(&hours)
        {
            bail!(
                "clustering.year_on_year_hour in {} must be non-negative, got {}",
                path.display(),
                hours
            );
        }

        if let Some(size) = self.clustering.size
            && !(1..=i64::from(u32::MAX)).contains(&size)
        {
            bail!(
                "clustering.size in {} must be positive, got {}",
                path.display(),
                size
            );
        }

        if let Some(lookback) = &self.clustering.lookback
            && parse_duration(lookback)? <= Duration::ZERO
        {
            bail!(
                "clustering.lookback in {} must be positive, got {}",
                path.display(),
                lookback
            );
        }

        if let Some(page_size) = self.view.page_size
            && page_size <= 0
        {
            bail!(
                "view.page_size in {} must be positive, got {}",
                path.display(),
                page_size
            );
        }

        if let Some(mode) = &self.view.display_mode
            && DisplayMode::parse(mode).is_none()
        {
            bail!(
                "view.display_mode in {} must be group or flatten, got {:?}",
                path.display(),
                mode
            );
        }

        if let Some(filter) = &self.log.filter {
            EnvFilter::try_new(filter).with_context(|| {
                format!("log.filter in {} is not a valid filter", path.display())
            })?;
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn index_set_id(&self) -> Result<IndexSetId> {
        self.api.index_set_id.map(IndexSetId::new).ok_or_else(|| {
            anyhow!("api.index_set_id is not set -- add it under [api] or run with --demo")
        })
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn pattern_level(&self) -> PatternLevel {
        self.clustering
            .pattern_level
            .as_deref()
            .and_then(PatternLevel::parse)
            .unwrap_or(PatternLevel::L05)
    }

    pub fn group_by(&self) -> Vec<String> {
        self.clustering
            .group_by
            .iter()
            .flatten()
            .map(|field| field.trim().to_owned())
            .collect()
    }

    pub fn year_on_year_hour(&self) -> u32 {
        self.clustering
            .year_on_year_hour
            .and_then(|hours| u32::try_from(hours).ok())
            .unwrap_or(0)
    }

    pub fn size(&self) -> u32 {
        self.clustering
            .size
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(DEFAULT_MAX_ROWS)
    }

    pub fn keyword(&self) -> &str {
        match self.clustering.keyword.as_deref().map(str::trim) {
            Some(keyword) if !keyword.is_empty() => keyword,
            _ => DEFAULT_KEYWORD,
        }
    }

    pub fn lookback(&self) -> Result<Duration> {
        parse_duration(
            self.clustering
                .lookback
                .as_deref()
                .unwrap_or(DEFAULT_LOOKBACK),
        )
    }

    pub fn query_settings(&self) -> Result<QuerySettings> {
        Ok(QuerySettings {
            keyword: self.keyword().to_owned(),
            pattern_level: self.pattern_level(),
            group_by: self.group_by(),
            year_on_year_hour: self.year_on_year_hour(),
            size: self.size(),
            lookback: self.lookback()?,
        })
    }

    pub fn page_size(&self) -> usize {
        self.view
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.view
            .display_mode
            .as_deref()
            .and_then(DisplayMode::parse)
            .unwrap_or_default()
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let cache_root = dirs::cache_dir().ok_or_else(|| {
            anyhow!("cannot resolve cache directory; set [log].file to a writable path")
        })?;
        Ok(cache_root.join(APP_NAME).join("clusterview.log"))
    }

    pub fn log_filter(&self) -> &str {
        self.log.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# clusterview config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\n# Required unless running with --demo\n# index_set_id = 42\ntimeout = \"{}\"\n\n[clustering]\nkeyword = \"{}\"\n# One of 01, 03, 05, 07, 09. Lower levels merge more aggressively.\npattern_level = \"05\"\ngroup_by = []\n# Set to 1 or more to compare against the same window N hours earlier\nyear_on_year_hour = 0\nsize = {}\nlookback = \"{}\"\n\n[view]\npage_size = {}\ndisplay_mode = \"group\"\n\n[log]\n# Optional. Default is the platform cache dir (for example ~/.cache/clusterview/clusterview.log)\n# file = \"/absolute/path/to/clusterview.log\"\n# CLUSTERVIEW_LOG overrides this\nfilter = \"{}\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            DEFAULT_KEYWORD,
            DEFAULT_MAX_ROWS,
            DEFAULT_LOOKBACK,
            DEFAULT_PAGE_SIZE,
            DEFAULT_LOG_FILTER,
        )
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
    let invalid = || format!("invalid duration {raw:?}");
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value.parse().with_context(invalid)?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value.parse().with_context(invalid)?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value.parse().with_context(invalid)?;
        return Ok(Duration::from_secs(mins * 60));
    }
    if let Some(value) = raw.strip_suffix('h') {
        let hours: u64 = value.parse().with_context(invalid)?;
        return Ok(Duration::from_secs(hours * 60 * 60));
    }

    bail!(
        "invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m, <N>h (for example 500ms or 15m)"
    )
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use clusterview_app::{DisplayMode, IndexSetId, PatternLevel};
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.base_url(), "http://localhost:8000/api/v1");
        assert_eq!(config.pattern_level(), PatternLevel::L05);
        assert_eq!(config.page_size(), 50);
        assert_eq!(config.display_mode(), DisplayMode::Group);
        assert_eq!(config.keyword(), "*");
        assert_eq!(config.lookback()?, Duration::from_secs(15 * 60));
        assert!(config.group_by().is_empty());
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nindex_set_id = 3\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api], [clustering], [view], and [log]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"https://bk.example/api/v1//\"\nindex_set_id = 42\ntimeout = \"3s\"\n[clustering]\nkeyword = \"level:error\"\npattern_level = \"07\"\ngroup_by = [\"service\", \" level \"]\nyear_on_year_hour = 24\nsize = 500\nlookback = \"1h\"\n[view]\npage_size = 20\ndisplay_mode = \"flatten\"\n[log]\nfilter = \"clusterview_api=debug\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.base_url(), "https://bk.example/api/v1");
        assert_eq!(config.index_set_id()?, IndexSetId::new(42));
        assert_eq!(config.api_timeout()?, Duration::from_secs(3));
        assert_eq!(config.pattern_level(), PatternLevel::L07);
        assert_eq!(config.group_by(), vec!["service", "level"]);
        assert_eq!(config.page_size(), 20);
        assert_eq!(config.display_mode(), DisplayMode::Flatten);
        assert_eq!(config.log_filter(), "clusterview_api=debug");

        let settings = config.query_settings()?;
        assert_eq!(settings.keyword, "level:error");
        assert_eq!(settings.year_on_year_hour, 24);
        assert_eq!(settings.size, 500);
        assert_eq!(settings.lookback, Duration::from_secs(3600));
        Ok(())
    }

    #[test]
    fn missing_index_set_id_points_at_demo() {
        let error = Config::default()
            .index_set_id()
            .expect_err("missing id should fail");
        assert!(error.to_string().contains("--demo"));
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() -> Result<()> {
        let cases = [
            ("[api]\nindex_set_id = 0\n", "must be positive"),
            ("[api]\ntimeout = \"0s\"\n", "must be positive"),
            ("[clustering]\npattern_level = \"04\"\n", "must be one of"),
            ("[clustering]\ngroup_by = [\"a\", \"a\"]\n", "twice"),
            ("[clustering]\ngroup_by = [\" \"]\n", "is empty"),
            ("[clustering]\nyear_on_year_hour = -1\n", "non-negative"),
            ("[clustering]\nsize = 0\n", "must be positive"),
            ("[view]\npage_size = 0\n", "must be positive"),
            ("[view]\ndisplay_mode = \"tree\"\n", "group or flatten"),
            ("[log]\nfilter = \"clusterview=loud\"\n", "not a valid filter"),
        ];
        for (body, expected) in cases {
            let (_temp, path) = write_config(&format!("version = 1\n{body}"))?;
            let error = Config::load(&path).expect_err("invalid value should fail");
            let message = format!("{error:#}");
            assert!(message.contains(expected), "{body:?}: {message}");
        }
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("CLUSTERVIEW_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("CLUSTERVIEW_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn log_file_prefers_config_value() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[log]\nfile = \"/var/tmp/cv.log\"\n")?;
        let config = Config::load(&path)?;
        assert_eq!(config.log_file()?, PathBuf::from("/var/tmp/cv.log"));
        Ok(())
    }

    #[test]
    fn durations_parse_all_units() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        assert_eq!(parse_duration("6h")?, Duration::from_secs(6 * 3600));
        let error = parse_duration("oops").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid duration"));
        Ok(())
    }

    #[test]
    fn example_config_round_trips() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        for section in ["[api]", "[clustering]", "[view]", "[log]"] {
            assert!(example.contains(section), "missing {section}");
        }
        std::fs::write(&path, example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.pattern_level(), PatternLevel::L05);
        Ok(())
    }
}
