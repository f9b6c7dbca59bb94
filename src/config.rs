pub use ::config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;

use crate::error::Result;
use crate::progress::ProgressDirection;

/// Settings file looked up in the working directory unless `CENSUS_CONFIG`
/// names another one. Missing is fine.
pub const DEFAULT_CONFIG_NAME: &str = "census";

/// Early stop for the legacy agent scan: agents were allocated first, so in
/// known stores they all sit in roughly the first 4% of keyspace. A store laid
/// out differently can lose agents to this; set it negative to scan everything.
pub const DEFAULT_LEGACY_EARLY_STOP: f64 = 0.04;

pub const DEFAULT_REPORT_INTERVAL: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub legacy_early_stop: f64,
    pub report_interval: u64,
    pub progress_direction: ProgressDirection,
    pub log_format: String,
    pub log_file: Option<String>,
    pub log_rotation: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            legacy_early_stop: DEFAULT_LEGACY_EARLY_STOP,
            report_interval: DEFAULT_REPORT_INTERVAL,
            progress_direction: ProgressDirection::Reverse,
            log_format: "pretty".to_string(),
            log_file: None,
            log_rotation: "daily".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then the settings file, then `CENSUS_*` environment variables.
    pub fn load() -> Result<Self> {
        let name = std::env::var("CENSUS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_NAME.to_string());
        Self::load_from(&name, Environment::with_prefix("CENSUS").try_parsing(true))
    }

    pub fn load_from(file_name: &str, environment: Environment) -> Result<Self> {
        let defaults = Settings::default();
        let config = Config::builder()
            .set_default("legacy_early_stop", defaults.legacy_early_stop)?
            .set_default("report_interval", defaults.report_interval as i64)?
            .set_default("progress_direction", "reverse")?
            .set_default("log_format", defaults.log_format)?
            .set_default("log_rotation", defaults.log_rotation)?
            .add_source(ConfigFile::with_name(file_name).required(false))
            .add_source(environment)
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// `None` when early stop is disabled. Values above 1.0 are passed through
    /// and refused by the scan.
    pub fn legacy_early_stop(&self) -> Option<f64> {
        (self.legacy_early_stop >= 0.0).then_some(self.legacy_early_stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env() -> Environment {
        Environment::with_prefix("CENSUS").source(Some(HashMap::new()))
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent");
        let settings = Settings::load_from(missing.to_str().unwrap(), no_env()).unwrap();
        assert_eq!(settings.legacy_early_stop(), Some(DEFAULT_LEGACY_EARLY_STOP));
        assert_eq!(settings.report_interval, DEFAULT_REPORT_INTERVAL);
        assert_eq!(settings.progress_direction, ProgressDirection::Reverse);
        assert_eq!(settings.log_file, None);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("census.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "legacy_early_stop = -1.0").unwrap();
        writeln!(file, "progress_direction = \"forward\"").unwrap();
        writeln!(file, "log_file = \"/var/log/census.log\"").unwrap();
        drop(file);

        let settings = Settings::load_from(path.to_str().unwrap(), no_env()).unwrap();
        assert_eq!(settings.legacy_early_stop(), None);
        assert_eq!(settings.progress_direction, ProgressDirection::Forward);
        assert_eq!(settings.log_file.as_deref(), Some("/var/log/census.log"));
        assert_eq!(settings.report_interval, DEFAULT_REPORT_INTERVAL);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent");
        let mut vars = HashMap::new();
        vars.insert("CENSUS_LEGACY_EARLY_STOP".to_string(), "0.5".to_string());
        vars.insert("CENSUS_REPORT_INTERVAL".to_string(), "7".to_string());
        let env = Environment::with_prefix("CENSUS")
            .try_parsing(true)
            .source(Some(vars));

        let settings = Settings::load_from(missing.to_str().unwrap(), env).unwrap();
        assert_eq!(settings.legacy_early_stop(), Some(0.5));
        assert_eq!(settings.report_interval, 7);
    }
}
