use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the context-window limit
pub const ENV_CONTEXT_LIMIT: &str = "CTXWATCH_CONTEXT_LIMIT";
/// Environment variable overriding the snapshot directory
pub const ENV_STATE_DIR: &str = "CTXWATCH_STATE_DIR";
/// Environment variable overriding the transcript poll interval
pub const ENV_POLL_INTERVAL: &str = "CTXWATCH_POLL_INTERVAL_MS";

/// Settings (from config file, environment, then CLI)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Context-window ceiling in tokens
    #[serde(default = "default_context_limit")]
    pub context_limit: u64,

    /// Transcript polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Directory holding per-session snapshot directories
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Wake the transcript follower on filesystem events between polls
    #[serde(default = "default_fs_events")]
    pub fs_events: bool,
}

fn default_context_limit() -> u64 {
    200_000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_fs_events() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            context_limit: default_context_limit(),
            poll_interval_ms: default_poll_interval(),
            state_dir: None,
            fs_events: default_fs_events(),
        }
    }
}

impl Settings {
    /// Load settings from a config file or use defaults.
    ///
    /// An explicit `path` that does not exist falls through to the default
    /// locations.
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(p) = path {
            if p.exists() {
                return Self::from_file(p);
            }
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("ctxwatch/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/ctxwatch/config.toml")),
            dirs::home_dir().map(|p| p.join(".ctxwatch.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply environment overrides
    pub fn merge_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(ENV_CONTEXT_LIMIT) {
            self.context_limit = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_CONTEXT_LIMIT, value))?;
        }
        if let Ok(value) = std::env::var(ENV_POLL_INTERVAL) {
            self.poll_interval_ms = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", ENV_POLL_INTERVAL, value))?;
        }
        if let Some(dir) = std::env::var_os(ENV_STATE_DIR) {
            if !dir.is_empty() {
                self.state_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        const MIN_CONTEXT_LIMIT: u64 = 1;
        const MIN_POLL_INTERVAL: u64 = 10;

        if self.context_limit < MIN_CONTEXT_LIMIT {
            self.context_limit = MIN_CONTEXT_LIMIT;
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL {
            self.poll_interval_ms = MIN_POLL_INTERVAL;
        }
    }

    /// Snapshot root: configured directory, else the platform data dir
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|p| p.join("ctxwatch").join("sessions"))
            .unwrap_or_else(|| PathBuf::from(".ctxwatch").join("sessions"))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.context_limit, 200_000);
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.state_dir, None);
        assert!(settings.fs_events);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            context_limit = 1000000
            state_dir = "/var/lib/ctxwatch"
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.context_limit, 1_000_000);
        assert_eq!(settings.poll_interval_ms, 500);
        assert_eq!(settings.state_dir(), PathBuf::from("/var/lib/ctxwatch"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_ms = 50\nfs_events = false\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.poll_interval_ms, 50);
        assert!(!settings.fs_events);
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "context_limit = \"lots\"\n").unwrap();

        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                (ENV_CONTEXT_LIMIT, Some("150000")),
                (ENV_STATE_DIR, Some("/tmp/ctxwatch-test")),
                (ENV_POLL_INTERVAL, None),
            ],
            || {
                let mut settings = Settings::default();
                settings.merge_env().unwrap();
                assert_eq!(settings.context_limit, 150_000);
                assert_eq!(settings.poll_interval_ms, 500);
                assert_eq!(settings.state_dir(), PathBuf::from("/tmp/ctxwatch-test"));
            },
        );
    }

    #[test]
    fn test_env_rejects_garbage_limit() {
        temp_env::with_var(ENV_CONTEXT_LIMIT, Some("two hundred"), || {
            let mut settings = Settings::default();
            assert!(settings.merge_env().is_err());
        });
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = Settings {
            context_limit: 0,
            poll_interval_ms: 0,
            ..Default::default()
        };
        settings.validate();
        assert_eq!(settings.context_limit, 1);
        assert_eq!(settings.poll_interval_ms, 10);
    }
}
