use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;
use tracing::warn;

use crate::exec::DEFAULT_EXEC_TIMEOUT;
use crate::model::LogWindow;
use crate::watch::DEFAULT_CONTEXT_POLL;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RuntimeConfig {
    pub source: Option<String>,
    pub context_poll: Duration,
    pub exec_timeout: Duration,
    pub log_window: LogWindow,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source: None,
            context_poll: DEFAULT_CONTEXT_POLL,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            log_window: LogWindow::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KviewConfigFile {
    #[serde(default, alias = "context_poll")]
    context_poll_secs: Option<u64>,
    #[serde(default, alias = "exec_timeout")]
    exec_timeout_secs: Option<u64>,
    #[serde(default)]
    logs: LogSpec,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct LogSpec {
    #[serde(default, alias = "tail")]
    tail_lines: Option<i64>,
    #[serde(default, alias = "since")]
    since_seconds: Option<i64>,
}

impl RuntimeConfig {
    /// Loads the first config file found; a missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let Some(path) = explicit
            .map(Path::to_path_buf)
            .or_else(discover_config_path)
        else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = parse_config(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.source = Some(path.display().to_string());
        Ok(config)
    }
}

fn parse_config(raw: &str) -> Result<RuntimeConfig> {
    let parsed: KviewConfigFile = if raw.trim().is_empty() {
        KviewConfigFile::default()
    } else {
        serde_yaml::from_str(raw)?
    };
    let defaults = RuntimeConfig::default();

    let context_poll = positive_secs(parsed.context_poll_secs, "context_poll_secs")
        .unwrap_or(defaults.context_poll);
    let exec_timeout = positive_secs(parsed.exec_timeout_secs, "exec_timeout_secs")
        .unwrap_or(defaults.exec_timeout);

    let log_window = match (parsed.logs.tail_lines, parsed.logs.since_seconds) {
        (Some(_), Some(seconds)) if seconds > 0 => {
            warn!("both logs.tail_lines and logs.since_seconds are set, using since_seconds");
            LogWindow::SinceSeconds(seconds)
        }
        (_, Some(seconds)) if seconds > 0 => LogWindow::SinceSeconds(seconds),
        (Some(lines), _) if lines > 0 => LogWindow::TailLines(lines),
        (None, None) => defaults.log_window,
        _ => {
            warn!("ignoring non-positive log window, using {}", defaults.log_window);
            defaults.log_window
        }
    };

    Ok(RuntimeConfig {
        source: None,
        context_poll,
        exec_timeout,
        log_window,
    })
}

fn positive_secs(value: Option<u64>, key: &str) -> Option<Duration> {
    match value {
        Some(0) => {
            warn!("{key} must be positive, using the default");
            None
        }
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KVIEW_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [PathBuf::from("kview.yaml"), PathBuf::from("kview.yml")];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/kview/config.yaml"),
            PathBuf::from(&home).join(".config/kview/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{RuntimeConfig, parse_config};
    use crate::model::LogWindow;
    use tokio::time::Duration;

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(parse_config("").unwrap(), RuntimeConfig::default());
        assert_eq!(parse_config("  \n").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = parse_config(
            "context_poll_secs: 10\nexec_timeout_secs: 30\nlogs:\n  tail_lines: 200\n",
        )
        .unwrap();
        assert_eq!(config.context_poll, Duration::from_secs(10));
        assert_eq!(config.exec_timeout, Duration::from_secs(30));
        assert_eq!(config.log_window, LogWindow::TailLines(200));
    }

    #[test]
    fn time_window_takes_precedence() {
        let config = parse_config("logs:\n  tail_lines: 50\n  since_seconds: 600\n").unwrap();
        assert_eq!(config.log_window, LogWindow::SinceSeconds(600));

        let config = parse_config("logs:\n  since: 60\n").unwrap();
        assert_eq!(config.log_window, LogWindow::SinceSeconds(60));
    }

    #[test]
    fn zero_values_fall_back() {
        let config = parse_config("exec_timeout_secs: 0\nlogs:\n  tail_lines: 0\n").unwrap();
        assert_eq!(config.exec_timeout, Duration::from_secs(5));
        assert_eq!(config.log_window, LogWindow::TailLines(1_000));
    }

    #[test]
    fn short_aliases_are_accepted() {
        let config = parse_config("exec_timeout: 12\nlogs:\n  tail: 20\n").unwrap();
        assert_eq!(config.exec_timeout, Duration::from_secs(12));
        assert_eq!(config.log_window, LogWindow::TailLines(20));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(parse_config("exec_timeout_secs: soon\n").is_err());
    }
}
