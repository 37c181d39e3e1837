//! Daemon configuration, read from `CHANSYNC_*` environment variables

use anyhow::{anyhow, bail, Context, Result};
use chansync_core::application::dispatcher::constants::DEFAULT_POLL_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.chansync/registry.db";
const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub db_path: String,
    /// Feature switch handed to the scheduler
    pub channels_enabled: bool,
    pub sync_program: String,
    pub sync_args: Vec<String>,
    pub sync_timeout: Option<Duration>,
    pub sync_env_allowlist: Vec<String>,
    /// Enables process-based foreground detection when set
    pub host_process: Option<String>,
    pub poll_interval: Duration,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = get("CHANSYNC_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = shellexpand::tilde(&db_path).into_owned();

        let channels_enabled = match get("CHANSYNC_CHANNELS_ENABLED") {
            Some(raw) => parse_bool(&raw).context("CHANSYNC_CHANNELS_ENABLED")?,
            None => true,
        };

        let command = get("CHANSYNC_SYNC_COMMAND")
            .ok_or_else(|| anyhow!("CHANSYNC_SYNC_COMMAND must name the sync program"))?;
        let mut words = command.split_whitespace().map(str::to_string);
        let sync_program = words
            .next()
            .ok_or_else(|| anyhow!("CHANSYNC_SYNC_COMMAND is empty"))?;
        let sync_args = words.collect();

        let sync_timeout = get("CHANSYNC_SYNC_TIMEOUT_SECS")
            .map(|raw| parse_positive(&raw).context("CHANSYNC_SYNC_TIMEOUT_SECS"))
            .transpose()?
            .map(Duration::from_secs);

        let sync_env_allowlist = match get("CHANSYNC_SYNC_ENV_ALLOWLIST") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ENV_ALLOWLIST.iter().map(|k| k.to_string()).collect(),
        };

        let poll_interval = get("CHANSYNC_POLL_INTERVAL_MS")
            .map(|raw| parse_positive(&raw).context("CHANSYNC_POLL_INTERVAL_MS"))
            .transpose()?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let log_format = match get("CHANSYNC_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            db_path,
            channels_enabled,
            sync_program,
            sync_args,
            sync_timeout,
            sync_env_allowlist,
            host_process: get("CHANSYNC_HOST_PROCESS"),
            poll_interval,
            log_format,
            log_dir: get("CHANSYNC_LOG_DIR")
                .map(|dir| PathBuf::from(shellexpand::tilde(&dir).into_owned())),
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {:?}", other),
    }
}

fn parse_positive(raw: &str) -> Result<u64> {
    let value: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("expected a positive integer, got {:?}", raw))?;
    if value == 0 {
        bail!("must be greater than zero");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<DaemonConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("CHANSYNC_SYNC_COMMAND", "channel-sync --all")]).unwrap();

        assert!(cfg.channels_enabled);
        assert_eq!(cfg.sync_program, "channel-sync");
        assert_eq!(cfg.sync_args, vec!["--all".to_string()]);
        assert_eq!(cfg.sync_timeout, None);
        assert_eq!(cfg.sync_env_allowlist, vec!["PATH", "HOME", "USER"]);
        assert_eq!(cfg.host_process, None);
        assert_eq!(cfg.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert!(cfg.db_path.ends_with(".chansync/registry.db"));
    }

    #[test]
    fn test_sync_command_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("CHANSYNC_SYNC_COMMAND", "   ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("CHANSYNC_SYNC_COMMAND", "/usr/bin/sync-channels"),
            ("CHANSYNC_DB_PATH", "/var/lib/chansync/registry.db"),
            ("CHANSYNC_CHANNELS_ENABLED", "off"),
            ("CHANSYNC_SYNC_TIMEOUT_SECS", "90"),
            ("CHANSYNC_SYNC_ENV_ALLOWLIST", "PATH, LANG"),
            ("CHANSYNC_HOST_PROCESS", "tv-launcher"),
            ("CHANSYNC_POLL_INTERVAL_MS", "250"),
            ("CHANSYNC_LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(cfg.db_path, "/var/lib/chansync/registry.db");
        assert!(!cfg.channels_enabled);
        assert!(cfg.sync_args.is_empty());
        assert_eq!(cfg.sync_timeout, Some(Duration::from_secs(90)));
        assert_eq!(cfg.sync_env_allowlist, vec!["PATH", "LANG"]);
        assert_eq!(cfg.host_process.as_deref(), Some("tv-launcher"));
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let base = ("CHANSYNC_SYNC_COMMAND", "sync");
        assert!(config(&[base, ("CHANSYNC_CHANNELS_ENABLED", "maybe")]).is_err());
        assert!(config(&[base, ("CHANSYNC_POLL_INTERVAL_MS", "0")]).is_err());
        assert!(config(&[base, ("CHANSYNC_SYNC_TIMEOUT_SECS", "-5")]).is_err());
    }
}
