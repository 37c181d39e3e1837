// Subprocess sync task
// reason: tokio for async process management
use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use chansync_core::port::{SyncTask, SyncTaskError};

/// Bytes of stderr kept in a `NonZeroExit` error
const STDERR_TAIL_BYTES: usize = 2048;

/// Runs the configured channel sync command as a child process.
///
/// The child sees only allowlisted variables from the daemon's environment.
/// With a timeout set, an overrunning child is killed and the run fails
/// with `SyncTaskError::Timeout`.
pub struct SubprocessSyncTask {
    program: String,
    args: Vec<String>,
    env_allowlist: Vec<String>,
    timeout: Option<Duration>,
}

impl SubprocessSyncTask {
    /// # Example
    /// ```ignore
    /// let task = SubprocessSyncTask::new("channel-sync", vec!["--all".to_string()])
    ///     .with_env_allowlist(vec!["PATH".to_string(), "HOME".to_string()])
    ///     .with_timeout(Duration::from_secs(120));
    /// ```
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env_allowlist: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_env_allowlist(mut self, env_allowlist: Vec<String>) -> Self {
        self.env_allowlist = env_allowlist;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Keep allowlisted variables only. Works on raw OS strings: a
    /// non-UTF-8 variable anywhere in the environment must not abort the run.
    fn filter_env(
        &self,
        env: impl Iterator<Item = (OsString, OsString)>,
    ) -> HashMap<OsString, OsString> {
        env.filter(|(k, _)| {
            self.env_allowlist
                .iter()
                .any(|allowed| OsStr::new(allowed) == k.as_os_str())
        })
        .collect()
    }

    async fn spawn_and_wait(&self) -> Result<std::process::Output, SyncTaskError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env_clear()
            .envs(self.filter_env(std::env::vars_os()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SyncTaskError::SpawnFailed(format!("{}: {}", self.program, e)))?;

        let waited = child.wait_with_output();
        let output = match self.timeout {
            // dropping the future drops the child, which kills it
            Some(limit) => timeout(limit, waited)
                .await
                .map_err(|_| SyncTaskError::Timeout(limit.as_millis() as u64))?,
            None => waited.await,
        };

        output.map_err(|e| SyncTaskError::Io(e.to_string()))
    }
}

#[async_trait]
impl SyncTask for SubprocessSyncTask {
    async fn run(&self) -> Result<(), SyncTaskError> {
        let started = Instant::now();
        info!(
            command = %self.program,
            args = ?self.args,
            timeout_ms = ?self.timeout.map(|t| t.as_millis() as u64),
            "Starting sync subprocess"
        );

        let output = self.spawn_and_wait().await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            command = %self.program,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Sync subprocess output captured"
        );

        if output.status.success() {
            info!(command = %self.program, duration_ms, "Sync subprocess completed");
            return Ok(());
        }

        Err(SyncTaskError::NonZeroExit {
            code: output.status.code(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> SubprocessSyncTask {
        SubprocessSyncTask::new("sh", vec!["-c".to_string(), script.to_string()])
            .with_env_allowlist(vec!["PATH".to_string()])
    }

    #[tokio::test]
    async fn test_run_success() {
        assert!(sh("exit 0").run().await.is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let result = sh("echo 'provider locked' >&2; exit 3").run().await;

        match result {
            Err(SyncTaskError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "provider locked");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_run() {
        let task = sh("sleep 10").with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let result = task.run().await;

        assert!(matches!(result, Err(SyncTaskError::Timeout(100))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let task = SubprocessSyncTask::new("/nonexistent/chansync-sync", vec![]);
        assert!(matches!(
            task.run().await,
            Err(SyncTaskError::SpawnFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_child_env_is_allowlisted() {
        // HOME is set for the test process but not allowlisted
        let result = sh("test -z \"$HOME\"").run().await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_env_filtering() {
        let task = SubprocessSyncTask::new("true", vec![])
            .with_env_allowlist(vec!["ALLOWED_VAR".to_string()]);

        let env = vec![
            (OsString::from("ALLOWED_VAR"), OsString::from("value1")),
            (OsString::from("BLOCKED_VAR"), OsString::from("value2")),
        ];
        let filtered = task.filter_env(env.into_iter());

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key(OsStr::new("ALLOWED_VAR")));
    }

    #[test]
    fn test_env_filtering_keeps_non_utf8_values() {
        use std::os::unix::ffi::OsStringExt;

        let task = SubprocessSyncTask::new("true", vec![])
            .with_env_allowlist(vec!["ALLOWED_VAR".to_string()]);
        let raw = OsString::from_vec(vec![b'c', b'h', 0xff, 0xfe]);

        let env = vec![
            (OsString::from("ALLOWED_VAR"), raw.clone()),
            (OsString::from_vec(vec![b'X', 0xff]), OsString::from("blocked")),
        ];
        let filtered = task.filter_env(env.into_iter());

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get(OsStr::new("ALLOWED_VAR")), Some(&raw));
    }

    #[tokio::test]
    async fn test_non_utf8_environment_does_not_abort_run() {
        use std::os::unix::ffi::OsStringExt;

        std::env::set_var(
            OsString::from_vec(b"CHANSYNC_TEST_RAW_\xff".to_vec()),
            OsString::from_vec(vec![0xff, 0xfe]),
        );
        std::env::set_var("CHANSYNC_TEST_PASSED", "1");

        let result = SubprocessSyncTask::new(
            "sh",
            vec!["-c".to_string(), "test \"$CHANSYNC_TEST_PASSED\" = 1".to_string()],
        )
        .with_env_allowlist(vec!["PATH".to_string(), "CHANSYNC_TEST_PASSED".to_string()])
        .run()
        .await;

        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let long = vec![b'x'; STDERR_TAIL_BYTES * 2];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_BYTES);
    }
}
