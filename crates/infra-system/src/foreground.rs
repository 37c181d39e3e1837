// Foreground oracles
// reason: sysinfo for cross-platform process monitoring
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

use chansync_core::application::dispatcher::constants::{
    ACTIVITY_TRACKER_MAX_SAMPLES, FOREGROUND_ACTIVITY_WINDOW, FOREGROUND_CPU_THRESHOLD,
};
use chansync_core::port::ForegroundOracle;

/// Foreground state pushed by the host itself.
///
/// Clones share the same flag, so the host keeps one handle and the gate
/// another.
#[derive(Debug, Clone, Default)]
pub struct ForegroundFlag {
    foreground: Arc<AtomicBool>,
}

impl ForegroundFlag {
    pub fn new(foreground: bool) -> Self {
        Self {
            foreground: Arc::new(AtomicBool::new(foreground)),
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::SeqCst);
    }
}

#[async_trait]
impl ForegroundOracle for ForegroundFlag {
    async fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }
}

/// Infers foreground state from the host process's CPU activity.
///
/// The host counts as foreground while it is running and used more than
/// `FOREGROUND_CPU_THRESHOLD` percent CPU at some sample inside
/// `FOREGROUND_ACTIVITY_WINDOW`. A host that is not running is background.
pub struct ProcessForegroundOracle {
    process_name: String,
    system: Mutex<System>,
    tracker: Mutex<ActivityTracker>,
    threshold: f32,
    window: Duration,
}

/// CPU usage history of the host process
struct ActivityTracker {
    samples: Vec<(Instant, f32)>,
    max_samples: usize,
}

impl ActivityTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::new(),
            max_samples,
        }
    }

    fn record(&mut self, cpu_usage: f32) {
        self.samples.push((Instant::now(), cpu_usage));

        if self.samples.len() > self.max_samples {
            self.samples.remove(0);
        }
    }

    /// Any sample inside the window at or above threshold
    fn is_active(&self, threshold: f32, window: Duration) -> bool {
        let Some(cutoff) = Instant::now().checked_sub(window) else {
            return self.samples.iter().any(|(_, cpu)| *cpu >= threshold);
        };

        self.samples
            .iter()
            .filter(|(time, _)| *time >= cutoff)
            .any(|(_, cpu)| *cpu >= threshold)
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

impl ProcessForegroundOracle {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self::with_thresholds(
            process_name,
            FOREGROUND_CPU_THRESHOLD,
            FOREGROUND_ACTIVITY_WINDOW,
        )
    }

    pub fn with_thresholds(
        process_name: impl Into<String>,
        threshold: f32,
        window: Duration,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            system: Mutex::new(System::new()),
            tracker: Mutex::new(ActivityTracker::new(ACTIVITY_TRACKER_MAX_SAMPLES)),
            threshold,
            window,
        }
    }

    /// Summed CPU usage of all processes named like the host, None when none
    /// is running.
    ///
    /// sysinfo derives CPU usage from the delta between two refreshes, so
    /// this refreshes twice `MINIMUM_CPU_UPDATE_INTERVAL` apart. A host that
    /// only just appeared would otherwise always read as idle.
    async fn sample_host_cpu(&self) -> Option<f32> {
        self.system
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_processes();

        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;

        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_processes();

        let usages: Vec<f32> = sys
            .processes_by_exact_name(&self.process_name)
            .map(|p| p.cpu_usage())
            .collect();

        if usages.is_empty() {
            None
        } else {
            Some(usages.iter().sum())
        }
    }
}

#[async_trait]
impl ForegroundOracle for ProcessForegroundOracle {
    async fn is_foreground(&self) -> bool {
        let sample = self.sample_host_cpu().await;

        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        let foreground = match sample {
            Some(cpu) => {
                tracker.record(cpu);
                tracker.is_active(self.threshold, self.window)
            }
            None => {
                // host exited; its old activity says nothing about the next run
                tracker.clear();
                false
            }
        };

        debug!(
            process = %self.process_name,
            cpu = ?sample,
            foreground,
            "Foreground check completed"
        );

        foreground
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flag_clones_share_state() {
        let flag = ForegroundFlag::new(false);
        let handle = flag.clone();

        assert!(!flag.is_foreground().await);
        handle.set_foreground(true);
        assert!(flag.is_foreground().await);
    }

    #[tokio::test]
    async fn test_missing_process_is_background() {
        let oracle = ProcessForegroundOracle::new("chansync-no-such-host-process");
        assert!(!oracle.is_foreground().await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_busy_host_is_foreground_on_first_check() {
        let mut busy = tokio::process::Command::new("sh")
            .args(["-c", "while :; do :; done"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // fresh oracle: no earlier refresh to diff against
        let oracle = ProcessForegroundOracle::new("sh");
        assert!(oracle.is_foreground().await);

        busy.kill().await.unwrap();
    }

    #[test]
    fn test_activity_tracker() {
        let mut tracker = ActivityTracker::new(10);

        for _ in 0..5 {
            tracker.record(0.5);
        }
        assert!(!tracker.is_active(2.0, Duration::from_secs(60)));

        tracker.record(40.0);
        assert!(tracker.is_active(2.0, Duration::from_secs(60)));

        tracker.clear();
        assert!(!tracker.is_active(2.0, Duration::from_secs(60)));
    }

    #[test]
    fn test_activity_outside_window_is_ignored() {
        let mut tracker = ActivityTracker::new(10);
        tracker.record(80.0);
        std::thread::sleep(Duration::from_millis(20));
        tracker.record(0.0);

        assert!(!tracker.is_active(2.0, Duration::from_millis(10)));
    }

    #[test]
    fn test_activity_tracker_bounds_samples() {
        let mut tracker = ActivityTracker::new(3);
        tracker.record(90.0);
        for _ in 0..3 {
            tracker.record(0.0);
        }

        assert_eq!(tracker.samples.len(), 3);
        assert!(!tracker.is_active(2.0, Duration::from_secs(60)));
    }
}
