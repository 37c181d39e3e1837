// Scheduling constants (no magic values)
use std::time::Duration;

/// Repeat interval of the periodic sync (15 minutes)
pub const PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Smallest repeat interval the substrate accepts; shorter requests are
/// clamped up to it without error.
pub const MIN_PERIODIC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How often the dispatcher looks for due registrations (1s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a dispatcher error before the next tick (5s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(5);

/// A Running registration older than this at startup is considered orphaned
/// (30 minutes, two periodic intervals)
pub const DEFAULT_RECOVERY_WINDOW_MS: i64 = 30 * 60 * 1000;

/// How often a running dispatcher sweeps for orphaned runs (5 minutes)
pub const RECOVERY_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Consecutive sync failures after which the dispatcher starts warning.
/// Warning only; nothing escalates.
pub const FAILURE_WARN_THRESHOLD: i64 = 5;

/// Samples kept by the process activity tracker (one per foreground check)
pub const ACTIVITY_TRACKER_MAX_SAMPLES: usize = 120;

/// Host process CPU usage above which it counts as actively used (percent)
pub const FOREGROUND_CPU_THRESHOLD: f32 = 2.0;

/// How far back host activity keeps the host "in the foreground" (2 minutes)
pub const FOREGROUND_ACTIVITY_WINDOW: Duration = Duration::from_secs(2 * 60);
