// Delegation engine constants (no magic values)
use std::time::Duration;

/// Default multiplier of queued-but-not-running tasks per worker
pub const DEFAULT_WAITING_TASKS_RATIO: f64 = 1.0;

/// How long dispatch waits for room in the pool queue before rejecting (50ms)
pub const DISPATCH_GRACE: Duration = Duration::from_millis(50);

/// Sleep between flag checks while a maintenance window is open (5 minutes)
pub const MAINTENANCE_RECHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Sleep before re-checking when the flag store cannot be reached (30s)
pub const FLAG_STORE_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Pause after a failed receive before polling again (none: the long poll paces retries)
pub const RECEIVE_ERROR_BACKOFF: Duration = Duration::ZERO;

/// Default interval between configuration refresh cycles (60s)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Graceful controller stop timeout (5 seconds)
pub const CONTROLLER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Graceful pool drain timeout on shutdown (30 seconds)
pub const POOL_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
