//! Wall-clock job scheduling.
//!
//! Jobs are registered with a [`Cadence`] (a minute and second within every
//! UTC hour) and run on their own tokio task. A job owns its state outright,
//! so runs of the same job never overlap and need no locking.
//!
//! Ticks follow the wall clock, not tokio's monotonic clock: the next tick is
//! recomputed from the current UTC time at every wake, so a suspended host or
//! a stepped clock falls back onto the cadence at the next tick.

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Source of the current UTC time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Longest single sleep between wall-clock checks. Clock jumps are noticed
/// within this long.
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Work invoked by the [`Scheduler`] at every matching tick.
pub trait ScheduledJob: Send + 'static {
    fn run(&mut self, now: DateTime<Utc>) -> impl Future<Output = ()> + Send;
}

/// A point within every hour (UTC) at which a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    minute: u32,
    second: u32,
}

impl Cadence {
    /// Time between two ticks of the same cadence.
    pub const PERIOD: Duration = Duration::from_secs(3600);

    /// Top of every hour (minute 0, second 0).
    pub fn hourly() -> Self {
        Self {
            minute: 0,
            second: 0,
        }
    }

    /// Returns `None` if `minute` or `second` is out of range.
    pub fn at(minute: u32, second: u32) -> Option<Self> {
        (minute < 60 && second < 60).then_some(Self { minute, second })
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn second(&self) -> u32 {
        self.second
    }

    /// First matching instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let into_hour = TimeDelta::seconds(i64::from(now.minute() * 60 + now.second()))
            + TimeDelta::nanoseconds(i64::from(now.nanosecond()));
        let offset = TimeDelta::seconds(i64::from(self.minute * 60 + self.second));
        let candidate = now - into_hour + offset;
        if candidate > now {
            candidate
        } else {
            candidate + TimeDelta::hours(1)
        }
    }
}

/// Runs registered jobs on their cadence until [`Scheduler::shutdown`].
///
/// Must be used from within a tokio runtime.
pub struct Scheduler {
    tasks: Mutex<Vec<JoinHandle<()>>>,
    clock: Clock,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }
}

impl Scheduler {
    /// Scheduler driven by the system UTC clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler driven by `clock` instead of the system clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Registers `job` to run at every tick matching `cadence`.
    ///
    /// The first run happens at the next matching tick, not immediately.
    pub fn register<J: ScheduledJob>(&self, cadence: Cadence, job: J) {
        tracing::debug!(
            next_run = %cadence.next_after((self.clock)()),
            minute = cadence.minute(),
            second = cadence.second(),
            "Registered scheduled job"
        );
        let handle = spawn_job(cadence, self.clock.clone(), job);
        self.lock_tasks().push(handle);
    }

    /// Number of registered jobs still running.
    pub fn job_count(&self) -> usize {
        self.lock_tasks().iter().filter(|h| !h.is_finished()).count()
    }

    /// Stops every registered job. A run in progress is cancelled at its
    /// next await point.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.lock_tasks().drain(..).collect();
        tracing::debug!(jobs = tasks.len(), "Stopping scheduled jobs");
        for task in tasks {
            task.abort();
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        // A panic while holding the lock leaves the Vec intact
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_job<J: ScheduledJob>(cadence: Cadence, clock: Clock, mut job: J) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next = cadence.next_after(clock());
        loop {
            let now = clock();
            if next - now > TimeDelta::hours(1) {
                // Clock stepped backwards; don't wait out the lost time
                next = cadence.next_after(now);
            }
            if now < next {
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait.min(MAX_WAIT)).await;
                continue;
            }
            job.run(now).await;
            // Ticks missed while the job ran or the host slept are skipped
            next = cadence.next_after(clock());
        }
    })
}

/// Clock that follows tokio's (pausable) time from `base`, plus a settable
/// jump in seconds standing in for a suspend or an NTP step.
#[cfg(test)]
pub(crate) fn test_clock(base: DateTime<Utc>) -> (Clock, Arc<std::sync::atomic::AtomicI64>) {
    use std::sync::atomic::{AtomicI64, Ordering};

    let start = tokio::time::Instant::now();
    let jump = Arc::new(AtomicI64::new(0));
    let offset = jump.clone();
    let clock: Clock = Arc::new(move || {
        let elapsed = TimeDelta::from_std(start.elapsed()).unwrap_or(TimeDelta::zero());
        base + elapsed + TimeDelta::seconds(offset.load(Ordering::SeqCst))
    });
    (clock, jump)
}
