//! The cron firing engine.
//!
//! A single engine instance owns the live entry table. It is constructed
//! once with an injectable [`Clock`] and handed to the job registry; there
//! is no process-global scheduler state. Each registered entry is one
//! trigger segment; firing runs the entry's callback on its own spawned
//! task so a slow job never delays other entries or the tick loop.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, trace, warn};

use opshub_core::error::AppError;
use opshub_core::result::AppResult;
use opshub_core::types::id::EntryId;

use crate::spec::TriggerSpec;

/// Time source for the engine. Production uses [`SystemClock`]; tests
/// drive a [`ManualClock`].
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at the given instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Future type produced by an entry callback.
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback fired for one registered trigger segment.
pub type EntryCallback = Arc<dyn Fn() -> CallbackFuture + Send + Sync>;

struct Entry {
    spec: TriggerSpec,
    next_fire: DateTime<Utc>,
    callback: EntryCallback,
}

/// The live firing table.
pub struct CronEngine {
    clock: Arc<dyn Clock>,
    tick_interval: StdDuration,
    entries: RwLock<HashMap<EntryId, Entry>>,
}

impl fmt::Debug for CronEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronEngine")
            .field("clock", &self.clock)
            .field("tick_interval", &self.tick_interval)
            .finish()
    }
}

impl CronEngine {
    /// Create a new engine driven by the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tick_interval: StdDuration::from_secs(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Override the firing-table check interval.
    pub fn with_tick_interval(mut self, interval: StdDuration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Register one trigger segment. Returns the entry handle used to
    /// unregister it later.
    pub async fn register(
        &self,
        spec: TriggerSpec,
        callback: EntryCallback,
    ) -> AppResult<EntryId> {
        let now = self.clock.now();
        let next_fire = match &spec {
            TriggerSpec::Every(interval) => now + interval.period(),
            TriggerSpec::Cron(schedule) => schedule
                .next_after(now)
                .ok_or_else(|| AppError::validation("cron expression never fires"))?,
        };

        let id = EntryId::new();
        self.entries.write().await.insert(
            id,
            Entry {
                spec,
                next_fire,
                callback,
            },
        );
        debug!("Registered entry {} (next fire {})", id, next_fire);
        Ok(id)
    }

    /// Remove an entry from the firing table. Unknown handles are a no-op.
    pub async fn unregister(&self, id: EntryId) {
        if self.entries.write().await.remove(&id).is_some() {
            debug!("Unregistered entry {}", id);
        }
    }

    /// Remove a set of entries from the firing table.
    pub async fn unregister_all(&self, ids: &[EntryId]) {
        let mut entries = self.entries.write().await;
        for id in ids {
            if entries.remove(id).is_some() {
                debug!("Unregistered entry {}", id);
            }
        }
    }

    /// Whether a handle is currently registered.
    pub async fn contains(&self, id: EntryId) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// Number of registered entries.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Fire every due entry and reschedule it. Each callback runs on its
    /// own spawned task.
    pub async fn tick(&self) {
        let now = self.clock.now();
        let mut due: Vec<(EntryId, EntryCallback)> = Vec::new();
        {
            let mut entries = self.entries.write().await;
            let mut exhausted: Vec<EntryId> = Vec::new();
            for (id, entry) in entries.iter_mut() {
                if entry.next_fire > now {
                    continue;
                }
                due.push((*id, Arc::clone(&entry.callback)));
                // Reschedule seeded from the current tick instant.
                match &entry.spec {
                    TriggerSpec::Every(interval) => entry.next_fire = now + interval.period(),
                    TriggerSpec::Cron(schedule) => match schedule.next_after(now) {
                        Some(next) => entry.next_fire = next,
                        None => exhausted.push(*id),
                    },
                }
            }
            for id in exhausted {
                warn!("Entry {} has no further firing times, removing", id);
                entries.remove(&id);
            }
        }

        for (id, callback) in due {
            trace!("Firing entry {}", id);
            tokio::spawn(callback());
        }
    }

    /// Run the tick loop until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Cron engine started (tick interval {:?})",
            self.tick_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.tick_interval) => {
                    self.tick().await;
                }
            }
        }

        info!("Cron engine stopped");
    }
}
