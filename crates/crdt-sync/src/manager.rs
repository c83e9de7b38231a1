//! The sync loop: debounced broadcasts after local mutations, periodic full
//! re-broadcasts, and merging of remote payloads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crdt_graph::wire::WireCrdt;
use crdt_graph::CrdtError;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

use crate::{SyncConfig, SyncError, Transport};

type Encoder = Box<dyn Fn() -> Result<String, CrdtError> + Send + Sync>;
type Applier = Box<dyn Fn(&str) -> Result<(), CrdtError> + Send + Sync>;

/// Type-erased access to one registered CRDT.
struct Entry {
    encode: Encoder,
    apply: Applier,
}

enum Command {
    Dirty(String),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Counters describing sync activity so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Payloads accepted by the transport.
    pub broadcasts: u64,
    /// Payloads the transport rejected.
    pub transport_failures: u64,
    /// Local states that could not be serialized.
    pub encode_failures: u64,
    /// Flushes triggered by the debounce timer.
    pub debounced_flushes: u64,
    /// Full re-broadcasts triggered by the sync interval.
    pub periodic_syncs: u64,
    /// Remote payloads merged into a local replica.
    pub remote_applied: u64,
    /// Remote payloads rejected (unknown name, decode or merge failure).
    pub remote_rejected: u64,
}

struct Shared {
    entries: RwLock<BTreeMap<String, Entry>>,
    transport: Box<dyn Transport>,
    stats: Mutex<SyncStats>,
}

impl Shared {
    fn broadcast(&self, name: &str) {
        let payload = {
            let entries = self.entries.read();
            let Some(entry) = entries.get(name) else {
                return;
            };
            (entry.encode)()
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                warn!(crdt = name, error = %err, "failed to encode crdt");
                self.stats.lock().encode_failures += 1;
                return;
            }
        };

        match self.transport.broadcast(name, &payload) {
            Ok(()) => {
                trace!(crdt = name, bytes = payload.len(), "broadcast");
                self.stats.lock().broadcasts += 1;
            }
            Err(err) => {
                // The next periodic sync carries the same state again.
                warn!(crdt = name, error = %err, "broadcast failed");
                self.stats.lock().transport_failures += 1;
            }
        }
    }

    fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// A registered CRDT, shared between the application and the sync loop.
///
/// Mutations go through [`mutate`](Self::mutate), which serializes access
/// with a mutex and schedules a debounced broadcast when the mutation
/// succeeds. Clones refer to the same instance.
pub struct Replica<C> {
    name: Arc<str>,
    crdt: Arc<Mutex<C>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl<C> Clone for Replica<C> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            crdt: Arc::clone(&self.crdt),
            commands: self.commands.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Replica<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<C> Replica<C> {
    /// The name this CRDT is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply a local mutation.
    ///
    /// The CRDT is marked dirty only when `f` returns `Ok`; a rejected
    /// mutation is never broadcast.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut C) -> Result<R, CrdtError>,
    ) -> Result<R, CrdtError> {
        let result = f(&mut *self.crdt.lock())?;
        if self.commands.send(Command::Dirty(self.name.to_string())).is_err() {
            trace!(crdt = %self.name, "sync loop stopped, change stays local");
        }
        Ok(result)
    }

    /// Read the current state.
    pub fn read<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(&*self.crdt.lock())
    }

    /// Clone the current state.
    pub fn snapshot(&self) -> C
    where
        C: Clone,
    {
        self.crdt.lock().clone()
    }
}

/// A cloneable handle to a [`SyncManager`], usable after it has been spawned.
#[derive(Clone)]
pub struct SyncHandle {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl SyncHandle {
    /// Register `crdt` under `name` and return the handle used to mutate it.
    pub fn register<C>(&self, name: impl Into<String>, crdt: C) -> Result<Replica<C>, SyncError>
    where
        C: WireCrdt + Send + 'static,
    {
        let name = name.into();
        let crdt = Arc::new(Mutex::new(crdt));

        let for_encode = Arc::clone(&crdt);
        let for_apply = Arc::clone(&crdt);
        let entry = Entry {
            encode: Box::new(move || for_encode.lock().to_json()),
            apply: Box::new(move |payload: &str| {
                let remote = C::from_json(payload)?;
                for_apply.lock().try_merge(&remote)
            }),
        };

        {
            let mut entries = self.shared.entries.write();
            if entries.contains_key(&name) {
                return Err(SyncError::AlreadyRegistered(name));
            }
            entries.insert(name.clone(), entry);
        }
        debug!(crdt = %name, type_name = C::TYPE_NAME, "registered crdt");

        Ok(Replica {
            name: name.into(),
            crdt,
            commands: self.commands.clone(),
        })
    }

    /// Merge a payload received from a peer into the CRDT registered as
    /// `crdt_name`.
    ///
    /// Delivery order and duplicates do not matter. On error the local
    /// instance is unchanged.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub fn on_remote_update(&self, crdt_name: &str, payload: &str) -> Result<(), SyncError> {
        let result = {
            let entries = self.shared.entries.read();
            match entries.get(crdt_name) {
                Some(entry) => (entry.apply)(payload).map_err(SyncError::from),
                None => Err(SyncError::UnknownCrdt(crdt_name.to_string())),
            }
        };

        let mut stats = self.shared.stats.lock();
        match &result {
            Ok(()) => {
                stats.remote_applied += 1;
                debug!("applied remote update");
            }
            Err(err) => {
                stats.remote_rejected += 1;
                warn!(error = %err, "rejected remote update");
            }
        }
        result
    }

    /// Broadcast every dirty CRDT now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(tx))
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)
    }

    /// Flush pending changes and stop the sync loop.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(tx))
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)
    }

    /// Names of the registered CRDTs, in order.
    pub fn crdt_names(&self) -> Vec<String> {
        self.shared.names()
    }

    /// A snapshot of the sync counters.
    pub fn stats(&self) -> SyncStats {
        *self.shared.stats.lock()
    }
}

/// Keeps registered CRDTs in sync with peers through a [`Transport`].
///
/// Two independent triggers emit state:
///
/// * a local mutation marks its CRDT dirty; once no further mutation has
///   arrived for the debounce window, every dirty CRDT is broadcast;
/// * every sync interval, all registered CRDTs are broadcast regardless of
///   activity, healing dropped or missed updates.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
/// use crdt_sync::{MemoryTransport, SyncConfig, SyncManager};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = MemoryTransport::new();
/// let manager = SyncManager::new(SyncConfig::default(), transport.clone());
/// let hits = manager.register("hits", GCounter::new("agent-a"))?;
/// let handle = manager.handle();
/// let task = manager.spawn();
///
/// hits.mutate(|c| c.increment_by(3))?;
/// handle.shutdown().await?;
/// task.await?;
///
/// assert_eq!(transport.sent()[0].crdt_name, "hits");
/// # Ok(())
/// # }
/// ```
pub struct SyncManager {
    config: SyncConfig,
    handle: SyncHandle,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl SyncManager {
    /// Create a manager that emits through `transport`.
    pub fn new(config: SyncConfig, transport: impl Transport) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            entries: RwLock::new(BTreeMap::new()),
            transport: Box::new(transport),
            stats: Mutex::new(SyncStats::default()),
        });
        Self {
            config,
            handle: SyncHandle {
                shared,
                commands: tx,
            },
            commands: rx,
        }
    }

    /// Register `crdt` under `name`. See [`SyncHandle::register`].
    pub fn register<C>(&self, name: impl Into<String>, crdt: C) -> Result<Replica<C>, SyncError>
    where
        C: WireCrdt + Send + 'static,
    {
        self.handle.register(name, crdt)
    }

    /// A handle for remote updates, registration and shutdown.
    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// The configuration this manager runs with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run the loop on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the sync loop until [`SyncHandle::shutdown`] is called or every
    /// handle and replica has been dropped.
    pub async fn run(self) {
        let Self {
            config,
            handle,
            mut commands,
        } = self;
        let shared = handle.shared;
        drop(handle.commands);

        let debounce = config.debounce_duration();
        // tokio rejects a zero period
        let period = config.sync_interval_duration().max(Duration::from_millis(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        let mut dirty = BTreeSet::new();
        let mut deadline: Option<Instant> = None;
        info!(
            debounce_ms = config.debounce_ms,
            sync_interval_ms = config.sync_interval_ms,
            "sync manager started"
        );

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dirty(name)) => {
                        dirty.insert(name);
                        deadline = Some(Instant::now() + debounce);
                    }
                    Some(Command::Flush(ack)) => {
                        flush(&shared, &mut dirty);
                        deadline = None;
                        let _ = ack.send(());
                    }
                    Some(Command::Shutdown(ack)) => {
                        flush(&shared, &mut dirty);
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        flush(&shared, &mut dirty);
                        break;
                    }
                },

                () = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    debug!(count = dirty.len(), "debounce elapsed");
                    shared.stats.lock().debounced_flushes += 1;
                    flush(&shared, &mut dirty);
                }

                _ = interval.tick() => {
                    let names = shared.names();
                    debug!(count = names.len(), "periodic sync");
                    shared.stats.lock().periodic_syncs += 1;
                    for name in &names {
                        shared.broadcast(name);
                    }
                    // everything dirty was just sent
                    dirty.clear();
                    deadline = None;
                }
            }
        }

        info!("sync manager stopped");
    }
}

fn flush(shared: &Shared, dirty: &mut BTreeSet<String>) {
    for name in std::mem::take(dirty) {
        shared.broadcast(&name);
    }
}
