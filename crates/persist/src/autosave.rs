//! Debounced auto-save.
//!
//! Each registered world gets a timer task. Queued documents replace each
//! other until the next tick, which writes the latest one through
//! [`WorldStore::save_world`].
//!
//! ```text
//! Idle --enable--> Armed --queue--> Queued --tick--> Flushing --done--> Armed
//!                    ^------------------- tick with nothing queued (no-op)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;
use worldvault_model::WorldState;

use crate::{StoreError, WorldStore};

/// Called with the world id and error whenever a flush fails.
pub type AutoSaveErrorHandler = Arc<dyn Fn(&str, &StoreError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoSaveState {
    /// No registration.
    Idle,
    /// Timer running, nothing queued.
    Armed,
    /// Timer running, a document waits for the next tick.
    Queued,
    /// A queued document is being written.
    Flushing,
}

#[derive(Default)]
struct Slot {
    pending: Option<WorldState>,
    flushing: bool,
}

struct Registration {
    slot: Arc<Mutex<Slot>>,
    interval: Duration,
    /// Dropping this stops the timer after any in-flight flush.
    _stop: oneshot::Sender<()>,
}

#[derive(Default)]
pub(crate) struct AutoSaveRegistry {
    registrations: Mutex<HashMap<String, Registration>>,
    on_error: Mutex<Option<AutoSaveErrorHandler>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AutoSaveRegistry {
    /// Start (or restart) the timer for `id`. A document already queued under
    /// a previous registration carries over.
    pub(crate) fn enable(
        &self,
        store: &Arc<WorldStore>,
        id: &str,
        interval: Duration,
    ) -> Result<(), StoreError> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let interval = interval.max(Duration::from_millis(1));
        let mut registrations = lock(&self.registrations);
        let carried = registrations
            .remove(id)
            .and_then(|previous| lock(&previous.slot).pending.take());

        let slot = Arc::new(Mutex::new(Slot {
            pending: carried,
            flushing: false,
        }));
        let (stop_tx, stop_rx) = oneshot::channel();
        runtime.spawn(
            run_timer(
                Arc::downgrade(store),
                id.to_string(),
                Arc::clone(&slot),
                interval,
                stop_rx,
            )
            .instrument(tracing::info_span!("autosave", world = id)),
        );

        registrations.insert(
            id.to_string(),
            Registration {
                slot,
                interval,
                _stop: stop_tx,
            },
        );
        tracing::debug!(world = id, ?interval, "auto-save enabled");
        Ok(())
    }

    pub(crate) fn queue(&self, doc: WorldState) -> Result<(), StoreError> {
        let registrations = lock(&self.registrations);
        let Some(registration) = registrations.get(doc.id()) else {
            return Err(StoreError::AutoSaveNotEnabled(doc.metadata.id));
        };
        lock(&registration.slot).pending = Some(doc);
        Ok(())
    }

    /// Cancel one registration. Returns whether it existed.
    pub(crate) fn disable(&self, id: &str) -> bool {
        let removed = lock(&self.registrations).remove(id).is_some();
        if removed {
            tracing::debug!(world = id, "auto-save disabled");
        }
        removed
    }

    pub(crate) fn disable_all(&self) {
        let drained: Vec<String> = lock(&self.registrations).drain().map(|(id, _)| id).collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "auto-save disabled for all worlds");
        }
    }

    pub(crate) fn state(&self, id: &str) -> AutoSaveState {
        let registrations = lock(&self.registrations);
        let Some(registration) = registrations.get(id) else {
            return AutoSaveState::Idle;
        };
        let slot = lock(&registration.slot);
        if slot.flushing {
            AutoSaveState::Flushing
        } else if slot.pending.is_some() {
            AutoSaveState::Queued
        } else {
            AutoSaveState::Armed
        }
    }

    pub(crate) fn interval(&self, id: &str) -> Option<Duration> {
        lock(&self.registrations).get(id).map(|r| r.interval)
    }

    pub(crate) fn set_error_handler(&self, handler: AutoSaveErrorHandler) {
        *lock(&self.on_error) = Some(handler);
    }

    fn report(&self, id: &str, err: &StoreError) {
        let handler = lock(&self.on_error).clone();
        if let Some(handler) = handler {
            handler(id, err);
        }
    }
}

async fn run_timer(
    store: Weak<WorldStore>,
    id: String,
    slot: Arc<Mutex<Slot>>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let Some(store) = store.upgrade() else { break };
                flush(&store, &id, &slot).await;
            }
        }
    }
    tracing::debug!("auto-save timer stopped");
}

async fn flush(store: &WorldStore, id: &str, slot: &Mutex<Slot>) {
    let pending = {
        let mut slot = lock(slot);
        let doc = slot.pending.take();
        slot.flushing = doc.is_some();
        doc
    };
    let Some(mut doc) = pending else {
        tracing::trace!("tick with nothing queued");
        return;
    };

    let outcome = store.save_world(&mut doc).await;

    let failure = {
        let mut slot = lock(slot);
        slot.flushing = false;
        match outcome {
            Ok(receipt) => {
                tracing::debug!(version = receipt.version, "auto-save flushed");
                None
            }
            Err(err) => {
                // Retry next tick unless something newer was queued meanwhile.
                if slot.pending.is_none() {
                    slot.pending = Some(doc);
                }
                Some(err)
            }
        }
    };

    if let Some(err) = failure {
        tracing::error!(world = id, error = %err, "auto-save flush failed");
        store.autosave.report(id, &err);
    }
}
