//! Background maintenance
//!
//! One thread per engine that, on each tick:
//! - deletes every expired item through the normal commit path
//! - shrinks the log once it outgrows the auto-shrink thresholds
//! - fsyncs a dirty log once per second under `SyncPolicy::EverySecond`
//!
//! Dropping the shutdown sender (or sending on it) stops the loop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::config::SyncPolicy;
use crate::engine::Shared;
use crate::error::{AtlasError, Result};
use crate::tx::Tx;

const SYNC_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct Sweeper {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<Self> {
        let (shutdown, signal) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name("atlasdb-sweeper".into())
            .spawn(move || run(&shared, &signal))?;
        Ok(Self { shutdown, handle })
    }

    /// Stop the loop and wait for it to exit
    pub(crate) fn stop(self) {
        let _ = self.shutdown.try_send(());
        drop(self.shutdown);
        if self.handle.join().is_err() {
            tracing::error!("sweeper thread panicked");
        }
    }
}

fn run(shared: &Shared, signal: &Receiver<()>) {
    let sweep_ticker = channel::tick(shared.config.sweep_interval);
    let sync_ticker = channel::tick(SYNC_INTERVAL);

    loop {
        select! {
            recv(signal) -> _ => break,
            recv(sweep_ticker) -> _ => {
                match sweep(shared) {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "expired items swept"),
                    Err(AtlasError::DatabaseClosed) => break,
                    Err(e) => tracing::warn!(error = %e, "sweep failed, retrying next tick"),
                }
                match shared.maybe_shrink() {
                    Ok(()) | Err(AtlasError::ShrinkInProgress) => {}
                    Err(AtlasError::DatabaseClosed) => break,
                    Err(e) => tracing::warn!(error = %e, "auto-shrink failed"),
                }
            }
            recv(sync_ticker) -> _ => {
                if shared.config.sync_policy == SyncPolicy::EverySecond {
                    if let Err(e) = shared.sync_log() {
                        tracing::warn!(error = %e, "background log sync failed");
                    }
                }
            }
        }
    }
}

/// Delete every item whose deadline has passed; returns how many
fn sweep(shared: &Shared) -> Result<usize> {
    let now = SystemTime::now();

    // Peek under the read lock so idle ticks never block readers
    let pending = Tx::begin(shared, false)?.expired_keys(now);
    if pending.is_empty() {
        return Ok(0);
    }

    let mut tx = Tx::begin(shared, true)?;
    let expired = tx.expired_keys(now);
    for key in &expired {
        tx.remove(key)?;
    }
    tx.commit()?;
    Ok(expired.len())
}
