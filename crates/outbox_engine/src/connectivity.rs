//! Connectivity monitor.
//!
//! Two producers feed the monitor: native online/offline events reported by
//! the host ([`ConnectivityMonitor::report_native`]) and a periodic
//! reachability probe against the backend ([`ConnectivityMonitor::spawn_probe`]).
//! The most recent reading wins, so a failed probe overrides a stale native
//! "online" and the next native edge overrides the probe.

use crate::http::{HttpClient, HttpRequest};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Where a connectivity reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// Edge-triggered event from the host.
    Native,
    /// Reachability probe.
    Probe,
}

/// One connectivity reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityReading {
    /// Whether the backend is considered reachable.
    pub online: bool,
    /// Producer of the reading.
    pub source: SignalSource,
    /// When the reading was taken.
    pub at: DateTime<Utc>,
}

/// Callback invoked with the new status on every transition.
pub type StatusListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Merges connectivity signals into one online flag.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
    last: RwLock<Option<ConnectivityReading>>,
    listeners: RwLock<Vec<(ListenerId, StatusListener)>>,
    next_listener: AtomicU64,
}

impl ConnectivityMonitor {
    /// Creates a monitor in the given initial state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self {
            tx,
            last: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Returns the current merged status.
    pub fn current_status(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns the most recent reading, if any signal has been recorded.
    pub fn last_reading(&self) -> Option<ConnectivityReading> {
        *self.last.read()
    }

    /// Registers a callback invoked on every transition.
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(listener, _)| *listener != id);
    }

    /// Returns a receiver that observes the merged status.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Records a native online/offline event.
    pub fn report_native(&self, online: bool) {
        self.record(online, SignalSource::Native);
    }

    /// Records the result of a reachability probe.
    pub fn record_probe(&self, reachable: bool) {
        self.record(reachable, SignalSource::Probe);
    }

    fn record(&self, online: bool, source: SignalSource) {
        let changed = {
            let mut last = self.last.write();
            *last = Some(ConnectivityReading {
                online,
                source,
                at: Utc::now(),
            });
            self.tx.send_if_modified(|current| {
                let changed = *current != online;
                *current = online;
                changed
            })
        };

        if !changed {
            return;
        }

        info!(online, ?source, "connectivity changed");
        let listeners: Vec<StatusListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(online);
        }
    }

    /// Starts the periodic reachability probe.
    ///
    /// The task stops once the monitor is dropped. A zero interval is raised
    /// to one millisecond.
    pub fn spawn_probe<C>(
        self: &Arc<Self>,
        client: Arc<C>,
        path: impl Into<String>,
        interval: Duration,
    ) -> JoinHandle<()>
    where
        C: HttpClient + ?Sized + 'static,
    {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let path = path.into();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let reachable = probe_once(client.as_ref(), &path).await;
                match monitor.upgrade() {
                    Some(monitor) => monitor.record_probe(reachable),
                    None => break,
                }
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.current_status())
            .field("last", &self.last_reading())
            .finish()
    }
}

/// Issues one reachability request.
///
/// Returns false for a non-success status or any transport error; never
/// fails.
pub async fn probe_once<C>(client: &C, path: &str) -> bool
where
    C: HttpClient + ?Sized,
{
    match client.send(HttpRequest::get(path)).await {
        Ok(response) if response.is_success() => true,
        Ok(response) => {
            debug!(status = response.status, "probe returned non-success status");
            false
        }
        Err(e) => {
            debug!(error = %e, "probe failed");
            false
        }
    }
}
