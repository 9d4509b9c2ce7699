//! Per-key debouncing for file system events.
//!
//! Editors rarely save a file with a single write. A save is usually a
//! truncate, one or more writes, and sometimes a rename over the original,
//! each reported separately by the OS. Without coalescing, each save would
//! trigger several test runs.
//!
//! [`Debouncer`] holds the latest value for each key until no new value has
//! arrived for the configured interval, then emits it on the output channel.
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use wipwatch_monitor::utils::debounce::Debouncer;
//!
//! # async fn example() {
//! let (tx, mut rx) = mpsc::channel(16);
//! let debouncer = Debouncer::new(Duration::from_millis(100), tx);
//!
//! debouncer.send("src/cart.py".to_string(), 1).await.unwrap();
//! debouncer.send("src/cart.py".to_string(), 2).await.unwrap();
//!
//! assert_eq!(rx.recv().await, Some(("src/cart.py".to_string(), 2)));
//! # }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Capacity of the debouncer's input queue.
const INPUT_CAPACITY: usize = 1000;

/// Errors returned when handing a value to the debouncer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The background task has stopped.
    #[error("debouncer channel closed")]
    ChannelClosed,
}

#[derive(Debug)]
struct Pending<V> {
    value: V,
    deadline: Instant,
}

/// Coalesces bursts of values by key.
///
/// Dropping the debouncer flushes every pending value immediately.
#[derive(Debug)]
pub struct Debouncer<K, V> {
    input_tx: mpsc::Sender<(K, V)>,
    _task: JoinHandle<()>,
}

impl<K, V> Debouncer<K, V>
where
    K: Clone + Eq + Hash + Send + Debug + 'static,
    V: Send + 'static,
{
    /// Starts a debouncer emitting to `output_tx`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<(K, V)>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let task = tokio::spawn(run_debounce_loop(interval, input_rx, output_tx));
        Self {
            input_tx,
            _task: task,
        }
    }

    /// Queues a value, replacing any pending value for the same key and
    /// restarting its timer.
    ///
    /// # Errors
    ///
    /// Returns [`DebouncerError::ChannelClosed`] if the background task has
    /// stopped.
    pub async fn send(&self, key: K, value: V) -> Result<(), DebouncerError> {
        self.input_tx
            .send((key, value))
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }

    /// Queues a value without waiting. Usable from synchronous callbacks such
    /// as the notify event handler.
    ///
    /// Returns `false` if the input queue is full or closed.
    pub fn try_send(&self, key: K, value: V) -> bool {
        self.input_tx.try_send((key, value)).is_ok()
    }
}

async fn run_debounce_loop<K, V>(
    interval: Duration,
    mut input_rx: mpsc::Receiver<(K, V)>,
    output_tx: mpsc::Sender<(K, V)>,
) where
    K: Clone + Eq + Hash + Debug,
{
    let mut pending: HashMap<K, Pending<V>> = HashMap::new();

    debug!(interval_ms = interval.as_millis(), "Starting debounce loop");

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            received = input_rx.recv() => {
                let Some((key, value)) = received else {
                    debug!(pending = pending.len(), "Input closed, flushing pending values");
                    for (key, entry) in pending.drain() {
                        emit(&output_tx, key, entry.value).await;
                    }
                    break;
                };
                trace!(key = ?key, "Debouncing value");
                pending.insert(key, Pending { value, deadline: Instant::now() + interval });
            }
            () = sleep_until_next(next_deadline) => {
                let now = Instant::now();
                let expired: Vec<K> = pending
                    .iter()
                    .filter(|(_, entry)| entry.deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();

                for key in expired {
                    if let Some(entry) = pending.remove(&key) {
                        emit(&output_tx, key, entry.value).await;
                    }
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}

async fn sleep_until_next(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn emit<K: Debug, V>(output_tx: &mpsc::Sender<(K, V)>, key: K, value: V) {
    trace!(key = ?key, "Emitting debounced value");
    if output_tx.send((key, value)).await.is_err() {
        warn!("Debounce output closed, dropping value");
    }
}
