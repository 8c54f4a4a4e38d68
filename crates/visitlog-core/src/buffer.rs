//! In-memory event buffer and its flush scheduler.
//!
//! Producers append under a short lock and poke the flush worker through a
//! single-slot channel; the worker swaps the whole `Vec` out and writes it to
//! the store after releasing the lock, so a slow write never blocks a request.
//!
//! The periodic ticker only runs while there is something to flush. It is
//! started by the first enqueue that finds it idle and stops itself on the
//! first tick that finds the buffer empty. Both decisions are taken under the
//! buffer lock, so an event appended concurrently with a stopping ticker
//! always restarts it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analytics::EventStore;
use crate::event::PageView;

struct BufferState {
    events: Vec<PageView>,
    /// Stamped at swap time, not when the write completes.
    last_flush: Instant,
    ticker_active: bool,
    /// Number of swaps taken so far. A batch is identified by the value this
    /// had right after it was swapped out.
    swapped: u64,
}

pub struct EventBuffer {
    state: Mutex<BufferState>,
    batch_size: usize,
    flush_interval: Duration,
    store: Arc<dyn EventStore>,
    flush_tx: mpsc::Sender<()>,
    /// Latest swap sequence whose write has finished (successfully or not).
    completed_tx: watch::Sender<u64>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EventBuffer {
    /// Create the buffer and spawn its flush worker.
    ///
    /// The worker exits after a final flush once `shutdown_rx` turns `true`.
    /// Must be called from within a tokio runtime.
    pub fn start(
        batch_size: usize,
        flush_interval: Duration,
        store: Arc<dyn EventStore>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let (completed_tx, _) = watch::channel(0);
        let buffer = Arc::new(Self {
            state: Mutex::new(BufferState {
                events: Vec::with_capacity(batch_size),
                last_flush: Instant::now(),
                ticker_active: false,
                swapped: 0,
            }),
            batch_size,
            flush_interval,
            store,
            flush_tx,
            completed_tx,
            shutdown_rx: shutdown_rx.clone(),
        });

        let worker = tokio::spawn(Arc::clone(&buffer).run_flush_worker(flush_rx, shutdown_rx));
        (buffer, worker)
    }

    /// Append `event` and request a flush when the batch is full or the last
    /// flush is older than the flush interval.
    ///
    /// Never waits on the store.
    pub async fn enqueue(self: &Arc<Self>, event: PageView) {
        let (should_flush, start_ticker) = {
            let mut state = self.state.lock().await;
            state.events.push(event);
            let should_flush = state.events.len() >= self.batch_size
                || state.last_flush.elapsed() >= self.flush_interval;
            let start_ticker = !state.ticker_active;
            state.ticker_active = true;
            (should_flush, start_ticker)
        };

        if start_ticker {
            debug!(interval_secs = self.flush_interval.as_secs(), "Flush ticker started");
            tokio::spawn(Arc::clone(self).run_ticker());
        }
        if should_flush {
            self.request_flush();
        }
    }

    /// Ask the worker to flush if anything is buffered. Returns `false` (and
    /// does nothing) when the buffer is empty.
    pub async fn force_flush(&self) -> bool {
        let pending = !self.state.lock().await.events.is_empty();
        if pending {
            self.request_flush();
        }
        pending
    }

    /// Force a flush and wait until the batch holding everything buffered so
    /// far has been written, or until `grace` elapses.
    ///
    /// Returns `true` when completion was observed. An empty buffer still
    /// waits for an in-flight write, but never triggers a new one.
    pub async fn flush_and_wait(&self, grace: Duration) -> bool {
        let mut completed = self.completed_tx.subscribe();
        let target = {
            let state = self.state.lock().await;
            if state.events.is_empty() {
                state.swapped
            } else {
                state.swapped + 1
            }
        };
        if target > *completed.borrow_and_update() {
            self.request_flush();
        }

        let observed = matches!(
            tokio::time::timeout(grace, completed.wait_for(|done| *done >= target)).await,
            Ok(Ok(_))
        );
        observed
    }

    /// Number of events waiting for the next flush.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn is_ticker_active(&self) -> bool {
        self.state.lock().await.ticker_active
    }

    /// Non-blocking flush request. A request already waiting in the slot
    /// covers this one.
    fn request_flush(&self) {
        match self.flush_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("Flush worker is gone; buffered events stay in memory");
            }
        }
    }

    /// Swap the buffer out and write it. Only the worker calls this, so
    /// flushes never overlap.
    async fn flush(&self) {
        let (batch, sequence) = {
            let mut state = self.state.lock().await;
            if state.events.is_empty() {
                return;
            }
            let batch =
                std::mem::replace(&mut state.events, Vec::with_capacity(self.batch_size));
            state.swapped += 1;
            state.last_flush = Instant::now();
            (batch, state.swapped)
        };

        match self.store.insert_events(&batch).await {
            Ok(()) => {
                info!(count = batch.len(), "Buffer flushed to store");
            }
            Err(e) => {
                error!(count = batch.len(), error = %e, "Buffer flush failed — events lost");
            }
        }
        self.completed_tx.send_replace(sequence);
    }

    async fn run_flush_worker(
        self: Arc<Self>,
        mut flush_rx: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                signal = flush_rx.recv() => match signal {
                    Some(()) => self.flush().await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Flush worker stopping, writing remaining events");
        self.flush().await;
    }

    async fn run_ticker(self: Arc<Self>) {
        let mut shutdown = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            if *shutdown.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    {
                        let mut state = self.state.lock().await;
                        if state.events.is_empty() {
                            state.ticker_active = false;
                            debug!("Buffer empty, flush ticker stopped");
                            return;
                        }
                    }
                    self.request_flush();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
