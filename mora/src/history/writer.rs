//! Background history writer
//!
//! One worker drains a bounded queue, so appends are applied in enqueue order
//! across all sessions. Enqueueing never blocks the caller; a full or closed
//! queue and failed writes are logged with the turn content and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{HistoryStore, NewTurn};

/// The turns one request produced, written together
#[derive(Debug, Clone)]
pub struct Exchange {
    pub session: String,
    pub turns: Vec<NewTurn>,
}

impl Exchange {
    /// A human utterance followed by the AI answer
    pub fn new(session: impl Into<String>, input: &str, answer: &str) -> Self {
        Self {
            session: session.into(),
            turns: vec![NewTurn::human(input), NewTurn::ai(answer)],
        }
    }
}

enum Job {
    Write(Exchange),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub struct HistoryWriter {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl HistoryWriter {
    /// Spawn the worker. `max_turns_per_session` of 0 disables pruning.
    pub fn spawn(
        store: Arc<dyn HistoryStore>,
        capacity: usize,
        max_turns_per_session: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run_worker(
            store,
            rx,
            max_turns_per_session,
            Arc::clone(&counters),
        ));

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Queue an exchange. Returns false if it was dropped.
    pub fn submit(&self, exchange: Exchange) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.drop_exchange(&exchange, "closed");
            return false;
        };

        match tx.try_send(Job::Write(exchange)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(Job::Write(exchange))) => {
                self.drop_exchange(&exchange, "full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(Job::Write(exchange))) => {
                self.drop_exchange(&exchange, "closed");
                false
            }
            Err(_) => false,
        }
    }

    fn drop_exchange(&self, exchange: &Exchange, reason: &'static str) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mora_history_dropped_total", "reason" => reason).increment(1);
        tracing::error!(
            session = %exchange.session,
            turns = ?exchange.turns,
            reason,
            "History queue rejected exchange"
        );
    }

    /// Wait until everything queued before this call has been applied.
    pub async fn flush(&self) {
        let tx = self.tx.lock().clone();
        let Some(tx) = tx else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Job::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "History writer task failed");
            }
        }
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    store: Arc<dyn HistoryStore>,
    mut rx: mpsc::Receiver<Job>,
    max_turns_per_session: usize,
    counters: Arc<Counters>,
) {
    tracing::debug!(backend = store.backend_name(), "History writer started");

    while let Some(job) = rx.recv().await {
        let exchange = match job {
            Job::Write(exchange) => exchange,
            Job::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        match store.append(&exchange.session, &exchange.turns).await {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("mora_history_writes_total").increment(1);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("mora_history_dropped_total", "reason" => "write_failed")
                    .increment(1);
                tracing::error!(
                    session = %exchange.session,
                    turns = ?exchange.turns,
                    error = %e,
                    "History append failed, exchange dropped"
                );
                continue;
            }
        }

        if max_turns_per_session > 0 {
            match store.prune(&exchange.session, max_turns_per_session).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::debug!(session = %exchange.session, removed, "Pruned history")
                }
                Err(e) => {
                    tracing::warn!(session = %exchange.session, error = %e, "History prune failed")
                }
            }
        }
    }

    tracing::debug!("History writer stopped");
}
