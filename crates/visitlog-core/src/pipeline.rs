use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::aggregate::{compute_snapshot, AggregateOptions};
use crate::analytics::{AnalyticsSnapshot, EventQuery, EventStore};
use crate::buffer::EventBuffer;
use crate::config::PipelineConfig;
use crate::event::{PageView, RequestInfo};
use crate::session::SessionTracker;
use crate::visitor::{classify, extract_utm, fingerprint, is_bot, should_exclude};

/// What [`Pipeline::track`] decided about an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedVisit {
    pub visitor_id: String,
    pub is_new_visit: bool,
}

/// The request-analytics pipeline: classifier → session tracker → buffer →
/// store, plus the snapshot read path.
///
/// Built once by the host with [`Pipeline::start`] and shared as an
/// `Arc<Pipeline>`. Background tasks (flush worker, flush ticker, session
/// sweep) run until [`Pipeline::shutdown`].
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn EventStore>,
    sessions: Arc<SessionTracker>,
    buffer: Arc<EventBuffer>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Construct the pipeline and spawn its background tasks. Must be called
    /// from within a tokio runtime.
    pub fn start(config: PipelineConfig, store: Arc<dyn EventStore>) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sessions = Arc::new(SessionTracker::new(config.session_window));
        let (buffer, worker) = EventBuffer::start(
            config.batch_size,
            config.flush_interval,
            Arc::clone(&store),
            shutdown_rx.clone(),
        );
        let sweeper = tokio::spawn(run_session_sweep(Arc::clone(&sessions), shutdown_rx));

        info!(
            batch_size = config.batch_size,
            flush_interval_secs = config.flush_interval.as_secs(),
            session_window_secs = config.session_window.as_secs(),
            "Analytics pipeline started"
        );

        Arc::new(Self {
            config,
            store,
            sessions,
            buffer,
            shutdown_tx,
            tasks: Mutex::new(vec![worker, sweeper]),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    /// Turn one completed request into a page view and enqueue it.
    ///
    /// Excluded paths and bot user agents are dropped before anything is
    /// built. Returns `None` for dropped requests.
    pub async fn track(&self, request: RequestInfo) -> Option<TrackedVisit> {
        if should_exclude(&request.path) || is_bot(&request.user_agent) {
            return None;
        }

        let visitor_id = fingerprint(&request.client_ip, &request.user_agent);
        let ua = classify(&request.user_agent);
        let utm = extract_utm(&request.query);
        let is_new_visit = self.sessions.is_new_visit(&visitor_id).await;

        let tracked = TrackedVisit {
            visitor_id: visitor_id.clone(),
            is_new_visit,
        };
        let event = PageView {
            id: uuid::Uuid::new_v4().to_string(),
            path: request.path,
            method: request.method,
            client_ip: request.client_ip,
            user_agent: request.user_agent,
            referrer: request.referrer,
            duration_ms: request.duration_ms,
            timestamp: Utc::now(),
            visitor_id,
            device_type: ua.device_type,
            browser: ua.browser.to_string(),
            os: ua.os.to_string(),
            country: String::new(),
            utm_source: utm.source,
            utm_medium: utm.medium,
            utm_campaign: utm.campaign,
            is_new_visit,
            query: request.query,
        };

        self.buffer.enqueue(event).await;
        Some(tracked)
    }

    /// Manual flush trigger. Returns `false` when there was nothing to flush.
    pub async fn force_flush(&self) -> bool {
        self.buffer.force_flush().await
    }

    /// Compute usage statistics from the store.
    ///
    /// Forces a flush first and waits up to `flush_grace` for it, then reads
    /// regardless. Store failures yield the all-zero snapshot.
    pub async fn snapshot(&self) -> AnalyticsSnapshot {
        if !self.buffer.flush_and_wait(self.config.flush_grace).await {
            debug!(
                grace_ms = self.config.flush_grace.as_millis() as u64,
                "Flush not confirmed before snapshot, reading anyway"
            );
        }

        let now = Utc::now();
        let query = EventQuery {
            since: now
                .checked_sub_signed(self.config.lookback)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            limit: self.config.max_rows,
        };

        let events = match self.store.recent_events(&query).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "Snapshot query failed, serving empty snapshot");
                return AnalyticsSnapshot::default();
            }
        };
        let total = match self.store.count_events().await {
            Ok(total) => total,
            Err(e) => {
                error!(error = %e, "Event count failed, serving empty snapshot");
                return AnalyticsSnapshot::default();
            }
        };

        compute_snapshot(
            &events,
            total,
            now,
            &AggregateOptions {
                timezone: self.config.timezone,
                max_hourly_visits: self.config.max_hourly_visits,
            },
        )
    }

    /// Stop background tasks. The flush worker writes whatever is still
    /// buffered before it exits.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Pipeline task ended abnormally");
            }
        }
        info!("Analytics pipeline stopped");
    }
}

/// Background loop: drop expired session entries every session window.
async fn run_session_sweep(sessions: Arc<SessionTracker>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(sessions.window());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let removed = sessions.sweep().await;
                if removed > 0 {
                    debug!(removed, "Expired sessions swept");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
