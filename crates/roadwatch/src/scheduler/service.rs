//! Periodic driver for active sessions.
//!
//! Three independent loops share one scheduler:
//! - risk: estimate position, score the corridor ahead, broadcast
//! - heartbeat: keep idle streams alive
//! - cleanup: sweep unwatched sessions and expire gateway caches
//!
//! Each tick is also callable directly so tests can drive time explicitly.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::corridor::extract_corridor;
use crate::config::NavigationConfig;
use crate::risk::{RiskGateway, RiskQuery, WeatherFlags, summarize};
use crate::session::{RiskUpdate, Session, SessionEndReason, SessionError, SessionRegistry};
use crate::weather::WeatherError;

/// Shortest loop period; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

// ============================================================================
// Options & Reports
// ============================================================================

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub risk_interval: Duration,
    pub heartbeat_interval: Duration,
    pub cleanup_interval: Duration,
    pub session_timeout: Duration,
    pub arrival_threshold_meters: f64,
    pub look_ahead_meters: f64,
    pub max_corridor_points: usize,
    pub max_concurrent_sessions: usize,
    pub session_update_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&NavigationConfig::default())
    }
}

impl From<&NavigationConfig> for SchedulerOptions {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            risk_interval: Duration::from_secs(config.risk_interval_seconds),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_seconds),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_seconds),
            session_timeout: Duration::from_secs(config.session_timeout_seconds),
            arrival_threshold_meters: config.arrival_threshold_meters,
            look_ahead_meters: config.look_ahead_meters,
            max_corridor_points: config.max_corridor_points,
            max_concurrent_sessions: config.max_concurrent_sessions.max(1),
            session_update_timeout: Duration::from_secs(config.session_update_timeout_seconds),
        }
    }
}

/// Outcome counts for one risk tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub arrived: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Why one session's update was abandoned this tick.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("weather lookup failed: {0}")]
    Weather(#[from] WeatherError),

    #[error("session update timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Session(#[from] SessionError),
}

enum Outcome {
    Updated(u64),
    Arrived,
    Skipped,
}

// ============================================================================
// Handle
// ============================================================================

/// Running scheduler loops.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop every loop and wait for in-flight ticks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Scheduler loop panicked");
            }
        }
        info!("Session scheduler stopped");
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Clone)]
pub struct SessionScheduler {
    registry: SessionRegistry,
    gateway: RiskGateway,
    options: SchedulerOptions,
}

impl SessionScheduler {
    pub fn new(registry: SessionRegistry, gateway: RiskGateway, options: SchedulerOptions) -> Self {
        Self {
            registry,
            gateway,
            options,
        }
    }

    /// Spawn the risk, heartbeat and cleanup loops.
    pub fn start(&self) -> SchedulerHandle {
        let cancel = CancellationToken::new();

        let risk = self.clone();
        let heartbeat = self.clone();
        let cleanup = self.clone();

        let tasks = vec![
            spawn_loop("risk", self.options.risk_interval, cancel.clone(), move || {
                let scheduler = risk.clone();
                async move {
                    scheduler.tick_risk().await;
                }
            }),
            spawn_loop(
                "heartbeat",
                self.options.heartbeat_interval,
                cancel.clone(),
                move || {
                    heartbeat.tick_heartbeat();
                    async {}
                },
            ),
            spawn_loop("cleanup", self.options.cleanup_interval, cancel.clone(), move || {
                cleanup.tick_cleanup();
                async {}
            }),
        ];

        info!(
            risk_interval_seconds = self.options.risk_interval.as_secs(),
            heartbeat_interval_seconds = self.options.heartbeat_interval.as_secs(),
            cleanup_interval_seconds = self.options.cleanup_interval.as_secs(),
            "Session scheduler started"
        );

        SchedulerHandle { cancel, tasks }
    }

    // ------------------------------------------------------------------------
    // Risk
    // ------------------------------------------------------------------------

    pub async fn tick_risk(&self) -> TickReport {
        self.tick_risk_at(Utc::now()).await
    }

    /// Update every active session as of `now`.
    ///
    /// Sessions are processed concurrently up to `max_concurrent_sessions`,
    /// each bounded by `session_update_timeout`. One session failing does
    /// not affect the rest.
    pub async fn tick_risk_at(&self, now: DateTime<Utc>) -> TickReport {
        let sessions = self.registry.active_sessions();
        let mut report = TickReport::default();
        if sessions.is_empty() {
            return report;
        }

        let limit = self.options.session_update_timeout;
        let outcomes: Vec<(String, Result<Outcome, ProcessError>)> = stream::iter(sessions)
            .map(|session| async move {
                let result = match tokio::time::timeout(limit, self.process_session(&session, now))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProcessError::TimedOut(limit)),
                };
                (session.id().to_string(), result)
            })
            .buffer_unordered(self.options.max_concurrent_sessions)
            .collect()
            .await;

        for (session_id, result) in outcomes {
            match result {
                Ok(Outcome::Updated(seq)) => {
                    report.updated += 1;
                    debug!(session_id = %session_id, seq, "Risk update broadcast");
                }
                Ok(Outcome::Arrived) => report.arrived += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(session_id = %session_id, error = %e, "Failed to process session");
                }
            }
        }

        debug!(
            updated = report.updated,
            arrived = report.arrived,
            skipped = report.skipped,
            failed = report.failed,
            "Risk tick complete"
        );
        report
    }

    async fn process_session(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<Outcome, ProcessError> {
        let position = session.estimate_position(now);

        if position.remaining_distance <= self.options.arrival_threshold_meters {
            return match self
                .registry
                .stop_with_reason(session.id(), SessionEndReason::DestinationReached)
            {
                Ok(_) => Ok(Outcome::Arrived),
                // Stopped concurrently by the driver or the sweep.
                Err(SessionError::NotFound(_) | SessionError::AlreadyStopped(_)) => {
                    Ok(Outcome::Skipped)
                }
                Err(e) => Err(e.into()),
            };
        }

        let corridor = extract_corridor(
            session.route(),
            &position,
            self.options.look_ahead_meters,
            self.options.max_corridor_points,
        );

        let weather_provider = self.gateway.weather();
        let weather = try_join_all(
            corridor
                .iter()
                .map(|point| weather_provider.resolve(point.coordinate)),
        )
        .await?;

        let queries: Vec<RiskQuery> = corridor
            .iter()
            .enumerate()
            .map(|(i, point)| point.to_query(i))
            .collect();
        let risk_points = self.gateway.predict_points(&queries, &weather, now).await;

        let weights: Vec<f64> = risk_points.iter().map(|p| p.weight).collect();
        let summary = summarize(&weights, WeatherFlags::from_conditions(&weather));

        let update = RiskUpdate {
            session_id: session.id().to_string(),
            timestamp: now,
            current_position: position,
            risk_points,
            summary,
        };

        Ok(match self.registry.broadcast(session.id(), update) {
            Some(seq) => Outcome::Updated(seq),
            None => Outcome::Skipped,
        })
    }

    // ------------------------------------------------------------------------
    // Heartbeat & Cleanup
    // ------------------------------------------------------------------------

    /// Send a keep-alive to every subscriber. Returns frames delivered.
    pub fn tick_heartbeat(&self) -> usize {
        self.registry
            .active_sessions()
            .iter()
            .map(|session| self.registry.heartbeat(session.id()))
            .sum()
    }

    pub fn tick_cleanup(&self) -> usize {
        self.tick_cleanup_at(Instant::now())
    }

    /// Sweep idle sessions as of `now` and expire gateway caches.
    pub fn tick_cleanup_at(&self, now: Instant) -> usize {
        let swept = self
            .registry
            .sweep_inactive(self.options.session_timeout, now);
        self.gateway.purge_expired();

        if swept > 0 {
            info!(swept, remaining = self.registry.len(), "Swept inactive sessions");
        }
        swept
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => tick().await,
            }
        }
        debug!(task = name, "Scheduler loop exited");
    })
}
