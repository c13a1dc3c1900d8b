//! A single monitored trip.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::frames::RiskUpdate;
use super::subscriber::{FrameSink, SubscriberId};
use super::types::{PositionEstimate, SessionMetadata, SessionStatus};
use crate::geo::RoutePath;

pub(super) struct Subscriber {
    pub id: SubscriberId,
    pub sink: FrameSink,
    pub connected_at: DateTime<Utc>,
}

/// Mutable part of a session, guarded by the session's own lock.
///
/// The lock is never held across an `.await`.
pub(super) struct SessionState {
    pub status: SessionStatus,
    pub subscribers: Vec<Subscriber>,
    pub last_event_seq: u64,
    pub last_activity_at: Instant,
    pub current_distance_from_start: f64,
    /// Most recent risk updates, oldest first, for stream resumption.
    pub replay: VecDeque<(u64, Arc<RiskUpdate>)>,
}

/// An active driving trip.
pub struct Session {
    id: String,
    user_id: String,
    route: RoutePath,
    start_time: DateTime<Utc>,
    speed_hint_kmh: f64,
    estimated_duration_seconds: u64,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    pub(super) fn new(
        id: String,
        user_id: String,
        route: RoutePath,
        start_time: DateTime<Utc>,
        speed_hint_kmh: f64,
    ) -> Self {
        let estimated_duration_seconds =
            (route.total_distance() / 1000.0 / speed_hint_kmh * 3600.0).round() as u64;

        Self {
            id,
            user_id,
            route,
            start_time,
            speed_hint_kmh,
            estimated_duration_seconds,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                status: SessionStatus::Active,
                subscribers: Vec::new(),
                last_event_seq: 0,
                last_activity_at: Instant::now(),
                current_distance_from_start: 0.0,
                replay: VecDeque::new(),
            }),
        }
    }

    pub(super) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn route(&self) -> &RoutePath {
        &self.route
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn speed_hint_kmh(&self) -> f64 {
        self.speed_hint_kmh
    }

    pub fn total_distance_meters(&self) -> u64 {
        self.route.total_distance().round() as u64
    }

    pub fn estimated_duration_seconds(&self) -> u64 {
        self.estimated_duration_seconds
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_state().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    pub fn last_event_seq(&self) -> u64 {
        self.lock_state().last_event_seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscribers.len()
    }

    /// Whole seconds since the driver started, never negative.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        let millis = (now - self.start_time).num_milliseconds().max(0);
        (millis as f64 / 1000.0).round() as u64
    }

    /// Estimate the driver's position at `now` assuming constant speed.
    ///
    /// Records the travelled distance as the session's current progress.
    pub fn estimate_position(&self, now: DateTime<Utc>) -> PositionEstimate {
        let elapsed = (now - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        let total = self.route.total_distance();
        let traveled = (self.speed_hint_kmh / 3.6 * elapsed).clamp(0.0, total);

        let (coordinate, segment_index) = self.route.interpolate(traveled);
        let remaining_distance = self.route.remaining_distance(coordinate, segment_index);

        self.lock_state().current_distance_from_start = traveled;

        PositionEstimate {
            coordinate,
            distance_from_start: traveled,
            remaining_distance,
            segment_index,
        }
    }

    pub fn metadata(&self) -> SessionMetadata {
        let state = self.lock_state();
        SessionMetadata {
            session_id: self.id.clone(),
            user_id: self.user_id.clone(),
            status: state.status,
            start_time: self.start_time,
            created_at: self.created_at,
            speed_hint_kmh: self.speed_hint_kmh,
            total_distance_meters: self.total_distance_meters(),
            estimated_duration_seconds: self.estimated_duration_seconds,
            current_distance_from_start: state.current_distance_from_start,
            last_event_seq: state.last_event_seq,
            subscriber_count: state.subscribers.len(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("start_time", &self.start_time)
            .field("speed_hint_kmh", &self.speed_hint_kmh)
            .finish_non_exhaustive()
    }
}
