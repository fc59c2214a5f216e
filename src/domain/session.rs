//! Linking session domain model and state machine
//!
//! A session is one linking run, persisted as a single row that the CLI and
//! external dashboards poll. Status transitions are a small state machine
//! enforced before every write; progress is phase-weighted so the bar moves
//! sensibly even though phases differ wildly in duration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a linking session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "Running",
            SessionStatus::Paused => "Paused",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
        }
    }

    /// Legal transitions: Running may pause or terminate, Paused may only
    /// resume. Terminal states accept nothing.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (
                SessionStatus::Running,
                SessionStatus::Paused | SessionStatus::Completed | SessionStatus::Failed
            ) | (SessionStatus::Paused, SessionStatus::Running)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<sqlx::Sqlite> for SessionStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for SessionStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for SessionStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        match s.as_str() {
            "Running" => Ok(SessionStatus::Running),
            "Paused" => Ok(SessionStatus::Paused),
            "Completed" => Ok(SessionStatus::Completed),
            "Failed" => Ok(SessionStatus::Failed),
            _ => Err(format!("Invalid SessionStatus: {s}").into()),
        }
    }
}

/// Pipeline phase a running session is currently in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkingPhase {
    Initializing,
    LoadingProducts,
    LoadingExistingLinks,
    Scanning,
    Matching,
    Finalizing,
    Completed,
    Failed,
}

impl LinkingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkingPhase::Initializing => "Initializing",
            LinkingPhase::LoadingProducts => "LoadingProducts",
            LinkingPhase::LoadingExistingLinks => "LoadingExistingLinks",
            LinkingPhase::Scanning => "Scanning",
            LinkingPhase::Matching => "Matching",
            LinkingPhase::Finalizing => "Finalizing",
            LinkingPhase::Completed => "Completed",
            LinkingPhase::Failed => "Failed",
        }
    }

    /// Overall-progress band this phase occupies. The jump from 20 to 25
    /// covers the in-memory index build between scanning and matching.
    pub fn progress_band(&self) -> (f64, f64) {
        match self {
            LinkingPhase::Initializing => (0.0, 2.0),
            LinkingPhase::LoadingProducts => (2.0, 5.0),
            LinkingPhase::LoadingExistingLinks => (5.0, 10.0),
            LinkingPhase::Scanning => (10.0, 20.0),
            LinkingPhase::Matching => (25.0, 90.0),
            LinkingPhase::Finalizing => (90.0, 100.0),
            LinkingPhase::Completed => (100.0, 100.0),
            LinkingPhase::Failed => (0.0, 100.0),
        }
    }

    /// Map completion within this phase onto the overall progress scale.
    pub fn weighted_progress(&self, done: u64, total: u64) -> f64 {
        let (lo, hi) = self.progress_band();
        if total == 0 {
            return lo;
        }
        let ratio = (done as f64 / total as f64).clamp(0.0, 1.0);
        lo + (hi - lo) * ratio
    }
}

impl fmt::Display for LinkingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Type<sqlx::Sqlite> for LinkingPhase {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for LinkingPhase {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for LinkingPhase {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        match s.as_str() {
            "Initializing" => Ok(LinkingPhase::Initializing),
            "LoadingProducts" => Ok(LinkingPhase::LoadingProducts),
            "LoadingExistingLinks" => Ok(LinkingPhase::LoadingExistingLinks),
            "Scanning" => Ok(LinkingPhase::Scanning),
            "Matching" => Ok(LinkingPhase::Matching),
            "Finalizing" => Ok(LinkingPhase::Finalizing),
            "Completed" => Ok(LinkingPhase::Completed),
            "Failed" => Ok(LinkingPhase::Failed),
            _ => Err(format!("Invalid LinkingPhase: {s}").into()),
        }
    }
}

/// How a linking run treats existing data
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkingMode {
    /// Incremental: skip anything already linked.
    #[default]
    Standard,
    /// Delete auto-matched links first, then relink from scratch.
    Refresh,
    /// Full scan and classification with zero writes.
    Audit,
    /// Continue a paused session from its scan cursor.
    Resume,
}

impl LinkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkingMode::Standard => "standard",
            LinkingMode::Refresh => "refresh",
            LinkingMode::Audit => "audit",
            LinkingMode::Resume => "resume",
        }
    }

    /// Audit runs classify but never write links or candidates.
    pub fn is_dry_run(&self) -> bool {
        matches!(self, LinkingMode::Audit)
    }
}

impl fmt::Display for LinkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LinkingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(LinkingMode::Standard),
            "refresh" => Ok(LinkingMode::Refresh),
            "audit" => Ok(LinkingMode::Audit),
            "resume" => Ok(LinkingMode::Resume),
            _ => Err(format!("Invalid LinkingMode: {s}")),
        }
    }
}

impl Type<sqlx::Sqlite> for LinkingMode {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for LinkingMode {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for LinkingMode {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

/// Persisted state of one linking run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingSession {
    pub id: String,
    pub status: SessionStatus,
    pub phase: LinkingPhase,
    pub mode: LinkingMode,
    /// Overall progress, 0.0 to 100.0, phase-weighted.
    pub progress: f64,
    pub current_batch: u32,
    pub total_batches: u32,
    pub images_scanned: u32,
    pub links_created: u32,
    pub candidates_created: u32,
    pub images_skipped: u32,
    pub errors_count: u32,
    pub exact_matches: u32,
    pub normalized_matches: u32,
    pub padded_matches: u32,
    /// Files classified per second during the matching phase.
    pub processing_rate: f64,
    pub eta_seconds: Option<i64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub options_snapshot: serde_json::Value,
    /// Index of the last fully processed file in the order-stable scan
    /// listing; set when pausing so a resume can re-enter mid-run.
    pub scan_cursor: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl LinkingSession {
    /// Fresh session in Running/Initializing with a v4 id.
    pub fn new(mode: LinkingMode, options_snapshot: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Running,
            phase: LinkingPhase::Initializing,
            mode,
            progress: 0.0,
            current_batch: 0,
            total_batches: 0,
            images_scanned: 0,
            links_created: 0,
            candidates_created: 0,
            images_skipped: 0,
            errors_count: 0,
            exact_matches: 0,
            normalized_matches: 0,
            padded_matches: 0,
            processing_rate: 0.0,
            eta_seconds: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            options_snapshot,
            scan_cursor: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            duration_seconds: None,
        }
    }

    /// Enter a phase, snapping progress to the start of its band.
    pub fn enter_phase(&mut self, phase: LinkingPhase) {
        self.phase = phase;
        self.progress = self.progress.max(phase.progress_band().0);
        self.updated_at = Utc::now();
    }

    /// Recompute rate, ETA and weighted progress from matching-phase counts.
    /// Linear extrapolation over elapsed wall time, same as a download bar.
    pub fn update_matching_progress(&mut self, processed: u64, total: u64) {
        let now = Utc::now();
        self.progress = LinkingPhase::Matching.weighted_progress(processed, total);

        let elapsed = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 && processed > 0 {
            self.processing_rate = processed as f64 / elapsed;
            let remaining = total.saturating_sub(processed);
            self.eta_seconds = Some((remaining as f64 / self.processing_rate).ceil() as i64);
        }
        self.updated_at = now;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors_count += 1;
        self.errors.push(message.into());
        self.updated_at = Utc::now();
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
        self.updated_at = Utc::now();
    }

    /// Stamp a terminal status with completion time and total duration.
    pub fn finish(&mut self, status: SessionStatus) {
        let now = Utc::now();
        self.status = status;
        self.phase = match status {
            SessionStatus::Failed => LinkingPhase::Failed,
            _ => LinkingPhase::Completed,
        };
        if status == SessionStatus::Completed {
            self.progress = 100.0;
        }
        self.completed_at = Some(now);
        self.duration_seconds = Some((now - self.started_at).num_seconds());
        self.updated_at = now;
    }

    pub fn bump_match_counter(&mut self, match_type: crate::domain::sku_index::MatchType) {
        use crate::domain::sku_index::MatchType;
        match match_type {
            MatchType::Exact => self.exact_matches += 1,
            MatchType::Normalized => self.normalized_matches += 1,
            MatchType::Padded => self.padded_matches += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_can_pause_complete_or_fail() {
        assert!(SessionStatus::Running.can_transition_to(SessionStatus::Paused));
        assert!(SessionStatus::Running.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::Running.can_transition_to(SessionStatus::Failed));
        assert!(!SessionStatus::Running.can_transition_to(SessionStatus::Running));
    }

    #[test]
    fn paused_can_only_resume() {
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Running));
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Failed));
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Paused));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [SessionStatus::Completed, SessionStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                SessionStatus::Running,
                SessionStatus::Paused,
                SessionStatus::Completed,
                SessionStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn phase_bands_are_monotonic() {
        let phases = [
            LinkingPhase::Initializing,
            LinkingPhase::LoadingProducts,
            LinkingPhase::LoadingExistingLinks,
            LinkingPhase::Scanning,
            LinkingPhase::Matching,
            LinkingPhase::Finalizing,
            LinkingPhase::Completed,
        ];
        for pair in phases.windows(2) {
            assert!(pair[0].progress_band().1 <= pair[1].progress_band().0);
        }
    }

    #[test]
    fn weighted_progress_stays_inside_the_band() {
        let phase = LinkingPhase::Matching;
        assert_eq!(phase.weighted_progress(0, 100), 25.0);
        assert_eq!(phase.weighted_progress(100, 100), 90.0);
        assert_eq!(phase.weighted_progress(50, 100), 57.5);
        // Empty phase pins to the band start rather than dividing by zero.
        assert_eq!(phase.weighted_progress(0, 0), 25.0);
    }

    #[test]
    fn enter_phase_never_moves_progress_backwards() {
        let mut session = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        session.enter_phase(LinkingPhase::Matching);
        session.progress = 60.0;
        session.enter_phase(LinkingPhase::Finalizing);
        assert_eq!(session.progress, 90.0);
    }

    #[test]
    fn finish_stamps_completion_fields() {
        let mut session = LinkingSession::new(LinkingMode::Standard, serde_json::json!({}));
        session.finish(SessionStatus::Completed);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.phase, LinkingPhase::Completed);
        assert_eq!(session.progress, 100.0);
        assert!(session.completed_at.is_some());
        assert!(session.duration_seconds.is_some());
    }

    #[test]
    fn mode_round_trips_through_strings() {
        for mode in [
            LinkingMode::Standard,
            LinkingMode::Refresh,
            LinkingMode::Audit,
            LinkingMode::Resume,
        ] {
            assert_eq!(mode.as_str().parse::<LinkingMode>().unwrap(), mode);
        }
        assert!("turbo".parse::<LinkingMode>().is_err());
        assert!(LinkingMode::Audit.is_dry_run());
        assert!(!LinkingMode::Standard.is_dry_run());
    }
}
