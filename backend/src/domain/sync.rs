//! Session-state synchronization for the attendance views.
//!
//! One controller instance backs one UI session. It owns the selected
//! service date, the in-memory roster/attendance projections, and the single
//! live subscription for the selected date. The projections are a cache of
//! what the stores returned, never a source of truth: a live delivery
//! replaces the current-date set wholesale, and local optimistic updates go
//! through the same keyed-replace reducer so the last writer wins either way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use shared::{AttendanceRecord, Child, ClassSummary};
use tracing::{info, warn};

use crate::domain::classifier;
use crate::domain::{AttendanceService, RosterService};
use crate::storage::json::JsonConnection;
use crate::storage::traits::SubscriptionHandle;

/// How long a transient error message stays before it is auto-dismissed
const ERROR_DISMISS_AFTER: Duration = Duration::from_secs(5);

#[derive(Default)]
struct SessionState {
    selected_date: Option<NaiveDate>,
    roster: Vec<Child>,
    current_date_attendance: Vec<AttendanceRecord>,
    all_attendance: Vec<AttendanceRecord>,
    last_error: Option<String>,
}

/// Synchronization controller: the state machine between the stores and a
/// presentation layer.
pub struct SyncController {
    roster_service: RosterService,
    attendance_service: AttendanceService,
    state: Arc<Mutex<SessionState>>,
    live_subscription: Mutex<Option<SubscriptionHandle>>,
    error_epoch: Arc<AtomicU64>,
}

impl SyncController {
    /// Create a controller over a document store connection
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self {
            roster_service: RosterService::new(Arc::clone(&connection)),
            attendance_service: AttendanceService::new(connection),
            state: Arc::new(Mutex::new(SessionState::default())),
            live_subscription: Mutex::new(None),
            error_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Select a service date: tear down the previous live subscription,
    /// fetch roster, the date's present-set, and the full history
    /// concurrently, then install a fresh subscription for the date.
    ///
    /// On a fetch failure the previous projections stay untouched, a
    /// transient error is raised, and no subscription is installed.
    pub async fn select_date(&self, date: NaiveDate) {
        info!("Selecting service date {date}");

        // Cancel-before-replace: exactly one prior subscription is torn down
        if let Some(previous) = self.live_subscription.lock().unwrap().take() {
            previous.unsubscribe();
        }
        self.state.lock().unwrap().selected_date = Some(date);

        let fetched = tokio::try_join!(
            self.roster_service.list_children(),
            self.attendance_service.get_by_date(date),
            self.attendance_service.get_all(),
        );

        let (roster, current, all) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                self.set_error(format!("Failed to load data: {e}"));
                return;
            }
        };

        {
            let mut state = self.state.lock().unwrap();
            state.roster = roster;
            state.current_date_attendance = current;
            state.all_attendance = all;
        }

        let state = Arc::clone(&self.state);
        let handle = self.attendance_service.subscribe_by_date(date, move |records| {
            let mut state = state.lock().unwrap();
            // A delivery for a date the session has moved away from is stale
            if state.selected_date == Some(date) {
                state.current_date_attendance = records;
            }
        });

        // Under rapid reselection another call may have installed its own
        // subscription while we were fetching; it loses
        if let Some(raced) = self.live_subscription.lock().unwrap().replace(handle) {
            raced.unsubscribe();
        }
    }

    /// Re-fetch roster and both attendance projections for the selected
    /// date, keeping the live subscription as is
    pub async fn refresh(&self) {
        let Some(date) = self.selected_date() else {
            return;
        };

        let fetched = tokio::try_join!(
            self.roster_service.list_children(),
            self.attendance_service.get_by_date(date),
            self.attendance_service.get_all(),
        );

        match fetched {
            Ok((roster, current, all)) => {
                let mut state = self.state.lock().unwrap();
                state.roster = roster;
                state.current_date_attendance = current;
                state.all_attendance = all;
            }
            Err(e) => self.set_error(format!("Failed to load data: {e}")),
        }
    }

    /// Mark a child present or absent on the selected date and fold the
    /// outcome into the local projections immediately, without waiting for
    /// the live subscription to confirm.
    pub async fn toggle_attendance(&self, child_id: &str, present: bool) {
        let Some(date) = self.selected_date() else {
            warn!("Ignoring attendance toggle with no selected date");
            return;
        };

        match self.attendance_service.mark_attendance(child_id, date, present).await {
            Ok(outcome) => {
                let mut state = self.state.lock().unwrap();
                apply_mark(&mut state.current_date_attendance, child_id, date, outcome.as_ref());
                apply_mark(&mut state.all_attendance, child_id, date, outcome.as_ref());
            }
            Err(e) => self.set_error(format!("Failed to mark attendance: {e}")),
        }
    }

    /// Whether the child is present on the selected date, per the
    /// current-date projection
    pub fn is_present(&self, child_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        match state.selected_date {
            Some(date) => state
                .current_date_attendance
                .iter()
                .any(|r| r.child_id == child_id && r.date == date && r.present),
            None => false,
        }
    }

    /// Per-class dashboard counts for the selected date
    pub fn class_summary(&self) -> Vec<ClassSummary> {
        let state = self.state.lock().unwrap();
        class_summaries(&state.roster, &state.current_date_attendance)
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.state.lock().unwrap().selected_date
    }

    pub fn roster(&self) -> Vec<Child> {
        self.state.lock().unwrap().roster.clone()
    }

    pub fn current_date_attendance(&self) -> Vec<AttendanceRecord> {
        self.state.lock().unwrap().current_date_attendance.clone()
    }

    pub fn all_attendance(&self) -> Vec<AttendanceRecord> {
        self.state.lock().unwrap().all_attendance.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    /// Raise a transient, auto-dismissing error. A newer error restarts the
    /// dismissal clock.
    fn set_error(&self, message: String) {
        warn!("{message}");
        let epoch = self.error_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.lock().unwrap().last_error = Some(message);

        let state = Arc::clone(&self.state);
        let error_epoch = Arc::clone(&self.error_epoch);
        tokio::spawn(async move {
            tokio::time::sleep(ERROR_DISMISS_AFTER).await;
            if error_epoch.load(Ordering::SeqCst) == epoch {
                state.lock().unwrap().last_error = None;
            }
        });
    }
}

/// Keyed replace over `(child_id, date)`: any existing record for the key is
/// dropped and the outcome, if any, takes its place. Both optimistic local
/// updates and live-feed deliveries funnel through this, so whichever writes
/// last wins.
pub fn apply_mark(
    records: &mut Vec<AttendanceRecord>,
    child_id: &str,
    date: NaiveDate,
    outcome: Option<&AttendanceRecord>,
) {
    records.retain(|r| !(r.child_id == child_id && r.date == date));
    if let Some(record) = outcome {
        records.push(record.clone());
    }
}

/// Per-class present/total counts over a roster and a date's present-set.
/// Children whose (possibly explicit) class matches no configured group are
/// not counted under any group.
pub fn class_summaries(roster: &[Child], current: &[AttendanceRecord]) -> Vec<ClassSummary> {
    classifier::class_groups()
        .into_iter()
        .map(|group| {
            let members: Vec<&Child> = roster
                .iter()
                .filter(|child| classifier::classify(child.birth_date, child.explicit_class()) == group.name)
                .collect();
            let present = members
                .iter()
                .filter(|child| current.iter().any(|r| r.child_id == child.id && r.present))
                .count();
            let total = members.len();

            ClassSummary {
                name: group.name.to_string(),
                ages: group.ages.to_string(),
                present,
                total,
                percentage: if total > 0 {
                    ((present as f64 / total as f64) * 100.0).round() as u32
                } else {
                    0
                },
            }
        })
        .collect()
}
