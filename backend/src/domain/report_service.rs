use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use shared::{AttendanceReport, AttendanceReportEntry, Child, ChildAttendanceSummary};
use tracing::info;

use crate::domain::classifier;
use crate::error::AppError;
use crate::storage::json::{AttendanceRepository, ChildRepository, JsonConnection};
use crate::storage::traits::{AttendanceStorage, ChildStorage};

/// Service producing attendance reports: records joined with the roster,
/// per-child totals, and a global percentage.
#[derive(Clone)]
pub struct ReportService {
    child_repository: ChildRepository,
    attendance_repository: AttendanceRepository,
}

impl ReportService {
    /// Create a new ReportService
    pub fn new(connection: Arc<JsonConnection>) -> Self {
        Self {
            child_repository: ChildRepository::new(Arc::clone(&connection)),
            attendance_repository: AttendanceRepository::new(connection),
        }
    }

    /// Build a report over the stored records, optionally restricted to a
    /// date range and/or one child. Records whose child is no longer on the
    /// roster are left out of the join.
    pub async fn attendance_report(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        child_id: Option<&str>,
    ) -> Result<AttendanceReport, AppError> {
        info!(
            "Generating attendance report (start={start_date:?}, end={end_date:?}, child={child_id:?})"
        );

        let records = match child_id {
            Some(child_id) => self.attendance_repository.get_by_child(child_id).await?,
            None => self.attendance_repository.get_all().await?,
        };

        let children: HashMap<String, Child> = self
            .child_repository
            .list_children()
            .await?
            .into_iter()
            .map(|child| (child.id.clone(), child))
            .collect();

        let mut entries = Vec::new();
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, (u32, u32)> = HashMap::new();

        for record in records {
            if let Some(start) = start_date {
                if record.date < start {
                    continue;
                }
            }
            if let Some(end) = end_date {
                if record.date > end {
                    continue;
                }
            }

            let Some(child) = children.get(&record.child_id) else {
                continue;
            };

            entries.push(AttendanceReportEntry {
                child_id: record.child_id.clone(),
                child_name: child.name.clone(),
                child_age: child.birth_date.map(classifier::age),
                date: record.date,
                present: record.present,
                marked_at: record.marked_at,
            });

            let (total, present) = totals.entry(record.child_id.clone()).or_insert_with(|| {
                order.push(record.child_id.clone());
                (0, 0)
            });
            *total += 1;
            if record.present {
                *present += 1;
            }
        }

        let summary: Vec<ChildAttendanceSummary> = order
            .iter()
            .map(|child_id| {
                let (total, present) = totals[child_id];
                ChildAttendanceSummary {
                    child: children[child_id].clone(),
                    total_services: total,
                    present_count: present,
                    absent_count: total - present,
                    attendance_percentage: percentage(present, total),
                }
            })
            .collect();

        let total_records = entries.len();
        let present_records = entries.iter().filter(|e| e.present).count();

        Ok(AttendanceReport {
            entries,
            summary,
            total_records,
            overall_percentage: percentage(present_records as u32, total_records as u32),
        })
    }
}

fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        0
    } else {
        ((part as f64 / whole as f64) * 100.0).round() as u32
    }
}
