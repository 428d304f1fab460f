use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A child on the roster.
///
/// `class` is an explicit class override; when it is `None` (or blank) the
/// class is derived from `birth_date` at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    /// Child ID in format: "child::<uuid>"
    pub id: String,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    pub medical_notes: Option<String>,
    /// URL of the uploaded photo, served from the photo store
    pub photo_url: Option<String>,
    /// Explicit class assignment overriding the age-derived class
    pub class: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Child {
    /// Generate a unique ID for a child
    pub fn generate_id() -> String {
        format!("child::{}", Uuid::new_v4().simple())
    }

    /// The explicit class override, if one is set and non-blank
    pub fn explicit_class(&self) -> Option<&str> {
        self.class
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// A single attendance record. The logical key is `(child_id, date)`:
/// at most one record exists per child per date, and only present-marked
/// children have a stored record at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub child_id: String,
    pub date: NaiveDate,
    pub present: bool,
    pub marked_at: DateTime<Utc>,
}

/// Request to add a child to the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    pub birth_date: NaiveDate,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    pub medical_notes: Option<String>,
    pub photo_url: Option<String>,
    pub class: Option<String>,
}

/// Partial update of a child; only provided fields are merged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateChildRequest {
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    pub medical_notes: Option<String>,
    pub photo_url: Option<String>,
    pub class: Option<String>,
}

/// Request to mark a child present or absent on a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkAttendanceRequest {
    pub child_id: String,
    pub date: NaiveDate,
    pub present: bool,
}

/// Bulk replace of a date's attendance: every existing record for `date` is
/// removed and `child_ids` becomes the new present-set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAttendanceRequest {
    pub date: NaiveDate,
    pub child_ids: Vec<String>,
}

/// Per-class attendance counts for the dashboard on a given date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub name: String,
    /// Display label for the class age range, e.g. "6-7 Years"
    pub ages: String,
    pub present: usize,
    pub total: usize,
    pub percentage: u32,
}

/// One attendance record joined with its child for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReportEntry {
    pub child_id: String,
    pub child_name: String,
    pub child_age: Option<i32>,
    pub date: NaiveDate,
    pub present: bool,
    pub marked_at: DateTime<Utc>,
}

/// Per-child attendance totals over the reported records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildAttendanceSummary {
    pub child: Child,
    pub total_services: u32,
    pub present_count: u32,
    pub absent_count: u32,
    pub attendance_percentage: u32,
}

/// Attendance report: joined entries plus per-child and global totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub entries: Vec<AttendanceReportEntry>,
    pub summary: Vec<ChildAttendanceSummary>,
    pub total_records: usize,
    pub overall_percentage: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_child_id() {
        let id = Child::generate_id();
        assert!(id.starts_with("child::"));
        assert_ne!(id, Child::generate_id());
    }

    #[test]
    fn test_explicit_class_blank_is_none() {
        let mut child = Child {
            id: Child::generate_id(),
            name: "Test".to_string(),
            birth_date: None,
            address: None,
            parent_name: None,
            parent_phone: None,
            parent_email: None,
            medical_notes: None,
            photo_url: None,
            class: Some("   ".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(child.explicit_class(), None);

        child.class = Some(" Cupbearers ".to_string());
        assert_eq!(child.explicit_class(), Some("Cupbearers"));
    }
}
