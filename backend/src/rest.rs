use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use shared::{
    AttendanceRecord, AttendanceReport, BulkAttendanceRequest, Child, ClassSummary,
    CreateChildRequest, MarkAttendanceRequest, UpdateChildRequest,
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::domain::{sync, AttendanceService, ReportService, RosterService};
use crate::error::AppError;
use crate::storage::json::JsonConnection;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub roster_service: RosterService,
    pub attendance_service: AttendanceService,
    pub report_service: ReportService,
}

impl AppState {
    /// Create application state over a document store connection
    pub fn new(connection: &Arc<JsonConnection>) -> Self {
        Self {
            roster_service: RosterService::new(Arc::clone(connection)),
            attendance_service: AttendanceService::new(Arc::clone(connection)),
            report_service: ReportService::new(Arc::clone(connection)),
        }
    }
}

/// The `/api` routes
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/children", get(list_children).post(create_child))
        .route(
            "/children/:id",
            get(get_child).put(update_child).delete(delete_child),
        )
        .route("/children/:id/photo", post(upload_child_photo))
        .route("/children/:id/attendance", get(child_attendance))
        .route("/attendance", get(list_attendance))
        .route("/attendance/mark", post(mark_attendance))
        .route("/attendance/bulk", post(bulk_attendance))
        .route("/attendance/:date/events", get(attendance_events))
        .route("/reports/attendance", get(attendance_report))
        .route("/dashboard", get(class_dashboard))
}

/// Handler for GET /api/children
async fn list_children(State(state): State<AppState>) -> Result<Json<Vec<Child>>, AppError> {
    info!("GET /api/children");
    state.roster_service.list_children().await.map(Json)
}

/// Handler for POST /api/children
async fn create_child(
    State(state): State<AppState>,
    Json(request): Json<CreateChildRequest>,
) -> Result<(StatusCode, Json<Child>), AppError> {
    info!("POST /api/children - name: {}", request.name);
    let child = state.roster_service.create_child(request).await?;
    Ok((StatusCode::CREATED, Json(child)))
}

/// Handler for GET /api/children/:id
async fn get_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Child>, AppError> {
    info!("GET /api/children/{id}");
    state
        .roster_service
        .get_child(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Child not found: {id}")))
}

/// Handler for PUT /api/children/:id
async fn update_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateChildRequest>,
) -> Result<Json<Child>, AppError> {
    info!("PUT /api/children/{id}");
    state.roster_service.update_child(&id, request).await.map(Json)
}

/// Handler for DELETE /api/children/:id
async fn delete_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!("DELETE /api/children/{id}");
    let child = state.roster_service.delete_child(&id).await?;
    Ok(Json(json!({
        "message": format!("Child '{}' deleted successfully", child.name)
    })))
}

/// Handler for POST /api/children/:id/photo (multipart)
async fn upload_child_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Child>, AppError> {
    info!("POST /api/children/{id}/photo");

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        if field.name() == Some("photo") {
            let file_name = field.file_name().unwrap_or("photo").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;
            upload = Some((file_name, bytes.to_vec()));
        }
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing photo field".to_string()))?;
    state
        .roster_service
        .upload_photo(&id, &file_name, &bytes)
        .await
        .map(Json)
}

/// Handler for GET /api/children/:id/attendance
async fn child_attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    info!("GET /api/children/{id}/attendance");
    state.attendance_service.get_by_child(&id).await.map(Json)
}

/// Query parameters for the attendance list endpoint
#[derive(Deserialize, Debug)]
struct AttendanceQuery {
    date: Option<NaiveDate>,
    child_id: Option<String>,
}

/// Handler for GET /api/attendance
async fn list_attendance(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    info!("GET /api/attendance - query: {query:?}");

    let records = match (query.date, query.child_id) {
        (Some(date), Some(child_id)) => {
            let mut records = state.attendance_service.get_by_date(date).await?;
            records.retain(|r| r.child_id == child_id);
            records
        }
        (Some(date), None) => state.attendance_service.get_by_date(date).await?,
        (None, Some(child_id)) => state.attendance_service.get_by_child(&child_id).await?,
        (None, None) => state.attendance_service.get_all().await?,
    };

    Ok(Json(records))
}

/// Handler for POST /api/attendance/mark
async fn mark_attendance(
    State(state): State<AppState>,
    Json(request): Json<MarkAttendanceRequest>,
) -> Result<Json<Option<AttendanceRecord>>, AppError> {
    info!(
        "POST /api/attendance/mark - child: {}, date: {}, present: {}",
        request.child_id, request.date, request.present
    );
    state
        .attendance_service
        .mark_attendance(&request.child_id, request.date, request.present)
        .await
        .map(Json)
}

/// Handler for POST /api/attendance/bulk
async fn bulk_attendance(
    State(state): State<AppState>,
    Json(request): Json<BulkAttendanceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(
        "POST /api/attendance/bulk - date: {}, children: {}",
        request.date,
        request.child_ids.len()
    );
    state
        .attendance_service
        .replace_date(request.date, &request.child_ids)
        .await?;
    Ok(Json(json!({ "message": "Bulk attendance updated successfully" })))
}

/// Handler for GET /api/attendance/:date/events: SSE feed delivering the
/// full present-set for the date on every change
async fn attendance_events(
    State(state): State<AppState>,
    Path(date): Path<NaiveDate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("GET /api/attendance/{date}/events - live feed connected");

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = state.attendance_service.subscribe_by_date(date, move |records| {
        let _ = tx.send(records);
    });

    let stream = UnboundedReceiverStream::new(rx).filter_map(move |records| {
        // The subscription lives exactly as long as the stream
        let _feed = &handle;
        Event::default()
            .event("attendance")
            .json_data(&records)
            .ok()
            .map(Ok)
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

/// Query parameters for the report endpoint
#[derive(Deserialize, Debug)]
struct ReportQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    child_id: Option<String>,
}

/// Handler for GET /api/reports/attendance
async fn attendance_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<AttendanceReport>, AppError> {
    info!("GET /api/reports/attendance - query: {query:?}");
    state
        .report_service
        .attendance_report(query.start_date, query.end_date, query.child_id.as_deref())
        .await
        .map(Json)
}

/// Query parameters for the dashboard endpoint
#[derive(Deserialize, Debug)]
struct DashboardQuery {
    date: Option<NaiveDate>,
}

/// Handler for GET /api/dashboard: per-class counts for a date (today when
/// not given)
async fn class_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Vec<ClassSummary>>, AppError> {
    let date = query.date.unwrap_or_else(|| Local::now().date_naive());
    info!("GET /api/dashboard - date: {date}");

    let roster = state.roster_service.list_children().await?;
    let current = state.attendance_service.get_by_date(date).await?;

    Ok(Json(sync::class_summaries(&roster, &current)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (AppState, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let connection = Arc::new(JsonConnection::new(temp_dir.path()).unwrap());
        (AppState::new(&connection), temp_dir)
    }

    fn create_request(name: &str) -> CreateChildRequest {
        CreateChildRequest {
            name: name.to_string(),
            birth_date: "2018-03-15".parse().unwrap(),
            address: Some("123 Main Street, Lagos".to_string()),
            parent_name: Some("Sarah Johnson".to_string()),
            parent_phone: None,
            parent_email: None,
            medical_notes: None,
            photo_url: None,
            class: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_children_crud_handlers() {
        let (state, _dir) = setup();

        let (status, Json(child)) =
            create_child(State(state.clone()), Json(create_request("Emma Johnson")))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(fetched) = get_child(State(state.clone()), Path(child.id.clone()))
            .await
            .unwrap();
        assert_eq!(fetched, child);

        let Json(updated) = update_child(
            State(state.clone()),
            Path(child.id.clone()),
            Json(UpdateChildRequest {
                name: Some("Emma J.".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Emma J.");

        let Json(listed) = list_children(State(state.clone())).await.unwrap();
        assert_eq!(listed.len(), 1);

        delete_child(State(state.clone()), Path(child.id.clone()))
            .await
            .unwrap();
        let missing = get_child(State(state), Path(child.id)).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_and_list_attendance_handlers() {
        let (state, _dir) = setup();
        let d = date("2025-07-20");

        let (_, Json(child)) =
            create_child(State(state.clone()), Json(create_request("Emma Johnson")))
                .await
                .unwrap();

        let Json(outcome) = mark_attendance(
            State(state.clone()),
            Json(MarkAttendanceRequest {
                child_id: child.id.clone(),
                date: d,
                present: true,
            }),
        )
        .await
        .unwrap();
        assert!(outcome.is_some());

        let Json(by_date) = list_attendance(
            State(state.clone()),
            Query(AttendanceQuery {
                date: Some(d),
                child_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(by_date.len(), 1);

        let Json(history) = child_attendance(State(state.clone()), Path(child.id.clone()))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        // Marking absent returns null and clears the stored record
        let Json(outcome) = mark_attendance(
            State(state.clone()),
            Json(MarkAttendanceRequest {
                child_id: child.id,
                date: d,
                present: false,
            }),
        )
        .await
        .unwrap();
        assert!(outcome.is_none());

        let Json(all) = list_attendance(
            State(state),
            Query(AttendanceQuery {
                date: None,
                child_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_and_report_handlers() {
        let (state, _dir) = setup();
        let d = date("2025-07-20");

        let (_, Json(emma)) =
            create_child(State(state.clone()), Json(create_request("Emma Johnson")))
                .await
                .unwrap();
        let (_, Json(liam)) =
            create_child(State(state.clone()), Json(create_request("Liam Smith")))
                .await
                .unwrap();

        bulk_attendance(
            State(state.clone()),
            Json(BulkAttendanceRequest {
                date: d,
                child_ids: vec![emma.id.clone(), liam.id.clone()],
            }),
        )
        .await
        .unwrap();

        let Json(report) = attendance_report(
            State(state.clone()),
            Query(ReportQuery {
                start_date: None,
                end_date: None,
                child_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(report.total_records, 2);
        assert_eq!(report.overall_percentage, 100);

        let Json(summary) = class_dashboard(
            State(state),
            Query(DashboardQuery { date: Some(d) }),
        )
        .await
        .unwrap();
        // Both children share a birth date, so one class holds them both
        let full: &ClassSummary = summary.iter().find(|s| s.total == 2).unwrap();
        assert_eq!(full.present, 2);
        assert_eq!(full.percentage, 100);
    }
}
