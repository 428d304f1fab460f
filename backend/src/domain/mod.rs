pub mod attendance_service;
pub mod classifier;
pub mod report_service;
pub mod roster_service;
pub mod sync;

pub use attendance_service::AttendanceService;
pub use report_service::ReportService;
pub use roster_service::RosterService;
pub use sync::SyncController;
