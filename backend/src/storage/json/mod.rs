//! # JSON Document Storage
//!
//! File-backed document store mirroring the layout of the hosted document
//! database this service replaces. Documents are JSON files addressed by
//! hierarchical collection paths under a base directory:
//!
//! ```text
//! children/{child_id}.json
//! attendance/ledger/{uuid}.json
//! attendance/{year}/{month}/{date}/records/{child_id}.json
//! photos/{child_id}_{timestamp}_{file_name}
//! ```
//!
//! Writes go through all-or-nothing batches with atomic per-file renames,
//! and committed changes fan out to per-collection change subscribers.

pub mod attendance_repository;
pub mod child_repository;
pub mod connection;
pub mod photo_repository;

pub use attendance_repository::AttendanceRepository;
pub use child_repository::ChildRepository;
pub use connection::{JsonConnection, WriteBatch};
pub use photo_repository::PhotoRepository;
