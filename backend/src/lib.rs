//! Attendance tracking service for a children's church.
//!
//! The crate is layered the same way front to back: a JSON document store
//! (`storage`), domain services over it (`domain`), and a thin REST adapter
//! (`rest`) wired up by the binary in `main.rs`.

pub mod config;
pub mod domain;
pub mod error;
pub mod rest;
pub mod storage;
