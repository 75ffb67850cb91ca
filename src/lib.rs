//! Real-time collaboration service for the staff admin: presence, field
//! locks, change versioning and conflict detection for records being edited
//! by several people at once.

pub mod collab;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod ws;
