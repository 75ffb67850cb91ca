use crate::{models::DiagnosticsResponse, ws::hub::CollabHub};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report coordinator counters and process resource usage
pub async fn diagnostics(
    State(hub): State<Arc<CollabHub>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {

    let stats = hub.coordinator().stats();
    let n_conn = hub.connections().connection_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Sessions: {}, Locks: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        stats.sessions,
        stats.field_locks
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions: stats.sessions as u32,
            n_participants: stats.participants as u32,
            n_field_locks: stats.field_locks as u32,
            n_indexed_users: stats.indexed_users as u32,
            n_conn,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
