// ── Auto-events ──
//
// Periodic per-device executors and the fleet manager that owns them.

mod executor;
mod manager;

pub use executor::{Executor, ExecutorFactory};
pub use manager::{AutoEventManager, spawn_change_listener};
