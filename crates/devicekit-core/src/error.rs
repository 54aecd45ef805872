// ── Core error types ──
//
// Errors surfaced by devicekit-core. Collaborator failures (registry
// writes, executor construction) are reported through these variants
// and logged at the point of call; none of them abort a whole sweep.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    #[error("Device already exists: {name}")]
    DuplicateDevice { name: String },

    #[error("Registry write failed for device {name}: {reason}")]
    RegistryWrite { name: String, reason: String },

    // ── Auto-event errors ────────────────────────────────────────────
    #[error("Invalid auto-event for resource '{resource}': {reason}")]
    InvalidAutoEvent { resource: String, reason: String },

    // ── Admission errors ─────────────────────────────────────────────
    #[error("Invalid identifier pattern for '{property}' in watcher {watcher}: {reason}")]
    InvalidPattern {
        watcher: String,
        property: String,
        reason: String,
    },
}
