// ── Provision watcher ──

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::device::AdminState;

/// Admission rule set for discovered devices.
///
/// A candidate is admitted when every `identifiers` pattern matches and no
/// `blocking_identifiers` literal does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionWatcher {
    pub name: String,
    /// Profile assigned to devices admitted by this watcher.
    #[serde(default)]
    pub profile_name: String,
    /// Service assigned to devices admitted by this watcher.
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub admin_state: AdminState,
    /// Allow-list: property name -> regular expression.
    #[serde(default)]
    pub identifiers: HashMap<String, String>,
    /// Deny-list: property name -> forbidden literal values.
    #[serde(default)]
    pub blocking_identifiers: HashMap<String, Vec<String>>,
}
