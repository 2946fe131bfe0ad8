use std::sync::Arc;

use crate::config::Config;
use crate::gc::GcCoordinator;
use crate::ledger::StatusLedger;
use crate::registry::RegistryClient;

/// Explicitly constructed object graph handed to the router; no ambient
/// singletons. The ledger Arc is shared with the coordinator.
pub struct AppState {
    pub coordinator: GcCoordinator,
    pub ledger: Arc<StatusLedger>,
    pub registry: Arc<RegistryClient>,
    pub config: Arc<Config>,
}
