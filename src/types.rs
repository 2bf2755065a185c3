use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::{config::ReconcileConfig, provider::DnsProvider, resolver::AddressResolver};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ReconcileConfig>,
    pub resolver: Arc<dyn AddressResolver + Send + Sync>,
    pub dns_provider: Arc<dyn DnsProvider + Send + Sync>,
    /// `None` leaves the HTTP trigger locked.
    pub trigger_password: Option<String>,
    /// Held for the duration of a run.
    pub run_guard: Arc<Mutex<()>>,
    /// Upper bound on a single run, after which it is abandoned.
    pub run_timeout: Duration,
}
