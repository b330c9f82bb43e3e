use std::time::Duration;

use ureq::Agent;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub const USER_AGENT: &str = concat!("growatt-charger/", env!("CARGO_PKG_VERSION"));

/// Build a default client.
///
/// Every client keeps its own cookie jar, so a new one means a new session.
pub fn new(user_agent: &str) -> Agent {
    Agent::config_builder().timeout_global(Some(TIMEOUT)).user_agent(user_agent).build().into()
}
