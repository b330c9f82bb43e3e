use std::time::Duration;

use clap::Parser;
use http::Uri;
use ureq::Agent;

use crate::prelude::*;

#[derive(Parser)]
pub struct HeartbeatArgs {
    /// Gets a `POST` after each successful run.
    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    pub url: Option<Uri>,
}

impl HeartbeatArgs {
    pub fn send(&self) {
        if let Some(url) = &self.url
            && let Err(error) = Self::send_fallible(url)
        {
            warn!("failed to send the heartbeat: {error:#}");
        }
    }

    #[instrument(skip_all)]
    fn send_fallible(url: &Uri) -> Result {
        info!("sending a heartbeat…");
        let client: Agent =
            Agent::config_builder().timeout_global(Some(Duration::from_secs(3))).build().into();
        client.post(url.to_string()).send_empty()?;
        Ok(())
    }
}
