use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use http::StatusCode;
use serde::Deserialize;
use ureq::Agent;

use crate::{
    api::client,
    core::{
        error::{Error as CycleError, Unavailable},
        forecast::RawForecast,
        provider::{Coordinates, ForecastProvider, Site},
    },
    prelude::*,
    quantity::energy::WattHours,
};

/// [forecast.solar](https://forecast.solar) public estimate API.
pub struct Api {
    client: Agent,
}

impl Default for Api {
    fn default() -> Self {
        // Rate limiting comes with a useful body:
        let client = Agent::config_builder()
            .timeout_global(Some(client::TIMEOUT))
            .user_agent(client::USER_AGENT)
            .http_status_as_error(false)
            .build()
            .into();
        Self { client }
    }
}

impl ForecastProvider for Api {
    #[instrument(
        skip_all,
        fields(latitude = coordinates.latitude, longitude = coordinates.longitude, kwp = site.kwp),
    )]
    fn estimate(&self, coordinates: Coordinates, site: &Site) -> Result<RawForecast> {
        info!("fetching…");
        let url = format!(
            "https://api.forecast.solar/estimate/{}/{}/{}/{}/{}",
            coordinates.latitude, coordinates.longitude, site.declination, site.azimuth, site.kwp,
        );
        let mut response = self
            .client
            .get(&url)
            .query("damping", site.damping.to_string())
            .call()
            .context("failed to request the estimate")?;
        let status = response.status();
        let forecast = response
            .body_mut()
            .read_json::<Response>()
            .with_context(|| format!("failed to deserialize the estimate ({status})"))?
            .into_forecast(status)?;
        info!(n_hours = forecast.len(), "fetched");
        Ok(forecast)
    }
}

#[derive(Deserialize)]
struct Response {
    result: Option<Estimate>,
    message: Message,
}

impl Response {
    fn into_forecast(self, status: StatusCode) -> Result<RawForecast> {
        if status == StatusCode::TOO_MANY_REQUESTS
            || self.message.code == i32::from(StatusCode::TOO_MANY_REQUESTS.as_u16())
        {
            let reset_at = self.message.rate_limit.and_then(|rate_limit| rate_limit.retry_at);
            return Err(CycleError::from(Unavailable::RateLimited { reset_at }).into());
        }
        if self.message.code != 0 {
            bail!(
                r#"forecast.solar error {code} ("{text}")"#,
                code = self.message.code,
                text = self.message.text,
            );
        }
        let estimate = self.result.context("forecast.solar returned no estimate")?;
        estimate
            .watt_hours_period
            .into_iter()
            .map(|(hour, generation)| {
                NaiveDateTime::parse_from_str(&hour, "%Y-%m-%d %H:%M:%S")
                    .with_context(|| format!("invalid timestamp `{hour}`"))
                    .map(|hour| (hour, generation))
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct Estimate {
    /// Energy generated within the period ending at the key, in local time.
    watt_hours_period: BTreeMap<String, WattHours>,
}

#[derive(Deserialize)]
struct Message {
    code: i32,

    #[serde(default)]
    text: String,

    #[serde(rename = "ratelimit")]
    rate_limit: Option<RateLimit>,
}

#[derive(Deserialize)]
struct RateLimit {
    #[serde(rename = "retry-at", default)]
    retry_at: Option<DateTime<Utc>>,
}
