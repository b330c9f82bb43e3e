use std::{thread::sleep, time::Duration};

use bon::Builder;
use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use serde_with::serde_as;

use crate::{
    core::{
        error::{Error as CycleError, ErrorKind, Unavailable},
        forecast::{GenerationForecast, WindowSelector},
        planner::ChargePlanner,
        provider::{
            Credentials,
            Device,
            ForecastProvider,
            GeocodeLookup,
            InverterGateway,
            InverterSession,
            Site,
        },
        trace::Trace,
    },
    prelude::*,
};

#[serde_as]
#[must_use]
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "RetryPolicy::default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between the attempts.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(default = "RetryPolicy::default_backoff")]
    pub backoff: humantime::Duration,
}

impl RetryPolicy {
    const fn default_max_attempts() -> u32 {
        3
    }

    fn default_backoff() -> humantime::Duration {
        Duration::from_secs(10).into()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: Self::default_max_attempts(), backoff: Self::default_backoff() }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum State {
    Running,
    Succeeded,
    Failed,
}

/// Final state of the cycle and the trace of its last attempt.
#[must_use]
#[derive(Debug)]
pub struct CycleResult {
    pub state: State,
    pub trace: Trace,
}

impl CycleResult {
    /// Failed cycle that could not even start because of the configuration.
    pub fn rejected(now: NaiveDateTime, error: &CycleError) -> Self {
        error!("cycle rejected: {error:#}");
        let mut trace = Trace::default();
        trace.push(format!("Configuration time: {}", now.format("%Y-%m-%d %H:%M:%S")));
        trace.separate();
        trace.push(error.to_string());
        trace.push("Please check your configuration values");
        Self { state: State::Failed, trace }
    }

    pub fn is_success(&self) -> bool {
        self.state == State::Succeeded
    }
}

/// Runs one scheduling cycle: forecast, plan, and configure the inverter.
///
/// Every attempt re-runs the whole pipeline starting with a fresh login, because a failed
/// inverter session cannot be trusted anymore.
///
/// The controller does not guard against concurrent cycles on the same inverter, it is up to
/// the caller to run at most one at a time.
#[derive(Builder)]
pub struct RunController<'a, G: InverterGateway> {
    forecast_provider: &'a dyn ForecastProvider,
    geocoder: &'a dyn GeocodeLookup,
    gateway: &'a G,
    planner: ChargePlanner,
    selector: WindowSelector,
    site: &'a Site,
    credentials: &'a Credentials,

    /// Discovered on each attempt when not set.
    device: Option<Device>,

    #[builder(default)]
    retry: RetryPolicy,

    /// Do everything except touching the inverter settings.
    #[builder(default)]
    scout: bool,

    clock: &'a dyn Fn() -> NaiveDateTime,
}

impl<G: InverterGateway> RunController<'_, G> {
    #[instrument(skip_all, fields(max_attempts = self.retry.max_attempts))]
    pub fn run(&self) -> CycleResult {
        let mut attempt = 1;
        loop {
            // Nothing from a failed attempt makes it into the next one:
            let mut trace = Trace::default();
            let state = match self.run_once(&mut trace) {
                Ok(()) => State::Succeeded,
                Err(error) => self.on_failure(attempt, &error, &mut trace),
            };
            if state != State::Running {
                info!(?state, attempt, "cycle finished");
                return CycleResult { state, trace };
            }
            attempt += 1;
        }
    }

    fn on_failure(&self, attempt: u32, error: &Error, trace: &mut Trace) -> State {
        let kind = ErrorKind::of(error);
        error!(attempt, ?kind, "attempt failed: {error:#}");
        trace.separate();
        trace.push(format!("Attempt {attempt} of {} failed: {error:#}", self.retry.max_attempts));

        if !kind.is_retriable() {
            trace.push("Please check your configuration values");
            return State::Failed;
        }
        if attempt >= self.retry.max_attempts {
            trace.push("Max attempts reached, giving up");
            return State::Failed;
        }

        info!(backoff = %self.retry.backoff, "sleeping before the retry…");
        sleep(self.retry.backoff.into());
        State::Running
    }

    #[instrument(skip_all)]
    fn run_once(&self, trace: &mut Trace) -> Result {
        let now = (self.clock)();
        trace.push(format!("Configuration time: {}", now.format("%Y-%m-%d %H:%M:%S")));
        trace.separate();

        // Fail fast, before the gate and before spending any of the API quota:
        let tariff = self.planner.tariff();
        tariff.duration()?;

        if tariff.contains(now.time()) {
            trace.push("Within off-peak window - no reconfiguration to happen");
            return Ok(());
        }

        let session = self.gateway.login(self.credentials)?;
        let forecast = self.fetch_forecast(now, trace)?;

        let device = match &self.device {
            Some(device) => device.clone(),
            None => session.discover_device().context("failed to discover the device")?,
        };
        let current_charge = session.read_state_of_charge(&device)?;
        if let Some(current_charge) = current_charge {
            trace.push(format!(
                "State of charge of plant {}, device {}: {current_charge}",
                device.plant_id, device.serial_number,
            ));
        }
        let plan = self.planner.plan(forecast.as_ref(), current_charge, trace)?;
        trace.separate();

        if self.scout {
            trace.push(format!(
                "Scout mode - not configuring the device: target charge {}, charge rate {:.2}",
                plan.target_charge, plan.charge_rate,
            ));
            return Ok(());
        }

        let timestamp = (self.clock)();
        trace.push(format!("Setting inverter time to: {}", timestamp.format("%Y-%m-%d %H:%M:%S")));
        session.set_clock(&device.serial_number, timestamp)?;
        trace.push("   - Successful");
        trace.separate();

        trace.push(format!(
            "Configuring charger - device: {}, charge start: {}, charge end: {}",
            device.serial_number, tariff.start, tariff.end,
        ));
        trace.push(format!(
            "Charge rate: {} %, target charge: {}",
            plan.charge_rate.truncate(),
            plan.target_charge,
        ));
        session.apply_schedule(&device.serial_number, &plan, tariff)?;
        trace.push("   - Successful");
        Ok(())
    }

    /// Fetch and select the forecast, or [`None`] if it is unavailable.
    fn fetch_forecast(
        &self,
        now: NaiveDateTime,
        trace: &mut Trace,
    ) -> Result<Option<GenerationForecast>> {
        let coordinates = self.site.location.resolve(self.geocoder)?;
        let raw = match self.forecast_provider.estimate(coordinates, self.site) {
            Ok(raw) => raw,
            Err(error) if ErrorKind::of(&error) == ErrorKind::ForecastUnavailable => {
                warn!("{error:#}");
                Self::trace_unavailable(&error, trace);
                return Ok(None);
            }
            Err(error) => return Err(error.context("failed to fetch the forecast")),
        };

        let off_peak_start = self.planner.tariff().start;
        trace.push(format!("Now: {now}, off-peak start: {off_peak_start}"));
        match self.selector.select(raw, off_peak_start, now) {
            Ok(forecast) => {
                trace.push(format!("Date for forecast: {}", forecast.day()));
                Ok(Some(forecast))
            }
            Err(unavailable) => {
                trace.push(format!("Forecast is unavailable: {unavailable}"));
                Ok(None)
            }
        }
    }

    fn trace_unavailable(error: &Error, trace: &mut Trace) {
        let reset_at = error.chain().find_map(|cause| match cause.downcast_ref::<CycleError>() {
            Some(CycleError::ForecastUnavailable(Unavailable::RateLimited { reset_at })) => {
                Some(*reset_at)
            }
            _ => None,
        });
        match reset_at {
            None => {
                trace.push(format!("Forecast is unavailable: {error:#}"));
            }
            Some(reset_at) => {
                trace.push("Ratelimit reached");
                if let Some(reset_at) = reset_at {
                    trace.push(format!("Rate limit resets at {reset_at}"));
                    if let Ok(period) = (reset_at - Utc::now()).to_std() {
                        // Sub-seconds are not informative:
                        let period = Duration::from_secs(period.as_secs());
                        trace.push(format!("That's in {}", humantime::format_duration(period)));
                    }
                }
            }
        }
    }
}
