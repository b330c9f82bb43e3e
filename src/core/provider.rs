//! Seams between the charging logic and the outside world.

use std::fmt::{Debug, Formatter};

use chrono::NaiveDateTime;

use crate::{
    core::{forecast::RawForecast, planner::ChargePlan, tariff::TariffWindow},
    prelude::*,
    quantity::percent::Percentage,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Where the panels are.
#[derive(Clone, Debug)]
pub enum Location {
    Coordinates(Coordinates),

    /// Free-form address to be geocoded.
    Address(String),
}

impl Location {
    pub fn resolve(&self, geocoder: &dyn GeocodeLookup) -> Result<Coordinates> {
        match self {
            Self::Coordinates(coordinates) => Ok(*coordinates),
            Self::Address(address) => geocoder
                .resolve(address)
                .with_context(|| format!("failed to geocode `{address}`")),
        }
    }
}

/// Solar installation parameters for the forecast.
#[derive(Clone, Debug)]
pub struct Site {
    pub location: Location,

    /// Panel tilt in degrees, `0` is horizontal.
    pub declination: f64,

    /// Panel orientation in degrees, `0` is south, `-90` is east.
    pub azimuth: f64,

    /// Installed peak power in kilowatts.
    pub kwp: f64,

    pub damping: f64,
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("username", &self.username).finish_non_exhaustive()
    }
}

/// Inverter identity within the vendor cloud.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub plant_id: String,
    pub serial_number: String,
}

pub trait ForecastProvider {
    /// Hourly generation estimate for at least one day.
    ///
    /// Rate limiting must be reported as [`crate::core::error::Error::ForecastUnavailable`].
    fn estimate(&self, coordinates: Coordinates, site: &Site) -> Result<RawForecast>;
}

pub trait GeocodeLookup {
    fn resolve(&self, address: &str) -> Result<Coordinates>;
}

pub trait InverterGateway {
    type Session: InverterSession;

    /// Start a fresh authenticated session.
    fn login(&self, credentials: &Credentials) -> Result<Self::Session>;
}

/// Authenticated inverter session, valid for one attempt.
pub trait InverterSession {
    /// Find the first device of the first plant of the logged-in user.
    fn discover_device(&self) -> Result<Device>;

    /// Current state of charge, or [`None`] if the device did not report it.
    fn read_state_of_charge(&self, device: &Device) -> Result<Option<Percentage>>;

    fn set_clock(&self, serial_number: &str, timestamp: NaiveDateTime) -> Result;

    /// Replace the device charging schedule with the single off-peak charging period.
    fn apply_schedule(
        &self,
        serial_number: &str,
        plan: &ChargePlan,
        window: TariffWindow,
    ) -> Result;
}
