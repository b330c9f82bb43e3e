use std::{fs, path::Path};

use serde::Deserialize;

use crate::{
    api::growatt,
    core::{
        battery::BatteryProfile,
        controller::RetryPolicy,
        error::Error as CycleError,
        forecast::WindowSelector,
        planner::{ChargePlanner, RateTuning},
        provider::{Coordinates, Credentials, Device, Location, Site},
        tariff::TariffWindow,
    },
    prelude::*,
    quantity::{percent::Percent, power::Watts},
};

/// Commented template written on the first run.
pub const DEFAULT: &str = include_str!("config/default.toml");

#[derive(Deserialize)]
pub struct Config {
    pub battery: BatteryConfig,
    pub tariff: TariffWindow,
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub growatt: GrowattConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub rate: RateTuning,
}

impl Config {
    /// Read the configuration, or write the default one if there is none yet.
    ///
    /// Returns [`None`] when the default configuration has just been written.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn read_or_bootstrap(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create `{}`", parent.display()))?;
            }
            fs::write(path, DEFAULT)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
            warn!("no configuration found, wrote the default one, please fill it in");
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let config = Self::parse(&contents)?;
        info!("loaded");
        Ok(Some(config))
    }

    pub fn parse(contents: &str) -> Result<Self, CycleError> {
        let config: Self = toml::from_str(contents)
            .map_err(|error| CycleError::configuration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CycleError> {
        let battery = &self.battery.profile;
        if battery.capacity.0 <= 0.0 {
            return Err(CycleError::configuration("battery capacity must be positive"));
        }
        if battery.max_charge_rate.0 <= 0.0 {
            return Err(CycleError::configuration("maximum charge rate must be positive"));
        }
        if battery.min_charge > battery.max_charge || battery.max_charge > Percent::HUNDRED {
            return Err(CycleError::configuration(format!(
                "expected minimum ≤ maximum ≤ 100 %, got {} and {}",
                battery.min_charge, battery.max_charge,
            )));
        }
        if battery.baseline_charge > Percent::HUNDRED {
            return Err(CycleError::configuration("baseline charge must not exceed 100 %"));
        }
        if self.battery.average_load.0 < 0.0 {
            return Err(CycleError::configuration("average load must not be negative"));
        }
        let confidence = self.forecast.confidence;
        if !(confidence > 0.0 && confidence <= 1.0) {
            return Err(CycleError::configuration(format!(
                "forecast confidence must be within (0, 1], got {confidence}",
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(CycleError::configuration("at least one attempt is required"));
        }
        Ok(())
    }

    pub fn planner(&self) -> ChargePlanner {
        ChargePlanner::builder()
            .battery(self.battery.profile)
            .tariff(self.tariff)
            .load(self.battery.average_load)
            .tuning(self.rate)
            .build()
    }

    pub const fn selector(&self) -> WindowSelector {
        WindowSelector { confidence: self.forecast.confidence }
    }
}

#[derive(Deserialize)]
pub struct BatteryConfig {
    #[serde(flatten)]
    pub profile: BatteryProfile,

    #[serde(rename = "average_load_w")]
    pub average_load: Watts,
}

#[derive(Deserialize)]
pub struct ForecastConfig {
    /// Address to geocode, unless the coordinates are given.
    pub location: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub declination: f64,
    pub azimuth: f64,
    pub kwp: f64,

    #[serde(default)]
    pub damping: f64,

    #[serde(default = "ForecastConfig::default_confidence")]
    pub confidence: f64,
}

impl ForecastConfig {
    const fn default_confidence() -> f64 {
        1.0
    }

    pub fn site(&self) -> Result<Site, CycleError> {
        let location = match (self.latitude, self.longitude, &self.location) {
            (Some(latitude), Some(longitude), _) => {
                Location::Coordinates(Coordinates { latitude, longitude })
            }
            (None, None, Some(address)) if !address.trim().is_empty() => {
                Location::Address(address.clone())
            }
            _ => {
                return Err(CycleError::configuration(
                    "either `location` or both `latitude` and `longitude` are required",
                ));
            }
        };
        Ok(Site {
            location,
            declination: self.declination,
            azimuth: self.azimuth,
            kwp: self.kwp,
            damping: self.damping,
        })
    }
}

#[derive(Deserialize)]
pub struct GrowattConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub plant_id: String,

    #[serde(default, rename = "device_sn")]
    pub serial_number: String,

    #[serde(default = "GrowattConfig::default_base_url")]
    pub base_url: String,
}

impl Default for GrowattConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            plant_id: String::new(),
            serial_number: String::new(),
            base_url: Self::default_base_url(),
        }
    }
}

impl GrowattConfig {
    fn default_base_url() -> String {
        growatt::DEFAULT_BASE_URL.to_string()
    }

    /// Credentials from the file take precedence over the fallbacks.
    pub fn credentials(
        &self,
        fallback_username: Option<&str>,
        fallback_password: Option<&str>,
    ) -> Result<Credentials, CycleError> {
        let pick = |value: &str, fallback: Option<&str>, name: &str, variable: &str| {
            Some(value)
                .filter(|value| !value.is_empty())
                .or_else(|| fallback.filter(|fallback| !fallback.is_empty()))
                .map(str::to_string)
                .ok_or_else(|| {
                    CycleError::configuration(format!(
                        "no Growatt {name}, set `growatt.{name}` or `{variable}`",
                    ))
                })
        };
        Ok(Credentials {
            username: pick(&self.username, fallback_username, "username", "GROWATT_USERNAME")?,
            password: pick(&self.password, fallback_password, "password", "GROWATT_PASSWORD")?,
        })
    }

    /// Configured device, or [`None`] to discover it.
    pub fn device(&self) -> Option<Device> {
        match (self.plant_id.is_empty(), self.serial_number.is_empty()) {
            (false, false) => Some(Device {
                plant_id: self.plant_id.clone(),
                serial_number: self.serial_number.clone(),
            }),
            (true, true) => None,
            _ => {
                warn!("both `plant_id` and `device_sn` are needed, discovering the device instead");
                None
            }
        }
    }
}
