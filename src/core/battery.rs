use bon::Builder;
use serde::Deserialize;

use crate::quantity::{
    energy::WattHours,
    percent::{Percent, Percentage},
    power::Watts,
};

/// Static battery parameters, loaded once per cycle.
#[must_use]
#[derive(Copy, Clone, Debug, Builder, Deserialize)]
pub struct BatteryProfile {
    #[serde(rename = "capacity_wh")]
    pub capacity: WattHours,

    #[serde(rename = "minimum_charge_pct")]
    pub min_charge: Percent,

    #[serde(rename = "maximum_charge_pct")]
    pub max_charge: Percent,

    /// The battery cannot absorb energy faster than this, no matter the solar surplus.
    #[serde(rename = "maximum_charge_rate_w")]
    pub max_charge_rate: Watts,

    /// State of charge above which the battery is considered topped up before the off-peak
    /// calculation begins.
    #[serde(rename = "baseline_charge_pct")]
    pub baseline_charge: Percent,
}

impl BatteryProfile {
    pub fn energy_at(&self, charge: Percentage) -> WattHours {
        self.capacity * charge.to_proportion()
    }

    pub fn charge_of(&self, energy: WattHours) -> Percentage {
        Percentage(energy / self.capacity * 100.0)
    }

    pub fn clamp(&self, charge: Percent) -> Percent {
        charge.clamp(self.min_charge, self.max_charge)
    }
}
