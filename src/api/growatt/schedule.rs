use chrono::NaiveTime;

use crate::core::{
    planner::ChargePlan,
    tariff::{TariffWindow, TimeOfDay},
};

/// AC charging schedule of a mix inverter: three fixed periods sharing the same setpoints.
#[must_use]
#[derive(Debug, Eq, PartialEq)]
pub struct ChargeSchedule {
    /// Percentage of the maximum charge power.
    pub charge_rate: u16,

    /// Charging stops at this state of charge.
    pub target_charge: u16,

    pub is_ac_charging_allowed: bool,

    pub periods: [ChargePeriod; 3],
}

impl ChargeSchedule {
    pub const SETTING: &'static str = "mix_ac_charge_time_period";

    /// Charge within the off-peak window only, the other periods get disabled.
    pub fn single(plan: &ChargePlan, window: TariffWindow) -> Self {
        Self {
            charge_rate: plan.charge_rate.truncate(),
            target_charge: plan.target_charge.0,
            is_ac_charging_allowed: true,
            periods: [
                ChargePeriod { start: window.start, end: window.end, is_enabled: true },
                ChargePeriod::DISABLED,
                ChargePeriod::DISABLED,
            ],
        }
    }

    /// Positional `paramN` values in the order the server expects them.
    pub fn to_parameters(&self) -> Vec<String> {
        let mut parameters = vec![
            self.charge_rate.to_string(),
            self.target_charge.to_string(),
            flag(self.is_ac_charging_allowed),
        ];
        for period in &self.periods {
            parameters.extend(period.to_parameters());
        }
        parameters
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct ChargePeriod {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub is_enabled: bool,
}

impl ChargePeriod {
    pub const DISABLED: Self = Self {
        start: TimeOfDay(NaiveTime::MIN),
        end: TimeOfDay(NaiveTime::MIN),
        is_enabled: false,
    };

    fn to_parameters(&self) -> [String; 5] {
        [
            self.start.0.format("%H").to_string(),
            self.start.0.format("%M").to_string(),
            self.end.0.format("%H").to_string(),
            self.end.0.format("%M").to_string(),
            flag(self.is_enabled),
        ]
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::tariff::tests::window,
        prelude::Result,
        quantity::percent::{Percent, Percentage},
    };

    #[test]
    fn to_parameters_ok() -> Result {
        let plan = ChargePlan { target_charge: Percent(60), charge_rate: Percentage(42.7) };
        let schedule = ChargeSchedule::single(&plan, window("00:30", "04:30")?);
        assert_eq!(
            schedule.to_parameters(),
            [
                "42", "60", "1", // setpoints
                "00", "30", "04", "30", "1", // off-peak
                "00", "00", "00", "00", "0", // unused
                "00", "00", "00", "00", "0", // unused
            ],
        );
        Ok(())
    }

    #[test]
    fn zero_rate_ok() -> Result {
        let plan = ChargePlan { target_charge: Percent(100), charge_rate: Percentage::ZERO };
        let schedule = ChargeSchedule::single(&plan, window("23:00", "23:59")?);
        let parameters = schedule.to_parameters();
        assert_eq!(parameters.len(), 18);
        assert_eq!(parameters[..8], ["0", "100", "1", "23", "00", "23", "59", "1"]);
        Ok(())
    }
}
