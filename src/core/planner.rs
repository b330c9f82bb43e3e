use bon::Builder;
use chrono::{NaiveDateTime, TimeDelta};
use serde::Deserialize;

use crate::{
    core::{
        battery::BatteryProfile,
        error::Error,
        forecast::GenerationForecast,
        tariff::TariffWindow,
        trace::Trace,
    },
    prelude::*,
    quantity::{
        energy::WattHours,
        percent::{Percent, Percentage},
        power::Watts,
    },
};

/// Empirical corrections of the commanded charge rate.
#[must_use]
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct RateTuning {
    /// The inverter systematically under-delivers the commanded rate by about this much.
    #[serde(rename = "bias_pct", default = "RateTuning::default_bias")]
    pub bias: Percentage,

    /// Any positive rate below this is considered unsafe and replaced with the full rate.
    #[serde(rename = "floor_pct", default = "RateTuning::default_floor")]
    pub floor: Percentage,
}

impl RateTuning {
    const fn default_bias() -> Percentage {
        Percentage(2.0)
    }

    const fn default_floor() -> Percentage {
        Percentage(5.0)
    }
}

impl Default for RateTuning {
    fn default() -> Self {
        Self { bias: Self::default_bias(), floor: Self::default_floor() }
    }
}

/// Setpoints for the upcoming off-peak window.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChargePlan {
    pub target_charge: Percent,
    pub charge_rate: Percentage,
}

#[must_use]
#[derive(Copy, Clone, Builder)]
pub struct ChargePlanner {
    battery: BatteryProfile,
    tariff: TariffWindow,

    /// Average household load.
    load: Watts,

    #[builder(default)]
    tuning: RateTuning,
}

impl ChargePlanner {
    pub const fn tariff(&self) -> TariffWindow {
        self.tariff
    }

    /// Compute the plan for the upcoming off-peak window.
    ///
    /// The missing forecast is not an error: the battery gets charged to the maximum then.
    /// The missing current state of charge is, as there is no way to compute the rate without it.
    #[instrument(skip_all, fields(load = ?self.load))]
    pub fn plan(
        &self,
        forecast: Option<&GenerationForecast>,
        current_charge: Option<Percentage>,
        trace: &mut Trace,
    ) -> Result<ChargePlan, Error> {
        // Check the window first, so that misconfiguration never depends on the inputs:
        let off_peak_duration = self.tariff.duration()?;

        let target_charge = self.target_charge(forecast, trace);
        let current_charge = current_charge.ok_or(Error::DeviceRead("the state of charge"))?;
        let charge_rate = self.charge_rate(target_charge, current_charge, off_peak_duration, trace);
        Ok(ChargePlan { target_charge, charge_rate })
    }

    /// Target state of charge by the end of the off-peak window, clamped into the allowed range.
    pub fn target_charge(
        &self,
        forecast: Option<&GenerationForecast>,
        trace: &mut Trace,
    ) -> Percent {
        let target_charge = match forecast {
            None => {
                trace.push(format!(
                    "No forecast received - setting target charge to {}",
                    self.battery.max_charge,
                ));
                self.battery.max_charge
            }
            Some(forecast) => match forecast.grid_neutral_time(self.load) {
                None => {
                    trace.push(format!(
                        "Never grid neutral - setting target charge to {}",
                        self.battery.max_charge,
                    ));
                    self.battery.max_charge
                }
                Some(grid_neutral_time) => {
                    self.target_charge_until_grid_neutral(forecast, grid_neutral_time, trace)
                }
            },
        };
        let target_charge = self.battery.clamp(target_charge);
        trace.push(format!(
            "Target charge within the allowed {}..={}: {target_charge}",
            self.battery.min_charge, self.battery.max_charge,
        ));
        trace.separate();
        target_charge
    }

    fn target_charge_until_grid_neutral(
        &self,
        forecast: &GenerationForecast,
        grid_neutral_time: NaiveDateTime,
        trace: &mut Trace,
    ) -> Percent {
        let required = self.energy_until_grid_neutral(grid_neutral_time, trace);

        trace.push(format!("Total generation: {:.2}", forecast.total()));
        let surplus = forecast.surplus_for_battery(self.load, self.battery.max_charge_rate);
        info!("surplus generation for the battery: {surplus:.2}");
        trace.separate();

        // Whatever the sun does not bring, the grid must during the off-peak window:
        let shortfall = (self.battery.capacity - surplus).max(WattHours::ZERO);
        info!("extra to draw from the grid to ensure full by end-of-day: {shortfall:.2}");

        let baseline = self.battery.energy_at(self.battery.baseline_charge.to_percentage());
        let amount_to_charge = required + shortfall + baseline;
        info!(?required, ?shortfall, ?baseline, "amount to charge: {amount_to_charge:.2}");

        let target_charge = Self::ceil(self.battery.charge_of(amount_to_charge));
        info!(%target_charge, "computed the raw target charge");
        target_charge
    }

    /// Energy the battery alone has to supply between the end of the off-peak window
    /// and the grid-neutral time.
    fn energy_until_grid_neutral(
        &self,
        grid_neutral_time: NaiveDateTime,
        trace: &mut Trace,
    ) -> WattHours {
        let on_battery = (grid_neutral_time.time() - self.tariff.end.0).max(TimeDelta::zero());
        let required = self.load * on_battery;
        trace.push(format!("Grid neutral time: {grid_neutral_time}"));
        info!(
            "{required:.2} required to get to grid neutral ({:.2} hours @ {:?})",
            on_battery.as_seconds_f64() / 3600.0,
            self.load,
        );
        required
    }

    /// Undershooting the target is worse than a slight overshoot, hence rounding up.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn ceil(charge: Percentage) -> Percent {
        Percent(charge.0.ceil().clamp(0.0, f64::from(u16::MAX)) as u16)
    }

    /// Charge rate that brings the battery to the target by the end of the off-peak window.
    pub fn charge_rate(
        &self,
        target_charge: Percent,
        current_charge: Percentage,
        off_peak_duration: TimeDelta,
        trace: &mut Trace,
    ) -> Percentage {
        let growth = (target_charge.to_percentage() - current_charge).max(Percentage::ZERO);
        trace.push(format!(
            "Current charge: {current_charge}, target charge: {target_charge}, growth: {growth:.2}",
        ));
        if growth == Percentage::ZERO {
            trace.push("Already at the target, charge rate: 0 %");
            return Percentage::ZERO;
        }

        let growth = self.battery.energy_at(growth);
        let power = growth / off_peak_duration;
        info!(?growth, ?off_peak_duration, "required charging power: {power:.2}");

        let charge_rate = (Percentage(power / self.battery.max_charge_rate * 100.0)
            + self.tuning.bias)
            .min(Percentage::HUNDRED);
        trace.push(format!("Charge rate: {charge_rate:.2}"));

        // A tiny rate leaves no room for error if anything goes wrong before the window starts:
        if charge_rate < self.tuning.floor {
            trace.push(format!(
                "Charge rate is below {} - charging at the full rate instead",
                self.tuning.floor,
            ));
            return Percentage::HUNDRED;
        }
        charge_rate
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::{
        battery::tests::battery,
        forecast::tests::forecast,
        tariff::tests::window,
    };

    fn planner(load: f64, off_peak: (&str, &str)) -> Result<ChargePlanner> {
        Ok(ChargePlanner::builder()
            .battery(battery())
            .tariff(window(off_peak.0, off_peak.1)?)
            .load(Watts(load))
            .build())
    }

    fn scenario_a() -> GenerationForecast {
        forecast(&[
            ("2022-06-28 06:00", 81.0),
            ("2022-06-28 12:00", 2774.0),
            ("2022-06-28 18:00", 2147.0),
        ])
    }

    fn summer_day() -> GenerationForecast {
        forecast(&[
            ("2022-06-28 05:00", 2.0),
            ("2022-06-28 06:00", 81.0),
            ("2022-06-28 07:00", 245.0),
            ("2022-06-28 08:00", 577.0),
            ("2022-06-28 09:00", 1016.0),
            ("2022-06-28 10:00", 1474.0),
            ("2022-06-28 11:00", 2039.0),
            ("2022-06-28 12:00", 2774.0),
            ("2022-06-28 13:00", 3489.0),
            ("2022-06-28 14:00", 3939.0),
            ("2022-06-28 15:00", 4066.0),
            ("2022-06-28 16:00", 3788.0),
            ("2022-06-28 17:00", 3082.0),
            ("2022-06-28 18:00", 2147.0),
            ("2022-06-28 19:00", 1221.0),
            ("2022-06-28 20:00", 551.0),
            ("2022-06-28 21:00", 191.0),
        ])
    }

    #[test]
    fn scenario_a_target_charge() -> Result {
        // 6 hours on battery after 06:00 at 300 W: 1800 Wh.
        // Surplus: 2474 + 1847 = 4321 Wh, shortfall: 679 Wh.
        // Baseline 10 % of 5000 Wh: 500 Wh. Total: 2979 Wh → 59.58 % → 60 %.
        let mut trace = Trace::default();
        let target_charge =
            planner(300.0, ("23:00", "06:00"))?.target_charge(Some(&scenario_a()), &mut trace);
        assert_eq!(target_charge, Percent(60));
        assert!(trace.contains("Grid neutral time: 2022-06-28 12:00:00"));
        Ok(())
    }

    #[test]
    fn summer_day_target_charge() -> Result {
        // Grid neutral at 08:00, that is 3.5 hours on battery after 04:30: 1050 Wh.
        // The surplus covers the whole capacity, so only the baseline is added: 1550 Wh → 31 %.
        let mut trace = Trace::default();
        let target_charge =
            planner(300.0, ("00:30", "04:30"))?.target_charge(Some(&summer_day()), &mut trace);
        assert_eq!(target_charge, Percent(31));
        Ok(())
    }

    #[test]
    fn grid_neutral_before_off_peak_end_requires_nothing() -> Result {
        // Grid neutral at 06:00 but the window ends at 07:00: no energy is needed to bridge.
        let forecast = forecast(&[("2022-06-28 06:00", 5000.0)]);
        let mut trace = Trace::default();
        let target_charge =
            planner(300.0, ("01:00", "07:00"))?.target_charge(Some(&forecast), &mut trace);
        // Surplus is capped at 2500 Wh, shortfall 2500 Wh, baseline 500 Wh: 60 %.
        assert_eq!(target_charge, Percent(60));
        Ok(())
    }

    #[test]
    fn missing_forecast_charges_to_max() -> Result {
        let mut trace = Trace::default();
        let target_charge = planner(300.0, ("00:30", "04:30"))?.target_charge(None, &mut trace);
        assert_eq!(target_charge, Percent(100));
        assert!(trace.contains("No forecast received"));
        Ok(())
    }

    #[test]
    fn never_grid_neutral_charges_to_max() -> Result {
        let planner = planner(300.0, ("00:30", "04:30"))?;
        for peak in [0.0, 150.0, 299.0, 300.0] {
            let forecast = forecast(&[
                ("2022-06-28 10:00", peak / 2.0),
                ("2022-06-28 12:00", peak),
                ("2022-06-28 14:00", peak / 3.0),
            ]);
            let mut trace = Trace::default();
            assert_eq!(planner.target_charge(Some(&forecast), &mut trace), Percent(100));
            assert!(trace.contains("Never grid neutral"));
        }
        Ok(())
    }

    #[test]
    fn never_grid_neutral_respects_max_charge() -> Result {
        let planner = ChargePlanner::builder()
            .battery(BatteryProfile { max_charge: Percent(90), ..battery() })
            .tariff(window("00:30", "04:30")?)
            .load(Watts(300.0))
            .build();
        let mut trace = Trace::default();
        assert_eq!(planner.target_charge(None, &mut trace), Percent(90));
        Ok(())
    }

    #[test]
    fn target_charge_is_clamped() -> Result {
        // Huge surplus and no bridging energy, but the minimum still applies:
        let battery =
            BatteryProfile { baseline_charge: Percent(0), min_charge: Percent(35), ..battery() };
        let planner = ChargePlanner::builder()
            .battery(battery)
            .tariff(window("00:30", "04:30")?)
            .load(Watts(100.0))
            .build();
        let sunny_night = forecast(&[
            ("2022-06-28 01:00", 4000.0),
            ("2022-06-28 02:00", 4000.0),
            ("2022-06-28 03:00", 4000.0),
        ]);
        let mut trace = Trace::default();
        assert_eq!(planner.target_charge(Some(&sunny_night), &mut trace), Percent(35));

        // Absurd load: the maximum applies.
        let planner = ChargePlanner::builder()
            .battery(battery)
            .tariff(window("00:30", "04:30")?)
            .load(Watts(3000.0))
            .build();
        let late_sun = forecast(&[("2022-06-28 20:00", 3500.0)]);
        assert_eq!(planner.target_charge(Some(&late_sun), &mut trace), Percent(100));
        Ok(())
    }

    #[test]
    fn target_charge_is_monotonic_in_load() -> Result {
        let forecast = summer_day();
        let mut previous = Percent(0);
        for load in (0..=5000).step_by(50) {
            let mut trace = Trace::default();
            let target_charge = planner(f64::from(load), ("00:30", "04:30"))?
                .target_charge(Some(&forecast), &mut trace);
            assert!(target_charge >= previous, "load {load} W: {target_charge} < {previous}");
            assert!(target_charge >= Percent(20) && target_charge <= Percent(100));
            previous = target_charge;
        }
        Ok(())
    }

    #[test]
    fn plan_is_idempotent() -> Result {
        let planner = planner(300.0, ("00:30", "04:30"))?;
        let forecast = summer_day();
        let first = planner.plan(Some(&forecast), Some(Percentage(12.0)), &mut Trace::default())?;
        let second = planner.plan(Some(&forecast), Some(Percentage(12.0)), &mut Trace::default())?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn plan_ok() -> Result {
        // Target 31 %, growth 21 % of 5000 Wh = 1050 Wh over 4 hours = 262.5 W.
        // That is 10.5 % of 2500 W, plus 2 % bias.
        let plan = planner(300.0, ("00:30", "04:30"))?.plan(
            Some(&summer_day()),
            Some(Percentage(10.0)),
            &mut Trace::default(),
        )?;
        assert_eq!(plan.target_charge, Percent(31));
        assert_abs_diff_eq!(plan.charge_rate.0, 12.5, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn scenario_b_missing_forecast_plans_full_charge() -> Result {
        // Growth 80 % of 5000 Wh over 4 hours = 1000 W, 40 % + 2 %.
        let plan = planner(300.0, ("00:30", "04:30"))?.plan(
            None,
            Some(Percentage(20.0)),
            &mut Trace::default(),
        )?;
        assert_eq!(plan.target_charge, Percent(100));
        assert_abs_diff_eq!(plan.charge_rate.0, 42.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn scenario_c_inverted_window_is_configuration_error() -> Result {
        let error = planner(300.0, ("22:00", "06:00"))?
            .plan(None, Some(Percentage(50.0)), &mut Trace::default())
            .unwrap_err();
        assert!(matches!(error, Error::Configuration(_)));
        Ok(())
    }

    #[test]
    fn zero_duration_window_is_configuration_error() -> Result {
        let error = planner(300.0, ("03:00", "03:00"))?
            .plan(None, Some(Percentage(50.0)), &mut Trace::default())
            .unwrap_err();
        assert!(matches!(error, Error::Configuration(_)));
        Ok(())
    }

    #[test]
    fn scenario_d_no_growth_means_zero_rate() -> Result {
        let mut trace = Trace::default();
        let charge_rate = planner(300.0, ("00:30", "04:30"))?.charge_rate(
            Percent(90),
            Percentage(95.0),
            TimeDelta::hours(4),
            &mut trace,
        );
        assert_eq!(charge_rate, Percentage::ZERO);
        Ok(())
    }

    #[test]
    fn tiny_rate_is_replaced_with_full_rate() -> Result {
        // Growth 1 % = 50 Wh over 4 hours = 12.5 W, 0.5 % + 2 % is below the floor.
        let mut trace = Trace::default();
        let charge_rate = planner(300.0, ("00:30", "04:30"))?.charge_rate(
            Percent(50),
            Percentage(49.0),
            TimeDelta::hours(4),
            &mut trace,
        );
        assert_eq!(charge_rate, Percentage::HUNDRED);
        assert!(trace.contains("charging at the full rate instead"));
        Ok(())
    }

    #[test]
    fn rate_is_capped_at_hundred() -> Result {
        // 100 % of 5000 Wh in one hour is twice the maximum charge rate.
        let mut trace = Trace::default();
        let charge_rate = planner(300.0, ("03:00", "04:00"))?.charge_rate(
            Percent(100),
            Percentage(0.0),
            TimeDelta::hours(1),
            &mut trace,
        );
        assert_eq!(charge_rate, Percentage::HUNDRED);
        Ok(())
    }

    #[test]
    fn rate_tuning_is_configurable() -> Result {
        let planner = ChargePlanner::builder()
            .battery(battery())
            .tariff(window("00:30", "04:30")?)
            .load(Watts(300.0))
            .tuning(RateTuning { bias: Percentage::ZERO, floor: Percentage(1.0) })
            .build();
        let charge_rate = planner.charge_rate(
            Percent(50),
            Percentage(49.0),
            TimeDelta::hours(4),
            &mut Trace::default(),
        );
        assert_eq!(charge_rate, Percentage::HUNDRED);

        let charge_rate = planner.charge_rate(
            Percent(50),
            Percentage(40.0),
            TimeDelta::hours(4),
            &mut Trace::default(),
        );
        assert_abs_diff_eq!(charge_rate.0, 5.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn missing_current_charge_is_device_read_error() -> Result {
        let error = planner(300.0, ("00:30", "04:30"))?
            .plan(Some(&summer_day()), None, &mut Trace::default())
            .unwrap_err();
        assert!(matches!(error, Error::DeviceRead(_)));
        Ok(())
    }
}
