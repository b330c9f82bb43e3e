use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime};

use crate::{
    core::{error::Unavailable, tariff::TimeOfDay},
    prelude::*,
    quantity::{energy::WattHours, power::Watts},
};

/// Hourly generation estimate as returned by the provider, possibly spanning several days.
#[must_use]
#[derive(Clone, Debug, Default, derive_more::IntoIterator)]
pub struct RawForecast(BTreeMap<NaiveDateTime, WattHours>);

impl RawForecast {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NaiveDateTime, WattHours)> for RawForecast {
    fn from_iter<T: IntoIterator<Item = (NaiveDateTime, WattHours)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Hourly generation estimate for exactly one calendar day, in chronological order.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationForecast {
    day: NaiveDate,
    hours: BTreeMap<NaiveDateTime, WattHours>,
}

impl GenerationForecast {
    pub const fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, WattHours)> + '_ {
        self.hours.iter().map(|(hour, generation)| (*hour, *generation))
    }

    pub fn total(&self) -> WattHours {
        self.hours.values().copied().sum()
    }

    /// First hour in which the generation alone strictly exceeds the household load.
    ///
    /// Fractional watt-hours do not count, so a derated hour barely above the load is not
    /// grid-neutral yet.
    pub fn grid_neutral_time(&self, load: Watts) -> Option<NaiveDateTime> {
        self.iter()
            .find(|(_, generation)| generation.0.trunc() > load.0)
            .map(|(hour, _)| hour)
    }

    /// Energy the battery can absorb from the solar surplus over the day.
    ///
    /// Each entry counts as one hour, and the battery cannot take more than its charge rate
    /// during that hour.
    pub fn surplus_for_battery(&self, load: Watts, max_charge_rate: Watts) -> WattHours {
        self.iter()
            .filter(|(_, generation)| generation.0 > load.0)
            .map(|(_, generation)| WattHours((generation.0 - load.0).min(max_charge_rate.0)))
            .sum()
    }
}

#[cfg(test)]
impl FromIterator<(NaiveDateTime, WattHours)> for GenerationForecast {
    /// Build a forecast directly from the entries, taking the day from the first entry.
    fn from_iter<T: IntoIterator<Item = (NaiveDateTime, WattHours)>>(iter: T) -> Self {
        let hours: BTreeMap<_, _> = iter.into_iter().collect();
        let day = hours.keys().next().map_or(NaiveDate::MIN, NaiveDateTime::date);
        Self { day, hours }
    }
}

/// Picks the forecast day relevant to the upcoming off-peak window and derates it.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct WindowSelector {
    /// Fraction in `(0, 1]` to hedge against the forecast optimism.
    pub confidence: f64,
}

impl WindowSelector {
    /// The upcoming off-peak window starts today, unless it has already started.
    /// In the latter case, the next one charges the battery for tomorrow's production.
    pub fn forecast_day(off_peak_start: TimeOfDay, now: NaiveDateTime) -> NaiveDate {
        let today = now.date();
        if now < off_peak_start.on(today) {
            today
        } else {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        }
    }

    #[instrument(skip_all, fields(confidence = self.confidence))]
    pub fn select(
        &self,
        raw: RawForecast,
        off_peak_start: TimeOfDay,
        now: NaiveDateTime,
    ) -> Result<GenerationForecast, Unavailable> {
        let day = Self::forecast_day(off_peak_start, now);
        debug!(%now, %off_peak_start, %day, "selecting the forecast day…");
        let hours: BTreeMap<_, _> = raw
            .into_iter()
            .filter(|(hour, _)| hour.date() == day)
            .map(|(hour, generation)| (hour, generation * self.confidence))
            .collect();
        if hours.is_empty() {
            return Err(Unavailable::NoData { day });
        }
        info!(%day, n_hours = hours.len(), "selected");
        Ok(GenerationForecast { day, hours })
    }
}

#[cfg(test)]
pub mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    pub fn at(timestamp: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M").unwrap()
    }

    pub fn forecast(entries: &[(&str, f64)]) -> GenerationForecast {
        entries.iter().map(|(hour, generation)| (at(hour), WattHours(*generation))).collect()
    }

    fn raw_forecast() -> RawForecast {
        [
            ("2022-06-27 12:00", 1000.0),
            ("2022-06-27 13:00", 1200.0),
            ("2022-06-28 12:00", 2000.0),
            ("2022-06-28 13:00", 3000.0),
        ]
        .into_iter()
        .map(|(hour, generation)| (at(hour), WattHours(generation)))
        .collect()
    }

    #[test]
    fn forecast_day_before_off_peak_ok() -> Result {
        let day = WindowSelector::forecast_day("23:00".parse()?, at("2022-06-27 18:00"));
        assert_eq!(day, at("2022-06-27 00:00").date());
        Ok(())
    }

    #[test]
    fn forecast_day_after_off_peak_start_ok() -> Result {
        let day = WindowSelector::forecast_day("00:30".parse()?, at("2022-06-27 18:00"));
        assert_eq!(day, at("2022-06-28 00:00").date());
        Ok(())
    }

    #[test]
    fn forecast_day_at_off_peak_start_ok() -> Result {
        let day = WindowSelector::forecast_day("18:00".parse()?, at("2022-06-27 18:00"));
        assert_eq!(day, at("2022-06-28 00:00").date());
        Ok(())
    }

    #[test]
    fn select_filters_and_derates_ok() -> Result {
        let selector = WindowSelector { confidence: 0.5 };
        let forecast = selector.select(raw_forecast(), "00:30".parse()?, at("2022-06-27 18:00"))?;
        assert_eq!(forecast.day(), at("2022-06-28 00:00").date());
        let hours: Vec<_> = forecast.iter().collect();
        assert_eq!(
            hours,
            [
                (at("2022-06-28 12:00"), WattHours(1000.0)),
                (at("2022-06-28 13:00"), WattHours(1500.0)),
            ]
        );
        Ok(())
    }

    #[test]
    fn select_missing_day_err() -> Result {
        let selector = WindowSelector { confidence: 1.0 };
        let error = selector
            .select(raw_forecast(), "00:30".parse()?, at("2022-06-28 18:00"))
            .unwrap_err();
        let expected_day = at("2022-06-29 00:00").date();
        assert!(matches!(error, Unavailable::NoData { day } if day == expected_day));
        Ok(())
    }

    #[test]
    fn grid_neutral_time_ok() {
        let forecast = forecast(&[
            ("2022-06-28 06:00", 81.0),
            ("2022-06-28 12:00", 2774.0),
            ("2022-06-28 18:00", 2147.0),
        ]);
        assert_eq!(forecast.grid_neutral_time(Watts(300.0)), Some(at("2022-06-28 12:00")));
    }

    #[test]
    fn grid_neutral_time_is_strict() {
        let forecast = forecast(&[("2022-06-28 11:00", 300.0), ("2022-06-28 12:00", 301.0)]);
        assert_eq!(forecast.grid_neutral_time(Watts(300.0)), Some(at("2022-06-28 12:00")));
    }

    #[test]
    fn grid_neutral_time_ignores_fractions() {
        let forecast = forecast(&[("2022-06-28 11:00", 300.4), ("2022-06-28 12:00", 301.9)]);
        assert_eq!(forecast.grid_neutral_time(Watts(300.0)), Some(at("2022-06-28 12:00")));
    }

    #[test]
    fn never_grid_neutral_ok() {
        let forecast = forecast(&[("2022-06-28 11:00", 100.0), ("2022-06-28 12:00", 300.0)]);
        assert_eq!(forecast.grid_neutral_time(Watts(300.0)), None);
    }

    #[test]
    fn surplus_is_capped_by_charge_rate() {
        let forecast = forecast(&[
            ("2022-06-28 10:00", 200.0),
            ("2022-06-28 11:00", 800.0),
            ("2022-06-28 12:00", 4000.0),
        ]);
        assert_abs_diff_eq!(forecast.surplus_for_battery(Watts(300.0), Watts(2500.0)).0, 3000.0);
        assert_abs_diff_eq!(forecast.total().0, 5000.0);
    }
}
