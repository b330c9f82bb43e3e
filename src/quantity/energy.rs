use std::ops::Div;

use chrono::TimeDelta;

use crate::quantity::power::Watts;

quantity!(WattHours, f64, "Wh");

impl Div<TimeDelta> for WattHours {
    type Output = Watts;

    fn div(self, rhs: TimeDelta) -> Self::Output {
        let hours = rhs.as_seconds_f64() / 3600.0;
        Watts(self.0 / hours)
    }
}
