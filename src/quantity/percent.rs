quantity!(Percent, u16, "%");

impl Percent {
    pub const HUNDRED: Self = Self(100);

    pub fn to_percentage(self) -> Percentage {
        Percentage(f64::from(self.0))
    }
}

/// Fractional percentage, for the device readings and the charge rate setpoint.
quantity!(Percentage, f64, "%");

impl Percentage {
    pub const HUNDRED: Self = Self(100.0);

    pub const fn to_proportion(self) -> f64 {
        0.01 * self.0
    }

    /// Integral part, as the vendor API expects it.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn truncate(self) -> u16 {
        self.0 as u16
    }
}
