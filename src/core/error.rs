use chrono::{DateTime, NaiveDate, Utc};

/// Classified failures of a scheduling cycle.
///
/// Plumbing code reports these through [`anyhow::Error`], so a classified error may be buried
/// under any amount of context. Use [`ErrorKind::of`] to dig it out.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("forecast is unavailable: {0}")]
    ForecastUnavailable(#[from] Unavailable),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to log in as `{username}`: {reason}")]
    AuthenticationFailure { username: String, reason: String },

    #[error("failed to read {0} from the device")]
    DeviceRead(&'static str),

    #[error("the device `{serial_number}` rejected the `{setting}` setting: {reason}")]
    DeviceWrite { serial_number: String, setting: &'static str, reason: String },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Unavailable {
    #[error("rate limit reached")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("no forecast for {day}")]
    NoData { day: NaiveDate },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    ForecastUnavailable,
    Configuration,
    AuthenticationFailure,
    DeviceReadFailure,
    DeviceWriteFailure,
    UnexpectedError,
}

impl ErrorKind {
    /// Classify the error by the first [`Error`] found in its chain.
    pub fn of(error: &anyhow::Error) -> Self {
        error.chain().find_map(|cause| cause.downcast_ref::<Error>()).map_or(
            Self::UnexpectedError,
            |error| match error {
                Error::ForecastUnavailable(_) => Self::ForecastUnavailable,
                Error::Configuration(_) => Self::Configuration,
                Error::AuthenticationFailure { .. } => Self::AuthenticationFailure,
                Error::DeviceRead(_) => Self::DeviceReadFailure,
                Error::DeviceWrite { .. } => Self::DeviceWriteFailure,
            },
        )
    }

    /// Retrying cannot fix bad configuration.
    pub const fn is_retriable(self) -> bool {
        !matches!(self, Self::Configuration)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn classify_through_context_ok() {
        let error = Err::<(), _>(Error::configuration("off-peak start is after its end"))
            .context("failed to plan")
            .context("attempt failed")
            .unwrap_err();
        assert_eq!(ErrorKind::of(&error), ErrorKind::Configuration);
        assert!(!ErrorKind::of(&error).is_retriable());
    }

    #[test]
    fn classify_unexpected_ok() {
        let error = anyhow::anyhow!("connection reset by peer");
        assert_eq!(ErrorKind::of(&error), ErrorKind::UnexpectedError);
        assert!(ErrorKind::of(&error).is_retriable());
    }

    #[test]
    fn classify_device_write_ok() {
        let error = anyhow::Error::new(Error::DeviceWrite {
            serial_number: "XYZ123".to_string(),
            setting: "pf_sys_year",
            reason: "timeout".to_string(),
        });
        assert_eq!(ErrorKind::of(&error), ErrorKind::DeviceWriteFailure);
    }
}
