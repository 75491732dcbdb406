use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotwiseError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SlotwiseError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            SlotwiseError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SlotwiseError>;

/// Failures of the zone clock. Both are client-correctable input errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    /// A local date or time string could not be parsed.
    #[error("Invalid time input: {0}")]
    InvalidTimeInput(String),

    /// The IANA timezone name is not in the tz database.
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

impl ClockError {
    pub fn code(&self) -> &'static str {
        match self {
            ClockError::InvalidTimeInput(_) => "INVALID_TIME_INPUT",
            ClockError::UnknownTimezone(_) => "UNKNOWN_TIMEZONE",
        }
    }
}
