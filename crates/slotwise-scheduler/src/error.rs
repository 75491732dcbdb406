use slotwise_booking::BookingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The tenant store could not be read or written.
    #[error("Store unavailable: {0}")]
    Store(#[from] BookingError),

    /// The notification provider rejected or failed the send.
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The recipient directory could not be consulted.
    #[error("Recipient lookup failed: {0}")]
    Resolver(String),
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::Store(_) => "STORE_UNAVAILABLE",
            SchedulerError::SendFailed(_) | SchedulerError::Http(_) => "SEND_FAILED",
            SchedulerError::Resolver(_) => "RESOLVER_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
