//! Error types for wheeltime.
//!
//! Three fatal kinds, matching the taxonomy the wheel actually raises.
//! Invalid *enrolment* inputs (a zero deadline, a non-positive duration)
//! are deliberately not errors here: the enrolment methods just return
//! `None` and do no work, preserving caller ergonomics for adaptive
//! schedulers that may compute a non-positive delay.

/// Result type alias for wheeltime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error conditions. All three halt the caller (or the owning task)
/// rather than propagating as a recoverable runtime condition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wheel geometry is invalid: level count not a power of two, a level's
    /// slot count not a power of two, a non-positive tick interval, or a
    /// non-positive request capacity.
    #[error("configuration error: {message}")]
    Configuration {
        /// Descriptive error message.
        message: String,
    },

    /// A lifecycle transition was attempted out of order (a second `Start`).
    /// `Stop` before `Start`, or a second `Stop`, is silent rather than an
    /// error — see [`crate::timing::TimingWheel::stop`].
    #[error("lifecycle error: {message}")]
    Lifecycle {
        /// Descriptive error message.
        message: String,
    },

    /// A timer's countdown exceeds the wheel's representable horizon. This
    /// is a defect in the caller's geometry sizing, not a runtime fluke.
    #[error("horizon overflow: countdown of {count} ticks cannot be placed in this wheel's geometry")]
    HorizonOverflow {
        /// The offending countdown, in ticks.
        count: i64,
    },
}

impl Error {
    /// Build a [`Error::Configuration`].
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`Error::Lifecycle`].
    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }

    /// Build a [`Error::HorizonOverflow`].
    pub fn horizon(count: i64) -> Self {
        Self::HorizonOverflow { count }
    }

    /// Category label, used when correlating an error with a metric or a
    /// log field rather than matching on the variant directly.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Lifecycle { .. } => "lifecycle",
            Self::HorizonOverflow { .. } => "horizon",
        }
    }
}
