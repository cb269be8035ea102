//! Request-rate thresholds.
//!
//! A threshold pairs a maximum sustained request rate with the period a client
//! stays blocked once it crosses that rate. Thresholds are written in a compact
//! notation, `"<rate> r/s|r/m|r/h, <duration>"`, for example `"60 r/s, 60s"`
//! or `"2 r/s, 5m"`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Error returned when a threshold or request rate cannot be parsed or built.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdError {
    /// The rate has no `r/s`, `r/m` or `r/h` unit suffix
    MissingUnit(String),
    /// The numeric part of the rate is not a number
    InvalidRate(String),
    /// The rate must be strictly positive
    NonPositiveRate(f64),
    /// The blocking period could not be parsed
    InvalidPeriod(String),
    /// The blocking period must be greater than zero
    ZeroPeriod,
    /// The text is not made of exactly two comma separated parts
    Malformed(String),
}

impl fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdError::MissingUnit(text) => {
                write!(f, "request rate '{}' must end with r/s, r/m or r/h", text)
            }
            ThresholdError::InvalidRate(text) => write!(f, "invalid request rate '{}'", text),
            ThresholdError::NonPositiveRate(rate) => {
                write!(f, "request rate must be greater than 0, got {}", rate)
            }
            ThresholdError::InvalidPeriod(text) => write!(f, "invalid blocking period '{}'", text),
            ThresholdError::ZeroPeriod => write!(f, "blocking period must be greater than 0"),
            ThresholdError::Malformed(text) => {
                write!(f, "threshold '{}' must look like '<rate> r/s, <period>'", text)
            }
        }
    }
}

impl std::error::Error for ThresholdError {}

/// Maximum request rate plus the blocking period applied once it is exceeded.
///
/// # Example
/// ```
/// use dos_guard::Threshold;
/// use std::time::Duration;
///
/// let threshold: Threshold = "2 r/s, 5m".parse().unwrap();
/// assert_eq!(threshold.request_rate(), 2.0);
/// assert_eq!(threshold.blocking_period(), Duration::from_secs(300));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    request_rate: f64,
    blocking_period: Duration,
}

impl Threshold {
    /// Threshold used when configuration cannot be parsed: 1 r/s, blocked for 15 minutes.
    pub const DEFAULT: Threshold = Threshold {
        request_rate: 1.0,
        blocking_period: Duration::from_secs(15 * 60),
    };

    /// Create a threshold.
    ///
    /// # Errors
    /// Returns an error if the rate is not strictly positive or the period is zero.
    pub fn new(request_rate: f64, blocking_period: Duration) -> Result<Self, ThresholdError> {
        if !(request_rate > 0.0) || !request_rate.is_finite() {
            return Err(ThresholdError::NonPositiveRate(request_rate));
        }
        if blocking_period.is_zero() {
            return Err(ThresholdError::ZeroPeriod);
        }
        Ok(Self {
            request_rate,
            blocking_period,
        })
    }

    /// Maximum sustained rate, in requests per second.
    pub fn request_rate(&self) -> f64 {
        self.request_rate
    }

    /// How long a client stays blocked after crossing the rate.
    pub fn blocking_period(&self) -> Duration {
        self.blocking_period
    }

    /// Render the threshold in the same notation accepted by the parser.
    pub fn to_description(&self) -> String {
        format!(
            "{} r/s, {}",
            self.request_rate,
            humantime::format_duration(self.blocking_period)
        )
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_description())
    }
}

impl FromStr for Threshold {
    type Err = ThresholdError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.split(',');
        let (Some(rate), Some(period), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ThresholdError::Malformed(text.to_string()));
        };
        let request_rate = parse_request_rate(rate)?;
        let period = period.trim();
        let blocking_period = humantime::parse_duration(period)
            .map_err(|_| ThresholdError::InvalidPeriod(period.to_string()))?;
        Threshold::new(request_rate, blocking_period)
    }
}

/// Parse a request rate such as `"60 r/s"`, `"30 r/m"` or `"100r/h"`.
///
/// The result is normalized to requests per second.
///
/// # Errors
/// Returns an error when the unit is missing or the number is invalid.
pub fn parse_request_rate(text: &str) -> Result<f64, ThresholdError> {
    let normalized = text.trim().to_ascii_lowercase();
    let (number, divisor) = if let Some(number) = normalized.strip_suffix("r/s") {
        (number, 1.0)
    } else if let Some(number) = normalized.strip_suffix("r/m") {
        (number, 60.0)
    } else if let Some(number) = normalized.strip_suffix("r/h") {
        (number, 3600.0)
    } else {
        return Err(ThresholdError::MissingUnit(text.trim().to_string()));
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| ThresholdError::InvalidRate(text.trim().to_string()))?;
    if !(value > 0.0) || !value.is_finite() {
        return Err(ThresholdError::NonPositiveRate(value));
    }
    Ok(value / divisor)
}

/// Parse a threshold, falling back to [`Threshold::DEFAULT`] on malformed input.
///
/// Configuration mistakes never stop the engine: the failure is logged and the
/// conservative default is used instead.
pub fn parse_threshold(text: &str) -> Threshold {
    match text.parse() {
        Ok(threshold) => threshold,
        Err(error) => {
            warn!(
                threshold = text,
                %error,
                "Invalid threshold, falling back to {}",
                Threshold::DEFAULT
            );
            Threshold::DEFAULT
        }
    }
}
