//! Domain error types.

use chrono::NaiveDate;

/// Rejection reasons for a single event at ingestion or insertion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventError {
    #[error("horizon must be at least one session, got {0}")]
    NonPositiveHorizon(i64),

    #[error("tilt magnitude must be non-zero and finite, got {0}")]
    InvalidMagnitude(f64),

    #[error("open date {0} is outside the backtest timeline")]
    OutsideTimeline(NaiveDate),

    #[error("empty symbol")]
    EmptySymbol,

    #[error("malformed {field}: '{value}'")]
    Malformed { field: &'static str, value: String },
}

/// Top-level error type for tiltbook.
#[derive(Debug, thiserror::Error)]
pub enum TiltbookError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error in {source_name}: {reason}")]
    Data { source_name: String, reason: String },

    #[error("invalid event in {source_name} line {line}: {reason}")]
    InvalidEvent {
        source_name: String,
        line: u64,
        #[source]
        reason: EventError,
    },

    #[error("no trading dates in range {start} to {end}")]
    EmptyTimeline { start: String, end: String },

    #[error("weights on {date} failed to renormalize (sum = {sum})")]
    Renormalization { date: NaiveDate, sum: f64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TiltbookError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TiltbookError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        TiltbookError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn data(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        TiltbookError::Data {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

impl From<&TiltbookError> for std::process::ExitCode {
    fn from(err: &TiltbookError) -> Self {
        let code: u8 = match err {
            TiltbookError::Io(_) => 1,
            TiltbookError::ConfigParse { .. }
            | TiltbookError::ConfigMissing { .. }
            | TiltbookError::ConfigInvalid { .. } => 2,
            TiltbookError::Data { .. } | TiltbookError::EmptyTimeline { .. } => 3,
            TiltbookError::InvalidEvent { .. } => 4,
            TiltbookError::Renormalization { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_event_message_names_source_and_line() {
        let err = TiltbookError::InvalidEvent {
            source_name: "pead.csv".into(),
            line: 7,
            reason: EventError::NonPositiveHorizon(0),
        };
        let msg = err.to_string();
        assert!(msg.contains("pead.csv"));
        assert!(msg.contains("line 7"));
    }

    #[test]
    fn renormalization_message_includes_date() {
        let err = TiltbookError::Renormalization {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            sum: f64::NAN,
        };
        assert!(err.to_string().contains("2024-03-01"));
    }

    #[test]
    fn helper_constructors_fill_fields() {
        let err = TiltbookError::invalid("risk", "max_leverage", "too small");
        assert!(matches!(err, TiltbookError::ConfigInvalid { ref key, .. } if key == "max_leverage"));
        let err = TiltbookError::missing("backtest", "prices");
        assert!(matches!(err, TiltbookError::ConfigMissing { ref section, .. } if section == "backtest"));
    }
}
