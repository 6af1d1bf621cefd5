use serde::{Deserialize, Serialize};
use tracing::Level;

/// Event severity as configured and as rendered in log files.
///
/// `tracing` stops at `ERROR`; `Fatal` is carried on error events through
/// the `fatal` marker field (see [`crate::fatal!`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "trace")]
    Verbose,
    Debug,
    #[serde(alias = "info")]
    Information,
    #[serde(alias = "warn")]
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn from_level(level: &Level) -> Self {
        match *level {
            Level::TRACE => Severity::Verbose,
            Level::DEBUG => Severity::Debug,
            Level::INFO => Severity::Information,
            Level::WARN => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Directive fragment understood by `EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Severity::Verbose => "trace",
            Severity::Debug => "debug",
            Severity::Information => "info",
            Severity::Warning => "warn",
            Severity::Error | Severity::Fatal => "error",
        }
    }

    /// Three-letter form used by the file template.
    pub fn abbreviation(self) -> &'static str {
        match self {
            Severity::Verbose => "VRB",
            Severity::Debug => "DBG",
            Severity::Information => "INF",
            Severity::Warning => "WRN",
            Severity::Error => "ERR",
            Severity::Fatal => "FTL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_accepts_short_names() {
        let parsed: Vec<Severity> =
            serde_json::from_str(r#"["trace", "debug", "info", "warn", "error", "fatal"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Severity::Verbose,
                Severity::Debug,
                Severity::Information,
                Severity::Warning,
                Severity::Error,
                Severity::Fatal,
            ]
        );
    }

    #[test]
    fn test_fatal_filters_as_error() {
        assert_eq!(Severity::Fatal.as_directive(), "error");
        assert_eq!(Severity::from_level(&Level::ERROR).abbreviation(), "ERR");
        assert_eq!(Severity::Fatal.abbreviation(), "FTL");
    }
}
