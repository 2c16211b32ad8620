use thiserror::Error;

/// Configuration errors. The only fatal error class: surfaced once at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Read {
        path: String,
        error: std::io::Error,
    },

    #[error("failed to parse config file {path}: {error}")]
    Parse {
        path: String,
        error: serde_json::Error,
    },

    #[error("invalid environment override {key}={value}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Cold tier errors. Retried by the archive worker & never propagated past it.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive serialisation error: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("archive store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        struct TestCase {
            input: String,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: env override
                input: ConfigError::Env {
                    key: "WS_BUFFER_SIZE",
                    value: "lots".to_string(),
                }
                .to_string(),
                expected: "invalid environment override WS_BUFFER_SIZE=lots",
            },
            TestCase {
                // TC1: validation
                input: ConfigError::Invalid("ring_capacity must be > 0".to_string()).to_string(),
                expected: "invalid config: ring_capacity must be > 0",
            },
            TestCase {
                // TC2: archive backend
                input: ArchiveError::Unavailable("disk full".to_string()).to_string(),
                expected: "archive store unavailable: disk full",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input, test.expected, "TC{} failed", index);
        }
    }
}
