// Error taxonomy for the routing engine
//
// Every public routing entry point returns one of the four error kinds below
// or success. Backends speak `anyhow`, which is folded into `Fault` at the
// routing boundary.

use std::fmt;

/// Errors surfaced to the stream manager
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    #[error("Fault: {0}")]
    Fault(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Audio service unavailable")]
    Unavailable,
}

impl RoutingError {
    pub fn bad_parameter(msg: impl Into<String>) -> Self {
        Self::BadParameter(msg.into())
    }

    pub fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }
}

impl From<anyhow::Error> for RoutingError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fault(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// Status code seen by the stream manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LeResult {
    Ok,
    Fault,
    BadParameter,
    Busy,
    Unavailable,
}

impl LeResult {
    pub fn is_ok(self) -> bool {
        self == LeResult::Ok
    }
}

impl From<&RoutingError> for LeResult {
    fn from(err: &RoutingError) -> Self {
        match err {
            RoutingError::BadParameter(_) => LeResult::BadParameter,
            RoutingError::Fault(_) => LeResult::Fault,
            RoutingError::Busy(_) => LeResult::Busy,
            RoutingError::Unavailable => LeResult::Unavailable,
        }
    }
}

impl<T> From<&Result<T>> for LeResult {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => LeResult::Ok,
            Err(e) => e.into(),
        }
    }
}

impl fmt::Display for LeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeResult::Ok => "LE_OK",
            LeResult::Fault => "LE_FAULT",
            LeResult::BadParameter => "LE_BAD_PARAMETER",
            LeResult::Busy => "LE_BUSY",
            LeResult::Unavailable => "LE_UNAVAILABLE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_errors_become_faults() {
        let err: RoutingError = anyhow::anyhow!("mixer control missing")
            .context("Cannot apply control")
            .into();
        match err {
            RoutingError::Fault(msg) => {
                assert!(msg.contains("Cannot apply control"));
                assert!(msg.contains("mixer control missing"));
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        let ok: Result<()> = Ok(());
        assert_eq!(LeResult::from(&ok), LeResult::Ok);

        let busy: Result<()> = Err(RoutingError::busy("pcm active"));
        assert_eq!(LeResult::from(&busy), LeResult::Busy);
        assert_eq!(LeResult::from(&busy).to_string(), "LE_BUSY");

        let unavailable: Result<u32> = Err(RoutingError::Unavailable);
        assert_eq!(LeResult::from(&unavailable), LeResult::Unavailable);
        assert!(!LeResult::from(&unavailable).is_ok());
    }
}
