// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Error taxonomy for the Rack Resiliency Service.

use thiserror::Error;

/// Main error type shared by all RRS components.
#[derive(Error, Debug)]
pub enum RrsError {
    #[error("required configuration missing: {0}")]
    ConfigMissing(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("corrupt document content: {0}")]
    Corrupt(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<kube::Error> for RrsError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => {
                RrsError::NotFound(resp.message.clone())
            }
            _ => RrsError::Transient(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RrsError {
    fn from(err: serde_json::Error) -> Self {
        RrsError::Corrupt(err.to_string())
    }
}

impl From<serde_yaml::Error> for RrsError {
    fn from(err: serde_yaml::Error) -> Self {
        RrsError::Corrupt(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RrsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = RrsError::ConfigMissing("namespace".to_string());
        assert_eq!(
            format!("{}", err),
            "required configuration missing: namespace"
        );

        let err = RrsError::LockTimeout("rrs-mon-dynamic".to_string());
        assert_eq!(
            format!("{}", err),
            "timed out waiting for lock on rrs-mon-dynamic"
        );
    }

    #[test]
    fn test_json_errors_classify_as_corrupt() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        assert!(matches!(RrsError::from(parse_err), RrsError::Corrupt(_)));
    }
}
