use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed date, slot or instrument serial.
    Format,
    /// Capacity or layout that cannot hold the requested plan.
    Config,
    InvalidInput,
    Io,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanError {
    pub code: ErrorCode,
    pub message: String,
    /// Offending raw value, for operator-facing reports.
    pub value: Option<String>,
}

impl PlanError {
    pub fn format(message: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Format,
            message: message.into(),
            value: Some(value.into()),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Config,
            message: message.into(),
            value: None,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
            value: None,
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{:?}: {} ('{value}')", self.code, self.message),
            None => write!(f, "{:?}: {}", self.code, self.message),
        }
    }
}

impl Error for PlanError {}
