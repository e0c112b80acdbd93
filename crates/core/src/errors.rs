use thiserror::Error;

use crate::validation::FieldErrors;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("unsupported unit `{unit}`")]
    UnsupportedUnit { unit: String },
    #[error("unknown variable kind `{kind}`")]
    InvalidKey { kind: String },
    #[error("record for key `{key}` is missing required fields: {missing:?}")]
    IncompleteRecord { key: String, missing: Vec<String> },
    #[error("defendant must be Tyco or BASF, got `{0}`")]
    InvalidDefendant(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Message safe to surface to a portal user. Internal detail stays in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Domain(DomainError::UnsupportedUnit { unit }) => {
                format!("The unit `{unit}` is not recognized. Re-check the selected unit.")
            }
            Self::Domain(_) => {
                "The submission could not be processed. Check inputs and try again.".to_owned()
            }
            Self::Validation(errors) => {
                format!("Submission rejected: {errors}")
            }
            Self::Persistence(_) => {
                "Failed to save the update due to a system error. No changes were made.".to_owned()
            }
            Self::Integration(_) => {
                "An external service is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::Configuration(_) => "An unexpected internal error occurred.".to_owned(),
        }
    }
}
