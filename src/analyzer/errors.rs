use crate::generator::GenerateError;
use crate::session::Superseded;
use crate::trace::validate::Violation;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnalyzeError {
    /// The request did not have the expected shape; nothing was generated
    #[error("Invalid request")]
    InvalidRequest { violations: Vec<Violation> },

    /// The producer call failed; the session keeps its previous trace
    #[error("AI processing failed")]
    Generate(#[from] GenerateError),

    /// A newer request for the same session was issued first
    #[error(transparent)]
    Superseded(#[from] Superseded),
}

impl AnalyzeError {
    pub fn is_superseded(&self) -> bool {
        matches!(self, AnalyzeError::Superseded(_))
    }

    /// Client-facing failure body
    pub fn to_body(&self) -> ErrorBody {
        match self {
            AnalyzeError::InvalidRequest { violations } => ErrorBody {
                error: self.to_string(),
                details: Some(violations.clone()),
            },
            _ => ErrorBody {
                error: self.to_string(),
                details: None,
            },
        }
    }

    /// The message with the underlying cause, for logs and the status bar
    pub fn detailed(&self) -> String {
        match self {
            AnalyzeError::InvalidRequest { violations } => {
                let details: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                format!("{}: {}", self, details.join("; "))
            }
            AnalyzeError::Generate(e) => format!("{}: {}", self, e),
            AnalyzeError::Superseded(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Violation>>,
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str(&self.error),
        }
    }
}
