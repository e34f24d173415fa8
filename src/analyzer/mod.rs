//! The analyze pipeline
//!
//! One request flows through these stages:
//!
//! 1. **Request check** - [`AnalyzeRequest::from_value`] or
//!    [`AnalyzeRequest::check`] reports every malformed field before any
//!    producer call is made
//! 2. **Ticket** - the session store issues the next sequence number
//! 3. **Generate** - the [`TraceGenerator`] produces raw text
//! 4. **Normalize** - the text becomes a canonical [`Trace`], never failing
//! 5. **Validate** - the parsed text is checked for diagnostics only
//! 6. **Complete** - the trace is stored unless a newer request was issued
//!
//! [`Analyzer::begin`] and [`Analyzer::run`] split stages 2 and 3-6 so a
//! caller can learn the sequence number before the producer call starts.

pub mod errors;

pub use errors::{AnalyzeError, ErrorBody};

use crate::generator::TraceGenerator;
use crate::session::{RequestTicket, SessionStore};
use crate::trace::normalize::{normalize_str, strip_code_fence};
use crate::trace::validate::{kind_of, validate, ValidationResult, Validator, Violation};
use crate::trace::Trace;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    TypeScript,
    C,
    Java,
    Pseudo,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::JavaScript,
        Language::Python,
        Language::TypeScript,
        Language::C,
        Language::Java,
        Language::Pseudo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::C => "c",
            Language::Java => "java",
            Language::Pseudo => "pseudo",
        }
    }

    pub fn is_js_family(self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }

    /// Guess the language from a file name
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "py" => Some(Language::Python),
            "ts" | "tsx" | "mts" => Some(Language::TypeScript),
            "c" | "h" => Some(Language::C),
            "java" => Some(Language::Java),
            "txt" | "pseudo" => Some(Language::Pseudo),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Language::ALL.iter().map(|l| l.as_str()).collect();
                format!("expected one of {}", names.join(", "))
            })
    }
}

const BLANK_SESSION_ID: &str = "must not be blank";

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// One analyze request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub language: Language,
    pub code: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_summary: Option<String>,
}

impl AnalyzeRequest {
    pub fn new(language: Language, code: impl Into<String>, session_id: impl Into<String>) -> Self {
        AnalyzeRequest {
            language,
            code: code.into(),
            session_id: session_id.into(),
            previous_summary: None,
        }
    }

    #[must_use]
    pub fn with_previous_summary(mut self, summary: impl Into<String>) -> Self {
        self.previous_summary = Some(summary.into());
        self
    }

    /// Parse a request body, reporting every malformed field at once
    pub fn from_value(body: &Value) -> Result<Self, AnalyzeError> {
        let mut validator = Validator::default();
        let Some(obj) = validator.object("$", body) else {
            return Err(AnalyzeError::InvalidRequest {
                violations: validator.finish().into_violations(),
            });
        };

        let language = match obj.get("language") {
            None => {
                validator.report("language", "missing required field");
                None
            }
            Some(Value::String(s)) => match s.parse::<Language>() {
                Ok(lang) => Some(lang),
                Err(reason) => {
                    validator.report("language", reason);
                    None
                }
            },
            Some(other) => {
                validator.report(
                    "language",
                    format!("expected a string, got {}", kind_of(other)),
                );
                None
            }
        };

        let mut required_string = |key: &str| match obj.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                validator.string(key, other);
                None
            }
            None => {
                validator.report(key, "missing required field");
                None
            }
        };
        let code = required_string("code");
        let session_id = required_string("sessionId");
        if session_id.as_deref().is_some_and(is_blank) {
            validator.report("sessionId", BLANK_SESSION_ID);
        }

        let previous_summary = match obj.get("previousSummary") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                validator.string("previousSummary", other);
                None
            }
        };

        let result = validator.finish();
        match (language, code, session_id) {
            (Some(language), Some(code), Some(session_id)) if result.is_valid() => {
                Ok(AnalyzeRequest {
                    language,
                    code,
                    session_id,
                    previous_summary,
                })
            }
            _ => Err(AnalyzeError::InvalidRequest {
                violations: result.into_violations(),
            }),
        }
    }

    /// Field rules the type alone does not enforce
    pub fn check(&self) -> Result<(), AnalyzeError> {
        if is_blank(&self.session_id) {
            return Err(AnalyzeError::InvalidRequest {
                violations: vec![Violation {
                    path: "sessionId".to_string(),
                    reason: BLANK_SESSION_ID.to_string(),
                }],
            });
        }
        Ok(())
    }
}

/// A completed analysis
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Sequence number of the request that produced this trace
    pub seq: u64,
    pub trace: Arc<Trace>,
    /// Structural problems in the raw producer output. Repaired by
    /// normalization, reported for diagnostics.
    pub violations: Vec<Violation>,
}

#[derive(Clone)]
pub struct Analyzer {
    generator: Arc<dyn TraceGenerator>,
    sessions: Arc<SessionStore>,
}

impl Analyzer {
    pub fn new(generator: Arc<dyn TraceGenerator>) -> Self {
        Self::with_sessions(generator, Arc::new(SessionStore::new()))
    }

    pub fn with_sessions(generator: Arc<dyn TraceGenerator>, sessions: Arc<SessionStore>) -> Self {
        Analyzer {
            generator,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    /// Check the request and take the next sequence number for its session
    pub fn begin(&self, request: &AnalyzeRequest) -> Result<RequestTicket, AnalyzeError> {
        request.check()?;
        Ok(self.sessions.begin_request(&request.session_id))
    }

    /// Generate, normalize and store the trace for a ticket from [`Analyzer::begin`]
    pub async fn run(
        &self,
        ticket: RequestTicket,
        request: &AnalyzeRequest,
    ) -> Result<Analysis, AnalyzeError> {
        let stored_summary = match &request.previous_summary {
            Some(_) => None,
            None => self
                .sessions
                .get(&request.session_id)
                .and_then(|session| session.previous_summary),
        };
        let previous_summary = request.previous_summary.as_deref().or(stored_summary.as_deref());

        debug!(
            "request {} for session '{}': generating with {}",
            ticket.seq,
            ticket.session_id,
            self.generator.name()
        );
        let raw = match self.generator.generate(request, previous_summary).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("request {} failed: {}", ticket.seq, e);
                return Err(e.into());
            }
        };

        let trace = normalize_str(&raw);
        let violations = diagnose(&raw);
        if !violations.is_empty() {
            warn!(
                "request {}: producer output had {} structural problems (repaired)",
                ticket.seq,
                violations.len()
            );
            for violation in &violations {
                debug!("  {}", violation);
            }
        }

        let seq = ticket.seq;
        let trace = self.sessions.complete(&ticket, trace).map_err(|e| {
            warn!("discarding response: {}", e);
            e
        })?;
        debug!("request {}: stored trace with {} steps", seq, trace.len());

        Ok(Analysis {
            seq,
            trace,
            violations,
        })
    }

    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<Analysis, AnalyzeError> {
        let ticket = self.begin(request)?;
        self.run(ticket, request).await
    }

    /// Parse a raw request body, then analyze it
    pub async fn analyze_value(&self, body: &Value) -> Result<Analysis, AnalyzeError> {
        let request = AnalyzeRequest::from_value(body)?;
        self.analyze(&request).await
    }
}

/// Structural problems in raw producer text
fn diagnose(raw: &str) -> Vec<Violation> {
    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(doc) => match validate(&doc) {
            ValidationResult::Valid => Vec::new(),
            ValidationResult::Invalid(violations) => violations,
        },
        Err(e) => vec![Violation {
            path: "$".to_string(),
            reason: format!("not valid JSON: {}", e),
        }],
    }
}
