use std::fmt;

use crate::buscacursos::BuscaCursosError;
use crate::data::StoreError;

/// Where a run is. Only failures while resolving the term or opening a
/// session abort the run; everything else is recorded and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    ResolvingTerm,
    PrimarySweep,
    RetrySweep,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolvingTerm => "resolving term",
            Self::PrimarySweep => "primary sweep",
            Self::RetrySweep => "retry sweep",
            Self::Done => "done",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The search for a code could not be completed or its page not parsed.
    #[error("search for '{code}' failed")]
    Fetch {
        code: String,
        #[source]
        source: BuscaCursosError,
    },
    /// A subject, campus, teacher or course lookup failed.
    #[error("could not resolve {entity} '{key}'")]
    Resolution {
        entity: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid course payload: {0}")]
    InvalidPayload(String),
    #[error("failed to save {code} section {section}")]
    Persistence {
        code: String,
        section: i32,
        #[source]
        source: StoreError,
    },
    #[error("crawl aborted during {phase}")]
    Fatal {
        phase: RunPhase,
        #[source]
        source: anyhow::Error,
    },
}

impl CrawlError {
    pub fn fatal(phase: RunPhase, source: impl Into<anyhow::Error>) -> Self {
        Self::Fatal {
            phase,
            source: source.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_message_names_phase() {
        let err = CrawlError::fatal(RunPhase::ResolvingTerm, anyhow::anyhow!("connection refused"));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "crawl aborted during resolving term");
    }

    #[test]
    fn test_invalid_payload_is_not_fatal() {
        let err = CrawlError::InvalidPayload("unknown day 'D'".to_owned());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "invalid course payload: unknown day 'D'");
    }
}
