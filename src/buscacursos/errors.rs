//! Error types for the BuscaCursos client.

#[derive(Debug, thiserror::Error)]
pub enum BuscaCursosError {
    #[error("BuscaCursos responded with status {status}")]
    Status { status: u16, url: String },
    #[error("Failed to parse response")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    RequestFailed(#[from] reqwest::Error),
}
