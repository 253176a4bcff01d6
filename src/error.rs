use thiserror::Error;

/// Unified error taxonomy for the resolver core. Variant names mirror the
/// categories in the error-handling design: each one has a fixed local
/// policy and a fixed client-visible effect, applied by the pipeline and
/// transport layers rather than by this enum itself.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("upstream transient failure: {0}")]
    UpstreamTransient(String),

    #[error("upstream returned http status {0}")]
    UpstreamHttpError(u16),

    #[error("forwarder unreachable: {0}")]
    ForwarderUnreachable(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("storage transient failure: {0}")]
    StorageTransient(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("fatal bind failure on {addr}: {source}")]
    BindFatal { addr: String, #[source] source: std::io::Error },

    #[error("tls error: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_query_message_is_descriptive() {
        let err = Error::MalformedQuery("truncated header".to_string());
        assert!(err.to_string().contains("truncated header"));
    }
}
