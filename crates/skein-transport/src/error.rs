use std::net::SocketAddr;
use std::time::Duration;

/// Errors returned by the Skein transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind endpoint: {0}")]
    Bind(#[source] anyhow::Error),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to open stream: {0}")]
    Open(#[source] anyhow::Error),

    #[error("failed to accept stream: {0}")]
    Accept(#[source] anyhow::Error),

    #[error("no stream within {0:?}")]
    Timeout(Duration),

    #[error("session is closed")]
    Closed,

    #[error("tls setup failed: {0}")]
    Tls(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<quinn::ConnectionError> for TransportError {
    fn from(e: quinn::ConnectionError) -> Self {
        match e {
            quinn::ConnectionError::LocallyClosed
            | quinn::ConnectionError::ApplicationClosed(_)
            | quinn::ConnectionError::ConnectionClosed(_) => TransportError::Closed,
            other => TransportError::Accept(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_timeout() {
        let err = TransportError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "no stream within 5s");
    }

    #[test]
    fn test_display_config() {
        let err = TransportError::Config("key length 16 is shorter than 32".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: key length 16 is shorter than 32"
        );
    }

    #[test]
    fn test_locally_closed_maps_to_closed() {
        let err: TransportError = quinn::ConnectionError::LocallyClosed.into();
        assert!(matches!(err, TransportError::Closed));
    }
}
