/// Failures of a transcode job.
///
/// Every variant is fatal for the job it occurs in; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// Empty or inconsistent stream map, missing encoder option, bad job file.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A backend or scratch buffer could not be allocated.
    #[error("allocation failed: {0}")]
    Allocation(String),
    /// Stream type or codec setup the transcoder does not implement.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// A demux/decode/encode/mux call reported failure.
    #[error("{op} failed: {source:#}")]
    Backend {
        op: &'static str,
        source: anyhow::Error,
    },
    /// A packet reached routing without a presentation timestamp.
    #[error("packet on stream {stream_index} has no presentation timestamp")]
    MissingTimestamp { stream_index: usize },
}

impl TranscodeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn backend(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Backend {
            op,
            source: source.into(),
        }
    }

    /// Adapter for `map_err` on backend calls.
    pub(crate) fn at(op: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Backend { op, source }
    }
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display() {
        let e = TranscodeError::configuration("map is empty");
        assert_eq!(e.to_string(), "configuration error: map is empty");

        let e = TranscodeError::MissingTimestamp { stream_index: 3 };
        assert_eq!(
            e.to_string(),
            "packet on stream 3 has no presentation timestamp"
        );
    }

    #[test]
    fn test_backend_keeps_source() {
        let e = TranscodeError::backend("decode video", anyhow::anyhow!("invalid data"));
        assert_eq!(e.to_string(), "decode video failed: invalid data");
        assert!(e.source().is_some());
    }
}
