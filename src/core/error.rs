use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Failed to read scene document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Scene document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Remote synthesis failed: {0}")]
    Remote(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Synthesized audio is empty")]
    EmptySource,
    #[error("Failed to spawn transcoder {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Transcoder exited with {status}: {stderr}")]
    Transcode { status: String, stderr: String },
    #[error("Transcoder produced no output")]
    EmptyOutput,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_error_display() {
        let err = PersistError::Transcode {
            status: "exit status: 1".to_string(),
            stderr: "pipe:0: Invalid data found when processing input".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Transcoder exited with exit status: 1: pipe:0: Invalid data found when processing input"
        );
    }

    #[test]
    fn test_storage_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("Failed to write out.mp3");
        let err = PersistError::from(inner);
        assert_eq!(err.to_string(), "Storage error: Failed to write out.mp3: disk full");
    }

    #[test]
    fn test_scene_parse_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SceneError::from(json_err);
        assert!(err.to_string().starts_with("Scene document is not valid JSON"));
    }
}
