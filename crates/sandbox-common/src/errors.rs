use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures reported by the container engine.
///
/// `NotFound` is kept apart from the other failures because deletion
/// treats a missing container as already deleted.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no such container: {0}")]
    NotFound(String),

    #[error("container engine error: {0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("hostname already in use in session: {0}")]
    HostnameTaken(String),

    #[error("instance {instance} does not belong to session {session}")]
    SessionMismatch { session: String, instance: String },

    #[error("http client error: {0}")]
    HttpClient(String),

    #[error("could not download file [{url}]: {reason}")]
    Download { url: String, reason: String },

    #[error("could not download file [{url}]: status code {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("error while uploading file [{file_name}]: {reason}")]
    Upload { file_name: String, reason: String },

    #[error("error {code} trying to get working directory")]
    WorkingDirectory { code: i64 },

    #[error("unexpected working directory output: {0:?}")]
    WorkingDirectoryParse(String),
}
