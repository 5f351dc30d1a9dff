//! Container engine contract.

use async_trait::async_trait;
use sandbox_common::EngineError;
use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Options for creating one instance container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateContainerOpts {
    pub image: String,
    pub session_id: String,
    pub pwd_ip_address: String,
    pub container_name: String,
    pub hostname: String,
    pub server_cert: Vec<u8>,
    pub server_key: Vec<u8>,
    pub ca_cert: Vec<u8>,
    pub privileged: bool,
    pub host_fqdn: String,
}

/// Duplex byte channel to an instance's interactive terminal.
pub struct TerminalChannel {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl TerminalChannel {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// Split a single bidirectional stream into a channel.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

/// Creates, attaches to, and removes instance containers.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create and start a container. Returns its IP address.
    async fn create(&self, opts: &CreateContainerOpts) -> Result<String, EngineError>;

    /// Remove a container. Reports [`EngineError::NotFound`] when it does
    /// not exist.
    async fn delete(&self, name: &str) -> Result<(), EngineError>;

    /// Open the interactive terminal of a container.
    async fn attach(&self, name: &str) -> Result<TerminalChannel, EngineError>;

    async fn resize(&self, name: &str, rows: u16, cols: u16) -> Result<(), EngineError>;

    /// Run a command to completion. Returns its exit code.
    async fn exec(&self, name: &str, cmd: &[String]) -> Result<i64, EngineError>;

    /// Run a command to completion, appending its output to `output`.
    async fn exec_capture(
        &self,
        name: &str,
        cmd: &[String],
        output: &mut Vec<u8>,
    ) -> Result<i64, EngineError>;

    /// Stream `content` into `dest/file_name` inside the container.
    async fn copy_into(
        &self,
        name: &str,
        dest: &str,
        file_name: &str,
        content: BoxedReader,
    ) -> Result<(), EngineError>;
}
