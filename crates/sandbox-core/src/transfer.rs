//! File transfer into instances.

use futures_util::TryStreamExt;
use sandbox_common::{Result, SandboxError};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::engine::BoxedReader;
use crate::lifecycle::Sandbox;
use crate::metrics::ActionTimer;
use crate::types::Instance;

impl Sandbox {
    /// Download `url` and stream the body into `dest/file_name` inside the
    /// instance. `dest` must be absolute.
    pub async fn upload_from_url(&self, instance: &Instance, file_name: &str, dest: &str, url: &str) -> Result<()> {
        let _timer = ActionTimer::start("upload_from_url");
        tracing::info!(url, instance = %instance.name, "downloading file");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| SandboxError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(SandboxError::DownloadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let reader: BoxedReader = Box::new(StreamReader::new(Box::pin(body)));

        self.engine
            .copy_into(&instance.name, dest, file_name, reader)
            .await
            .map_err(|e| SandboxError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Stream `reader` into `dest/file_name` inside the instance. A relative
    /// `dest` is resolved against the working directory of the instance's
    /// shell.
    pub async fn upload_from_reader<R>(&self, instance: &Instance, file_name: &str, dest: &str, reader: R) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let _timer = ActionTimer::start("upload_from_reader");
        let dest = self.resolve_destination(instance, dest).await?;

        self.engine
            .copy_into(&instance.name, &dest, file_name, Box::new(reader))
            .await
            .map_err(|e| SandboxError::Upload {
                file_name: file_name.to_string(),
                reason: e.to_string(),
            })
    }

    async fn resolve_destination(&self, instance: &Instance, dest: &str) -> Result<String> {
        if is_absolute(dest) {
            return Ok(dest.to_string());
        }
        let cwd = self.working_directory(instance).await?;
        Ok(format!("{}/{dest}", cwd.trim_end_matches('/')))
    }

    /// Working directory of the instance's interactive shell.
    async fn working_directory(&self, instance: &Instance) -> Result<String> {
        let mut output = Vec::new();
        let code = self
            .engine
            .exec_capture(&instance.name, &self.config.transfer.cwd_command, &mut output)
            .await?;
        let output = String::from_utf8_lossy(&output);
        if code != 0 {
            tracing::warn!(instance = %instance.name, code, output = %output.trim(), "working directory lookup failed");
            return Err(SandboxError::WorkingDirectory { code });
        }
        parse_cwd(&output)
    }
}

/// Container paths are POSIX regardless of the host.
fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

/// Extract the directory from `pwdx` output (`<pid>: <dir>`).
fn parse_cwd(output: &str) -> Result<String> {
    output
        .split_once(':')
        .map(|(_, dir)| dir.trim())
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SandboxError::WorkingDirectoryParse(output.trim().to_string()))
}
