//! Client side of the control socket.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::protocol::{ProtocolError, Reply, decode_reply, encode_request};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("socket i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Send one request (`service` followed by its arguments) and wait for the reply.
pub async fn call<S: AsRef<str>>(socket: &Path, tokens: &[S]) -> Result<Reply, ClientError> {
    let mut stream = UnixStream::connect(socket)
        .await
        .map_err(|source| ClientError::Connect {
            path: socket.to_path_buf(),
            source,
        })?;
    stream.write_all(&encode_request(tokens)).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(decode_reply(&buf)?)
}
