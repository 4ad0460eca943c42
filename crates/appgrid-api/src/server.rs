//! Unix socket server: one task per connection, one request per connection.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::protocol::{MAX_MESSAGE_LEN, encode_reply};
use crate::service::Dispatcher;

/// Clients must send their whole request and half-close within this time.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bind `path`, creating its directory and replacing a stale socket file.
///
/// Refuses to replace anything that is not a socket.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => {
            use std::os::unix::fs::FileTypeExt;
            if !metadata.file_type().is_socket() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists but is not a socket", path.display()),
                ));
            }
            debug!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "control socket bound");
    Ok(listener)
}

/// Accept connections until `shutdown` flips to `true`.
pub async fn serve(
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &dispatcher).await {
                            warn!(error = %e, "control connection failed");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    info!("control socket closed");
}

async fn handle_connection(mut stream: UnixStream, dispatcher: &Dispatcher) -> io::Result<()> {
    let request = read_request(&mut stream, REQUEST_TIMEOUT).await?;
    let reply = dispatcher.handle(&request).await;
    stream.write_all(&encode_reply(&reply)).await?;
    stream.shutdown().await
}

/// [`read_message`], failing with `TimedOut` if EOF does not arrive in time.
pub(crate) async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> io::Result<Vec<u8>> {
    tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request not completed in time"))?
}

/// Read until EOF, stopping one byte past the size limit.
pub(crate) async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(MAX_MESSAGE_LEN as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    Ok(buf)
}
