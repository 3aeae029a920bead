//! SSH capability probe built on russh.
//!
//! Success means the key exchange finished with one of the offered methods.
//! What happens at authentication afterwards does not matter: a rejected
//! login still proves the key exchange method is supported.
use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use russh::client;
use russh::keys::PublicKey;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{self, Instant, Sleep};
use tracing::debug;

use crate::error::ProbeError;
use crate::probe::dial;
use crate::types::{ScanTarget, SshDetails};

/// User name for the single `none` authentication attempt.
const PROBE_USER: &str = "pqc-scan";

/// Accepts whatever host key the server presents and remembers its algorithm.
struct AcceptAnyHostKey {
    host_key_algorithm: Arc<OnceLock<String>>,
}

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let _ = self
            .host_key_algorithm
            .set(server_public_key.algorithm().to_string());
        Ok(true)
    }
}

/// TCP stream whose reads and writes fail once `deadline` passes.
///
/// russh runs the session on a task of its own that owns the stream, so
/// dropping the handshake future does not close the socket. Failing the I/O
/// ends that task and drops the socket at the deadline.
struct DeadlineStream {
    inner: TcpStream,
    deadline: Pin<Box<Sleep>>,
}

impl DeadlineStream {
    fn new(inner: TcpStream, deadline: Instant) -> Self {
        Self {
            inner,
            deadline: Box::pin(time::sleep_until(deadline)),
        }
    }

    fn check(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Err(io::Error::new(io::ErrorKind::TimedOut, "probe deadline passed")),
            Poll::Pending => Ok(()),
        }
    }
}

impl AsyncRead for DeadlineStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.check(cx)?;
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for DeadlineStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.check(cx)?;
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.check(cx)?;
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Client config offering exactly `kex`.
pub fn client_config(kex: &[russh::kex::Name]) -> Result<client::Config, ProbeError> {
    if kex.is_empty() {
        return Err(ProbeError::EmptyKexSet);
    }
    Ok(client::Config {
        preferred: russh::Preferred {
            kex: Cow::Owned(kex.to_vec()),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// One TCP connection and one SSH key exchange offering only `kex`.
pub async fn handshake(
    target: &ScanTarget,
    kex: &[russh::kex::Name],
    deadline: Instant,
    timeout: Duration,
) -> Result<SshDetails, ProbeError> {
    let config = Arc::new(client_config(kex)?);
    let tcp = DeadlineStream::new(dial(target, deadline, timeout).await?, deadline);

    let host_key_algorithm = Arc::new(OnceLock::new());
    let handler = AcceptAnyHostKey {
        host_key_algorithm: host_key_algorithm.clone(),
    };
    // connect_stream returns once the key exchange has finished.
    let mut handle = time::timeout_at(deadline, client::connect_stream(config, tcp, handler))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

    match time::timeout_at(deadline, handle.authenticate_none(PROBE_USER)).await {
        Ok(Ok(_)) => debug!(target = %target, "ssh auth answered after key exchange"),
        Ok(Err(e)) => debug!(target = %target, error = %e, "ssh auth failed after key exchange"),
        Err(_) => debug!(target = %target, "ssh auth timed out after key exchange"),
    }
    match time::timeout_at(
        deadline,
        handle.disconnect(russh::Disconnect::ByApplication, "", "en"),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(target = %target, error = %e, "ssh disconnect failed"),
        Err(_) => debug!(target = %target, "ssh disconnect timed out"),
    }

    Ok(SshDetails {
        host_key_algorithm: host_key_algorithm.get().cloned(),
    })
}
