//! In-process endpoints for the integration tests.
#![allow(dead_code)]

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use rustls::crypto::{aws_lc_rs, CryptoProvider, SupportedKxGroup};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

pub use rustls::crypto::aws_lc_rs::kx_group;

const CERT_PEM: &[u8] = include_bytes!("../fixtures/server.cert.pem");
const KEY_PEM: &[u8] = include_bytes!("../fixtures/server.key.pem");
const SSH_HOST_KEY: &str = include_str!("../fixtures/ssh_host_ed25519_key");

/// A listening endpoint on 127.0.0.1. The server task stops on drop.
pub struct Fixture {
    pub port: u16,
    task: Option<JoinHandle<()>>,
    _listener: Option<TcpListener>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// TLS 1.3 server that only agrees on `groups`.
pub async fn tls_server(groups: &[&'static dyn SupportedKxGroup]) -> Fixture {
    let provider = CryptoProvider {
        kx_groups: groups.to_vec(),
        ..aws_lc_rs::default_provider()
    };
    let cert = CertificateDer::from_pem_slice(CERT_PEM).unwrap();
    let key = PrivateKeyDer::from_pem_slice(KEY_PEM).unwrap();
    let config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let (listener, port) = bind().await;
    let task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let _ = acceptor.accept(stream).await;
            });
        }
    });
    Fixture {
        port,
        task: Some(task),
        _listener: None,
    }
}

/// Handler with every default: all authentication attempts are rejected.
struct RejectAll;

impl russh::server::Handler for RejectAll {
    type Error = russh::Error;
}

/// SSH server that only agrees on `kex`.
pub async fn ssh_server(kex: Vec<russh::kex::Name>) -> Fixture {
    let host_key = russh::keys::PrivateKey::from_openssh(SSH_HOST_KEY).unwrap();
    let config = Arc::new(russh::server::Config {
        keys: vec![host_key],
        preferred: russh::Preferred {
            kex: Cow::Owned(kex),
            ..Default::default()
        },
        auth_rejection_time: Duration::from_millis(10),
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    });

    let (listener, port) = bind().await;
    let task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let config = config.clone();
            tokio::spawn(async move {
                if let Ok(session) = russh::server::run_stream(config, stream, RejectAll).await {
                    let _ = session.await;
                }
            });
        }
    });
    Fixture {
        port,
        task: Some(task),
        _listener: None,
    }
}

/// Plain HTTP server, no TLS.
pub async fn http_server() -> Fixture {
    let app = axum::Router::new().route("/", axum::routing::get(|| async { "hello" }));
    let (listener, port) = bind().await;
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Fixture {
        port,
        task: Some(task),
        _listener: None,
    }
}

/// Listener that completes TCP connects but never reads or writes.
pub async fn silent_listener() -> Fixture {
    let (listener, port) = bind().await;
    Fixture {
        port,
        task: None,
        _listener: Some(listener),
    }
}

/// A port that was just released, so connects are refused.
pub async fn closed_port() -> u16 {
    let (listener, port) = bind().await;
    drop(listener);
    port
}

pub fn classical_ssh_kex() -> Vec<russh::kex::Name> {
    vec![russh::kex::CURVE25519, russh::kex::ECDH_SHA2_NISTP256]
}

pub fn hybrid_ssh_kex() -> Vec<russh::kex::Name> {
    vec![russh::kex::MLKEM768X25519_SHA256, russh::kex::CURVE25519]
}

pub fn pq_ssh_kex() -> Vec<russh::kex::Name> {
    vec![russh::kex::MLKEM768X25519_SHA256]
}
