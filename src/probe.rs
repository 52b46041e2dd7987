// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Live TLS handshake against a running service, trusting only the stack CA.

use crate::error::{Error, Result};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, ProtocolVersion, RootCertStore};
use std::io::{self, BufReader};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Handshake completed and the peer chain verified
    Handshake {
        peer_subject: Option<String>,
        protocol: String,
    },
    Refused,
    TimedOut,
    Failed(String),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Handshake { .. })
    }
}

/// Client config whose only trust anchor is `ca_pem`.
pub fn client_config(ca_pem: &str) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    for (i, result) in rustls_pemfile::certs(&mut BufReader::new(ca_pem.as_bytes())).enumerate() {
        let cert = result
            .map_err(|e| Error::Tls(format!("Failed to parse CA certificate {}: {}", i + 1, e)))?;
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("Invalid CA certificate: {}", e)))?;
    }
    if roots.is_empty() {
        return Err(Error::Tls("No CA certificate found".into()));
    }

    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(config)
}

/// Connect to `host:port` and complete a TLS handshake using `server_name`
/// for SNI and hostname verification.
///
/// Connection and handshake problems are outcomes, not errors. `Err` is
/// only returned when the CA or server name cannot be used at all.
pub fn probe(
    host: &str,
    port: u16,
    server_name: &str,
    ca_pem: &str,
    timeout: Duration,
) -> Result<ProbeOutcome> {
    let config = Arc::new(client_config(ca_pem)?);
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|e| Error::Tls(format!("Invalid server name '{}': {}", server_name, e)))?;

    let mut sock = match connect(host, port, timeout) {
        Ok(sock) => sock,
        Err(outcome) => return Ok(outcome),
    };
    if let Err(e) = sock
        .set_read_timeout(Some(timeout))
        .and_then(|_| sock.set_write_timeout(Some(timeout)))
    {
        return Ok(ProbeOutcome::Failed(e.to_string()));
    }

    let mut conn =
        ClientConnection::new(config, name).map_err(|e| Error::Tls(e.to_string()))?;

    while conn.is_handshaking() {
        if let Err(e) = conn.complete_io(&mut sock) {
            tracing::debug!(host, port, error = %e, "handshake failed");
            return Ok(io_outcome(&e));
        }
    }

    let peer_subject = conn
        .peer_certificates()
        .and_then(|chain| chain.first())
        .and_then(|leaf: &CertificateDer<'_>| crate::x509::parse_cert_der(leaf).ok())
        .map(|info| info.subject);

    let protocol = match conn.protocol_version() {
        Some(ProtocolVersion::TLSv1_3) => "TLSv1.3".to_string(),
        Some(ProtocolVersion::TLSv1_2) => "TLSv1.2".to_string(),
        Some(other) => format!("{:?}", other),
        None => "unknown".to_string(),
    };

    conn.send_close_notify();
    let _ = conn.complete_io(&mut sock);

    Ok(ProbeOutcome::Handshake {
        peer_subject,
        protocol,
    })
}

fn connect(
    host: &str,
    port: u16,
    timeout: Duration,
) -> std::result::Result<TcpStream, ProbeOutcome> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProbeOutcome::Failed(format!("Cannot resolve {}: {}", host, e)))?;

    let mut last = ProbeOutcome::Failed(format!("No addresses for {}", host));
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(sock) => return Ok(sock),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect failed");
                last = io_outcome(&e);
            }
        }
    }
    Err(last)
}

fn io_outcome(e: &io::Error) -> ProbeOutcome {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => ProbeOutcome::Refused,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProbeOutcome::TimedOut,
        _ => ProbeOutcome::Failed(e.to_string()),
    }
}
