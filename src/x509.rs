// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse and verify X.509 certificates without shelling out to openssl.

use crate::error::{Error, Result};
use std::path::Path;
use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_after_timestamp: i64,
    pub not_before_timestamp: i64,
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    /// DNS names and IP addresses, in certificate order
    pub subject_alt_names: Vec<String>,
    pub is_ca: bool,
    pub serial: String,
}

fn format_timestamp(timestamp: i64, with_time: bool) -> String {
    match ::time::OffsetDateTime::from_unix_timestamp(timestamp) {
        Ok(dt) if with_time => format!(
            "{}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            dt.year(),
            dt.month() as u8,
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        ),
        Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
        Err(_) => "Invalid date".to_string(),
    }
}

impl CertInfo {
    pub fn expiry_string(&self) -> String {
        format_timestamp(self.not_after_timestamp, false)
    }

    pub fn not_before_string(&self) -> String {
        format_timestamp(self.not_before_timestamp, true)
    }

    pub fn not_after_string(&self) -> String {
        format_timestamp(self.not_after_timestamp, true)
    }

    pub fn days_remaining(&self) -> i64 {
        let now = ::time::OffsetDateTime::now_utc();
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(expiry) => (expiry - now).whole_days(),
            Err(_) => -1, // Treat invalid timestamps as expired
        }
    }

    /// Length of the validity window in seconds.
    pub fn validity_seconds(&self) -> i64 {
        self.not_after_timestamp - self.not_before_timestamp
    }
}

pub fn read_pem_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    parse_cert_pem(&read_pem_file(path)?)
}

fn certificate_der(pem_str: &str) -> Result<Vec<u8>> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    Ok(pem.into_contents())
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;
    Ok(cert)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let der = certificate_der(pem_str)?;
    parse_cert_der(&der)
}

pub fn parse_cert_der(der: &[u8]) -> Result<CertInfo> {
    let cert = parse_der(der)?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let mut subject_alt_names = Vec::new();
    let mut is_ca = false;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => subject_alt_names.push(dns.to_string()),
                        GeneralName::IPAddress(ip_bytes) if ip_bytes.len() == 4 => {
                            let ip = std::net::Ipv4Addr::new(
                                ip_bytes[0],
                                ip_bytes[1],
                                ip_bytes[2],
                                ip_bytes[3],
                            );
                            subject_alt_names.push(ip.to_string());
                        }
                        GeneralName::IPAddress(ip_bytes) if ip_bytes.len() == 16 => {
                            if let Ok(bytes) = <[u8; 16]>::try_from(*ip_bytes) {
                                subject_alt_names.push(std::net::Ipv6Addr::from(bytes).to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                is_ca = bc.ca;
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        not_after_timestamp: cert.validity().not_after.timestamp(),
        not_before_timestamp: cert.validity().not_before.timestamp(),
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        subject_alt_names,
        is_ca,
        serial: cert.raw_serial_as_string(),
    })
}

/// Check that `cert_pem` chains to `ca_pem`: the issuer name matches the
/// CA subject, the signature verifies under the CA key, and both are
/// inside their validity windows.
///
/// Passing the CA as both arguments checks its self-signature.
pub fn verify_issued_by(cert_pem: &str, ca_pem: &str) -> Result<()> {
    let cert_der = certificate_der(cert_pem)?;
    let ca_der = certificate_der(ca_pem)?;
    let cert = parse_der(&cert_der)?;
    let ca = parse_der(&ca_der)?;

    if !ca.is_ca() {
        return Err(Error::NotIssuedBy(format!(
            "'{}' is not a CA certificate",
            ca.subject()
        )));
    }

    if cert.issuer().to_string() != ca.subject().to_string() {
        return Err(Error::NotIssuedBy(format!(
            "issuer '{}' does not match CA subject '{}'",
            cert.issuer(),
            ca.subject()
        )));
    }

    cert.verify_signature(Some(ca.public_key())).map_err(|_| {
        Error::NotIssuedBy(
            "signature does not verify under the CA key (different CA generation?)".into(),
        )
    })?;

    if !ca.validity().is_valid() {
        return Err(Error::NotIssuedBy(format!(
            "CA certificate is outside its validity period (not after {})",
            ca.validity().not_after
        )));
    }

    if !cert.validity().is_valid() {
        return Err(Error::NotIssuedBy(format!(
            "certificate is outside its validity period ({} to {})",
            cert.validity().not_before,
            cert.validity().not_after
        )));
    }

    Ok(())
}

/// File-based variant of [`verify_issued_by`].
pub fn verify_cert_file(cert_path: &Path, ca_path: &Path) -> Result<()> {
    let cert_pem = read_pem_file(cert_path)?;
    let ca_pem = read_pem_file(ca_path)?;
    verify_issued_by(&cert_pem, &ca_pem)
}
