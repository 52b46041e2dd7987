// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::ca::Ca;
use crate::config::{validate_service_name, Paths, ServiceSpec};
use crate::error::{Error, Result};
use crate::fs::atomic_write;
use once_cell::sync::Lazy;
use rcgen::{
    CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair, KeyUsagePurpose, SanType,
};
use regex::Regex;
use std::collections::HashSet;
use std::net::IpAddr;

/// Maximum certificate validity period (10 years).
pub const MAX_CERT_DAYS: u32 = 3650;

/// Names every service certificate carries besides the service name.
pub const LOCALHOST_SANS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Validate that the validity period is within allowed bounds.
///
/// # Errors
/// Returns an error if `days` is 0 or exceeds [`MAX_CERT_DAYS`].
pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::InvalidDays("days cannot be 0".into()));
    }
    if days > MAX_CERT_DAYS {
        return Err(Error::InvalidDays(format!(
            "days cannot exceed {} (10 years)",
            MAX_CERT_DAYS
        )));
    }
    Ok(())
}

/// SAN entries for a service: its name, the loopback names, then any
/// configured extras. Repeats are folded case-insensitively, first one wins.
pub fn san_entries(service: &ServiceSpec) -> Vec<String> {
    let candidates = std::iter::once(service.name.as_str())
        .chain(LOCALHOST_SANS.iter().copied())
        .chain(service.extra_sans.iter().map(String::as_str));

    let mut seen = HashSet::new();
    candidates
        .filter(|entry| seen.insert(entry.to_lowercase()))
        .map(String::from)
        .collect()
}

/// Hostnames with an optional leading wildcard label.
static DNS_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
        .expect("invalid DNS name regex")
});

fn to_san(entry: &str) -> Result<SanType> {
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    let invalid = |reason: &str| Error::InvalidSan {
        value: entry.to_string(),
        reason: reason.to_string(),
    };
    if entry.is_empty() || entry.len() > 253 {
        return Err(invalid("DNS name must be 1-253 characters"));
    }
    if !DNS_NAME_REGEX.is_match(entry) {
        return Err(invalid("not an IP address or DNS name"));
    }
    Ok(SanType::DnsName(
        entry
            .to_string()
            .try_into()
            .map_err(|_| invalid("not an IP address or DNS name"))?,
    ))
}

/// A service's leaf certificate with its private key.
pub struct ServiceCert {
    pub service: String,
    /// The certificate in PEM format.
    pub pem: String,
    /// The private key in PEM format.
    pub key_pem: String,
    pub subject_alt_names: Vec<String>,
}

impl ServiceCert {
    /// Issue a server/client certificate for `service`, signed by `ca`.
    pub fn issue(ca: &Ca, service: &ServiceSpec, days: u32) -> Result<Self> {
        validate_days(days)?;
        validate_service_name(&service.name)?;

        if let Ok(ca_days) = ca.days_remaining() {
            if days as i64 > ca_days {
                tracing::warn!(
                    service = %service.name,
                    "certificate validity ({} days) exceeds CA's remaining validity ({} days)",
                    days,
                    ca_days
                );
            }
        }

        let sans = san_entries(service);

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, service.name.as_str());
        for entry in &sans {
            params.subject_alt_names.push(to_san(entry)?);
        }

        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        // Services both accept TLS and dial each other
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(days as i64);

        let key_pair = KeyPair::generate()?;
        let issuer = ca.issuer()?;
        let cert = params.signed_by(&key_pair, &issuer)?;

        tracing::debug!(service = %service.name, sans = ?sans, days, "issued service certificate");

        Ok(Self {
            service: service.name.clone(),
            pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            subject_alt_names: sans,
        })
    }

    /// Write key, certificate, CA copy and any aliases into the service
    /// directory.
    pub fn save(&self, paths: &Paths, service: &ServiceSpec, ca_pem: &str) -> Result<()> {
        let dir = paths.service_dir(&self.service);
        paths.ensure_dir(&dir)?;

        atomic_write(&paths.service_key(&self.service), self.key_pem.as_bytes())?;
        atomic_write(&paths.service_cert(&self.service), self.pem.as_bytes())?;
        atomic_write(&paths.service_ca(&self.service), ca_pem.as_bytes())?;

        if let Some(alias) = &service.cert_alias {
            atomic_write(&paths.alias_path(&self.service, alias), self.pem.as_bytes())?;
        }
        if let Some(alias) = &service.key_alias {
            atomic_write(&paths.alias_path(&self.service, alias), self.key_pem.as_bytes())?;
        }

        Ok(())
    }
}
