// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Read-only inspection of a certificate tree, plus `clean`.
//!
//! Inspection never stops at the first problem: every entry is checked and
//! missing files are reported as data rather than errors.

use crate::config::{Config, Paths};
use crate::error::Result;
use crate::expiry::{classify, ExpiryBand};
use crate::fs::remove_tree;
use crate::x509::{parse_cert_file, read_pem_file, verify_cert_file, verify_issued_by, CertInfo};
use std::path::PathBuf;

/// Entry name used for the CA in reports.
pub const CA_ENTRY: &str = "ca";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Verified,
    Missing(Vec<PathBuf>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CheckEntry {
    pub name: String,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub entries: Vec<CheckEntry>,
}

impl VerifyReport {
    pub fn verified(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == CheckStatus::Verified)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.verified()
    }

    pub fn all_verified(&self) -> bool {
        self.failed() == 0
    }
}

fn missing_files(files: &[PathBuf]) -> Vec<PathBuf> {
    files.iter().filter(|p| !p.exists()).cloned().collect()
}

fn check_ca(paths: &Paths) -> CheckStatus {
    let missing = missing_files(&[paths.ca_key.clone(), paths.ca_cert.clone()]);
    if !missing.is_empty() {
        return CheckStatus::Missing(missing);
    }
    match read_pem_file(&paths.ca_cert).and_then(|pem| verify_issued_by(&pem, &pem)) {
        Ok(()) => CheckStatus::Verified,
        Err(e) => CheckStatus::Failed(e.to_string()),
    }
}

fn check_service(paths: &Paths, name: &str) -> CheckStatus {
    let cert = paths.service_cert(name);
    let missing = missing_files(&[paths.service_key(name), cert.clone()]);
    if !missing.is_empty() {
        return CheckStatus::Missing(missing);
    }
    match verify_cert_file(&cert, &paths.ca_cert) {
        Ok(()) => CheckStatus::Verified,
        Err(e) => CheckStatus::Failed(e.to_string()),
    }
}

/// Check the CA and then every configured service against `ca/ca.crt`.
pub fn verify_tree(paths: &Paths, config: &Config) -> VerifyReport {
    let mut entries = vec![CheckEntry {
        name: CA_ENTRY.to_string(),
        status: check_ca(paths),
    }];

    for service in &config.services {
        let status = check_service(paths, &service.name);
        tracing::debug!(service = %service.name, ?status, "verified service");
        entries.push(CheckEntry {
            name: service.name.clone(),
            status,
        });
    }

    VerifyReport { entries }
}

/// Parsed details of one certificate on disk.
#[derive(Debug, Clone)]
pub struct CertSummary {
    pub name: String,
    pub path: PathBuf,
    pub info: std::result::Result<CertInfo, String>,
}

/// Details for the CA and each service certificate. Absent files are
/// skipped.
pub fn describe_tree(paths: &Paths, config: &Config) -> Vec<CertSummary> {
    std::iter::once((CA_ENTRY.to_string(), paths.ca_cert.clone()))
        .chain(
            config
                .services
                .iter()
                .map(|s| (s.name.clone(), paths.service_cert(&s.name))),
        )
        .filter(|(_, path)| path.exists())
        .map(|(name, path)| CertSummary {
            info: parse_cert_file(&path).map_err(|e| e.to_string()),
            name,
            path,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryStatus {
    Remaining {
        days: i64,
        expires: String,
        band: ExpiryBand,
    },
    Missing,
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct ExpiryEntry {
    pub name: String,
    pub status: ExpiryStatus,
}

/// Days until expiry for the CA and each service, classified into bands.
pub fn expiry_report(paths: &Paths, config: &Config) -> Vec<ExpiryEntry> {
    std::iter::once((CA_ENTRY.to_string(), paths.ca_cert.clone()))
        .chain(
            config
                .services
                .iter()
                .map(|s| (s.name.clone(), paths.service_cert(&s.name))),
        )
        .map(|(name, path)| {
            let status = if !path.exists() {
                ExpiryStatus::Missing
            } else {
                match parse_cert_file(&path) {
                    Ok(info) => {
                        let days = info.days_remaining();
                        ExpiryStatus::Remaining {
                            days,
                            expires: info.expiry_string(),
                            band: classify(days, &config.expiry),
                        }
                    }
                    Err(e) => ExpiryStatus::Unreadable(e.to_string()),
                }
            };
            ExpiryEntry { name, status }
        })
        .collect()
}

/// Delete the whole tree. Returns whether anything was removed.
pub fn clean(paths: &Paths) -> Result<bool> {
    let removed = remove_tree(&paths.base)?;
    tracing::debug!(path = %paths.base.display(), removed, "cleaned certificate tree");
    Ok(removed)
}
