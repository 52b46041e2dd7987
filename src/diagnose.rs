// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Best-effort health report for a deployed certificate tree.
//!
//! Four passes per service: files on disk, chain against the service's own
//! CA copy, the mounted directory inside its container, and a live TLS
//! handshake. Every pass records its finding and moves on.

use crate::config::{Config, Paths, ServiceSpec};
use crate::docker::ContainerRuntime;
use crate::error::{Error, Result};
use crate::expiry::{classify, ExpiryBand};
use crate::inspect::CheckStatus;
use crate::probe::{probe, ProbeOutcome};
use crate::x509::{parse_cert_file, read_pem_file, verify_cert_file};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCheck {
    Valid {
        subject: String,
        subject_alt_names: Vec<String>,
        days_remaining: i64,
        band: ExpiryBand,
    },
    Invalid(String),
    /// Certificate or CA copy missing
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerCheck {
    NotConfigured,
    RuntimeUnavailable(String),
    NotRunning,
    Listing(String),
    ListFailed(String),
}

#[derive(Debug, Clone)]
pub struct ServiceDiagnosis {
    pub name: String,
    pub files: CheckStatus,
    pub chain: ChainCheck,
    pub container: ContainerCheck,
    /// `None` when the service has no port configured
    pub connection: Option<ProbeOutcome>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub ca_files: CheckStatus,
    pub services: Vec<ServiceDiagnosis>,
    critical_days: i64,
}

impl DiagnosticReport {
    /// Bundles with every file present, counting the CA.
    pub fn files_found(&self) -> usize {
        let ca = usize::from(self.ca_files == CheckStatus::Verified);
        ca + self
            .services
            .iter()
            .filter(|s| s.files == CheckStatus::Verified)
            .count()
    }

    pub fn file_total(&self) -> usize {
        self.services.len() + 1
    }

    pub fn chains_valid(&self) -> usize {
        self.services
            .iter()
            .filter(|s| matches!(s.chain, ChainCheck::Valid { .. }))
            .count()
    }

    pub fn handshakes_ok(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.connection.as_ref().is_some_and(ProbeOutcome::is_success))
            .count()
    }

    /// Missing files or invalid chains. Connectivity alone is not an issue.
    pub fn has_issues(&self) -> bool {
        self.files_found() < self.file_total() || self.chains_valid() < self.services.len()
    }

    pub fn issue_count(&self) -> usize {
        (self.file_total() - self.files_found()) + (self.services.len() - self.chains_valid())
    }

    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();

        if self.files_found() < self.file_total() {
            out.push("Run 'stackssl generate' to create missing certificates".to_string());
        }
        if self
            .services
            .iter()
            .any(|s| matches!(s.chain, ChainCheck::Invalid(_)))
        {
            out.push(
                "Some certificates do not verify against their CA copy; run 'stackssl renew'"
                    .to_string(),
            );
        }
        if self
            .services
            .iter()
            .any(|s| s.connection.as_ref().is_some_and(|c| !c.is_success()))
        {
            out.push(
                "Some services are not accessible; check that their containers are running"
                    .to_string(),
            );
        }
        for service in &self.services {
            if let ChainCheck::Valid { days_remaining, .. } = service.chain {
                if days_remaining < self.critical_days {
                    out.push(format!(
                        "{} certificate expires in {} days; run 'stackssl renew'",
                        service.name, days_remaining
                    ));
                }
            }
        }

        out
    }
}

fn check_files(files: &[PathBuf]) -> CheckStatus {
    let missing: Vec<PathBuf> = files.iter().filter(|p| !p.exists()).cloned().collect();
    if missing.is_empty() {
        CheckStatus::Verified
    } else {
        CheckStatus::Missing(missing)
    }
}

fn check_chain(paths: &Paths, config: &Config, name: &str) -> ChainCheck {
    let cert = paths.service_cert(name);
    let ca_copy = paths.service_ca(name);
    if !cert.exists() || !ca_copy.exists() {
        return ChainCheck::Skipped;
    }

    if let Err(e) = verify_cert_file(&cert, &ca_copy) {
        return ChainCheck::Invalid(e.to_string());
    }

    match parse_cert_file(&cert) {
        Ok(info) => {
            let days_remaining = info.days_remaining();
            ChainCheck::Valid {
                subject: info.subject,
                subject_alt_names: info.subject_alt_names,
                days_remaining,
                band: classify(days_remaining, &config.expiry),
            }
        }
        Err(e) => ChainCheck::Invalid(e.to_string()),
    }
}

fn check_container(
    service: &ServiceSpec,
    running: &std::result::Result<Vec<String>, String>,
    runtime: &dyn ContainerRuntime,
    cert_dir: &str,
) -> ContainerCheck {
    let Some(container) = &service.container else {
        return ContainerCheck::NotConfigured;
    };
    let running = match running {
        Ok(names) => names,
        Err(e) => return ContainerCheck::RuntimeUnavailable(e.clone()),
    };
    if !running.iter().any(|n| n == container) {
        return ContainerCheck::NotRunning;
    }
    match runtime.list_dir(container, cert_dir) {
        Ok(listing) => ContainerCheck::Listing(listing),
        Err(e) => ContainerCheck::ListFailed(e.to_string()),
    }
}

fn check_connection(
    service: &ServiceSpec,
    config: &Config,
    ca_pem: Option<&str>,
) -> Option<ProbeOutcome> {
    let port = service.port?;
    let Some(ca_pem) = ca_pem else {
        return Some(ProbeOutcome::Failed("CA certificate unavailable".into()));
    };
    let host = &config.diagnostics.probe_host;
    let timeout = Duration::from_secs(config.diagnostics.probe_timeout_secs);

    let outcome = probe(host, port, host, ca_pem, timeout)
        .unwrap_or_else(|e| ProbeOutcome::Failed(e.to_string()));
    tracing::debug!(service = %service.name, port, ?outcome, "probed service");
    Some(outcome)
}

/// Run every diagnostic pass. Fails only when the tree itself is absent.
pub fn diagnose(
    paths: &Paths,
    config: &Config,
    runtime: &dyn ContainerRuntime,
) -> Result<DiagnosticReport> {
    if !paths.tree_exists() {
        return Err(Error::TreeMissing(paths.base.clone()));
    }

    let ca_files = check_files(&[paths.ca_key.clone(), paths.ca_cert.clone()]);

    let needs_runtime = config.services.iter().any(|s| s.container.is_some());
    let running = if needs_runtime {
        runtime.running_containers().map_err(|e| e.to_string())
    } else {
        Ok(Vec::new())
    };

    let ca_pem = read_pem_file(&paths.ca_cert).ok();
    let cert_dir = &config.diagnostics.container_cert_dir;

    let services = config
        .services
        .iter()
        .map(|service| {
            let name = &service.name;
            let service_ca = read_pem_file(&paths.service_ca(name)).ok();
            ServiceDiagnosis {
                name: name.clone(),
                files: check_files(&[
                    paths.service_key(name),
                    paths.service_cert(name),
                    paths.service_ca(name),
                ]),
                chain: check_chain(paths, config, name),
                container: check_container(service, &running, runtime, cert_dir),
                connection: check_connection(
                    service,
                    config,
                    ca_pem.as_deref().or(service_ca.as_deref()),
                ),
            }
        })
        .collect();

    Ok(DiagnosticReport {
        ca_files,
        services,
        critical_days: config.expiry.critical_days,
    })
}
