// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Local CA and service certificates for a docker-compose threat-intel stack.
//!
//! ```rust,no_run
//! use stackssl::{generate, verify_tree, Config, Paths};
//!
//! let config = Config::load(&Config::resolve_path(None))?;
//! let paths = Paths::resolve(None, &config);
//!
//! let report = generate(&paths, &config, false)?;
//! assert_eq!(report.failed(), 0);
//!
//! let checks = verify_tree(&paths, &config);
//! println!("{} verified, {} failed", checks.verified(), checks.failed());
//! # Ok::<(), stackssl::Error>(())
//! ```

/// Certificate Authority management.
pub mod ca;
/// Service certificate issuance.
pub mod cert;
/// Configuration handling.
pub mod config;
/// Health report for a deployed tree.
pub mod diagnose;
/// Container runtime access.
pub mod docker;
/// Error types.
pub mod error;
/// Expiry bands.
pub mod expiry;
/// Filesystem utilities.
pub mod fs;
/// Full tree generation.
pub mod generate;
/// Verify, info, expiry and clean operations.
pub mod inspect;
/// TLS connectivity probes.
pub mod probe;
/// External command execution.
pub mod process;
/// System trust store management.
pub mod trust;
/// X.509 certificate parsing.
pub mod x509;

pub use ca::Ca;
pub use cert::{san_entries, validate_days, ServiceCert, LOCALHOST_SANS, MAX_CERT_DAYS};
pub use config::{Config, Paths, ServiceSpec};
pub use diagnose::{diagnose, ChainCheck, ContainerCheck, DiagnosticReport, ServiceDiagnosis};
pub use docker::{ContainerRuntime, DockerCli};
pub use error::{Error, Result};
pub use expiry::{classify, ExpiryBand};
pub use generate::{generate, GeneratedService, GenerationReport};
pub use inspect::{
    clean, describe_tree, expiry_report, verify_tree, CertSummary, CheckEntry, CheckStatus,
    ExpiryEntry, ExpiryStatus, VerifyReport,
};
pub use probe::{probe, ProbeOutcome};
pub use trust::{get_trust_store, install_ca, TrustOutcome, TrustStore};
pub use x509::{parse_cert_file, parse_cert_pem, verify_issued_by, CertInfo};
