// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

#[cfg(target_os = "linux")]
mod linux;

use crate::config::Paths;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// What happened when installing the CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustOutcome {
    /// Copied into the anchor directory and the store was refreshed
    Installed { location: PathBuf },
    /// The store already holds this exact certificate
    AlreadyTrusted { store: &'static str },
    /// The platform is not supported; the operator must install by hand
    Manual { instructions: String },
}

pub trait TrustStore {
    fn add_ca(&self, cert_path: &Path) -> Result<TrustOutcome>;
    fn is_trusted(&self, cert_path: &Path) -> Result<bool>;
    fn name(&self) -> &'static str;
}

/// Validate a path for use in trust store operations.
/// Rejects anything that is not an existing regular file and resolves
/// symlinks.
pub fn validate_cert_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::ReadFile {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "File not found"),
        });
    }

    if !path.is_file() {
        return Err(Error::TrustStore(format!(
            "Path is not a regular file: {}",
            path.display()
        )));
    }

    path.canonicalize().map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Steps for installing the CA by hand.
pub fn manual_instructions(cert_path: &Path) -> String {
    format!(
        "Automatic installation is not supported on this system.\n\
         Install {} into your system trust store manually, for example:\n  \
         Debian/Ubuntu: cp <ca.crt> /usr/local/share/ca-certificates/ && update-ca-certificates\n  \
         Fedora/RHEL:   cp <ca.crt> /etc/pki/ca-trust/source/anchors/ && update-ca-trust extract\n  \
         Arch:          cp <ca.crt> /etc/ca-certificates/trust-source/anchors/ && trust extract-compat",
        cert_path.display()
    )
}

pub fn get_trust_store() -> Box<dyn TrustStore> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxTrustStore::detect())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NullTrustStore)
    }
}

pub struct NullTrustStore;

impl TrustStore for NullTrustStore {
    fn add_ca(&self, cert_path: &Path) -> Result<TrustOutcome> {
        Ok(TrustOutcome::Manual {
            instructions: manual_instructions(cert_path),
        })
    }

    fn is_trusted(&self, _cert_path: &Path) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "Unsupported"
    }
}

/// Install the tree's CA certificate into the system trust store.
/// Requires an effective UID of 0.
pub fn install_ca(paths: &Paths, store: &dyn TrustStore) -> Result<TrustOutcome> {
    install_ca_checked(paths, store, crate::fs::is_root())
}

fn install_ca_checked(
    paths: &Paths,
    store: &dyn TrustStore,
    is_root: bool,
) -> Result<TrustOutcome> {
    if !is_root {
        return Err(Error::PrivilegeRequired {
            command: "install-ca".into(),
        });
    }

    if !paths.ca_cert.exists() {
        return Err(Error::CaMissing(paths.ca_dir.clone()));
    }

    let info = crate::x509::parse_cert_file(&paths.ca_cert)?;
    if !info.is_ca {
        return Err(Error::TrustStore(format!(
            "{} is not a CA certificate",
            paths.ca_cert.display()
        )));
    }

    let cert_path = validate_cert_path(&paths.ca_cert)?;
    if store.is_trusted(&cert_path)? {
        return Ok(TrustOutcome::AlreadyTrusted {
            store: store.name(),
        });
    }

    tracing::debug!(store = store.name(), path = %cert_path.display(), "installing CA");
    store.add_ca(&cert_path)
}
