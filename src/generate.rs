// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Full generation run: build a complete tree beside the target, swap it
//! into place, then re-verify every leaf against the new CA.

use crate::ca::Ca;
use crate::cert::ServiceCert;
use crate::config::{Config, Paths};
use crate::error::{Error, Result};
use crate::fs::{
    create_dir, effective_owner, normalize_tree, remove_tree, rename, sibling_temp_path,
};
use crate::x509::verify_cert_file;
use std::path::{Path, PathBuf};

/// Outcome for one service after the new tree is in place.
#[derive(Debug, Clone)]
pub struct GeneratedService {
    pub name: String,
    pub subject_alt_names: Vec<String>,
    /// `None` when the leaf verified against the CA
    pub failure: Option<String>,
}

impl GeneratedService {
    pub fn verified(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub base: PathBuf,
    /// Whether an existing tree was replaced
    pub replaced: bool,
    /// Ownership applied to the tree, if any
    pub owner: Option<(u32, u32)>,
    pub services: Vec<GeneratedService>,
}

impl GenerationReport {
    pub fn failed(&self) -> usize {
        self.services.iter().filter(|s| !s.verified()).count()
    }
}

/// Generate the CA and every configured service certificate.
///
/// With `overwrite` false an existing tree is an error. Nothing under
/// `paths.base` changes unless the whole tree was built successfully.
pub fn generate(paths: &Paths, config: &Config, overwrite: bool) -> Result<GenerationReport> {
    config.validate()?;

    let replaced = paths.tree_exists();
    if replaced && !overwrite {
        return Err(Error::TreeExists(paths.base.clone()));
    }

    let staging_dir = sibling_temp_path(&paths.base, "staging")?;
    let staging = Paths::new(&staging_dir);
    let owner = effective_owner(&config.permissions);

    tracing::debug!(staging = %staging_dir.display(), "building certificate tree");
    let issued = match build_tree(&staging, config, owner) {
        Ok(issued) => issued,
        Err(e) => {
            discard_staging(&staging_dir);
            return Err(e);
        }
    };

    swap_into_place(&staging_dir, &paths.base)?;

    let services = issued
        .into_iter()
        .map(|leaf| {
            let failure = verify_cert_file(&paths.service_cert(&leaf.service), &paths.ca_cert)
                .err()
                .map(|e| e.to_string());
            GeneratedService {
                name: leaf.service,
                subject_alt_names: leaf.subject_alt_names,
                failure,
            }
        })
        .collect();

    Ok(GenerationReport {
        base: paths.base.clone(),
        replaced,
        owner,
        services,
    })
}

fn build_tree(
    staging: &Paths,
    config: &Config,
    owner: Option<(u32, u32)>,
) -> Result<Vec<ServiceCert>> {
    create_dir(&staging.base)?;

    let ca = Ca::generate(config, config.ca_days)?;
    ca.save(staging)?;

    let mut issued = Vec::with_capacity(config.services.len());
    for service in &config.services {
        let leaf = ServiceCert::issue(&ca, service, config.cert_days)?;
        leaf.save(staging, service, &ca.cert_pem)?;
        issued.push(leaf);
    }

    normalize_tree(
        &staging.base,
        &config.permissions,
        &[staging.ca_key.clone()],
        owner,
    )?;

    Ok(issued)
}

/// Move `staging` to `target`. An existing target is renamed aside first
/// and put back if the second rename fails.
fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    let previous = if target.exists() {
        let aside = match sibling_temp_path(target, "old") {
            Ok(aside) => aside,
            Err(e) => {
                discard_staging(staging);
                return Err(e);
            }
        };
        if let Err(e) = rename(target, &aside) {
            discard_staging(staging);
            return Err(e);
        }
        Some(aside)
    } else {
        None
    };

    if let Err(e) = rename(staging, target) {
        if let Some(aside) = &previous {
            if let Err(restore) = rename(aside, target) {
                tracing::warn!(error = %restore, "failed to restore previous tree");
            }
        }
        discard_staging(staging);
        return Err(e);
    }

    tracing::debug!(target = %target.display(), "swapped new tree into place");

    if let Some(aside) = previous {
        // The new tree is already live
        if let Err(e) = remove_tree(&aside) {
            tracing::warn!(path = %aside.display(), error = %e, "failed to remove previous tree");
        }
    }

    Ok(())
}

fn discard_staging(staging: &Path) {
    if let Err(e) = remove_tree(staging) {
        tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging tree");
    }
}
