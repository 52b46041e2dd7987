// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::process::{run_checked, TRUST_UPDATE_TIMEOUT_SECS};
use crate::trust::{manual_instructions, validate_cert_path, TrustOutcome, TrustStore};
use std::path::{Path, PathBuf};

const TRUST_STORE_CERT_NAME: &str = "stackssl-ca.crt";

pub struct LinuxTrustStore {
    distro: LinuxDistro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinuxDistro {
    Debian, // Ubuntu, Mint, Pop!_OS, etc.
    Fedora, // RHEL, CentOS, Rocky, Alma
    Arch,   // Manjaro, EndeavourOS
    Unknown,
}

impl LinuxDistro {
    fn trust_store_dir(&self) -> Option<&'static Path> {
        match self {
            LinuxDistro::Debian => Some(Path::new("/usr/local/share/ca-certificates")),
            LinuxDistro::Fedora => Some(Path::new("/etc/pki/ca-trust/source/anchors")),
            LinuxDistro::Arch => Some(Path::new("/etc/ca-certificates/trust-source/anchors")),
            LinuxDistro::Unknown => None,
        }
    }

    fn cert_path(&self) -> Option<PathBuf> {
        self.trust_store_dir()
            .map(|dir| dir.join(TRUST_STORE_CERT_NAME))
    }

    fn update_command(&self) -> Option<&'static [&'static str]> {
        match self {
            LinuxDistro::Debian => Some(&["update-ca-certificates"]),
            LinuxDistro::Fedora => Some(&["update-ca-trust", "extract"]),
            LinuxDistro::Arch => Some(&["trust", "extract-compat"]),
            LinuxDistro::Unknown => None,
        }
    }

    /// Detect the family from the `ID` and `ID_LIKE` fields of os-release.
    fn from_os_release(content: &str) -> Self {
        let ids: Vec<String> = content
            .lines()
            .filter_map(|line| {
                line.strip_prefix("ID=")
                    .or_else(|| line.strip_prefix("ID_LIKE="))
            })
            .flat_map(|value| {
                value
                    .trim_matches(|c| c == '"' || c == '\'')
                    .split_whitespace()
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .collect();

        let any = |names: &[&str]| ids.iter().any(|id| names.contains(&id.as_str()));

        if any(&["debian", "ubuntu", "linuxmint", "pop"]) {
            LinuxDistro::Debian
        } else if any(&["fedora", "rhel", "centos", "rocky", "almalinux"]) {
            LinuxDistro::Fedora
        } else if any(&["arch", "manjaro", "endeavouros"]) {
            LinuxDistro::Arch
        } else {
            LinuxDistro::Unknown
        }
    }
}

impl LinuxTrustStore {
    pub fn detect() -> Self {
        let distro = detect_distro();
        tracing::debug!(?distro, "detected Linux distribution");
        Self { distro }
    }
}

impl TrustStore for LinuxTrustStore {
    fn add_ca(&self, cert_path: &Path) -> Result<TrustOutcome> {
        let safe_cert_path = validate_cert_path(cert_path)?;

        let (dest, update_cmd) = match (self.distro.cert_path(), self.distro.update_command()) {
            (Some(dest), Some(cmd)) => (dest, cmd),
            _ => {
                return Ok(TrustOutcome::Manual {
                    instructions: manual_instructions(&safe_cert_path),
                })
            }
        };

        if let Some(dir) = dest.parent() {
            crate::fs::create_dir(dir)?;
        }
        std::fs::copy(&safe_cert_path, &dest).map_err(|e| {
            Error::TrustStore(format!(
                "Failed to copy certificate to {}: {}",
                dest.display(),
                e
            ))
        })?;
        tracing::debug!(dest = %dest.display(), "copied CA into trust anchors");

        run_update_command(update_cmd)?;

        Ok(TrustOutcome::Installed { location: dest })
    }

    fn is_trusted(&self, cert_path: &Path) -> Result<bool> {
        let trust_store_path = match self.distro.cert_path() {
            Some(path) => path,
            None => return Ok(false),
        };

        let trusted_content = match std::fs::read_to_string(&trust_store_path) {
            Ok(content) => content,
            Err(_) => return Ok(false),
        };

        let our_content = std::fs::read_to_string(cert_path).map_err(|e| Error::ReadFile {
            path: cert_path.to_path_buf(),
            source: e,
        })?;

        Ok(normalize_pem(&trusted_content) == normalize_pem(&our_content))
    }

    fn name(&self) -> &'static str {
        match self.distro {
            LinuxDistro::Debian => "Debian/Ubuntu ca-certificates",
            LinuxDistro::Fedora => "Fedora/RHEL ca-trust",
            LinuxDistro::Arch => "Arch trust",
            LinuxDistro::Unknown => "Linux (unknown)",
        }
    }
}

fn normalize_pem(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn detect_distro() -> LinuxDistro {
    if let Ok(content) = std::fs::read_to_string("/etc/os-release") {
        let distro = LinuxDistro::from_os_release(&content);
        if distro != LinuxDistro::Unknown {
            return distro;
        }
    }

    // Fall back to whichever refresh tool is installed
    if Path::new("/usr/sbin/update-ca-certificates").exists() {
        return LinuxDistro::Debian;
    }
    if Path::new("/usr/bin/update-ca-trust").exists() {
        return LinuxDistro::Fedora;
    }
    if Path::new("/usr/bin/trust").exists() {
        return LinuxDistro::Arch;
    }

    LinuxDistro::Unknown
}

fn run_update_command(args: &[&str]) -> Result<()> {
    let (cmd, rest) = args
        .split_first()
        .ok_or_else(|| Error::TrustStore("No command provided".into()))?;

    run_checked(cmd, rest, TRUST_UPDATE_TIMEOUT_SECS).map_err(|e| match e {
        Error::Command { stderr, .. } => {
            Error::TrustStore(format!("Failed to update trust store: {}", stderr))
        }
        other => other,
    })?;

    Ok(())
}
