// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CA not found at {0}. Run 'stackssl generate' first.")]
    CaMissing(PathBuf),

    #[error("Certificate directory {0} not found. Run 'stackssl generate' first.")]
    TreeMissing(PathBuf),

    #[error("Certificate tree already exists at {0}. Use --yes to regenerate it.")]
    TreeExists(PathBuf),

    #[error("Aborted.")]
    Aborted,

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to set permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("Invalid service name '{name}': {reason}")]
    InvalidServiceName { name: String, reason: String },

    #[error("Invalid subject alternative name '{value}': {reason}")]
    InvalidSan { value: String, reason: String },

    #[error("Invalid validity period: {0}")]
    InvalidDays(String),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Certificate was not issued by this CA: {0}")]
    NotIssuedBy(String),

    #[error("Trust store operation failed: {0}")]
    TrustStore(String),

    #[error("'{command}' requires root privileges.\nRun: sudo stackssl {command}")]
    PrivilegeRequired { command: String },

    #[error("Command '{command}' timed out after {seconds} seconds")]
    CommandTimeout { command: String, seconds: u64 },

    #[error("Command '{command}' not found.\n{hint}")]
    CommandNotFound { command: String, hint: String },

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{failed} check(s) failed")]
    ChecksFailed { failed: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
