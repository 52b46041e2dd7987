// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Current config file version. Increment when making breaking changes.
const CONFIG_VERSION: u32 = 1;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "stackssl.toml";

/// Certificate tree location when neither the CLI, env nor config set one.
pub const DEFAULT_SSL_DIR: &str = "ssl";

/// Environment variable overriding the certificate tree location.
pub const SSL_DIR_ENV: &str = "STACKSSL_DIR";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "STACKSSL_CONFIG";

/// Service names double as directory names and DNS SANs, so they must be
/// a single lowercase DNS label.
static SERVICE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("invalid service name regex")
});

/// Directory names that cannot be used as service names.
pub const RESERVED_NAMES: &[&str] = &["ca"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config file version for future migration support
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_dir: Option<PathBuf>,
    #[serde(default = "default_ca_days")]
    pub ca_days: u32,
    #[serde(default = "default_cert_days")]
    pub cert_days: u32,
    #[serde(default = "default_ca_common_name")]
    pub ca_common_name: String,
    #[serde(default = "default_ca_organization")]
    pub ca_organization: String,
    #[serde(default)]
    pub expiry: ExpiryConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default = "default_services")]
    pub services: Vec<ServiceSpec>,
}

/// Day thresholds for the expiry bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Fewer days remaining than this is critical
    #[serde(default = "default_critical_days")]
    pub critical_days: i64,
    /// Fewer days remaining than this is a warning
    #[serde(default = "default_warning_days")]
    pub warning_days: i64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            critical_days: default_critical_days(),
            warning_days: default_warning_days(),
        }
    }
}

/// Modes and ownership applied to the generated tree so containers can
/// bind-mount it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
    #[serde(default = "default_ca_key_mode")]
    pub ca_key_mode: u32,
    /// Owner applied when running as root
    #[serde(default = "default_owner_id")]
    pub owner_uid: u32,
    #[serde(default = "default_owner_id")]
    pub owner_gid: u32,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            dir_mode: default_dir_mode(),
            file_mode: default_file_mode(),
            ca_key_mode: default_ca_key_mode(),
            owner_uid: default_owner_id(),
            owner_gid: default_owner_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Host the TLS probes connect to
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Where containers mount their certificate directory
    #[serde(default = "default_container_cert_dir")]
    pub container_cert_dir: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            probe_host: default_probe_host(),
            probe_timeout_secs: default_probe_timeout_secs(),
            container_cert_dir: default_container_cert_dir(),
        }
    }
}

/// One service that receives a CA-signed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    /// Additional DNS names or IP addresses beyond the built-in set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_sans: Vec<String>,
    /// TLS port probed by `diagnose`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Container name inspected by `diagnose`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Extra file name the certificate is also written under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_alias: Option<String>,
    /// Extra file name the private key is also written under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alias: Option<String>,
}

impl ServiceSpec {
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            extra_sans: Vec::new(),
            port: Some(port),
            container: Some(name.to_string()),
            cert_alias: None,
            key_alias: None,
        }
    }
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_ca_days() -> u32 {
    3650
}

fn default_cert_days() -> u32 {
    365
}

fn default_ca_common_name() -> String {
    "OpenCTI Root CA".to_string()
}

fn default_ca_organization() -> String {
    "OpenCTI".to_string()
}

fn default_critical_days() -> i64 {
    30
}

fn default_warning_days() -> i64 {
    90
}

fn default_dir_mode() -> u32 {
    0o755
}

fn default_file_mode() -> u32 {
    0o644
}

fn default_ca_key_mode() -> u32 {
    0o600
}

fn default_owner_id() -> u32 {
    1000
}

fn default_probe_host() -> String {
    "localhost".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_container_cert_dir() -> String {
    "/etc/ssl/stack".to_string()
}

/// The five services of the stack and their TLS ports.
pub fn default_services() -> Vec<ServiceSpec> {
    let mut minio = ServiceSpec::new("minio", 9000);
    minio.cert_alias = Some("public.crt".to_string());
    minio.key_alias = Some("private.key".to_string());

    vec![
        ServiceSpec::new("redis", 6380),
        ServiceSpec::new("elasticsearch", 9200),
        minio,
        ServiceSpec::new("rabbitmq", 5671),
        ServiceSpec::new("opencti", 8080),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            ssl_dir: None,
            ca_days: default_ca_days(),
            cert_days: default_cert_days(),
            ca_common_name: default_ca_common_name(),
            ca_organization: default_ca_organization(),
            expiry: ExpiryConfig::default(),
            permissions: PermissionsConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            services: default_services(),
        }
    }
}

/// Check that a service name is usable as a directory name and DNS label.
pub fn validate_service_name(name: &str) -> Result<()> {
    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        return Err(Error::InvalidServiceName {
            name: name.to_string(),
            reason: "reserved for the CA directory".into(),
        });
    }
    if !SERVICE_NAME_REGEX.is_match(name) {
        return Err(Error::InvalidServiceName {
            name: name.to_string(),
            reason: "must be a lowercase DNS label (a-z, 0-9, '-')".into(),
        });
    }
    Ok(())
}

fn validate_alias(service: &ServiceSpec, alias: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Error::Config(format!(
            "service '{}': invalid alias '{}': {}",
            service.name, alias, reason
        ))
    };

    if alias.is_empty() || alias.starts_with('.') {
        return Err(invalid("must be a non-hidden file name"));
    }
    if alias.contains('/') || alias.contains('\\') || alias.contains('\0') {
        return Err(invalid("must not contain path separators"));
    }
    let own = [
        format!("{}.crt", service.name),
        format!("{}.key", service.name),
        "ca.crt".to_string(),
    ];
    if own.iter().any(|name| name == alias) {
        return Err(invalid("collides with a bundle file"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    pub ca_dir: PathBuf,
    pub ca_key: PathBuf,
    pub ca_cert: PathBuf,
}

impl Paths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let ca_dir = base.join("ca");
        Self {
            ca_key: ca_dir.join("ca.key"),
            ca_cert: ca_dir.join("ca.crt"),
            ca_dir,
            base,
        }
    }

    /// Pick the tree location: CLI flag, then `STACKSSL_DIR`, then the
    /// config file, then `./ssl`.
    pub fn resolve(cli: Option<&Path>, config: &Config) -> Self {
        Self::resolve_with_env(cli, std::env::var_os(SSL_DIR_ENV), config)
    }

    fn resolve_with_env(cli: Option<&Path>, env: Option<OsString>, config: &Config) -> Self {
        if let Some(dir) = cli {
            return Self::new(dir);
        }
        if let Some(dir) = env.filter(|v| !v.is_empty()) {
            return Self::new(PathBuf::from(dir));
        }
        match &config.ssl_dir {
            Some(dir) => Self::new(dir),
            None => Self::new(DEFAULT_SSL_DIR),
        }
    }

    pub fn service_dir(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    pub fn service_cert(&self, name: &str) -> PathBuf {
        self.service_dir(name).join(format!("{}.crt", name))
    }

    pub fn service_key(&self, name: &str) -> PathBuf {
        self.service_dir(name).join(format!("{}.key", name))
    }

    /// The CA copy that ships next to each service certificate.
    pub fn service_ca(&self, name: &str) -> PathBuf {
        self.service_dir(name).join("ca.crt")
    }

    pub fn alias_path(&self, name: &str, alias: &str) -> PathBuf {
        self.service_dir(name).join(alias)
    }

    pub fn tree_exists(&self) -> bool {
        self.base.exists()
    }

    pub fn ca_exists(&self) -> bool {
        self.ca_key.exists() && self.ca_cert.exists()
    }

    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| Error::CreateDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl Config {
    /// Pick the config file: CLI flag, then `STACKSSL_CONFIG`, then
    /// `./stackssl.toml`.
    pub fn resolve_path(cli: Option<&Path>) -> PathBuf {
        if let Some(path) = cli {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Load the config, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        use crate::cert::{validate_days, MAX_CERT_DAYS};

        if self.config_version > CONFIG_VERSION {
            tracing::warn!(
                "config version {} is newer than supported version {}; some settings may be ignored",
                self.config_version,
                CONFIG_VERSION
            );
        }

        validate_days(self.cert_days)?;
        if self.ca_days == 0 {
            return Err(Error::InvalidDays("ca_days cannot be 0".into()));
        }
        if self.ca_days > MAX_CERT_DAYS {
            return Err(Error::InvalidDays(format!(
                "ca_days cannot exceed {} (10 years)",
                MAX_CERT_DAYS
            )));
        }

        if self.ca_common_name.trim().is_empty() {
            return Err(Error::Config("ca_common_name cannot be empty".into()));
        }

        if self.expiry.critical_days < 1 {
            return Err(Error::Config("expiry.critical_days must be at least 1".into()));
        }
        if self.expiry.warning_days < self.expiry.critical_days {
            return Err(Error::Config(
                "expiry.warning_days must not be less than expiry.critical_days".into(),
            ));
        }

        for (field, mode) in [
            ("dir_mode", self.permissions.dir_mode),
            ("file_mode", self.permissions.file_mode),
            ("ca_key_mode", self.permissions.ca_key_mode),
        ] {
            if mode > 0o7777 {
                return Err(Error::Config(format!(
                    "permissions.{} must be an octal mode such as 0o644, got {:o}",
                    field, mode
                )));
            }
        }

        if self.diagnostics.probe_host.trim().is_empty() {
            return Err(Error::Config("diagnostics.probe_host cannot be empty".into()));
        }
        if !(1..=300).contains(&self.diagnostics.probe_timeout_secs) {
            return Err(Error::Config(
                "diagnostics.probe_timeout_secs must be between 1 and 300".into(),
            ));
        }

        if self.services.is_empty() {
            return Err(Error::Config("at least one service must be configured".into()));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            validate_service_name(&service.name)?;
            if !seen.insert(service.name.as_str()) {
                return Err(Error::Config(format!(
                    "service '{}' is listed more than once",
                    service.name
                )));
            }
            if service.port == Some(0) {
                return Err(Error::Config(format!(
                    "service '{}': port must be between 1 and 65535",
                    service.name
                )));
            }
            for alias in [&service.cert_alias, &service.key_alias].into_iter().flatten() {
                validate_alias(service, alias)?;
            }
            if service.cert_alias.is_some() && service.cert_alias == service.key_alias {
                return Err(Error::Config(format!(
                    "service '{}': cert_alias and key_alias must differ",
                    service.name
                )));
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        crate::fs::atomic_write(path, content.as_bytes())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }
}
