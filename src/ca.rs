// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Config, Paths};
use crate::error::{Error, Result};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, Issuer, KeyPair,
    KeyUsagePurpose,
};

/// Root CA that signs every service certificate in the tree.
pub struct Ca {
    pub key_pair: KeyPair,
    pub cert_pem: String,
}

impl Ca {
    pub fn generate(config: &Config, days: u32) -> Result<Self> {
        crate::cert::validate_days(days)?;
        let key_pair = KeyPair::generate()?;
        let cert = Self::create_ca_cert(config, &key_pair, days)?;
        let cert_pem = cert.pem();

        tracing::debug!(common_name = %config.ca_common_name, days, "generated CA");
        Ok(Self { key_pair, cert_pem })
    }

    /// Create an Issuer for signing certificates
    ///
    /// Note: This recreates the KeyPair because Issuer takes ownership
    pub fn issuer(&self) -> Result<Issuer<'_, KeyPair>> {
        let key_pem = self.key_pair.serialize_pem();
        let key_pair = KeyPair::from_pem(&key_pem)?;
        Issuer::from_ca_cert_pem(&self.cert_pem, key_pair).map_err(Error::CertGen)
    }

    fn create_ca_cert(config: &Config, key_pair: &KeyPair, days: u32) -> Result<Certificate> {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, config.ca_common_name.as_str());
        params
            .distinguished_name
            .push(DnType::OrganizationName, config.ca_organization.as_str());
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(days as i64);

        Ok(params.self_signed(key_pair)?)
    }

    /// Write `ca/ca.key` and `ca/ca.crt` under the tree root.
    pub fn save(&self, paths: &Paths) -> Result<()> {
        paths.ensure_dir(&paths.ca_dir)?;
        crate::fs::atomic_write(&paths.ca_key, self.key_pair.serialize_pem().as_bytes())?;
        crate::fs::atomic_write(&paths.ca_cert, self.cert_pem.as_bytes())?;
        Ok(())
    }

    pub fn days_remaining(&self) -> Result<i64> {
        let info = crate::x509::parse_cert_pem(&self.cert_pem)?;
        Ok(info.days_remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ca_generate() {
        let ca = Ca::generate(&Config::default(), 30).unwrap();

        assert!(!ca.key_pair.serialize_pem().is_empty());
        assert!(ca.cert_pem.contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_ca_generate_invalid_days() {
        assert!(Ca::generate(&Config::default(), 0).is_err());
        assert!(Ca::generate(&Config::default(), 3651).is_err());
    }

    #[test]
    fn test_ca_validity_is_exact() {
        let ca = Ca::generate(&Config::default(), 3650).unwrap();
        let info = crate::x509::parse_cert_pem(&ca.cert_pem).unwrap();

        assert_eq!(info.validity_seconds(), 3650 * 86_400);
    }

    #[test]
    fn test_ca_days_remaining() {
        let ca = Ca::generate(&Config::default(), 30).unwrap();
        let days = ca.days_remaining().unwrap();

        assert!(days >= 29);
        assert!(days <= 30);
    }

    #[test]
    fn test_ca_save() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::new(dir.path().join("ssl"));
        assert!(!paths.ca_exists());

        let ca = Ca::generate(&Config::default(), 30).unwrap();
        ca.save(&paths).unwrap();
        assert!(paths.ca_exists());

        assert_eq!(std::fs::read_to_string(&paths.ca_cert).unwrap(), ca.cert_pem);
        assert_eq!(
            std::fs::read_to_string(&paths.ca_key).unwrap(),
            ca.key_pair.serialize_pem()
        );
    }
}
