//! Client configuration
//!
//! Everything that would otherwise be a build-time switch of a boot ROM
//! (discovery protocol, DHCP identity options, retry counts, block size)
//! is a runtime setting here, loadable from JSON.

use crate::error::NetbootError;
use crate::wire::tftp::{TFTP_MAX_BLKSIZE, TFTP_MIN_BLKSIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the client obtains its IP configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Discovery {
    /// DHCP (RFC2131) with BOOTP servers still accepted
    #[default]
    Dhcp,
    /// Plain BOOTP (RFC951): the first valid reply binds
    Bootp,
    /// Reverse ARP (RFC903): IP only, boot file derived from it
    Rarp,
}

/// Boot client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub discovery: Discovery,
    /// Option 60
    pub vendor_class_id: String,
    /// Option 61, sent with hardware type byte 0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Option 77
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_class: Option<String>,
    /// Ask for and record DNS servers (option 6)
    pub request_dns: bool,
    /// Accept ProxyDHCP offers and query the ProxyDHCP server after binding
    pub proxy_dhcp: bool,
    /// Boot file used when the server supplies none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_bootfile: Option<String>,
    /// RARP boot file is this prefix followed by the client IP
    pub rarp_bootfile_prefix: String,
    pub max_bootp_retries: u32,
    pub max_tftp_retries: u32,
    pub max_arp_retries: u32,
    /// Exponent clamp for every backoff
    pub backoff_limit: u32,
    /// Block size requested in the TFTP blksize option
    pub tftp_block_size: u16,
    /// Answer link-aggregation (LACP) partners
    pub lacp: bool,
    /// Give up after this many configure+load attempts; 0 retries forever
    pub max_boot_attempts: u32,
    /// Pause between boot attempts
    pub retry_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            discovery: Discovery::Dhcp,
            vendor_class_id: "Etherboot-5.4".to_string(),
            client_id: None,
            user_class: None,
            request_dns: true,
            proxy_dhcp: true,
            default_bootfile: None,
            rarp_bootfile_prefix: "/tftpboot/kernel.".to_string(),
            max_bootp_retries: 20,
            max_tftp_retries: 20,
            max_arp_retries: 20,
            backoff_limit: 7,
            tftp_block_size: TFTP_MAX_BLKSIZE,
            lacp: true,
            max_boot_attempts: 0,
            retry_delay_secs: 2,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, NetbootError> {
        let config: ClientConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file
    pub fn from_file(path: &Path) -> Result<Self, NetbootError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject settings the protocol engine cannot honour
    pub fn validate(&self) -> Result<(), NetbootError> {
        if !(TFTP_MIN_BLKSIZE..=TFTP_MAX_BLKSIZE).contains(&self.tftp_block_size) {
            return Err(NetbootError::Configuration(format!(
                "tftpBlockSize must be between {TFTP_MIN_BLKSIZE} and {TFTP_MAX_BLKSIZE}, got {}",
                self.tftp_block_size
            )));
        }
        if self.vendor_class_id.len() > 255 {
            return Err(NetbootError::Configuration(
                "vendorClassId longer than 255 bytes".to_string(),
            ));
        }
        for (name, value) in [("clientId", &self.client_id), ("userClass", &self.user_class)] {
            if value.as_ref().is_some_and(|v| v.len() > 254) {
                return Err(NetbootError::Configuration(format!("{name} longer than 254 bytes")));
            }
        }
        if self.max_bootp_retries == 0 || self.max_tftp_retries == 0 || self.max_arp_retries == 0 {
            return Err(NetbootError::Configuration("retry counts must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.tftp_block_size, 1468);
        assert_eq!(config.vendor_class_id, "Etherboot-5.4");
    }

    #[test]
    fn test_camel_case_fields() {
        let config = ClientConfig::from_json(
            r#"{"discovery":"bootp","defaultBootfile":"pxelinux.0","maxBootAttempts":3,"lacp":false}"#,
        )
        .unwrap();
        assert_eq!(config.discovery, Discovery::Bootp);
        assert_eq!(config.default_bootfile.as_deref(), Some("pxelinux.0"));
        assert_eq!(config.max_boot_attempts, 3);
        assert!(!config.lacp);
    }

    #[test]
    fn test_block_size_out_of_range_is_rejected() {
        let err = ClientConfig::from_json(r#"{"tftpBlockSize":8}"#).unwrap_err();
        assert!(matches!(err, NetbootError::Configuration(_)), "got {err:?}");
        assert!(ClientConfig::from_json(r#"{"tftpBlockSize":1469}"#).is_err());
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = ClientConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, NetbootError::Serialization(_)));
    }
}
