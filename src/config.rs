//! The live configuration record. Actually reading and parsing the YAML file
//! from disk is an external collaborator's job (see SPEC_FULL.md §1); this
//! module only defines the shape `serde` deserializes into, its defaults,
//! and light structural validation.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_hostname() -> Ipv4Addr {
    Ipv4Addr::new(127, 0, 0, 1)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_enable")]
    pub enable: bool,
    #[serde(default = "CacheConfig::default_max_size")]
    pub max_size: usize,
    #[serde(default = "CacheConfig::default_ttl")]
    pub ttl: u64,
}

impl CacheConfig {
    fn default_enable() -> bool {
        true
    }
    fn default_max_size() -> usize {
        1000
    }
    fn default_ttl() -> u64 {
        600
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enable: Self::default_enable(), max_size: Self::default_max_size(), ttl: Self::default_ttl() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SslConfig {
    #[serde(default = "SslConfig::default_certfile")]
    pub certfile: String,
    #[serde(default = "SslConfig::default_keyfile")]
    pub keyfile: String,
}

impl SslConfig {
    fn default_certfile() -> String {
        "certs/cert.pem".to_string()
    }
    fn default_keyfile() -> String {
        "certs/key.pem".to_string()
    }
}

impl Default for SslConfig {
    fn default() -> Self {
        Self { certfile: Self::default_certfile(), keyfile: Self::default_keyfile() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsListenConfig {
    #[serde(default = "default_hostname")]
    pub hostname: Ipv4Addr,
    #[serde(default = "DnsListenConfig::default_port")]
    pub port: u16,
    /// `"key:value"` strings, parsed at config-apply time into `custom_map`.
    #[serde(default)]
    pub custom: Vec<String>,
}

impl DnsListenConfig {
    fn default_port() -> u16 {
        53
    }
}

impl Default for DnsListenConfig {
    fn default() -> Self {
        Self { hostname: default_hostname(), port: Self::default_port(), custom: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DohConfig {
    #[serde(default = "default_hostname")]
    pub hostname: Ipv4Addr,
    #[serde(default = "DohConfig::default_port")]
    pub port: u16,
}

impl DohConfig {
    fn default_port() -> u16 {
        5053
    }
}

impl Default for DohConfig {
    fn default() -> Self {
        Self { hostname: default_hostname(), port: Self::default_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DotConfig {
    #[serde(default = "default_hostname")]
    pub hostname: Ipv4Addr,
    #[serde(default = "DotConfig::default_port")]
    pub port: u16,
}

impl DotConfig {
    fn default_port() -> u16 {
        853
    }
}

impl Default for DotConfig {
    fn default() -> Self {
        Self { hostname: default_hostname(), port: Self::default_port() }
    }
}

/// `message-mode` of an upstream: wire `application/dns-message`, or the
/// alternate JSON API (`application/dns-json`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    #[default]
    DnsMessage,
    DnsJson,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseConfig {
    /// raw `"key:value"` custom entries, same syntax as `dns.custom`.
    #[serde(default)]
    pub custom: Vec<String>,
    /// `"<suffix>:<ip>[,<ip>...]"` forwarding rules, evaluated in order.
    #[serde(default)]
    pub forward: Vec<String>,
    #[serde(default)]
    pub target_mode: TargetMode,
    #[serde(default = "BaseConfig::default_target_doh")]
    pub target_doh: Vec<String>,
}

impl BaseConfig {
    fn default_target_doh() -> Vec<String> {
        vec!["https://1.1.1.1/dns-query".to_string()]
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            forward: Vec::new(),
            target_mode: TargetMode::default(),
            target_doh: Self::default_target_doh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdsBlockConfig {
    #[serde(default)]
    pub reload: bool,
    #[serde(default)]
    pub custom: Vec<String>,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default = "AdsBlockConfig::default_blacklist")]
    pub blacklist: Vec<String>,
}

impl AdsBlockConfig {
    fn default_blacklist() -> Vec<String> {
        vec!["https://v.firebog.net/hosts/easyprivacy.txt".to_string()]
    }
}

impl Default for AdsBlockConfig {
    fn default() -> Self {
        Self {
            reload: false,
            custom: Vec::new(),
            whitelist: Vec::new(),
            blacklist: Self::default_blacklist(),
        }
    }
}

/// One flat top-level record with small nested records per concern, per the
/// spec's own redesign guidance — deliberately NOT the deep nested-dataclass
/// shape the source config carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default)]
    pub dns: DnsListenConfig,
    #[serde(default)]
    pub doh: DohConfig,
    #[serde(default)]
    pub dot: DotConfig,
    #[serde(default)]
    pub base: BaseConfig,
    #[serde(default)]
    pub adsblock: AdsBlockConfig,
}

impl Config {
    /// Structural checks the core itself is responsible for, independent of
    /// whatever YAML-level parsing produced this value.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_size == 0 {
            return Err(Error::ConfigInvalid("cache.max_size must be > 0".to_string()));
        }
        if self.base.target_doh.is_empty() {
            return Err(Error::ConfigInvalid("base.target_doh must not be empty".to_string()));
        }
        for rule in &self.base.forward {
            if !rule.contains(':') {
                return Err(Error::ConfigInvalid(format!("invalid forward rule: {rule}")));
            }
        }
        Ok(())
    }

    /// Parse `"key:value"` entries (from `dns.custom` and `base.custom`) into
    /// a merged map, always seeded with the built-in entries from §3.
    pub fn custom_map(&self, hostname: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("1.0.0.127.in-addr.arpa.".to_string(), "localhost.".to_string());
        map.insert("localhost.".to_string(), "127.0.0.1".to_string());
        map.insert(format!("{}.", hostname.to_ascii_lowercase()), "127.0.0.1".to_string());

        for entry in self.dns.custom.iter().chain(self.base.custom.iter()) {
            match entry.split_once(':') {
                Some((key, value)) => {
                    map.insert(format!("{}.", key.trim().to_ascii_lowercase()), value.trim().to_string());
                }
                None => {
                    tracing::error!(entry = %entry, "invalid custom dns entry, skipping");
                }
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn custom_map_always_seeds_localhost() {
        let config = Config::default();
        let map = config.custom_map("myhost");
        assert_eq!(map.get("localhost.").unwrap(), "127.0.0.1");
        assert_eq!(map.get("myhost.").unwrap(), "127.0.0.1");
        assert_eq!(map.get("1.0.0.127.in-addr.arpa.").unwrap(), "localhost.");
    }

    #[test]
    fn custom_map_merges_user_entries() {
        let mut config = Config::default();
        config.dns.custom.push("example.com:1.2.3.4".to_string());
        let map = config.custom_map("myhost");
        assert_eq!(map.get("example.com.").unwrap(), "1.2.3.4");
    }

    #[test]
    fn rejects_zero_cache_size() {
        let mut config = Config::default();
        config.cache.max_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_forward_rule() {
        let mut config = Config::default();
        config.base.forward.push("no-colon-here".to_string());
        assert!(config.validate().is_err());
    }
}
