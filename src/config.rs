// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! Bus-port configuration
//!
//! The service is configured with an ordered list of bus node paths:
//!
//! ```toml
//! ports = ["/dev/i2c-1", "/dev/i2c-2"]
//! ```
//!
//! The order is preserved and is the order in which available buses are
//! reported.

use crate::error::{I2CError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// The set of bus paths a service may hand out
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    ports: Vec<String>,
}

impl ServiceConfig {
    /// Build a configuration from a list of bus paths
    pub fn new<I, S>(ports: I) -> Result<ServiceConfig>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = ServiceConfig {
            ports: ports.into_iter().map(Into::into).collect(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<ServiceConfig> {
        let config: ServiceConfig =
            toml::from_str(s).map_err(|e| I2CError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServiceConfig> {
        let path = path.as_ref();
        log::debug!("i2c: loading port configuration from {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(|e| I2CError::Config(format!("{}: {}", path.display(), e)))?;
        ServiceConfig::from_toml_str(&contents)
    }

    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for port in &self.ports {
            if port.is_empty() {
                return Err(I2CError::Config("empty port path".into()));
            }
            if !seen.insert(port.as_str()) {
                return Err(I2CError::Config(format!("duplicate port {}", port)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_order() {
        let config = ServiceConfig::from_toml_str(
            r#"
            ports = ["/dev/i2c-2", "/dev/i2c-0", "/dev/i2c-1"]
            "#,
        )
        .unwrap();
        assert_eq!(config.ports(), &["/dev/i2c-2", "/dev/i2c-0", "/dev/i2c-1"]);
    }

    #[test]
    fn test_missing_ports_is_empty() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert!(config.ports().is_empty());
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(matches!(
            ServiceConfig::new(vec!["/dev/i2c-1", "/dev/i2c-1"]),
            Err(I2CError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::new(vec![""]),
            Err(I2CError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("ports = 3"),
            Err(I2CError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("i2cport-no-such-config.toml");
        assert!(matches!(
            ServiceConfig::load(&path),
            Err(I2CError::Config(_))
        ));
    }
}
