// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

use crate::config::ServiceConfig;
use crate::core::I2CBus;
use crate::error::{I2CError, Result};
use std::path::Path;

/// Capability required for every service entry point
pub const I2C_PORT: &str = "I2C_PORT";

/// Identity of the process calling into the service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub pid: u32,
    pub uid: u32,
    /// Capabilities granted to the caller
    pub capabilities: Vec<String>,
}

impl Credentials {
    pub fn new(pid: u32, uid: u32) -> Credentials {
        Credentials {
            pid,
            uid,
            capabilities: Vec::new(),
        }
    }

    pub fn grant<S: Into<String>>(mut self, capability: S) -> Credentials {
        self.capabilities.push(capability.into());
        self
    }
}

/// Decides whether a caller holds a capability
pub trait PermissionCheck {
    /// Fail with `PermissionDenied` unless `caller` holds `capability`
    fn enforce(&self, caller: &Credentials, capability: &str) -> Result<()>;
}

/// Grants exactly the capabilities listed in the caller's credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantedCapabilities;

impl PermissionCheck for GrantedCapabilities {
    fn enforce(&self, caller: &Credentials, capability: &str) -> Result<()> {
        if caller.capabilities.iter().any(|c| c == capability) {
            Ok(())
        } else {
            Err(I2CError::PermissionDenied {
                capability: capability.to_string(),
            })
        }
    }
}

/// Registry of the configured I2C buses and gatekeeper for opening them
///
/// The set of ports is fixed when the service is built.  Callers are
/// checked for the `I2C_PORT` capability on every request, before any
/// other work is done; nothing about a previous request is remembered.
#[derive(Debug)]
pub struct I2CService<B, C> {
    ports: Vec<String>,
    bus: B,
    checker: C,
}

impl<B: I2CBus, C: PermissionCheck> I2CService<B, C> {
    pub fn new(config: ServiceConfig, bus: B, checker: C) -> I2CService<B, C> {
        I2CService {
            ports: config.ports().to_vec(),
            bus,
            checker,
        }
    }

    /// All configured ports, present or not
    pub fn ports(&self) -> &[String] {
        &self.ports
    }

    fn enforce(&self, caller: &Credentials) -> Result<()> {
        self.checker.enforce(caller, I2C_PORT).map_err(|e| {
            log::warn!(
                "i2c: denied request from pid {} uid {}: {}",
                caller.pid,
                caller.uid,
                e
            );
            e
        })
    }

    /// The configured ports which currently exist, in configuration order
    ///
    /// The filesystem is scanned on every call.
    pub fn list_available_buses(&self, caller: &Credentials) -> Result<Vec<String>> {
        self.enforce(caller)?;
        let available: Vec<String> = self
            .ports
            .iter()
            .filter(|port| self.bus.probe(Path::new(port.as_str())))
            .cloned()
            .collect();
        log::debug!("i2c: available buses {:?}", available);
        Ok(available)
    }

    /// Open a configured port and hand the handle over to the caller
    ///
    /// Existence is not re-checked: a configured port which has vanished
    /// fails in the native open.  The service keeps no record of the
    /// handles it gives out, and the same port may be opened any number
    /// of times.
    pub fn open_bus(&self, caller: &Credentials, path: &str) -> Result<B::Handle> {
        self.enforce(caller)?;
        if !self.ports.iter().any(|port| port == path) {
            return Err(I2CError::invalid_argument(format!(
                "invalid I2C port {}",
                path
            )));
        }
        log::debug!("i2c: pid {} opening {}", caller.pid, path);
        self.bus.open(Path::new(path))
    }
}
