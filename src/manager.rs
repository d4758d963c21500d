// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

use crate::core::{I2CBus, Transport};
use crate::device::I2CDevice;
use crate::error::{I2CError, Result};
use crate::service::{Credentials, I2CService, PermissionCheck};
use std::io;
use std::sync::{Arc, Weak};

/// In-process transport to an `I2CService`
///
/// Requests carry the credentials stored in the transport.  The service
/// is referenced weakly: once it has been dropped every request fails
/// with `I2CError::Transport`.
#[derive(Debug)]
pub struct LocalTransport<B, C> {
    service: Weak<I2CService<B, C>>,
    credentials: Credentials,
}

impl<B, C> LocalTransport<B, C> {
    pub fn new(service: &Arc<I2CService<B, C>>, credentials: Credentials) -> LocalTransport<B, C> {
        LocalTransport {
            service: Arc::downgrade(service),
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Replace the credentials sent with subsequent requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    fn service(&self) -> Result<Arc<I2CService<B, C>>> {
        self.service
            .upgrade()
            .ok_or_else(|| I2CError::Transport("I2C service is no longer running".into()))
    }
}

impl<B: I2CBus, C: PermissionCheck> Transport for LocalTransport<B, C> {
    type Handle = B::Handle;

    fn list_available_buses(&self) -> Result<Vec<String>> {
        self.service()?.list_available_buses(&self.credentials)
    }

    fn open_bus(&self, path: &str) -> Result<Option<B::Handle>> {
        self.service()?.open_bus(&self.credentials, path).map(Some)
    }
}

/// Client entry point for enumerating and opening I2C devices
///
/// Requests are forwarded to the service over `T`; opened handles are
/// wrapped in an `I2CDevice` driven through the native layer `B`.  Once
/// a device has been opened the service is no longer involved.
///
/// Transport failures are returned as `I2CError::Transport` and are
/// never retried here: they mean the service cannot be reached, which
/// this side cannot repair.
#[derive(Debug)]
pub struct I2CManager<T, B> {
    transport: T,
    bus: B,
}

impl<T, B> I2CManager<T, B>
where
    B: I2CBus + Clone,
    T: Transport<Handle = B::Handle>,
{
    pub fn new(transport: T, bus: B) -> I2CManager<T, B> {
        I2CManager { transport, bus }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Names of the buses which are available to this client
    pub fn list_buses(&self) -> Result<Vec<String>> {
        self.transport.list_available_buses()
    }

    /// Open the bus `name` and bind it to the device at `slave_address`
    pub fn open_device(&self, name: &str, slave_address: u16) -> Result<I2CDevice<B>> {
        let handle = match self.transport.open_bus(name)? {
            Some(handle) => handle,
            None => {
                return Err(I2CError::io(
                    format!("could not open I2C device {}", name),
                    io::Error::new(io::ErrorKind::NotFound, "service returned no handle"),
                ))
            }
        };

        let mut device = I2CDevice::new(name, self.bus.clone());
        if let Err(e) = device.open(handle, slave_address) {
            let (error, handle) = e.into_parts();
            if let Err(close_err) = self.bus.close(handle) {
                log::warn!("i2c: error closing {}: {}", name, close_err);
            }
            return Err(error);
        }
        Ok(device)
    }
}
