// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! # i2cport
//!
//! The `i2cport` crate brokers access to I2C buses exposed by the Linux
//! kernel through the i2c-dev interface:
//! https://www.kernel.org/doc/Documentation/i2c/dev-interface
//!
//! An `I2CService` knows which bus nodes may be handed out and checks
//! every caller for the `I2C_PORT` capability.  Clients go through an
//! `I2CManager`, which asks the service to open a bus over a `Transport`
//! and wraps the returned handle in an `I2CDevice` bound to one slave
//! address.  From then on reads, writes and combined write/read
//! transactions go straight to the native layer.
//!
//! ```no_run
//! # #[cfg(any(target_os = "linux", target_os = "android"))]
//! # fn main() -> i2cport::Result<()> {
//! use std::sync::Arc;
//! use i2cport::{Credentials, GrantedCapabilities, I2CManager, I2CService};
//! use i2cport::{LocalTransport, ServiceConfig, TransferBuffer, I2C_PORT};
//! use i2cport::linux::LinuxI2CBus;
//!
//! let config = ServiceConfig::new(vec!["/dev/i2c-1"])?;
//! let service = Arc::new(I2CService::new(config, LinuxI2CBus, GrantedCapabilities));
//! let caller = Credentials::new(std::process::id(), 0).grant(I2C_PORT);
//! let manager = I2CManager::new(LocalTransport::new(&service, caller), LinuxI2CBus);
//!
//! let mut dev = manager.open_device("/dev/i2c-1", 0x48)?;
//! let mut reg = [0x00];
//! let mut value = [0u8; 2];
//! dev.write_read(
//!     &TransferBuffer::direct(&mut reg),
//!     1,
//!     &mut TransferBuffer::direct(&mut value),
//!     2,
//! )?;
//! dev.close()?;
//! # Ok(())
//! # }
//! # #[cfg(not(any(target_os = "linux", target_os = "android")))]
//! # fn main() {}
//! ```

#![crate_name = "i2cport"]
#![crate_type = "lib"]

pub mod buffer;
pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod manager;
pub mod mock;
pub mod service;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod ffi;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod linux;

pub use crate::buffer::{BufferMode, TransferBuffer};
pub use crate::config::ServiceConfig;
pub use crate::core::{I2CBus, Transport};
pub use crate::device::{I2CDevice, OpenError, TransferPolicy};
pub use crate::error::{I2CError, Result};
pub use crate::manager::{I2CManager, LocalTransport};
pub use crate::service::{Credentials, GrantedCapabilities, I2CService, PermissionCheck, I2C_PORT};
