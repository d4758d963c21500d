// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

use crate::error::Result;
use std::path::Path;
use std::time::Duration;

/// Interface to the native I2C layer of a host
///
/// The native layer owns everything below the broker and the device
/// handle: opening bus nodes, binding a slave address to an opened bus
/// and moving bytes.  It keeps no state of its own; the `Handle`
/// produced by `open` and the `Context` produced by `acquire` are owned
/// values which are passed back into every call that needs them.
///
/// Length checks are the responsibility of the implementation.  A
/// request for more bytes than the supplied slice holds must fail with
/// `InvalidArgument`.
pub trait I2CBus {
    /// An opened bus node, e.g. a file descriptor for `/dev/i2c-1`
    type Handle;

    /// A handle bound to one slave address, ready for transfers
    type Context;

    /// Check whether a bus node is currently present
    fn probe(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Open the bus node at `path`
    fn open(&self, path: &Path) -> Result<Self::Handle>;

    /// Bind `slave_address` to an opened bus and return the transfer context
    fn acquire(&self, handle: &Self::Handle, slave_address: u16) -> Result<Self::Context>;

    /// Release an opened bus node
    fn close(&self, handle: Self::Handle) -> Result<()>;

    /// Tear down a transfer context
    fn release(&self, context: Self::Context) -> Result<()>;

    /// Read into memory the kernel may access in place
    fn read_direct(&self, context: &mut Self::Context, data: &mut [u8]) -> Result<usize>;

    /// Read into managed storage through an intermediate copy
    fn read_array(&self, context: &mut Self::Context, data: &mut [u8]) -> Result<usize>;

    /// Write the first `len` bytes of `data` in place
    fn write_direct(&self, context: &mut Self::Context, data: &[u8], len: usize) -> Result<()>;

    /// Write the first `len` bytes of `data` through an intermediate copy
    fn write_array(&self, context: &mut Self::Context, data: &[u8], len: usize) -> Result<()>;

    /// Write `len_in` bytes from `input` and then read `len_out` bytes into
    /// `output` as one combined transaction, without releasing the bus
    /// between the two phases
    fn write_read(
        &self,
        context: &mut Self::Context,
        input: &[u8],
        len_in: usize,
        output: &mut [u8],
        len_out: usize,
    ) -> Result<()>;

    /// Set the timeout applied to subsequent transfers
    fn set_timeout(&self, context: &mut Self::Context, timeout: Duration) -> Result<()>;

    /// Set the number of times the adapter retries a transfer
    fn set_retries(&self, context: &mut Self::Context, retries: u32) -> Result<()>;
}

/// Request/response channel between a client and the bus service
///
/// Failures of the channel itself are reported as `I2CError::Transport`;
/// errors raised by the service (e.g. `PermissionDenied`) are passed
/// through unchanged.
pub trait Transport {
    /// Handle type delivered to the requester on a successful open
    type Handle;

    /// Enumerate the configured buses which are currently present
    fn list_available_buses(&self) -> Result<Vec<String>>;

    /// Open a configured bus
    ///
    /// `Ok(None)` means the service produced no handle without reporting
    /// an error.
    fn open_bus(&self, path: &str) -> Result<Option<Self::Handle>>;
}
