// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

use crate::buffer::{BufferMode, TransferBuffer};
use crate::core::I2CBus;
use crate::error::{I2CError, Result};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Timeout and retry settings applied to every transfer of a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Last timeout accepted by the native layer
    pub timeout: Option<Duration>,
    /// Last retry count accepted by the native layer
    pub retries: Option<u32>,
}

enum State<B: I2CBus> {
    Idle,
    Open {
        handle: B::Handle,
        context: B::Context,
        slave_address: u16,
        policy: TransferPolicy,
    },
    Closed,
}

impl<B: I2CBus> State<B> {
    fn describe(&self) -> &'static str {
        match *self {
            State::Idle => "not open",
            State::Open { .. } => "open",
            State::Closed => "closed",
        }
    }
}

/// Failure to open a device
///
/// The handle passed to `I2CDevice::open` is given back so the caller
/// keeps ownership of it.
pub struct OpenError<H> {
    error: I2CError,
    handle: H,
}

impl<H> OpenError<H> {
    pub fn error(&self) -> &I2CError {
        &self.error
    }

    /// Take back the handle that could not be opened
    pub fn into_handle(self) -> H {
        self.handle
    }

    pub fn into_parts(self) -> (I2CError, H) {
        (self.error, self.handle)
    }
}

impl<H> fmt::Debug for OpenError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenError")
            .field("error", &self.error)
            .finish()
    }
}

impl<H> fmt::Display for OpenError<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<H> Error for OpenError<H> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

impl<H> From<OpenError<H>> for I2CError {
    fn from(e: OpenError<H>) -> I2CError {
        e.error
    }
}

/// An I2C slave device reached through an opened bus
///
/// A device starts out unopened; `open` takes ownership of a bus handle
/// and binds the slave address, after which transfers may be issued.
/// `close` (or dropping the device) gives the handle back to the
/// operating system.  Once closed, a device cannot be reopened.
///
/// Every operation blocks the calling thread until the native layer
/// returns, bounded by the configured timeout and retry count.
pub struct I2CDevice<B: I2CBus> {
    name: String,
    bus: B,
    state: State<B>,
}

impl<B: I2CBus> I2CDevice<B> {
    /// Create an unopened device; `name` is only used for diagnostics
    pub fn new<S: Into<String>>(name: S, bus: B) -> I2CDevice<B> {
        I2CDevice {
            name: name.into(),
            bus,
            state: State::Idle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    /// The bound slave address, while the device is open
    pub fn slave_address(&self) -> Option<u16> {
        match self.state {
            State::Open { slave_address, .. } => Some(slave_address),
            _ => None,
        }
    }

    /// The active transfer policy, while the device is open
    pub fn policy(&self) -> Option<TransferPolicy> {
        match self.state {
            State::Open { policy, .. } => Some(policy),
            _ => None,
        }
    }

    fn invalid_state(&self) -> I2CError {
        I2CError::InvalidState {
            name: self.name.clone(),
            state: self.state.describe(),
        }
    }

    /// Take ownership of `handle` and bind `slave_address` to it
    ///
    /// Typically the address is expected to be 7-bits but 10-bit addresses
    /// may be supported by the kernel driver in some cases.  Little
    /// validation is done in Rust as the kernel is good at making sure
    /// things are valid.
    ///
    /// If the native layer cannot bind the address the device stays
    /// unopened and the handle is returned inside the error.
    pub fn open(
        &mut self,
        handle: B::Handle,
        slave_address: u16,
    ) -> std::result::Result<(), OpenError<B::Handle>> {
        if !matches!(self.state, State::Idle) {
            return Err(OpenError {
                error: self.invalid_state(),
                handle,
            });
        }
        match self.bus.acquire(&handle, slave_address) {
            Ok(context) => {
                log::debug!("i2c: opened {} at 0x{:02x}", self.name, slave_address);
                self.state = State::Open {
                    handle,
                    context,
                    slave_address,
                    policy: TransferPolicy::default(),
                };
                Ok(())
            }
            Err(error) => Err(OpenError { error, handle }),
        }
    }

    /// Release the bus handle and then the native context
    ///
    /// Closing a device that is not open does nothing.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open {
                handle, context, ..
            } => {
                log::debug!("i2c: closing {}", self.name);
                let closed = self.bus.close(handle);
                let released = self.bus.release(context);
                closed.and(released)
            }
            State::Idle | State::Closed => Ok(()),
        }
    }

    fn open_context(&mut self) -> Result<(&B, &mut B::Context)> {
        if let State::Open {
            ref mut context, ..
        } = self.state
        {
            return Ok((&self.bus, context));
        }
        Err(self.invalid_state())
    }

    /// Read data from the device into `buffer`
    ///
    /// At most `buffer.remaining()` bytes are stored, starting at the
    /// buffer's position.  The position is left where it was; the return
    /// value tells how many bytes arrived.
    pub fn read(&mut self, buffer: &mut TransferBuffer<'_>) -> Result<usize> {
        let mode = buffer.mode();
        let (bus, context) = self.open_context()?;
        let data = buffer.sink().ok_or_else(|| {
            I2CError::invalid_argument("buffer is not direct and has no accessible array")
        })?;
        log::trace!("i2c: read up to {} bytes ({:?})", data.len(), mode);
        match mode {
            BufferMode::Direct => bus.read_direct(context, data),
            _ => bus.read_array(context, data),
        }
    }

    /// Write `length` bytes from `buffer`, starting at its position
    ///
    /// The position is left where it was.
    pub fn write(&mut self, buffer: &TransferBuffer<'_>, length: usize) -> Result<()> {
        let (bus, context) = self.open_context()?;
        log::trace!("i2c: write {} bytes ({:?})", length, buffer.mode());
        match buffer.mode() {
            BufferMode::Direct => bus.write_direct(context, buffer.source(), length),
            BufferMode::Array => bus.write_array(context, buffer.source(), length),
            BufferMode::ReadOnly => Err(I2CError::invalid_argument(
                "buffer is not direct and has no accessible array",
            )),
        }
    }

    /// Write `length_in` bytes and read `length_out` bytes in a single
    /// combined transaction
    ///
    /// Both buffers must be `Direct`: the transaction is handed to the
    /// kernel in one call which needs stable addresses for both halves.
    /// Data is taken from and stored at each buffer's position, and
    /// neither position moves.
    pub fn write_read(
        &mut self,
        buffer_in: &TransferBuffer<'_>,
        length_in: usize,
        buffer_out: &mut TransferBuffer<'_>,
        length_out: usize,
    ) -> Result<()> {
        let (bus, context) = self.open_context()?;
        if buffer_in.mode() != BufferMode::Direct || buffer_out.mode() != BufferMode::Direct {
            return Err(I2CError::invalid_argument("buffers are not direct"));
        }
        let output = buffer_out
            .sink()
            .ok_or_else(|| I2CError::invalid_argument("buffers are not direct"))?;
        log::trace!("i2c: write {} then read {} bytes", length_in, length_out);
        bus.write_read(context, buffer_in.source(), length_in, output, length_out)
    }

    /// Set the timeout for subsequent transfers
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let (bus, context) = self.open_context()?;
        bus.set_timeout(context, timeout)?;
        log::debug!("i2c: {} timeout set to {:?}", self.name, timeout);
        if let State::Open { ref mut policy, .. } = self.state {
            policy.timeout = Some(timeout);
        }
        Ok(())
    }

    /// Set the number of retries for subsequent transfers
    pub fn set_retries(&mut self, retries: u32) -> Result<()> {
        let (bus, context) = self.open_context()?;
        bus.set_retries(context, retries)?;
        log::debug!("i2c: {} retries set to {}", self.name, retries);
        if let State::Open { ref mut policy, .. } = self.state {
            policy.retries = Some(retries);
        }
        Ok(())
    }
}

impl<B: I2CBus> Drop for I2CDevice<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("i2c: error closing {}: {}", self.name, e);
        }
    }
}

impl<B: I2CBus> fmt::Debug for I2CDevice<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("I2CDevice")
            .field("name", &self.name)
            .field("state", &self.state.describe())
            .field("slave_address", &self.slave_address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockI2CBus};
    use std::path::Path;

    const NODE: &str = "/dev/i2c-1";

    fn open_device(bus: &MockI2CBus) -> I2CDevice<MockI2CBus> {
        let handle = bus.open(Path::new(NODE)).unwrap();
        let mut dev = I2CDevice::new(NODE, bus.clone());
        dev.open(handle, 0x50).unwrap();
        bus.clear_calls();
        dev
    }

    #[test]
    fn test_round_trip_preserves_position() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        let mut src = [0xde, 0xad, 0xbe, 0xef];
        let mut tx = TransferBuffer::direct(&mut src);
        dev.write(&tx, 4).unwrap();
        assert_eq!(tx.position(), 0);

        let mut dst = [0u8; 4];
        let mut rx = TransferBuffer::direct(&mut dst);
        assert_eq!(dev.read(&mut rx).unwrap(), 4);
        assert_eq!(rx.position(), 0);
        assert_eq!(rx.as_slice(), tx.as_slice());

        // nonzero positions are honoured and left alone
        tx.set_position(2).unwrap();
        dev.write(&tx, 2).unwrap();
        assert_eq!(tx.position(), 2);
        assert_eq!(bus.pending(), vec![0xbe, 0xef]);
    }

    #[test]
    fn test_dispatch_on_buffer_mode() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        let mut managed = vec![7u8, 8, 9];
        let mut buf = TransferBuffer::array(&mut managed);
        dev.write(&buf, 3).unwrap();
        buf.set_limit(2).unwrap();
        assert_eq!(dev.read(&mut buf).unwrap(), 2);
        assert_eq!(buf.position(), 0);

        let mut direct = [0u8; 1];
        dev.read(&mut TransferBuffer::direct(&mut direct)).unwrap();
        assert_eq!(direct, [9]);

        assert_eq!(
            bus.calls(),
            vec![
                MockCall::WriteArray(3),
                MockCall::ReadArray(2),
                MockCall::ReadDirect(1)
            ]
        );
    }

    #[test]
    fn test_read_only_buffer_makes_no_native_call() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        let bytes = [1u8, 2, 3];
        let mut ro = TransferBuffer::read_only(&bytes);
        assert!(matches!(
            dev.read(&mut ro),
            Err(I2CError::InvalidArgument(_))
        ));
        assert!(matches!(
            dev.write(&ro, 3),
            Err(I2CError::InvalidArgument(_))
        ));
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_oversized_write_is_rejected_by_native_layer() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        let mut src = [0u8; 2];
        let tx = TransferBuffer::direct(&mut src);
        assert!(matches!(
            dev.write(&tx, 3),
            Err(I2CError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_read_is_one_native_call() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        let mut cmd = [0x05, 0x06];
        let mut reply = [0u8; 2];
        let tx = TransferBuffer::direct(&mut cmd);
        let mut rx = TransferBuffer::direct(&mut reply);
        dev.write_read(&tx, 2, &mut rx, 2).unwrap();

        assert_eq!(bus.calls(), vec![MockCall::WriteRead(2, 2)]);
        assert_eq!(rx.as_slice(), &[0x05, 0x06]);
        assert_eq!(tx.position(), 0);
        assert_eq!(rx.position(), 0);
    }

    #[test]
    fn test_write_read_requires_direct_buffers() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        let mut cmd = vec![0x05];
        let mut reply = [0u8; 1];
        let tx = TransferBuffer::array(&mut cmd);
        let mut rx = TransferBuffer::direct(&mut reply);
        assert!(matches!(
            dev.write_read(&tx, 1, &mut rx, 1),
            Err(I2CError::InvalidArgument(_))
        ));
        assert!(bus.calls().is_empty());
    }

    #[test]
    fn test_close_twice_releases_once() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);

        dev.close().unwrap();
        dev.close().unwrap();
        drop(dev);

        // handle first, then context
        assert_eq!(bus.calls(), vec![MockCall::Close(1), MockCall::Release(1)]);
    }

    #[test]
    fn test_drop_closes_open_device() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let dev = open_device(&bus);
        drop(dev);
        assert_eq!(bus.count(|c| matches!(c, MockCall::Release(_))), 1);
    }

    #[test]
    fn test_close_before_open_is_a_no_op() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = I2CDevice::new(NODE, bus.clone());
        dev.close().unwrap();
        assert!(bus.calls().is_empty());

        let handle = bus.open(Path::new(NODE)).unwrap();
        dev.open(handle, 0x50).unwrap();
        assert!(dev.is_open());
    }

    #[test]
    fn test_close_releases_context_when_handle_close_fails() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut dev = open_device(&bus);
        bus.fail_close(true);

        match dev.close() {
            Err(I2CError::Io { context, .. }) => assert!(context.contains("could not close")),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(bus.calls(), vec![MockCall::Close(1), MockCall::Release(1)]);
        assert!(!dev.is_open());

        // already closed, nothing left to release on drop
        drop(dev);
        assert_eq!(bus.count(|c| matches!(c, MockCall::Release(_))), 1);
    }

    #[test]
    fn test_operations_outside_open_state() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        let mut idle = I2CDevice::new(NODE, bus.clone());
        let mut data = [0u8; 1];
        assert!(matches!(
            idle.read(&mut TransferBuffer::direct(&mut data)),
            Err(I2CError::InvalidState { state: "not open", .. })
        ));
        assert_eq!(bus.count(MockCall::is_transfer), 0);

        let mut dev = open_device(&bus);
        dev.close().unwrap();
        bus.clear_calls();

        let mut buf = TransferBuffer::direct(&mut data);
        assert!(matches!(dev.read(&mut buf), Err(I2CError::InvalidState { .. })));
        assert!(matches!(dev.write(&buf, 1), Err(I2CError::InvalidState { .. })));
        assert!(matches!(
            dev.set_timeout(Duration::from_millis(10)),
            Err(I2CError::InvalidState { .. })
        ));
        assert!(matches!(dev.set_retries(1), Err(I2CError::InvalidState { .. })));
        assert!(bus.calls().is_empty());

        // a closed device stays closed
        let handle = bus.open(Path::new(NODE)).unwrap();
        let err = dev.open(handle, 0x50).unwrap_err();
        assert!(matches!(err.error(), I2CError::InvalidState { state: "closed", .. }));
    }

    #[test]
    fn test_failed_open_returns_handle() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        bus.fail_acquire(true);
        let handle = bus.open(Path::new(NODE)).unwrap();
        let mut dev = I2CDevice::new(NODE, bus.clone());

        let err = dev.open(handle, 0x50).unwrap_err();
        assert!(matches!(err.error(), I2CError::Io { .. }));
        assert_eq!(err.into_handle().path(), Path::new(NODE));
        assert!(!dev.is_open());

        bus.fail_acquire(false);
        let handle = bus.open(Path::new(NODE)).unwrap();
        dev.open(handle, 0x51).unwrap();
        assert_eq!(dev.slave_address(), Some(0x51));
    }

    #[test]
    fn test_policy_tracks_accepted_values() {
        let bus = MockI2CBus::with_nodes(vec![NODE]);
        bus.reject_timeout_above(Duration::from_secs(1));
        bus.reject_retries_above(5);
        let mut dev = open_device(&bus);
        assert_eq!(dev.policy(), Some(TransferPolicy::default()));

        dev.set_timeout(Duration::from_millis(200)).unwrap();
        dev.set_retries(3).unwrap();
        assert!(matches!(
            dev.set_timeout(Duration::from_secs(5)),
            Err(I2CError::Io { .. })
        ));
        assert!(matches!(dev.set_retries(9), Err(I2CError::Io { .. })));

        assert_eq!(
            dev.policy(),
            Some(TransferPolicy {
                timeout: Some(Duration::from_millis(200)),
                retries: Some(3),
            })
        );
    }
}
