// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! In-memory native layer
//!
//! `MockI2CBus` stands in for the kernel: bus nodes are a set of virtual
//! paths, every byte written to any context is queued on a loopback wire
//! and handed back by the next read, and each native call is recorded so
//! that tests can assert on what reached the native layer and in which
//! order.

use crate::core::I2CBus;
use crate::error::{I2CError, Result};
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A native call observed by `MockI2CBus`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Probe(PathBuf),
    Open(PathBuf),
    Acquire { handle: usize, slave_address: u16 },
    Close(usize),
    Release(usize),
    ReadDirect(usize),
    ReadArray(usize),
    WriteDirect(usize),
    WriteArray(usize),
    WriteRead(usize, usize),
    SetTimeout(Duration),
    SetRetries(u32),
}

impl MockCall {
    /// True for calls which move bytes over the bus
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            MockCall::ReadDirect(_)
                | MockCall::ReadArray(_)
                | MockCall::WriteDirect(_)
                | MockCall::WriteArray(_)
                | MockCall::WriteRead(..)
        )
    }
}

#[derive(Debug)]
pub struct MockHandle {
    id: usize,
    path: PathBuf,
}

impl MockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug)]
pub struct MockContext {
    id: usize,
    slave_address: u16,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: BTreeSet<PathBuf>,
    calls: Vec<MockCall>,
    wire: VecDeque<u8>,
    next_id: usize,
    fail_acquire: bool,
    fail_close: bool,
    max_timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl MockState {
    fn record(&mut self, call: MockCall) {
        log::trace!("mock: {:?}", call);
        self.calls.push(call);
    }

    fn push(&mut self, data: &[u8], len: usize) -> Result<()> {
        if len > data.len() {
            return Err(I2CError::invalid_argument(format!(
                "write length {} exceeds buffer capacity {}",
                len,
                data.len()
            )));
        }
        self.wire.extend(&data[..len]);
        Ok(())
    }

    fn pull(&mut self, data: &mut [u8]) -> usize {
        let n = data.len().min(self.wire.len());
        for (slot, byte) in data.iter_mut().zip(self.wire.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

/// Loopback native layer with virtual bus nodes and a call log
///
/// Clones share state, so a test can keep one clone for inspection while
/// the service and the devices under test own others.
#[derive(Debug, Clone, Default)]
pub struct MockI2CBus {
    state: Arc<Mutex<MockState>>,
}

impl MockI2CBus {
    pub fn new() -> MockI2CBus {
        MockI2CBus::default()
    }

    /// Create a bus on which the given nodes are present
    pub fn with_nodes<I, P>(nodes: I) -> MockI2CBus
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let bus = MockI2CBus::new();
        for node in nodes {
            bus.add_node(node);
        }
        bus
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_node<P: Into<PathBuf>>(&self, node: P) {
        self.state().nodes.insert(node.into());
    }

    pub fn remove_node<P: AsRef<Path>>(&self, node: P) {
        self.state().nodes.remove(node.as_ref());
    }

    /// Make every subsequent `acquire` fail, as if the kernel refused the address
    pub fn fail_acquire(&self, fail: bool) {
        self.state().fail_acquire = fail;
    }

    /// Make every subsequent `close` of a handle fail
    pub fn fail_close(&self, fail: bool) {
        self.state().fail_close = fail;
    }

    /// Reject timeouts longer than `max`
    pub fn reject_timeout_above(&self, max: Duration) {
        self.state().max_timeout = Some(max);
    }

    /// Reject retry counts larger than `max`
    pub fn reject_retries_above(&self, max: u32) {
        self.state().max_retries = Some(max);
    }

    /// Bytes written but not yet read back
    pub fn pending(&self) -> Vec<u8> {
        self.state().wire.iter().cloned().collect()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of recorded calls matching `pred`
    pub fn count<F: Fn(&MockCall) -> bool>(&self, pred: F) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }
}

impl I2CBus for MockI2CBus {
    type Handle = MockHandle;
    type Context = MockContext;

    fn probe(&self, path: &Path) -> bool {
        let mut state = self.state();
        state.record(MockCall::Probe(path.to_path_buf()));
        state.nodes.contains(path)
    }

    fn open(&self, path: &Path) -> Result<MockHandle> {
        let mut state = self.state();
        state.record(MockCall::Open(path.to_path_buf()));
        if !state.nodes.contains(path) {
            return Err(I2CError::io(
                format!("could not open {}", path.display()),
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }
        state.next_id += 1;
        Ok(MockHandle {
            id: state.next_id,
            path: path.to_path_buf(),
        })
    }

    fn acquire(&self, handle: &MockHandle, slave_address: u16) -> Result<MockContext> {
        let mut state = self.state();
        state.record(MockCall::Acquire {
            handle: handle.id,
            slave_address,
        });
        if state.fail_acquire {
            return Err(I2CError::io(
                format!("could not set I2C slave address 0x{:02x}", slave_address),
                io::Error::from_raw_os_error(libc::EBUSY),
            ));
        }
        Ok(MockContext {
            id: handle.id,
            slave_address,
        })
    }

    fn close(&self, handle: MockHandle) -> Result<()> {
        let mut state = self.state();
        state.record(MockCall::Close(handle.id));
        if state.fail_close {
            return Err(I2CError::io(
                format!("could not close {}", handle.path.display()),
                io::Error::from_raw_os_error(libc::EIO),
            ));
        }
        Ok(())
    }

    fn release(&self, context: MockContext) -> Result<()> {
        self.state().record(MockCall::Release(context.id));
        Ok(())
    }

    fn read_direct(&self, _context: &mut MockContext, data: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        state.record(MockCall::ReadDirect(data.len()));
        Ok(state.pull(data))
    }

    fn read_array(&self, _context: &mut MockContext, data: &mut [u8]) -> Result<usize> {
        let mut state = self.state();
        state.record(MockCall::ReadArray(data.len()));
        Ok(state.pull(data))
    }

    fn write_direct(&self, _context: &mut MockContext, data: &[u8], len: usize) -> Result<()> {
        let mut state = self.state();
        state.record(MockCall::WriteDirect(len));
        state.push(data, len)
    }

    fn write_array(&self, _context: &mut MockContext, data: &[u8], len: usize) -> Result<()> {
        let mut state = self.state();
        state.record(MockCall::WriteArray(len));
        state.push(data, len)
    }

    fn write_read(
        &self,
        context: &mut MockContext,
        input: &[u8],
        len_in: usize,
        output: &mut [u8],
        len_out: usize,
    ) -> Result<()> {
        let mut state = self.state();
        state.record(MockCall::WriteRead(len_in, len_out));
        if len_out > output.len() {
            return Err(I2CError::invalid_argument(format!(
                "read length {} exceeds buffer capacity {}",
                len_out,
                output.len()
            )));
        }
        state.push(input, len_in)?;
        let n = state.pull(&mut output[..len_out]);
        if n < len_out {
            return Err(I2CError::io(
                format!(
                    "slave 0x{:02x} returned {} of {} bytes",
                    context.slave_address, n, len_out
                ),
                io::Error::from_raw_os_error(libc::EIO),
            ));
        }
        Ok(())
    }

    fn set_timeout(&self, _context: &mut MockContext, timeout: Duration) -> Result<()> {
        let mut state = self.state();
        state.record(MockCall::SetTimeout(timeout));
        match state.max_timeout {
            Some(max) if timeout > max => Err(I2CError::io(
                "could not set I2C timeout",
                io::Error::from_raw_os_error(libc::EINVAL),
            )),
            _ => Ok(()),
        }
    }

    fn set_retries(&self, _context: &mut MockContext, retries: u32) -> Result<()> {
        let mut state = self.state();
        state.record(MockCall::SetRetries(retries));
        match state.max_retries {
            Some(max) if retries > max => Err(I2CError::io(
                "could not set I2C number of retries",
                io::Error::from_raw_os_error(libc::EINVAL),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_returns_written_bytes() {
        let bus = MockI2CBus::with_nodes(vec!["/dev/i2c-1"]);
        let handle = bus.open(Path::new("/dev/i2c-1")).unwrap();
        let mut ctx = bus.acquire(&handle, 0x20).unwrap();

        bus.write_direct(&mut ctx, &[1, 2, 3, 4], 3).unwrap();
        assert_eq!(bus.pending(), vec![1, 2, 3]);

        let mut out = [0u8; 8];
        assert_eq!(bus.read_direct(&mut ctx, &mut out).unwrap(), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert!(bus.pending().is_empty());
    }

    #[test]
    fn test_missing_node_fails_open() {
        let bus = MockI2CBus::new();
        assert!(matches!(
            bus.open(Path::new("/dev/i2c-9")),
            Err(I2CError::Io { .. })
        ));
        assert_eq!(bus.calls(), vec![MockCall::Open("/dev/i2c-9".into())]);
    }

    #[test]
    fn test_oversized_write_is_invalid_argument() {
        let bus = MockI2CBus::with_nodes(vec!["/dev/i2c-1"]);
        let handle = bus.open(Path::new("/dev/i2c-1")).unwrap();
        let mut ctx = bus.acquire(&handle, 0x20).unwrap();
        assert!(matches!(
            bus.write_array(&mut ctx, &[0; 2], 3),
            Err(I2CError::InvalidArgument(_))
        ));
        assert!(bus.pending().is_empty());
    }
}
