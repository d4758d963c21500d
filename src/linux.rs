// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

use crate::core::I2CBus;
use crate::error::{I2CError, Result};
use crate::ffi::{self, i2c_msg, I2CMsgFlags};
use libc::c_int;
use std::convert::TryFrom;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::prelude::*;
use std::os::unix::prelude::*;
use std::path::Path;
use std::time::Duration;

/// The i2c-dev interface of the Linux kernel
///
/// Bus nodes (`/dev/i2c-N`) are opened read/write.  Acquiring a context
/// duplicates the node's descriptor and binds the slave address on the
/// duplicate with `I2C_SLAVE`, so handle and context can be released
/// independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxI2CBus;

/// An open bus node bound to one slave address
#[derive(Debug)]
pub struct LinuxI2CContext {
    devfile: File,
    slave_address: u16,
}

impl AsRawFd for LinuxI2CContext {
    fn as_raw_fd(&self) -> RawFd {
        self.devfile.as_raw_fd()
    }
}

fn check_len(what: &str, len: usize, available: usize) -> Result<()> {
    if len > available {
        return Err(I2CError::invalid_argument(format!(
            "{} length {} exceeds buffer capacity {}",
            what, len, available
        )));
    }
    Ok(())
}

fn msg_len(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        I2CError::invalid_argument(format!("message length {} does not fit an i2c_msg", len))
    })
}

/// Convert a timeout to the 10ms units used by `I2C_TIMEOUT`, rounding up
fn timeout_units(timeout: Duration) -> io::Result<c_int> {
    let units = (timeout.as_nanos() + 9_999_999) / 10_000_000;
    c_int::try_from(units).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("timeout of {:?} is out of range", timeout),
        )
    })
}

impl I2CBus for LinuxI2CBus {
    type Handle = File;
    type Context = LinuxI2CContext;

    fn open(&self, path: &Path) -> Result<File> {
        log::debug!("i2c: opening bus {}", path.display());
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| I2CError::io(format!("could not open {}", path.display()), e))
    }

    fn acquire(&self, handle: &File, slave_address: u16) -> Result<LinuxI2CContext> {
        // the handle may be closed independently, so work on a duplicate
        let devfile = handle
            .try_clone()
            .map_err(|e| I2CError::io("could not open I2C bus", e))?;
        ffi::i2c_set_slave_address(devfile.as_raw_fd(), slave_address).map_err(|e| {
            I2CError::io(
                format!("could not set I2C slave address 0x{:02x}", slave_address),
                io::Error::from(e),
            )
        })?;
        Ok(LinuxI2CContext {
            devfile,
            slave_address,
        })
    }

    fn close(&self, handle: File) -> Result<()> {
        drop(handle);
        Ok(())
    }

    fn release(&self, context: LinuxI2CContext) -> Result<()> {
        log::debug!(
            "i2c: releasing context for slave 0x{:02x}",
            context.slave_address
        );
        drop(context);
        Ok(())
    }

    fn read_direct(&self, context: &mut LinuxI2CContext, data: &mut [u8]) -> Result<usize> {
        context
            .devfile
            .read(data)
            .map_err(|e| I2CError::io("I2C read failed", e))
    }

    fn read_array(&self, context: &mut LinuxI2CContext, data: &mut [u8]) -> Result<usize> {
        let mut staging = vec![0u8; data.len()];
        let n = context
            .devfile
            .read(&mut staging)
            .map_err(|e| I2CError::io("I2C read failed", e))?;
        data[..n].copy_from_slice(&staging[..n]);
        Ok(n)
    }

    fn write_direct(&self, context: &mut LinuxI2CContext, data: &[u8], len: usize) -> Result<()> {
        check_len("write", len, data.len())?;
        context
            .devfile
            .write_all(&data[..len])
            .map_err(|e| I2CError::io("I2C write failed", e))
    }

    fn write_array(&self, context: &mut LinuxI2CContext, data: &[u8], len: usize) -> Result<()> {
        check_len("write", len, data.len())?;
        let staging = data[..len].to_vec();
        context
            .devfile
            .write_all(&staging)
            .map_err(|e| I2CError::io("I2C write failed", e))
    }

    fn write_read(
        &self,
        context: &mut LinuxI2CContext,
        input: &[u8],
        len_in: usize,
        output: &mut [u8],
        len_out: usize,
    ) -> Result<()> {
        check_len("write", len_in, input.len())?;
        check_len("read", len_out, output.len())?;
        let mut msgs = [
            i2c_msg {
                addr: context.slave_address,
                flags: 0,
                len: msg_len(len_in)?,
                // the kernel only reads from write messages
                buf: input.as_ptr() as *mut u8,
            },
            i2c_msg {
                addr: context.slave_address,
                flags: I2CMsgFlags::I2C_M_RD.bits(),
                len: msg_len(len_out)?,
                buf: output.as_mut_ptr(),
            },
        ];
        ffi::i2c_rdwr(context.as_raw_fd(), &mut msgs)
            .map(drop)
            .map_err(|e| I2CError::io("I2C combined transaction failed", io::Error::from(e)))
    }

    fn set_timeout(&self, context: &mut LinuxI2CContext, timeout: Duration) -> Result<()> {
        let units = timeout_units(timeout)
            .map_err(|e| I2CError::io("could not set I2C timeout", e))?;
        ffi::i2c_set_timeout(context.as_raw_fd(), units)
            .map_err(|e| I2CError::io("could not set I2C timeout", io::Error::from(e)))
    }

    fn set_retries(&self, context: &mut LinuxI2CContext, retries: u32) -> Result<()> {
        let retries = c_int::try_from(retries).map_err(|_| {
            I2CError::io(
                "could not set I2C number of retries",
                io::Error::new(io::ErrorKind::InvalidInput, "retry count is out of range"),
            )
        })?;
        ffi::i2c_set_retries(context.as_raw_fd(), retries).map_err(|e| {
            I2CError::io("could not set I2C number of retries", io::Error::from(e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process;

    #[test]
    fn test_timeout_units_round_up() {
        assert_eq!(timeout_units(Duration::from_millis(0)).unwrap(), 0);
        assert_eq!(timeout_units(Duration::from_micros(500)).unwrap(), 1);
        assert_eq!(timeout_units(Duration::from_millis(1)).unwrap(), 1);
        assert_eq!(timeout_units(Duration::from_micros(10_001)).unwrap(), 2);
        assert_eq!(timeout_units(Duration::from_millis(10)).unwrap(), 1);
        assert_eq!(timeout_units(Duration::from_millis(25)).unwrap(), 3);
        assert_eq!(timeout_units(Duration::from_secs(1)).unwrap(), 100);
        assert!(timeout_units(Duration::from_secs(u64::MAX)).is_err());
    }

    #[test]
    fn test_open_missing_node_is_io_error() {
        let bus = LinuxI2CBus;
        let path = std::env::temp_dir().join(format!("i2cport-missing-{}", process::id()));
        match bus.open(&path) {
            Err(I2CError::Io { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_acquire_on_regular_file_fails() {
        // a regular file does not understand I2C_SLAVE
        let bus = LinuxI2CBus;
        let path = std::env::temp_dir().join(format!("i2cport-regular-{}", process::id()));
        fs::write(&path, b"").unwrap();
        let handle = bus.open(&path).unwrap();
        let result = bus.acquire(&handle, 0x48);
        fs::remove_file(&path).unwrap();
        match result {
            Err(I2CError::Io { source, .. }) => {
                assert_eq!(source.raw_os_error(), Some(libc::ENOTTY));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_write_transfers_all_requested_bytes() {
        let bus = LinuxI2CBus;
        let path = std::env::temp_dir().join(format!("i2cport-write-{}", process::id()));
        fs::write(&path, b"").unwrap();
        let mut context = LinuxI2CContext {
            devfile: bus.open(&path).unwrap(),
            slave_address: 0x48,
        };
        bus.write_direct(&mut context, &[1, 2, 3, 4], 3).unwrap();
        bus.write_array(&mut context, &[5, 6], 2).unwrap();
        let written = fs::read(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(written, vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn test_failed_write_is_io_error() {
        let bus = LinuxI2CBus;
        let mut context = LinuxI2CContext {
            devfile: OpenOptions::new().write(true).open("/dev/full").unwrap(),
            slave_address: 0x48,
        };
        match bus.write_direct(&mut context, &[0; 4], 4) {
            Err(I2CError::Io { source, .. }) => {
                assert_eq!(source.raw_os_error(), Some(libc::ENOSPC));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_write_longer_than_buffer_is_rejected() {
        assert!(matches!(
            check_len("write", 4, 3),
            Err(I2CError::InvalidArgument(_))
        ));
        assert!(check_len("write", 3, 3).is_ok());
        assert!(matches!(msg_len(70_000), Err(I2CError::InvalidArgument(_))));
    }
}
