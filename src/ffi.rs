// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

#![allow(dead_code)]
#![allow(non_camel_case_types)]

use bitflags::bitflags;
use libc::c_int;
use std::os::unix::prelude::*;

bitflags! {
    /// Flags carried by each message of an `I2C_RDWR` transaction
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct I2CMsgFlags: u16 {
        /// this is a ten bit chip address
        const I2C_M_TEN = 0x0010;
        /// read data, from slave to master
        const I2C_M_RD = 0x0001;
        /// if I2C_FUNC_PROTOCOL_MANGLING
        const I2C_M_STOP = 0x8000;
        /// if I2C_FUNC_NOSTART
        const I2C_M_NOSTART = 0x4000;
        /// if I2C_FUNC_PROTOCOL_MANGLING
        const I2C_M_REV_DIR_ADDR = 0x2000;
        /// if I2C_FUNC_PROTOCOL_MANGLING
        const I2C_M_IGNORE_NAK = 0x1000;
        /// if I2C_FUNC_PROTOCOL_MANGLING
        const I2C_M_NO_RD_ACK = 0x0800;
        /// length will be first received byte
        const I2C_M_RECV_LEN = 0x0400;
    }
}

#[repr(C)]
pub struct i2c_msg {
    /// slave address
    pub(crate) addr: u16,
    /// serialized I2CMsgFlags
    pub(crate) flags: u16,
    /// msg length
    pub(crate) len: u16,
    /// pointer to msg data
    pub(crate) buf: *mut u8,
}

// from include/uapi/linux/i2c-dev.h
const I2C_RETRIES: u16 = 0x0701;
const I2C_TIMEOUT: u16 = 0x0702;
const I2C_SLAVE: u16 = 0x0703;
const I2C_RDWR: u16 = 0x0707;

/// This is the structure as used in the I2C_RDWR ioctl call
// see linux/i2c-dev.h
#[repr(C)]
pub struct i2c_rdwr_ioctl_data {
    // struct i2c_msg __user *msgs;
    msgs: *mut i2c_msg,
    // __u32 nmsgs;
    nmsgs: u32,
}

mod ioctl {
    pub use super::i2c_rdwr_ioctl_data;
    use super::{I2C_RDWR, I2C_RETRIES, I2C_SLAVE, I2C_TIMEOUT};
    use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

    ioctl_write_int_bad!(set_i2c_slave_address, I2C_SLAVE);
    ioctl_write_int_bad!(set_i2c_timeout, I2C_TIMEOUT);
    ioctl_write_int_bad!(set_i2c_retries, I2C_RETRIES);
    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, i2c_rdwr_ioctl_data);
}

pub fn i2c_set_slave_address(fd: RawFd, slave_address: u16) -> nix::Result<()> {
    unsafe {
        ioctl::set_i2c_slave_address(fd, c_int::from(slave_address))?;
    }
    Ok(())
}

/// Set the adapter timeout, expressed in units of 10ms
pub fn i2c_set_timeout(fd: RawFd, units_of_10ms: c_int) -> nix::Result<()> {
    unsafe {
        ioctl::set_i2c_timeout(fd, units_of_10ms)?;
    }
    Ok(())
}

pub fn i2c_set_retries(fd: RawFd, retries: c_int) -> nix::Result<()> {
    unsafe {
        ioctl::set_i2c_retries(fd, retries)?;
    }
    Ok(())
}

/// Issue the messages as one combined transaction
///
/// The kernel sends a repeated START between messages and a single STOP
/// after the last one, so no other master can claim the bus in between.
#[inline]
pub fn i2c_rdwr(fd: RawFd, values: &mut [i2c_msg]) -> nix::Result<u32> {
    let i2c_data = i2c_rdwr_ioctl_data {
        msgs: values.as_mut_ptr(),
        nmsgs: values.len() as u32,
    };

    let n;
    unsafe {
        n = ioctl::i2c_rdwr(fd, &i2c_data)?;
    }
    Ok(n as u32)
}
