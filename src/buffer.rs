// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! Caller-owned transfer buffers
//!
//! A `TransferBuffer` borrows a region of memory for the duration of a
//! single transaction.  Like a cursor it tracks a position and a limit;
//! transactions read from or write into the region starting at the
//! position, but never move it.

use std::fmt;

/// How the bytes of a buffer can be handed to the native layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Contiguous memory with a stable address, passed to the kernel directly
    Direct,
    /// Managed array storage which is staged through a copy
    Array,
    /// Storage that cannot be used for transfers at all
    ReadOnly,
}

enum Storage<'a> {
    Direct(&'a mut [u8]),
    Array(&'a mut Vec<u8>),
    ReadOnly(&'a [u8]),
}

/// A borrowed byte region with a position, a limit and a storage mode
pub struct TransferBuffer<'a> {
    storage: Storage<'a>,
    position: usize,
    limit: usize,
}

impl<'a> TransferBuffer<'a> {
    fn with_storage(storage: Storage<'a>, capacity: usize) -> TransferBuffer<'a> {
        TransferBuffer {
            storage,
            position: 0,
            limit: capacity,
        }
    }

    /// Borrow contiguous memory that the kernel may access in place
    pub fn direct(bytes: &'a mut [u8]) -> TransferBuffer<'a> {
        let capacity = bytes.len();
        TransferBuffer::with_storage(Storage::Direct(bytes), capacity)
    }

    /// Borrow a managed array; transfers copy through an intermediate buffer
    pub fn array(bytes: &'a mut Vec<u8>) -> TransferBuffer<'a> {
        let capacity = bytes.len();
        TransferBuffer::with_storage(Storage::Array(bytes), capacity)
    }

    /// Wrap bytes that may be inspected but are not accessible for transfers
    pub fn read_only(bytes: &'a [u8]) -> TransferBuffer<'a> {
        TransferBuffer::with_storage(Storage::ReadOnly(bytes), bytes.len())
    }

    pub fn mode(&self) -> BufferMode {
        match &self.storage {
            Storage::Direct(_) => BufferMode::Direct,
            Storage::Array(_) => BufferMode::Array,
            Storage::ReadOnly(_) => BufferMode::ReadOnly,
        }
    }

    pub fn capacity(&self) -> usize {
        self.as_slice().len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of bytes between the position and the limit
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Move the cursor
    ///
    /// Fails with `InvalidArgument` if the new position lies beyond the limit.
    pub fn set_position(&mut self, position: usize) -> crate::Result<()> {
        if position > self.limit {
            return Err(crate::I2CError::invalid_argument(format!(
                "position {} exceeds limit {}",
                position, self.limit
            )));
        }
        self.position = position;
        Ok(())
    }

    /// Move the limit, pulling the position back if it would exceed it
    pub fn set_limit(&mut self, limit: usize) -> crate::Result<()> {
        if limit > self.capacity() {
            return Err(crate::I2CError::invalid_argument(format!(
                "limit {} exceeds capacity {}",
                limit,
                self.capacity()
            )));
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        Ok(())
    }

    /// The whole underlying region, independent of the cursor
    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Direct(bytes) => &bytes[..],
            Storage::Array(bytes) => &bytes[..],
            Storage::ReadOnly(bytes) => &bytes[..],
        }
    }

    /// Bytes from the position to the end of the region
    pub(crate) fn source(&self) -> &[u8] {
        &self.as_slice()[self.position..]
    }

    /// Bytes from the position to the limit, if the region is writable
    pub(crate) fn sink(&mut self) -> Option<&mut [u8]> {
        let (position, limit) = (self.position, self.limit);
        match &mut self.storage {
            Storage::Direct(bytes) => Some(&mut bytes[position..limit]),
            Storage::Array(bytes) => Some(&mut bytes[position..limit]),
            Storage::ReadOnly(_) => None,
        }
    }
}

impl<'a> fmt::Debug for TransferBuffer<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("mode", &self.mode())
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_bounds() {
        let mut data = [0u8; 8];
        let mut buf = TransferBuffer::direct(&mut data);
        assert_eq!(buf.remaining(), 8);

        buf.set_position(3).unwrap();
        buf.set_limit(6).unwrap();
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.source().len(), 5);
        assert_eq!(buf.sink().map(|s| s.len()), Some(3));

        assert!(buf.set_position(7).is_err());
        assert!(buf.set_limit(9).is_err());

        // shrinking the limit drags the position along
        buf.set_limit(2).unwrap();
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_modes() {
        let mut direct = [0u8; 2];
        let mut array = vec![0u8; 4];
        let read_only = [1u8, 2, 3];

        assert_eq!(TransferBuffer::direct(&mut direct).mode(), BufferMode::Direct);
        assert_eq!(TransferBuffer::array(&mut array).mode(), BufferMode::Array);

        let mut ro = TransferBuffer::read_only(&read_only);
        assert_eq!(ro.mode(), BufferMode::ReadOnly);
        assert_eq!(ro.capacity(), 3);
        assert!(ro.sink().is_none());
    }
}
