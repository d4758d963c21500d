// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types shared by the service, the manager and the device handle

use std::io;
use thiserror::Error;

/// Error that occurred while brokering or performing an I2C operation
#[derive(Debug, Error)]
pub enum I2CError {
    /// The caller does not hold the capability guarding the entry point
    #[error("permission denied: caller lacks the {capability} capability")]
    PermissionDenied { capability: String },

    /// Bad bus path, wrong buffer storage mode or oversized length
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A device operation was attempted outside the open state
    #[error("I2C device {name} is {state}")]
    InvalidState { name: String, state: &'static str },

    /// The native layer failed (open, context acquisition, transfer, policy)
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The service could not be reached
    #[error("transport failure: {0}")]
    Transport(String),

    /// The bus-path configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result of an I2C operation
pub type Result<T> = std::result::Result<T, I2CError>;

impl I2CError {
    /// Wrap an `io::Error` together with a description of the failing call
    pub fn io(context: impl Into<String>, source: io::Error) -> I2CError {
        I2CError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> I2CError {
        I2CError::InvalidArgument(msg.into())
    }
}

impl From<nix::Error> for I2CError {
    fn from(e: nix::Error) -> I2CError {
        I2CError::io("ioctl failed", io::Error::from(e))
    }
}

impl From<io::Error> for I2CError {
    fn from(e: io::Error) -> I2CError {
        I2CError::io("I/O error", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nix_errors_become_io() {
        let err = I2CError::from(nix::Error::ENOTTY);
        match err {
            I2CError::Io { source, .. } => {
                assert_eq!(source.raw_os_error(), Some(libc::ENOTTY));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_display_names_the_device() {
        let err = I2CError::InvalidState {
            name: "/dev/i2c-1".into(),
            state: "closed",
        };
        assert_eq!(err.to_string(), "I2C device /dev/i2c-1 is closed");
    }
}
