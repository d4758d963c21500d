// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

// Reads the temperature register of an LM75-compatible sensor through
// the i2cport service, using one combined write/read per sample.

extern crate byteorder;
extern crate docopt;
extern crate env_logger;
extern crate i2cport;

use docopt::Docopt;
use std::env::args;

#[cfg(any(target_os = "linux", target_os = "android"))]
use byteorder::{BigEndian, ByteOrder};
#[cfg(any(target_os = "linux", target_os = "android"))]
use i2cport::linux::LinuxI2CBus;
#[cfg(any(target_os = "linux", target_os = "android"))]
use i2cport::{
    Credentials, GrantedCapabilities, I2CManager, I2CService, LocalTransport, ServiceConfig,
    TransferBuffer, I2C_PORT,
};
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::sync::Arc;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::thread;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::time::Duration;

const USAGE: &str = "
Reads the temperature from an LM75 sensor via the i2cport service.

Usage:
  lm75 [options] <device>
  lm75 (-h | --help)
  lm75 --version

Options:
  -h --help            Show this help text.
  --version            Show version.
  --config=<file>      TOML file listing the permitted ports.
  --addr=<addr>        Slave address of the sensor [default: 72].
  --samples=<n>        Number of samples to take [default: 5].
  --timeout-ms=<ms>    Adapter timeout in milliseconds [default: 100].
";

#[cfg(any(target_os = "linux", target_os = "android"))]
const TEMP_REGISTER: u8 = 0x00;

/// Convert the two raw bytes of the temperature register to degrees
///
/// The value is left aligned: the top 11 bits hold a two's complement
/// reading in steps of 0.125 degrees.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn raw_to_celsius(raw: &[u8]) -> f32 {
    f32::from(BigEndian::read_i16(raw) >> 5) * 0.125
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn main() {
    let _ = Docopt::new(USAGE).and_then(|d| d.argv(args()).parse());
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn main() {
    env_logger::init();

    let args = Docopt::new(USAGE)
        .and_then(|d| d.argv(args()).parse())
        .unwrap_or_else(|e| e.exit());
    let device = args.get_str("<device>");
    let addr: u16 = args.get_str("--addr").parse().unwrap_or(0x48);
    let samples: usize = args.get_str("--samples").parse().unwrap_or(5);
    let timeout_ms: u64 = args.get_str("--timeout-ms").parse().unwrap_or(100);

    let config = match args.get_str("--config") {
        "" => ServiceConfig::new(vec![device]),
        path => ServiceConfig::load(path),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            println!("Invalid configuration: {}", e);
            return;
        }
    };

    let service = Arc::new(I2CService::new(config, LinuxI2CBus, GrantedCapabilities));
    let caller = Credentials::new(std::process::id(), 0).grant(I2C_PORT);
    let manager = I2CManager::new(LocalTransport::new(&service, caller), LinuxI2CBus);

    match manager.list_buses() {
        Ok(buses) => println!("Available buses: {:?}", buses),
        Err(e) => println!("Could not list buses: {}", e),
    }

    let mut dev = match manager.open_device(device, addr) {
        Ok(dev) => dev,
        Err(e) => {
            println!("Error opening {} at 0x{:02x}: {}", device, addr, e);
            return;
        }
    };
    if let Err(e) = dev.set_timeout(Duration::from_millis(timeout_ms)) {
        println!("Could not set timeout: {}", e);
    }

    let mut reg = [TEMP_REGISTER];
    let mut raw = [0u8; 2];
    for _ in 0..samples {
        let result = dev.write_read(
            &TransferBuffer::direct(&mut reg),
            1,
            &mut TransferBuffer::direct(&mut raw),
            2,
        );
        match result {
            Ok(()) => println!("{:.3} C", raw_to_celsius(&raw)),
            Err(e) => println!("Error reading temperature: {}", e),
        }
        thread::sleep(Duration::from_millis(500));
    }

    if let Err(e) = dev.close() {
        println!("Error closing {}: {}", device, e);
    }
}
