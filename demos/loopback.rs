// Copyright 2024, The Embedded Linux Team <embedded-linux@teams.rust-embedded.org>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/license/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option.  This file may not be copied, modified, or distributed
// except according to those terms.

// Walks through the service, manager and device against the in-memory
// loopback bus, printing what reaches the native layer.  Run with
// RUST_LOG=trace to see the crate's own logging as well.

extern crate byteorder;
extern crate env_logger;
extern crate i2cport;

use byteorder::{ByteOrder, LittleEndian};
use i2cport::mock::MockI2CBus;
use i2cport::{
    Credentials, GrantedCapabilities, I2CManager, I2CService, LocalTransport, ServiceConfig,
    TransferBuffer, I2C_PORT,
};
use std::sync::Arc;

fn main() -> i2cport::Result<()> {
    env_logger::init();

    let bus = MockI2CBus::with_nodes(vec!["/dev/i2c-1"]);
    let config = ServiceConfig::new(vec!["/dev/i2c-1", "/dev/i2c-2"])?;
    let service = Arc::new(I2CService::new(config, bus.clone(), GrantedCapabilities));

    let caller = Credentials::new(std::process::id(), 1000).grant(I2C_PORT);
    let manager = I2CManager::new(LocalTransport::new(&service, caller), bus.clone());
    println!("Available buses: {:?}", manager.list_buses()?);

    let mut dev = manager.open_device("/dev/i2c-1", 0x20)?;

    let mut word = [0u8; 2];
    LittleEndian::write_u16(&mut word, 0xbeef);
    dev.write(&TransferBuffer::direct(&mut word), 2)?;

    let mut managed = vec![0u8; 2];
    let mut rx = TransferBuffer::array(&mut managed);
    let n = dev.read(&mut rx)?;
    println!(
        "Read {} bytes: 0x{:04x} (position still {})",
        n,
        LittleEndian::read_u16(rx.as_slice()),
        rx.position()
    );

    dev.close()?;
    for call in bus.calls() {
        println!("native: {:?}", call);
    }
    Ok(())
}
