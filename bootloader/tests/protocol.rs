// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end protocol coverage against the host-testable core: an
//! in-memory `CommandLink` double and `SimFlash`, no real silicon.
//!
//! Covers the seed scenarios (S1-S6) and properties (P1-P6) from the
//! command-protocol contract; P7 (handoff stack-pointer correctness) is
//! asserted at the unit level in `cortexm4::handoff` and `bootloader::boot`
//! since the actual `msr msp` instruction cannot run on the host.

use bootloader::dispatch::DeviceId;
use bootloader::flash::test_support::SimFlash;
use bootloader::flash::FlashStatus;
use bootloader::frame::{Crc32, CrcAccumulator};
use bootloader::link::test_support::LoopbackLink;
use bootloader::link::CommandLink;

struct FixedDeviceId(u16);

impl DeviceId for FixedDeviceId {
    fn device_id(&mut self) -> u16 {
        self.0
    }
}

fn crc_of(bytes: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    let mut value = 0;
    for &b in bytes {
        value = crc.accumulate_byte(b);
    }
    value
}

/// Builds a full wire frame (`L | CMD | ARGS... | CRC32`) given just `CMD |
/// ARGS...`; `L` counts the command, argument, and CRC bytes together, and
/// the CRC is computed over `L | CMD | ARGS...`.
fn framed(cmd_and_args: &[u8]) -> Vec<u8> {
    let l = (cmd_and_args.len() + 4) as u8;
    let mut crc_input = vec![l];
    crc_input.extend_from_slice(cmd_and_args);
    let crc = crc_of(&crc_input);

    let mut wire = vec![l];
    wire.extend_from_slice(cmd_and_args);
    wire.extend_from_slice(&crc.to_le_bytes());
    wire
}

/// Runs exactly one frame through the full receive -> decode -> verify ->
/// dispatch -> reply path the way `dispatch::run_command_loop` would,
/// without needing the loop to actually run forever. Decode happens before
/// verification, so an unrecognized opcode never reaches the CRC check.
fn exchange(
    wire: Vec<u8>,
    flash: &mut SimFlash,
    device_id: &mut FixedDeviceId,
) -> Vec<u8> {
    use bootloader::dispatch::{Opcode, Services};
    use bootloader::flash::Apertures;
    use bootloader::frame::{self, Frame};

    let mut link = LoopbackLink::with_rx(&wire);
    let mut crc = Crc32::new();

    let frame = Frame::receive(&mut link);

    let opcode = match Opcode::from_byte(frame.command()) {
        Some(opcode) => opcode,
        None => return link.tx,
    };

    if !frame::verify(&mut crc, &frame) {
        link.transmit(&[0xEE]);
        return link.tx;
    }

    let mut services = Services { flash, device_id, apertures: Apertures::device() };
    let reply = bootloader::dispatch::test_support::dispatch(opcode, &frame, &mut services);
    bootloader::dispatch::test_support::send(&mut link, &reply);
    link.tx
}

#[test]
fn s1_get_version() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0x0421);
    let wire = framed(&[0xA1]);
    assert_eq!(wire[0], 0x05);
    assert_eq!(exchange(wire, &mut flash, &mut device_id), vec![0xBB, 0x01, 0x10]);
}

#[test]
fn s2_get_dev_id() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0x0421);
    let wire = framed(&[0xA3]);
    assert_eq!(wire[0], 0x05);
    assert_eq!(
        exchange(wire, &mut flash, &mut device_id),
        vec![0xBB, 0x02, 0x21, 0x04]
    );
}

#[test]
fn s3_jmp_addr_to_sram1_base() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);
    let mut cmd_and_args = vec![0xA5];
    cmd_and_args.extend_from_slice(&bootloader::config::SRAM1_BASE.to_le_bytes());
    let wire = framed(&cmd_and_args);
    assert_eq!(wire[0], 0x09);
    assert_eq!(
        exchange(wire, &mut flash, &mut device_id),
        vec![0xBB, 0x01, 0x00]
    );
}

#[test]
fn s4_erase_write_read_round_trip() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);

    let erase = framed(&[0xA6, 2, 1]);
    assert_eq!(
        exchange(erase, &mut flash, &mut device_id),
        vec![0xBB, 0x01, FlashStatus::Success as u8]
    );

    let addr = bootloader::config::FLASH_BASE + 2 * (bootloader::config::FLASH_SIZE / 8);
    let mut write_args = vec![0xA7u8];
    write_args.extend_from_slice(&addr.to_le_bytes());
    write_args.push(4);
    write_args.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(
        exchange(framed(&write_args), &mut flash, &mut device_id),
        vec![0xBB, 0x01, FlashStatus::Success as u8]
    );

    let mut read_args = vec![0xA8u8];
    read_args.extend_from_slice(&addr.to_le_bytes());
    read_args.push(4);
    assert_eq!(
        exchange(framed(&read_args), &mut flash, &mut device_id),
        vec![0xBB, 0x05, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]
    );
}

#[test]
fn s5_corrupt_crc_yields_bare_nack() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);
    let mut wire = framed(&[0xA1]);
    let last = wire.len() - 1;
    wire[last] ^= 0xFF;
    assert_eq!(exchange(wire, &mut flash, &mut device_id), vec![0xEE]);
}

#[test]
fn s6_unknown_opcode_emits_nothing() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);
    let wire = framed(&[0xFF]);
    assert_eq!(exchange(wire, &mut flash, &mut device_id), Vec::<u8>::new());
}

#[test]
fn unknown_opcode_with_corrupt_crc_still_emits_nothing() {
    // Decode must happen before CRC verification: an unrecognized opcode
    // with a corrupted CRC must not surface as a NACK, or it would be
    // indistinguishable from a recognized command's CRC failure.
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);
    let mut wire = framed(&[0xFF]);
    let last = wire.len() - 1;
    wire[last] ^= 0xFF;
    assert_eq!(exchange(wire, &mut flash, &mut device_id), Vec::<u8>::new());
}

#[test]
fn p4_jmp_addr_address_safety() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);

    let mut inside = vec![0xA5u8];
    inside.extend_from_slice(&bootloader::config::SRAM1_BASE.to_le_bytes());
    assert_eq!(
        exchange(framed(&inside), &mut flash, &mut device_id),
        vec![0xBB, 0x01, 0x00]
    );

    let mut outside = vec![0xA5u8];
    outside.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(
        exchange(framed(&outside), &mut flash, &mut device_id),
        vec![0xBB, 0x01, 0x01]
    );
}

#[test]
fn p6_write_then_read_idempotence() {
    let mut flash = SimFlash::new();
    let mut device_id = FixedDeviceId(0);

    let erase = framed(&[0xA6, 2, 1]);
    exchange(erase, &mut flash, &mut device_id);

    let addr = bootloader::config::FLASH_BASE + 2 * (bootloader::config::FLASH_SIZE / 8) + 16;
    let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut write_args = vec![0xA7u8];
    write_args.extend_from_slice(&addr.to_le_bytes());
    write_args.push(bytes.len() as u8);
    write_args.extend_from_slice(&bytes);
    exchange(framed(&write_args), &mut flash, &mut device_id);

    let mut read_args = vec![0xA8u8];
    read_args.extend_from_slice(&addr.to_le_bytes());
    read_args.push(bytes.len() as u8);
    let mut expected = vec![0xBB, (bytes.len() + 1) as u8, 0x00];
    expected.extend_from_slice(&bytes);
    assert_eq!(exchange(framed(&read_args), &mut flash, &mut device_id), expected);
}
