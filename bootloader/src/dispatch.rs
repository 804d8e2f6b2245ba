// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command dispatcher: opcode decode, per-command handlers, and the
//! never-returning command loop.
//!
//! Handlers never touch the wire directly. Each returns a [`Reply`]
//! describing what the dispatcher should send; the dispatcher alone owns
//! writing `0xBB`/`0xEE`, the length-to-follow byte, and the payload,
//! keeping reply-size bookkeeping in one place rather than duplicated
//! across every handler.

use crate::boot;
use crate::config::{MASS_ERASE_SECTOR, NUM_SECTORS, SUPPORTED_OPCODES};
use crate::flash::{self, Apertures, FlashController, FlashStatus, WriteProtectLevel};
use crate::frame::{self, CrcAccumulator, Frame};
use crate::link::{CommandLink, DebugTrace};

const ACK: u8 = 0xBB;
const NACK: u8 = 0xEE;
const VALID: u8 = 0x00;
const INVALID: u8 = 0x01;

/// The ten opcodes this bootloader understands, per the handler contract
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    GetVersion = 0xA1,
    GetHelp = 0xA2,
    GetDevId = 0xA3,
    GetRdpLevel = 0xA4,
    JmpAddr = 0xA5,
    FlashErase = 0xA6,
    MemWrite = 0xA7,
    MemRead = 0xA8,
    SetRwProtect = 0xA9,
    GetRwProtect = 0xAA,
}

impl Opcode {
    /// Decode a wire opcode byte, or `None` if it isn't one of the
    /// supported values; the caller treats that as "trace and drop".
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xA1 => Some(Self::GetVersion),
            0xA2 => Some(Self::GetHelp),
            0xA3 => Some(Self::GetDevId),
            0xA4 => Some(Self::GetRdpLevel),
            0xA5 => Some(Self::JmpAddr),
            0xA6 => Some(Self::FlashErase),
            0xA7 => Some(Self::MemWrite),
            0xA8 => Some(Self::MemRead),
            0xA9 => Some(Self::SetRwProtect),
            0xAA => Some(Self::GetRwProtect),
            _ => None,
        }
    }
}

/// What the dispatcher should put on the wire in response to one frame.
/// Variable-length replies (`GetHelp`, `MemRead`) carry a fixed buffer
/// sized for the worst case plus an explicit length, since `no_std` rules
/// out an owned `Vec`.
pub enum Reply {
    Nack,
    Ack1(u8),
    Ack2([u8; 2]),
    Ack8([u8; 8]),
    AckVar { buf: [u8; 256], len: usize },
}

impl Reply {
    fn var(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 256];
        buf[..bytes.len()].copy_from_slice(bytes);
        Reply::AckVar { buf, len: bytes.len() }
    }
}

/// Reads the 12-bit silicon device identifier, an external collaborator
/// since it lives in a vendor-specific debug register (`DBGMCU_IDCODE` on
/// this family).
pub trait DeviceId {
    fn device_id(&mut self) -> u16;
}

/// Bundles every external collaborator a handler might need. Handlers take
/// `&mut Services` rather than each collaborator individually so adding a
/// new opcode never changes every existing handler's signature.
pub struct Services<'a, F: FlashController, D: DeviceId> {
    pub flash: &'a mut F,
    pub device_id: &'a mut D,
    pub apertures: Apertures,
}

fn handle(opcode: Opcode, frame: &Frame, services: &mut Services<impl FlashController, impl DeviceId>) -> Reply {
    let args = frame.args();
    match opcode {
        Opcode::GetVersion => Reply::Ack1(crate::config::BL_VERSION),
        Opcode::GetHelp => Reply::var(&SUPPORTED_OPCODES),
        Opcode::GetDevId => Reply::Ack2(services.device_id.device_id().to_le_bytes()),
        Opcode::GetRdpLevel => Reply::Ack1(services.flash.rdp_level() as u8),
        Opcode::JmpAddr => {
            let addr = le_u32(args, 0);
            if services.apertures.contains(addr) {
                Reply::Ack1(VALID)
            } else {
                Reply::Ack1(INVALID)
            }
        }
        Opcode::FlashErase => {
            let base = args[0];
            let count = args[1];
            if !flash::validate_erase_range(base, count) {
                return Reply::Ack1(FlashStatus::Failure as u8);
            }
            let status = if base == MASS_ERASE_SECTOR {
                services.flash.erase_sector(MASS_ERASE_SECTOR)
            } else {
                let mut status = FlashStatus::Success;
                for sector in base..base + count {
                    if services.flash.erase_sector(sector) == FlashStatus::Failure {
                        status = FlashStatus::Failure;
                    }
                }
                status
            };
            Reply::Ack1(status as u8)
        }
        Opcode::MemWrite => {
            let dest = le_u32(args, 0);
            let len = args[4] as usize;
            let data = &args[5..5 + len];
            if !services.apertures.contains_writable_range(dest, len as u32) {
                return Reply::Ack1(FlashStatus::Failure as u8);
            }
            Reply::Ack1(services.flash.program(dest, data) as u8)
        }
        Opcode::MemRead => {
            let src = le_u32(args, 0);
            let len = args[4] as usize;
            if !services.apertures.contains_range(src, len as u32) {
                let mut reply = [0u8; 256];
                reply[0] = FlashStatus::Failure as u8;
                return Reply::AckVar { buf: reply, len: len + 1 };
            }
            let mut reply = [0u8; 256];
            let status = services.flash.read(src, &mut reply[1..1 + len]);
            reply[0] = status as u8;
            Reply::AckVar { buf: reply, len: len + 1 }
        }
        Opcode::SetRwProtect => {
            let mask = args[0];
            let level = match args[1] {
                0 => WriteProtectLevel::Unprotected,
                1 => WriteProtectLevel::Protected,
                _ => WriteProtectLevel::PermanentlyProtected,
            };
            Reply::Ack1(services.flash.set_write_protect(mask, level) as u8)
        }
        Opcode::GetRwProtect => {
            let levels = services.flash.write_protect_levels();
            let mut out = [0u8; NUM_SECTORS as usize];
            for (i, level) in levels.iter().enumerate() {
                out[i] = *level as u8;
            }
            Reply::Ack8(out)
        }
    }
}

fn le_u32(args: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        args[offset],
        args[offset + 1],
        args[offset + 2],
        args[offset + 3],
    ])
}

/// Serialize `reply` onto `link`: `0xEE` alone for [`Reply::Nack`], else
/// `0xBB`, the length-to-follow byte, then the payload (invariant I3).
fn send_reply(link: &mut impl CommandLink, reply: &Reply) {
    match reply {
        Reply::Nack => link.transmit(&[NACK]),
        Reply::Ack1(b) => link.transmit(&[ACK, 1, *b]),
        Reply::Ack2(bytes) => {
            link.transmit(&[ACK, bytes.len() as u8]);
            link.transmit(bytes);
        }
        Reply::Ack8(bytes) => {
            link.transmit(&[ACK, bytes.len() as u8]);
            link.transmit(bytes);
        }
        Reply::AckVar { buf, len } => {
            link.transmit(&[ACK, *len as u8]);
            link.transmit(&buf[..*len]);
        }
    }
}

/// The resident command loop: receive a frame, decode its opcode, verify
/// its CRC, dispatch, reply, repeat. Never returns except by transferring
/// control away via [`boot::jump_to_address`] inside the `JmpAddr` handler.
///
/// Opcode decode happens strictly before CRC verification. An unrecognized
/// opcode is dropped without ever calling [`frame::verify`], so it never
/// produces a NACK; only a recognized opcode with a bad CRC does. Checking
/// the CRC first would make the two cases indistinguishable on the wire.
pub fn run_command_loop<L, C, F, D, T>(
    link: &mut L,
    crc: &mut C,
    flash: &mut F,
    device_id: &mut D,
    trace_sink: &mut T,
) -> !
where
    L: CommandLink,
    C: CrcAccumulator,
    F: FlashController,
    D: DeviceId,
    T: DebugTrace,
{
    loop {
        let frame = Frame::receive(link);

        let opcode = match Opcode::from_byte(frame.command()) {
            Some(opcode) => opcode,
            None => {
                crate::trace!(trace_sink, "unknown opcode {:#x}", frame.command());
                continue;
            }
        };

        if !frame::verify(crc, &frame) {
            crate::trace!(trace_sink, "frame crc mismatch");
            send_reply(link, &Reply::Nack);
            continue;
        }

        let mut services = Services { flash, device_id, apertures: Apertures::device() };
        let reply = handle(opcode, &frame, &mut services);
        send_reply(link, &reply);

        if opcode == Opcode::JmpAddr {
            if let Reply::Ack1(VALID) = reply {
                let addr = le_u32(frame.args(), 0);
                boot::jump_to_address(link, addr);
            }
        }
    }
}

/// Exposes the dispatcher's otherwise-private `handle`/`send_reply` pair so
/// `tests/protocol.rs` can drive one frame through the real dispatch path
/// without duplicating it.
#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::{handle, send_reply, DeviceId, Frame, Opcode, Reply, Services};
    use crate::flash::FlashController;
    use crate::link::CommandLink;

    pub fn dispatch(
        opcode: Opcode,
        frame: &Frame,
        services: &mut Services<impl FlashController, impl DeviceId>,
    ) -> Reply {
        handle(opcode, frame, services)
    }

    pub fn send(link: &mut impl CommandLink, reply: &Reply) {
        send_reply(link, reply)
    }
}
