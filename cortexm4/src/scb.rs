// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ARM System Control Block.
//!
//! <http://infocenter.arm.com/help/index.jsp?topic=/com.arm.doc.dui0553a/CIHFDJCA.html>
//!
//! The bootloader only needs one thing from the SCB: a software reset,
//! kept around for the host-triggered recovery path a production image
//! would need if `SET_RW_PROTECT` bricks the link.

use tock_registers::interfaces::Writeable;
use tock_registers::{register_bitfields, register_structs};
use tock_registers::registers::ReadWrite;

register_bitfields![u32,
    AIRCR [
        VECTKEY OFFSET(16) NUMBITS(16) [],
        SYSRESETREQ OFFSET(2) NUMBITS(1) []
    ]
];

register_structs! {
    ScbRegisters {
        (0x00 => cpuid: ReadWrite<u32>),
        (0x04 => icsr: ReadWrite<u32>),
        (0x08 => vtor: ReadWrite<u32>),
        (0x0C => aircr: ReadWrite<u32, AIRCR::Register>),
        (0x10 => scr: ReadWrite<u32>),
        (0x14 => @END),
    }
}

const SCB_BASE: usize = 0xE000_ED00;

fn scb() -> &'static ScbRegisters {
    unsafe { &*(SCB_BASE as *const ScbRegisters) }
}

/// System software reset. Does not return.
pub fn reset() -> ! {
    scb()
        .aircr
        .write(AIRCR::VECTKEY.val(0x05FA) + AIRCR::SYSRESETREQ::SET);
    loop {
        crate::support::nop();
    }
}
