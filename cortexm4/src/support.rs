// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Helper functions for the Cortex-M4 architecture.

/// NOP instruction
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline(always)]
pub fn nop() {
    use core::arch::asm;
    unsafe {
        asm!("nop", options(nomem, nostack, preserves_flags));
    }
}

// Mock implementation for host-side unit tests (`cargo test`), where there
// is no Cortex-M core to execute this instruction against.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub fn nop() {
    unimplemented!("nop() only runs on a Cortex-M target")
}
