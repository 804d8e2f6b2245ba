// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boot selection and application handoff.
//!
//! Two exits from this bootloader exist: stay resident and run the command
//! loop, or migrate the stack pointer and branch into the user image. Both
//! exits drain the command link first so the host never observes a reply
//! truncated by the jump (a deliberate correction over the original device
//! this design is based on, which did not drain first).

use crate::link::CommandLink;

/// Which path the command loop should take after reset, decided once by
/// [`read_strap_pin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Strap pin held low: stay in the bootloader and serve commands.
    Interactive,
    /// Strap pin high (or floating with its pull-up): jump straight to the
    /// resident application.
    Application,
}

/// External collaborator: reads the physical boot-mode strap pin.
///
/// Sampled exactly once, immediately after clock initialization. No
/// debounce is applied, since the strap is a jumper or fixed level, not a
/// button the user is expected to operate at the sampling instant.
pub trait BootStrap {
    /// True if the strap pin reads logical low.
    fn is_asserted(&mut self) -> bool;
}

/// Decide the boot mode from the strap pin's current level.
pub fn read_strap_pin(strap: &mut impl BootStrap) -> BootMode {
    if strap.is_asserted() {
        BootMode::Interactive
    } else {
        BootMode::Application
    }
}

/// Migrate the main stack pointer and branch into the application residing
/// at `image_base`, per the two-word vector table convention: the first
/// word is the initial stack pointer, the second is the reset entry point.
///
/// Never returns; draining `link` first guarantees any reply already
/// queued for the host has fully left the UART before control transfers
/// (invariant I4).
pub fn handoff_to_application(link: &mut impl CommandLink, image_base: u32) -> ! {
    link.drain();

    // Safety: `image_base` has already been validated by the caller as
    // lying inside the flash aperture, and the two words it names are
    // treated as opaque handoff data, never dereferenced by this crate
    // beyond the single read here.
    let (msp, entry) = unsafe {
        let vector_table = image_base as *const u32;
        (
            core::ptr::read_volatile(vector_table),
            core::ptr::read_volatile(vector_table.add(1)),
        )
    };

    // Safety: `msp` and `entry` come directly from the application's own
    // vector table; branching into them is exactly the handoff this
    // function exists to perform.
    unsafe { cortexm4::handoff::set_msp_and_branch(msp, cortexm4::handoff::thumb(entry)) }
}

/// Branch directly to `addr` without touching the stack pointer, used by
/// `JMP_ADDR` to transfer control to an arbitrary validated address rather
/// than a full application image.
pub fn jump_to_address(link: &mut impl CommandLink, addr: u32) -> ! {
    link.drain();

    // Safety: `addr` has already been validated by the caller as lying
    // inside a declared aperture (invariant I5); branching to it is
    // exactly what this command requests.
    unsafe { cortexm4::handoff::branch(cortexm4::handoff::thumb(addr)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStrap(bool);

    impl BootStrap for FixedStrap {
        fn is_asserted(&mut self) -> bool {
            self.0
        }
    }

    #[test]
    fn low_strap_selects_interactive_mode() {
        assert_eq!(read_strap_pin(&mut FixedStrap(true)), BootMode::Interactive);
    }

    #[test]
    fn high_strap_selects_application_mode() {
        assert_eq!(read_strap_pin(&mut FixedStrap(false)), BootMode::Application);
    }
}
