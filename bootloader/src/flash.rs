// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flash-update state machine and address safety envelope.
//!
//! This module owns two separate concerns: validating that an address or
//! address range the host asked for is safe to touch, and driving whatever
//! concrete flash controller a board provides through the
//! [`FlashController`] trait. The controller itself is vendor-specific
//! register sequencing and is never modeled here.

use crate::config::{FLASH_BASE, FLASH_SIZE, MASS_ERASE_SECTOR, NUM_SECTORS, SRAM1_BASE,
    SRAM1_SIZE, SRAM2_BASE, SRAM2_SIZE};

/// Status byte returned verbatim in reply payloads by every flash
/// operation, per the handler contract in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlashStatus {
    Success = 0,
    Failure = 1,
}

/// Read-protection level stored in the option bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RdpLevel {
    None = 0,
    ReadProtect = 1,
    PermanentReadProtect = 2,
}

/// Per-sector write-protection state reported by `GET_RW_PROTECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteProtectLevel {
    Unprotected = 0,
    Protected = 1,
    PermanentlyProtected = 2,
}

/// A contiguous, inclusive-exclusive memory region used to describe the
/// flash/SRAM1/SRAM2 apertures an address is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Aperture {
    pub base: u32,
    pub size: u32,
}

impl Aperture {
    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.base.saturating_add(self.size)
    }

    pub const fn contains_range(&self, addr: u32, len: u32) -> bool {
        // `len == 0` never passes validation upstream, but avoid relying on
        // that here: an empty range is trivially contained if its start is.
        match addr.checked_add(len) {
            Some(end) => self.contains(addr) && end <= self.base.saturating_add(self.size),
            None => false,
        }
    }
}

/// The three device apertures readable and/or writable by host commands
/// (spec §3).
pub struct Apertures {
    pub flash: Aperture,
    pub sram1: Aperture,
    pub sram2: Aperture,
}

impl Apertures {
    pub const fn device() -> Self {
        Self {
            flash: Aperture { base: FLASH_BASE, size: FLASH_SIZE },
            sram1: Aperture { base: SRAM1_BASE, size: SRAM1_SIZE },
            sram2: Aperture { base: SRAM2_BASE, size: SRAM2_SIZE },
        }
    }

    /// True if `addr` lies in any of the three apertures (read/jump
    /// validation, invariant I5).
    pub fn contains(&self, addr: u32) -> bool {
        self.flash.contains(addr) || self.sram1.contains(addr) || self.sram2.contains(addr)
    }

    /// True if `[addr, addr + len)` lies entirely within any single
    /// aperture.
    pub fn contains_range(&self, addr: u32, len: u32) -> bool {
        self.flash.contains_range(addr, len)
            || self.sram1.contains_range(addr, len)
            || self.sram2.contains_range(addr, len)
    }

    /// True if `[addr, addr + len)` lies entirely within the flash
    /// aperture, the only aperture writes are permitted to target.
    pub fn contains_writable_range(&self, addr: u32, len: u32) -> bool {
        self.flash.contains_range(addr, len)
    }
}

/// True if `sector` is either a concrete sector number in `0..NUM_SECTORS`
/// or the mass-erase sentinel.
pub fn validate_sector(sector: u8) -> bool {
    sector < NUM_SECTORS || sector == MASS_ERASE_SECTOR
}

/// Validates a `(base, count)` erase range: `base` must itself be a valid
/// sector (the mass-erase sentinel ignores `count` entirely) and
/// `base + count` must not run past the last sector. `count == 0` is a
/// valid no-op range, not an error.
pub fn validate_erase_range(base: u8, count: u8) -> bool {
    if base == MASS_ERASE_SECTOR {
        return true;
    }
    validate_sector(base) && base.saturating_add(count) <= NUM_SECTORS
}

/// External collaborator: the concrete flash controller for a board.
///
/// Every method returns a [`FlashStatus`] rather than a `Result`, since the
/// dispatcher propagates that byte verbatim into the reply payload, and
/// there is no richer error channel in the wire protocol.
pub trait FlashController {
    /// Erase one sector, or every user sector if `sector ==
    /// MASS_ERASE_SECTOR`. Caller has already validated `sector` with
    /// [`validate_sector`].
    fn erase_sector(&mut self, sector: u8) -> FlashStatus;

    /// Program `data` starting at `dest`, which the caller has already
    /// validated as lying entirely within the flash aperture. Byte-granular
    /// from the caller's perspective; the controller handles any
    /// word-alignment the silicon requires internally.
    fn program(&mut self, dest: u32, data: &[u8]) -> FlashStatus;

    /// Read `len` bytes starting at `src` into `out`, which the caller has
    /// already validated as lying within one of the device apertures.
    fn read(&mut self, src: u32, out: &mut [u8]) -> FlashStatus;

    /// Current RDP level from the option bytes.
    fn rdp_level(&mut self) -> RdpLevel;

    /// Program a new write-protection `level` for every sector selected in
    /// `sector_mask` (bit `i` selects sector `i`).
    fn set_write_protect(&mut self, sector_mask: u8, level: WriteProtectLevel) -> FlashStatus;

    /// Current write-protection level of every sector, indexed `0..8`.
    fn write_protect_levels(&mut self) -> [WriteProtectLevel; NUM_SECTORS as usize];
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::*;

    /// An in-memory [`FlashController`] double backed by a flat byte
    /// vector, for exercising the erase/write/read idempotence property
    /// (spec P6) without real silicon.
    pub struct SimFlash {
        image: std::vec::Vec<u8>,
        rdp: RdpLevel,
        protect: [WriteProtectLevel; NUM_SECTORS as usize],
    }

    impl SimFlash {
        const SECTOR_SIZE: u32 = (FLASH_SIZE) / (NUM_SECTORS as u32);

        pub fn new() -> Self {
            Self {
                image: std::vec![0xFFu8; FLASH_SIZE as usize],
                rdp: RdpLevel::None,
                protect: [WriteProtectLevel::Unprotected; NUM_SECTORS as usize],
            }
        }

        fn offset(addr: u32) -> usize {
            (addr - FLASH_BASE) as usize
        }
    }

    impl FlashController for SimFlash {
        fn erase_sector(&mut self, sector: u8) -> FlashStatus {
            if sector == MASS_ERASE_SECTOR {
                self.image.fill(0xFF);
                return FlashStatus::Success;
            }
            if sector >= NUM_SECTORS {
                return FlashStatus::Failure;
            }
            let start = (sector as u32 * Self::SECTOR_SIZE) as usize;
            let end = start + Self::SECTOR_SIZE as usize;
            self.image[start..end].fill(0xFF);
            FlashStatus::Success
        }

        fn program(&mut self, dest: u32, data: &[u8]) -> FlashStatus {
            let start = Self::offset(dest);
            self.image[start..start + data.len()].copy_from_slice(data);
            FlashStatus::Success
        }

        fn read(&mut self, src: u32, out: &mut [u8]) -> FlashStatus {
            let start = Self::offset(src);
            out.copy_from_slice(&self.image[start..start + out.len()]);
            FlashStatus::Success
        }

        fn rdp_level(&mut self) -> RdpLevel {
            self.rdp
        }

        fn set_write_protect(&mut self, sector_mask: u8, level: WriteProtectLevel) -> FlashStatus {
            for i in 0..NUM_SECTORS {
                if sector_mask & (1 << i) != 0 {
                    self.protect[i as usize] = level;
                }
            }
            FlashStatus::Success
        }

        fn write_protect_levels(&mut self) -> [WriteProtectLevel; NUM_SECTORS as usize] {
            self.protect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::SimFlash;
    use super::*;

    #[test]
    fn apertures_reject_addresses_outside_all_three_regions() {
        let ap = Apertures::device();
        assert!(!ap.contains(0x0000_0000));
        assert!(!ap.contains(FLASH_BASE + FLASH_SIZE));
    }

    #[test]
    fn apertures_accept_flash_sram1_and_sram2() {
        let ap = Apertures::device();
        assert!(ap.contains(FLASH_BASE));
        assert!(ap.contains(SRAM1_BASE + 4));
        assert!(ap.contains(SRAM2_BASE + SRAM2_SIZE - 1));
    }

    #[test]
    fn writable_range_excludes_sram() {
        let ap = Apertures::device();
        assert!(!ap.contains_writable_range(SRAM1_BASE, 4));
        assert!(ap.contains_writable_range(FLASH_BASE + 0x8000, 16));
    }

    #[test]
    fn validate_sector_accepts_mass_erase_sentinel() {
        assert!(validate_sector(MASS_ERASE_SECTOR));
        assert!(validate_sector(0));
        assert!(validate_sector(NUM_SECTORS - 1));
        assert!(!validate_sector(NUM_SECTORS));
    }

    #[test]
    fn validate_erase_range_rejects_runoff_past_last_sector() {
        assert!(validate_erase_range(2, 1));
        assert!(validate_erase_range(0, NUM_SECTORS));
        assert!(!validate_erase_range(NUM_SECTORS - 1, 2));
        assert!(validate_erase_range(MASS_ERASE_SECTOR, 0));
    }

    #[test]
    fn validate_erase_range_accepts_zero_count_as_a_no_op() {
        assert!(validate_erase_range(2, 0));
        assert!(!validate_erase_range(NUM_SECTORS, 0));
    }

    #[test]
    fn write_then_read_is_idempotent_within_a_sector() {
        let mut flash = SimFlash::new();
        let sector_size = FLASH_SIZE / NUM_SECTORS as u32;
        let addr = FLASH_BASE + 2 * sector_size;

        assert_eq!(flash.erase_sector(2), FlashStatus::Success);
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(flash.program(addr, &data), FlashStatus::Success);

        let mut out = [0u8; 4];
        assert_eq!(flash.read(addr, &mut out), FlashStatus::Success);
        assert_eq!(out, data);
    }
}
