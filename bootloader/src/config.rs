// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compile-time configuration.
//!
//! A bootloader has no runtime configuration file to load; everything that
//! would otherwise live in one is a `const` here instead.

/// Bootloader version reported by `GET_VERSION`, encoded as `(major << 4) |
/// minor` (`0x10` is v1.0).
pub const BL_VERSION: u8 = 0x10;

/// Start of the internal flash aperture.
pub const FLASH_BASE: u32 = 0x0800_0000;
/// Size of the internal flash aperture.
pub const FLASH_SIZE: u32 = 512 * 1024;

/// Start of SRAM1.
pub const SRAM1_BASE: u32 = 0x2000_0000;
/// Size of SRAM1.
pub const SRAM1_SIZE: u32 = 112 * 1024;

/// Start of SRAM2.
pub const SRAM2_BASE: u32 = 0x2001_C000;
/// Size of SRAM2.
pub const SRAM2_SIZE: u32 = 16 * 1024;

/// Offset of the resident application image from [`FLASH_BASE`] (sector 2).
pub const APP_OFFSET: u32 = 0x8000;

/// Base address of the resident application image.
pub const APP_BASE: u32 = FLASH_BASE + APP_OFFSET;

/// Address of the option-bytes word that carries the RDP level in bits
/// `[15:8]`.
pub const OPTION_BYTES_ADDR: u32 = 0x1FFF_C000;

/// Number of erasable sectors in the user flash area.
pub const NUM_SECTORS: u8 = 8;

/// Sentinel base-sector value requesting a mass erase.
pub const MASS_ERASE_SECTOR: u8 = 0xFF;

/// Command-channel and debug-channel line settings (8N1).
pub const UART_BAUD_RATE: u32 = 115_200;

/// Size of the frame receive buffer: one length byte plus the largest
/// payload a single `u8` length field can describe (0..=255 bytes).
pub const MAX_FRAME_LEN: usize = 256;

/// Opcodes supported by this bootloader, in the order `GET_HELP` reports
/// them.
pub const SUPPORTED_OPCODES: [u8; 10] = [
    0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA,
];
