// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core of an in-system firmware-update bootloader for the STM32F446 family.
//!
//! This crate implements three things and nothing else:
//!
//!  - boot selection and application handoff ([`boot`]),
//!  - the framed command protocol spoken over the command UART ([`frame`],
//!    [`dispatch`]),
//!  - the flash-update state machine and its address safety envelope
//!    ([`flash`]).
//!
//! Everything that talks to real silicon (GPIO muxing, USART baud-rate
//! setup, the concrete flash-controller register sequence, the hardware CRC
//! peripheral) is an external collaborator, reached only through the
//! [`link::CommandLink`], [`link::DebugTrace`], [`frame::CrcAccumulator`],
//! and [`flash::FlashController`] traits. The `nucleo_f446re` binary in
//! `src/bin/` wires real peripherals to those traits; everything in this
//! library is runnable and testable on the host.

#![cfg_attr(not(any(test, feature = "test-util")), no_std)]

pub mod boot;
pub mod config;
pub mod dispatch;
pub mod flash;
pub mod frame;
pub mod link;
pub mod trace;
