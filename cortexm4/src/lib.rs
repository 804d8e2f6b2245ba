// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cortex-M4 architecture support.
//!
//! This crate holds exactly the architecture-level primitives the bootloader
//! core needs: basic instruction wrappers, the system control block, and the
//! application handoff trampoline. It does not model interrupts, the MPU, or
//! process switching, since the bootloader never runs more than one context.

#![cfg_attr(not(test), no_std)]

pub mod handoff;
pub mod scb;
pub mod support;
