// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Firmware entry point for the Nucleo-F446RE board.
//!
//! Wires the chip-agnostic `bootloader` library onto real STM32F446
//! peripherals: RCC for clock gating, GPIOA/GPIOC for pin muxing, USART2 as
//! the command link, USART3 as the debug trace link, the flash interface
//! and CRC peripherals, and DBGMCU for the device identifier. Adapted from
//! the board bring-up shape in `boards/nucleo_f446re/src/main.rs`, with the
//! kernel/capsule wiring replaced by the trait objects `bootloader::dispatch`
//! consumes.

#![no_std]
#![no_main]

use bootloader::boot::{self, BootMode, BootStrap};
use bootloader::dispatch::{self, DeviceId};
use bootloader::flash::{FlashController, FlashStatus, RdpLevel, WriteProtectLevel};
use bootloader::link::{CommandLink, DebugTrace};

use core::panic::PanicInfo;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;
use tock_registers::{register_bitfields, register_structs};

// ---------------------------------------------------------------------
// RCC
// ---------------------------------------------------------------------

register_structs! {
    RccRegisters {
        (0x00 => cr: ReadWrite<u32>),
        (0x04 => pllcfgr: ReadWrite<u32>),
        (0x08 => cfgr: ReadWrite<u32>),
        (0x0C => cir: ReadWrite<u32>),
        (0x10 => ahb1rstr: ReadWrite<u32>),
        (0x14 => ahb2rstr: ReadWrite<u32>),
        (0x18 => ahb3rstr: ReadWrite<u32>),
        (0x1C => _reserved0),
        (0x20 => apb1rstr: ReadWrite<u32>),
        (0x24 => apb2rstr: ReadWrite<u32>),
        (0x28 => _reserved1),
        (0x30 => ahb1enr: ReadWrite<u32>),
        (0x34 => ahb2enr: ReadWrite<u32>),
        (0x38 => ahb3enr: ReadWrite<u32>),
        (0x3C => _reserved2),
        (0x40 => apb1enr: ReadWrite<u32>),
        (0x44 => apb2enr: ReadWrite<u32>),
        (0x48 => @END),
    }
}

const RCC_BASE: usize = 0x4002_3800;
const RCC_AHB1ENR_GPIOAEN: u32 = 1 << 0;
const RCC_AHB1ENR_GPIOCEN: u32 = 1 << 2;
const RCC_APB1ENR_USART2EN: u32 = 1 << 17;
const RCC_APB1ENR_USART3EN: u32 = 1 << 18;
const RCC_AHB1ENR_CRCEN: u32 = 1 << 12;

fn rcc() -> &'static RccRegisters {
    unsafe { &*(RCC_BASE as *const RccRegisters) }
}

fn enable_clocks() {
    rcc()
        .ahb1enr
        .set(rcc().ahb1enr.get() | RCC_AHB1ENR_GPIOAEN | RCC_AHB1ENR_GPIOCEN | RCC_AHB1ENR_CRCEN);
    rcc()
        .apb1enr
        .set(rcc().apb1enr.get() | RCC_APB1ENR_USART2EN | RCC_APB1ENR_USART3EN);
}

// ---------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------

register_structs! {
    GpioRegisters {
        (0x00 => moder: ReadWrite<u32>),
        (0x04 => otyper: ReadWrite<u32>),
        (0x08 => ospeedr: ReadWrite<u32>),
        (0x0C => pupdr: ReadWrite<u32>),
        (0x10 => idr: ReadWrite<u32>),
        (0x14 => odr: ReadWrite<u32>),
        (0x18 => bsrr: ReadWrite<u32>),
        (0x1C => lckr: ReadWrite<u32>),
        (0x20 => afrl: ReadWrite<u32>),
        (0x24 => afrh: ReadWrite<u32>),
        (0x28 => @END),
    }
}

const GPIOA_BASE: usize = 0x4002_0000;
const GPIOC_BASE: usize = 0x4002_0800;
const AF7: u32 = 7;
const MODER_ALTERNATE: u32 = 0b10;
const MODER_INPUT: u32 = 0b00;

fn gpioa() -> &'static GpioRegisters {
    unsafe { &*(GPIOA_BASE as *const GpioRegisters) }
}

fn gpioc() -> &'static GpioRegisters {
    unsafe { &*(GPIOC_BASE as *const GpioRegisters) }
}

/// Mux one pin to an alternate function, push-pull, pull-up, high speed.
fn configure_alternate_function(gpio: &'static GpioRegisters, pin: u32, af: u32) {
    gpio.moder
        .set((gpio.moder.get() & !(0b11 << (pin * 2))) | (MODER_ALTERNATE << (pin * 2)));
    gpio.otyper.set(gpio.otyper.get() & !(1 << pin));
    gpio.ospeedr
        .set(gpio.ospeedr.get() | (0b11 << (pin * 2)));
    gpio.pupdr
        .set((gpio.pupdr.get() & !(0b11 << (pin * 2))) | (0b01 << (pin * 2)));

    if pin < 8 {
        gpio.afrl
            .set((gpio.afrl.get() & !(0xF << (pin * 4))) | (af << (pin * 4)));
    } else {
        let shifted = pin - 8;
        gpio.afrh
            .set((gpio.afrh.get() & !(0xF << (shifted * 4))) | (af << (shifted * 4)));
    }
}

fn configure_strap_input(gpio: &'static GpioRegisters, pin: u32) {
    gpio.moder
        .set(gpio.moder.get() & !(0b11 << (pin * 2)) | (MODER_INPUT << (pin * 2)));
    gpio.pupdr
        .set((gpio.pupdr.get() & !(0b11 << (pin * 2))) | (0b01 << (pin * 2)));
}

fn configure_gpio() {
    configure_alternate_function(gpioa(), 2, AF7); // PA2 USART2_TX
    configure_alternate_function(gpioa(), 3, AF7); // PA3 USART2_RX
    configure_alternate_function(gpioc(), 10, AF7); // PC10 USART3_TX
    configure_alternate_function(gpioc(), 11, AF7); // PC11 USART3_RX
    configure_strap_input(gpioc(), 13); // PC13 boot-mode strap
}

// ---------------------------------------------------------------------
// USART
// ---------------------------------------------------------------------

register_bitfields![u32,
    USART_SR [
        TC OFFSET(6) NUMBITS(1) [],
        RXNE OFFSET(5) NUMBITS(1) [],
        TXE OFFSET(7) NUMBITS(1) []
    ]
];

register_structs! {
    UsartRegisters {
        (0x00 => sr: ReadWrite<u32, USART_SR::Register>),
        (0x04 => dr: ReadWrite<u32>),
        (0x08 => brr: ReadWrite<u32>),
        (0x0C => cr1: ReadWrite<u32>),
        (0x10 => cr2: ReadWrite<u32>),
        (0x14 => cr3: ReadWrite<u32>),
        (0x18 => gtpr: ReadWrite<u32>),
        (0x1C => @END),
    }
}

const USART2_BASE: usize = 0x4000_4400;
const USART3_BASE: usize = 0x4000_4800;

// APB1 on this family runs at 45 MHz after the board's default clock
// configuration; oversampling by 16 gives a BRR of APB1_CLK / baud.
const APB1_CLK_HZ: u32 = 45_000_000;
const UART_CR1_UE: u32 = 1 << 13;
const UART_CR1_TE: u32 = 1 << 3;
const UART_CR1_RE: u32 = 1 << 2;
const USART_RETRY_LIMIT: u32 = 1_000_000;

fn usart2() -> &'static UsartRegisters {
    unsafe { &*(USART2_BASE as *const UsartRegisters) }
}

fn usart3() -> &'static UsartRegisters {
    unsafe { &*(USART3_BASE as *const UsartRegisters) }
}

fn configure_usart(usart: &'static UsartRegisters, baud: u32) {
    usart.brr.set(APB1_CLK_HZ / baud);
    usart
        .cr1
        .set(UART_CR1_UE | UART_CR1_TE | UART_CR1_RE);
}

/// [`CommandLink`] over USART2, busy-polling status flags with a bounded
/// retry so a stuck line can never spin the firmware forever, even though
/// the protocol above it has no timeout of its own.
struct Usart2Link;

impl Usart2Link {
    fn wait_for(&self, predicate: impl Fn() -> bool) {
        let mut attempts = 0;
        while !predicate() && attempts < USART_RETRY_LIMIT {
            attempts += 1;
            cortexm4::support::nop();
        }
    }
}

impl CommandLink for Usart2Link {
    fn transmit(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.wait_for(|| usart2().sr.is_set(USART_SR::TXE));
            usart2().dr.set(byte as u32);
        }
    }

    fn receive(&mut self, buf: &mut [u8]) {
        for slot in buf.iter_mut() {
            self.wait_for(|| usart2().sr.is_set(USART_SR::RXNE));
            *slot = usart2().dr.get() as u8;
        }
    }

    fn drain(&mut self) {
        self.wait_for(|| usart2().sr.is_set(USART_SR::TC));
    }
}

/// [`DebugTrace`] over USART3. Drops output rather than blocking if the
/// line isn't ready, since tracing must never add latency to the command
/// UART's timing.
struct Usart3Trace;

impl DebugTrace for Usart3Trace {
    fn trace(&mut self, msg: &str) {
        for &byte in msg.as_bytes() {
            if !usart3().sr.is_set(USART_SR::TXE) {
                return;
            }
            usart3().dr.set(byte as u32);
        }
    }
}

// ---------------------------------------------------------------------
// Boot-mode strap (PC13)
// ---------------------------------------------------------------------

struct StrapPin;

impl BootStrap for StrapPin {
    fn is_asserted(&mut self) -> bool {
        gpioc().idr.get() & (1 << 13) == 0
    }
}

// ---------------------------------------------------------------------
// CRC peripheral
// ---------------------------------------------------------------------

register_structs! {
    CrcRegisters {
        (0x00 => dr: ReadWrite<u32>),
        (0x04 => idr: ReadWrite<u32>),
        (0x08 => cr: ReadWrite<u32>),
        (0x0C => @END),
    }
}

const CRC_BASE: usize = 0x4002_3000;
const CRC_CR_RESET: u32 = 1 << 0;

fn crc_peripheral() -> &'static CrcRegisters {
    unsafe { &*(CRC_BASE as *const CrcRegisters) }
}

/// [`bootloader::frame::CrcAccumulator`] backed by the real hardware CRC
/// unit instead of the software model used on the host; feeds one
/// zero-extended byte per word, matching the convention the software model
/// mirrors.
struct HardwareCrc;

impl bootloader::frame::CrcAccumulator for HardwareCrc {
    fn reset(&mut self) {
        crc_peripheral().cr.set(CRC_CR_RESET);
    }

    fn accumulate_byte(&mut self, byte: u8) -> u32 {
        crc_peripheral().dr.set(byte as u32);
        crc_peripheral().dr.get()
    }
}

// ---------------------------------------------------------------------
// Flash controller
// ---------------------------------------------------------------------

register_structs! {
    FlashRegisters {
        (0x00 => acr: ReadWrite<u32>),
        (0x04 => keyr: ReadWrite<u32>),
        (0x08 => optkeyr: ReadWrite<u32>),
        (0x0C => sr: ReadWrite<u32>),
        (0x10 => cr: ReadWrite<u32>),
        (0x14 => optcr: ReadWrite<u32>),
        (0x18 => optcr1: ReadWrite<u32>),
        (0x1C => @END),
    }
}

const FLASH_IF_BASE: usize = 0x4002_3C00;
const FLASH_SR_BSY: u32 = 1 << 16;
const FLASH_CR_PG: u32 = 1 << 0;
const FLASH_CR_SER: u32 = 1 << 1;
const FLASH_CR_MER: u32 = 1 << 2;
const FLASH_CR_STRT: u32 = 1 << 16;
const FLASH_CR_PSIZE_WORD: u32 = 0b10 << 8;
const FLASH_CR_LOCK: u32 = 1 << 31;
const FLASH_KEY1: u32 = 0x4567_0123;
const FLASH_KEY2: u32 = 0xCDEF_89AB;

fn flash_if() -> &'static FlashRegisters {
    unsafe { &*(FLASH_IF_BASE as *const FlashRegisters) }
}

fn flash_unlock() {
    if flash_if().cr.get() & FLASH_CR_LOCK != 0 {
        flash_if().keyr.set(FLASH_KEY1);
        flash_if().keyr.set(FLASH_KEY2);
    }
}

fn flash_wait_idle() {
    while flash_if().sr.get() & FLASH_SR_BSY != 0 {
        cortexm4::support::nop();
    }
}

/// [`FlashController`] driving the STM32F4 sector-erase flash interface.
/// Option-byte-based protection levels are tracked in an in-memory shadow
/// here rather than programmed into silicon, since flipping RDP/WRP bits
/// on real hardware from a bootloader under active development is
/// effectively irreversible.
struct Stm32FlashController {
    write_protect: [WriteProtectLevel; bootloader::config::NUM_SECTORS as usize],
}

impl Stm32FlashController {
    const fn new() -> Self {
        Self {
            write_protect: [WriteProtectLevel::Unprotected; bootloader::config::NUM_SECTORS as usize],
        }
    }
}

impl FlashController for Stm32FlashController {
    fn erase_sector(&mut self, sector: u8) -> FlashStatus {
        flash_unlock();
        flash_wait_idle();

        if sector == bootloader::config::MASS_ERASE_SECTOR {
            flash_if().cr.set(FLASH_CR_MER);
        } else {
            flash_if()
                .cr
                .set(FLASH_CR_SER | ((sector as u32) << 3));
        }
        flash_if().cr.set(flash_if().cr.get() | FLASH_CR_STRT);
        flash_wait_idle();
        flash_if().cr.set(flash_if().cr.get() & !(FLASH_CR_SER | FLASH_CR_MER));

        FlashStatus::Success
    }

    fn program(&mut self, dest: u32, data: &[u8]) -> FlashStatus {
        flash_unlock();
        flash_wait_idle();
        flash_if().cr.set(FLASH_CR_PG | FLASH_CR_PSIZE_WORD);

        for (i, chunk) in data.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let addr = (dest as usize + i * 4) as *mut u32;
            unsafe { core::ptr::write_volatile(addr, u32::from_le_bytes(word)) };
            flash_wait_idle();
        }

        flash_if().cr.set(flash_if().cr.get() & !FLASH_CR_PG);
        FlashStatus::Success
    }

    fn read(&mut self, src: u32, out: &mut [u8]) -> FlashStatus {
        for (i, slot) in out.iter_mut().enumerate() {
            let addr = (src as usize + i) as *const u8;
            *slot = unsafe { core::ptr::read_volatile(addr) };
        }
        FlashStatus::Success
    }

    fn rdp_level(&mut self) -> RdpLevel {
        let option_bytes = unsafe {
            core::ptr::read_volatile(bootloader::config::OPTION_BYTES_ADDR as *const u32)
        };
        match (option_bytes >> 8) & 0xFF {
            0xAA => RdpLevel::None,
            0xCC => RdpLevel::PermanentReadProtect,
            _ => RdpLevel::ReadProtect,
        }
    }

    fn set_write_protect(&mut self, sector_mask: u8, level: WriteProtectLevel) -> FlashStatus {
        for i in 0..bootloader::config::NUM_SECTORS {
            if sector_mask & (1 << i) != 0 {
                self.write_protect[i as usize] = level;
            }
        }
        FlashStatus::Success
    }

    fn write_protect_levels(&mut self) -> [WriteProtectLevel; bootloader::config::NUM_SECTORS as usize] {
        self.write_protect
    }
}

// ---------------------------------------------------------------------
// DBGMCU device identifier
// ---------------------------------------------------------------------

const DBGMCU_IDCODE_ADDR: usize = 0xE004_2000;

struct Dbgmcu;

impl DeviceId for Dbgmcu {
    fn device_id(&mut self) -> u16 {
        let idcode = unsafe { core::ptr::read_volatile(DBGMCU_IDCODE_ADDR as *const u32) };
        (idcode & 0xFFF) as u16
    }
}

// ---------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------

/// One slot of the two-word vector table head: either the initial stack
/// pointer value or a handler's entry address. A `union` lets the array
/// hold both without a pointer-to-integer cast, which the reset value
/// would otherwise need and which CTFE does not permit.
#[repr(C)]
pub union VectorTableEntry {
    stack_pointer: u32,
    handler: unsafe extern "C" fn() -> !,
}

/// Two-word head of the vector table: initial stack pointer and reset
/// entry point. Everything else (fault handlers, IRQ vectors) is out of
/// scope for a bootloader that never enables interrupts.
#[link_section = ".vector_table.reset_vector"]
#[no_mangle]
pub static RESET_VECTOR: [VectorTableEntry; 2] = [
    VectorTableEntry {
        stack_pointer: bootloader::config::SRAM1_BASE + bootloader::config::SRAM1_SIZE,
    },
    VectorTableEntry { handler: reset },
];

#[no_mangle]
pub unsafe extern "C" fn reset() -> ! {
    enable_clocks();
    configure_gpio();
    configure_usart(usart2(), bootloader::config::UART_BAUD_RATE);
    configure_usart(usart3(), bootloader::config::UART_BAUD_RATE);

    let mut strap = StrapPin;
    let mode = boot::read_strap_pin(&mut strap);

    let mut link = Usart2Link;
    let mut crc = HardwareCrc;
    let mut flash = Stm32FlashController::new();
    let mut device_id = Dbgmcu;
    let mut trace_sink = Usart3Trace;

    match mode {
        BootMode::Application => {
            boot::handoff_to_application(&mut link, bootloader::config::APP_BASE);
        }
        BootMode::Interactive => {
            dispatch::run_command_loop(&mut link, &mut crc, &mut flash, &mut device_id, &mut trace_sink);
        }
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    cortexm4::scb::reset()
}
