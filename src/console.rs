// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Boot console on a 16550 compatible UART with 32-bit register spacing.

use arm_gic::UniqueMmioPointer;
use bitflags::bitflags;
use core::fmt::{self, Write};
use safe_mmio::{
    field, field_shared,
    fields::{ReadOnly, ReadPureWrite, ReadWrite},
};
use zerocopy::FromBytes;

/// 16550 UART registers.
#[derive(FromBytes)]
#[repr(C)]
pub struct Uart16550Registers {
    /// Receive buffer, transmit holding or divisor latch low register.
    pub rbr_thr_dll: ReadWrite<u32>,
    /// Interrupt enable or divisor latch high register.
    pub ier_dlh: ReadPureWrite<u32>,
    /// Interrupt identification or FIFO control register.
    pub iir_fcr: ReadWrite<u32>,
    /// Line control register.
    pub lcr: ReadPureWrite<u32>,
    /// Modem control register.
    pub mcr: ReadPureWrite<u32>,
    /// Line status register.
    pub lsr: ReadOnly<u32>,
    /// Modem status register.
    pub msr: ReadOnly<u32>,
    /// Scratch register.
    pub scr: ReadPureWrite<u32>,
}

bitflags! {
    /// Line control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct Lcr: u32 {
        const WLS_8 = 0b11;
        const DLAB = 1 << 7;
    }

    /// FIFO control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct Fcr: u32 {
        const FIFOE = 1 << 0;
        const RFIFOR = 1 << 1;
        const XFIFOR = 1 << 2;
    }

    /// Modem control register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct Mcr: u32 {
        const DTR = 1 << 0;
        const RTS = 1 << 1;
    }

    /// Line status register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct Lsr: u32 {
        const THRE = 1 << 5;
        const TEMT = 1 << 6;
    }

    /// Interrupt enable register.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Ier: u32 {
        /// Received data available.
        const ERBFI = 1 << 0;
        /// Transmit holding register empty.
        const ETBEI = 1 << 1;
        /// Receiver line status.
        const ELSI = 1 << 2;
        /// Modem status.
        const EDSSI = 1 << 3;
    }
}

/// Driver for a 16550 UART, used for output only.
pub struct Uart16550 {
    registers: UniqueMmioPointer<'static, Uart16550Registers>,
}

impl Uart16550 {
    /// Creates a driver for the given UART registers, without touching the hardware.
    pub fn new(registers: UniqueMmioPointer<'static, Uart16550Registers>) -> Self {
        Self { registers }
    }

    /// Programs the baud rate divisor and sets up the line for 8 data bits, no parity and 1 stop
    /// bit, with FIFOs enabled and interrupts disabled.
    pub fn init(&mut self, clock_hz: u32, baud_rate: u32) {
        assert!(baud_rate > 0);
        let divisor = (clock_hz + baud_rate / 2) / (16 * baud_rate);

        field!(self.registers, lcr).write(Lcr::DLAB.bits());
        field!(self.registers, rbr_thr_dll).write(divisor & 0xff);
        field!(self.registers, ier_dlh).write((divisor >> 8) & 0xff);
        field!(self.registers, lcr).write(Lcr::WLS_8.bits());
        self.disable_interrupts();
        field!(self.registers, iir_fcr).write((Fcr::FIFOE | Fcr::RFIFOR | Fcr::XFIFOR).bits());
        field!(self.registers, mcr).write((Mcr::DTR | Mcr::RTS).bits());
    }

    /// Returns the interrupt sources which are enabled.
    pub fn enabled_interrupts(&self) -> Ier {
        Ier::from_bits_retain(field_shared!(self.registers, ier_dlh).read())
    }

    /// Masks all interrupt sources of the UART.
    pub fn disable_interrupts(&mut self) {
        field!(self.registers, ier_dlh).write(Ier::empty().bits());
    }

    fn line_status(&mut self) -> Lsr {
        Lsr::from_bits_retain(field!(self.registers, lsr).read())
    }

    fn putc(&mut self, c: u8) {
        while !self.line_status().contains(Lsr::THRE) {}
        field!(self.registers, rbr_thr_dll).write(c.into());
    }

    /// Waits until everything written has been transmitted.
    pub fn flush(&mut self) {
        while !self.line_status().contains(Lsr::TEMT) {}
    }
}

impl Write for Uart16550 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.bytes() {
            if c == b'\n' {
                self.putc(b'\r');
            }
            self.putc(c);
        }
        Ok(())
    }
}

/// Initialises the given UART as the boot console.
pub fn console_init(
    registers: UniqueMmioPointer<'static, Uart16550Registers>,
    clock_hz: u32,
    baud_rate: u32,
) -> Uart16550 {
    let mut uart = Uart16550::new(registers);
    uart.init(clock_hz, baud_rate);
    uart
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    fn fake_uart() -> Uart16550 {
        let registers = Box::leak(Box::new(Uart16550Registers::new_zeroed()));
        registers.lsr = ReadOnly((Lsr::THRE | Lsr::TEMT).bits());
        registers.ier_dlh = ReadPureWrite(Ier::ERBFI.bits());
        Uart16550::new(UniqueMmioPointer::from(registers))
    }

    #[test]
    fn init_programs_divisor_and_line() {
        let mut uart = console_init(fake_uart().registers, 24_000_000, 115_200);

        // (24000000 + 57600) / 1843200 = 13
        assert_eq!(field!(uart.registers, rbr_thr_dll).read(), 13);
        assert_eq!(uart.enabled_interrupts(), Ier::empty());
        assert_eq!(field!(uart.registers, lcr).read(), 0x3);
        assert_eq!(field!(uart.registers, iir_fcr).read(), 0x7);
        assert_eq!(field!(uart.registers, mcr).read(), 0x3);
    }

    #[test]
    fn newline_is_sent_as_crlf() {
        let mut uart = fake_uart();
        write!(uart, "ok\n").unwrap();
        uart.flush();
        assert_eq!(field!(uart.registers, rbr_thr_dll).read(), u32::from(b'\n'));
    }

    #[test]
    fn interrupts_can_be_masked() {
        let mut uart = fake_uart();
        assert_eq!(uart.enabled_interrupts(), Ier::ERBFI);
        uart.disable_interrupts();
        assert_eq!(uart.enabled_interrupts(), Ier::empty());
    }
}
