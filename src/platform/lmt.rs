// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The LMT SoC: two clusters of four cores.

use super::{
    Platform,
    ax::{AxPsciPlatformImpl, PMU_SIZE, SECURE_INTERRUPTS, handle_unexpected_interrupt},
};
use crate::{
    console::{Uart16550, Uart16550Registers, console_init},
    context::{CoresImpl, EntryPointInfo},
    gicv2::{Gic, GicConfig, GicDriver, InterruptController},
    logger::{self, LockedWriter},
    mailbox::MailboxRegisters,
    topology::{AffinityLayout, ClusterTopology},
};
use arm_gic::{
    IntId, UniqueMmioPointer,
    gicv2::registers::{Gicc, Gicd},
};
use arm_sysregs::SpsrEl3 as Spsr;
use core::ptr::NonNull;
use percore::Cores;

const DRAM_BASE: u64 = 0x4_0000_0000;
const NS_DRAM_SIZE: u64 = 16 << 30;
const BL32_OFFSET: u64 = 0x0400_0000;
const BL33_OFFSET: u64 = 0x0020_0000;

const IRAM_BASE: usize = 0x0000_0000;
const IRAM_SIZE: usize = 128 << 10;
/// The last 4 KiB of IRAM are shared with the cores' cold boot code.
const SHARED_RAM_BASE: usize = IRAM_BASE + IRAM_SIZE - (4 << 10);

const PMU_BASE: usize = 0x0600_0000;

const BOOT_UART_BASE: *mut Uart16550Registers = 0x1068_a000 as _;
const BOOT_UART_CLK_IN_HZ: u32 = 24_000_000;
const CONSOLE_BAUDRATE: u32 = 115_200;

const GICD_BASE: *mut Gicd = 0x0044_9000 as _;
const GICC_BASE: *mut Gicc = 0x0044_a000 as _;

/// PMU power control register offsets, by core position.
const PMU_CORE_OFFSETS: [Option<usize>; 8] = [
    Some(0x214),
    Some(0x220),
    Some(0x22c),
    Some(0x238),
    Some(0x240),
    Some(0x248),
    Some(0x250),
    Some(0x258),
];

const _: () = {
    assert!(PMU_CORE_OFFSETS.len() == Lmt::CORE_COUNT);
    let mut i = 0;
    while i < PMU_CORE_OFFSETS.len() {
        match PMU_CORE_OFFSETS[i] {
            Some(offset) => assert!(offset < PMU_SIZE && offset % 4 == 0),
            None => panic!("Every LMT core has a PMU power control register"),
        }
        i += 1;
    }
    assert!(SHARED_RAM_BASE + size_of::<MailboxRegisters>() <= IRAM_BASE + IRAM_SIZE);
    assert!(BL32_OFFSET < NS_DRAM_SIZE && BL33_OFFSET < NS_DRAM_SIZE);
};

/// The LMT SoC.
pub struct Lmt;

impl Platform for Lmt {
    const NAME: &'static str = "LMT";
    const TOPOLOGY: ClusterTopology = ClusterTopology::new(2, 4, AffinityLayout::CoreInAff1);
    const PRIMARY_CPU_MPIDR: u64 = 0x0;

    const NS_DRAM_BASE: u64 = DRAM_BASE;
    const NS_DRAM_SIZE: u64 = NS_DRAM_SIZE;
    const TRUSTED_MAILBOX_BASE: usize = SHARED_RAM_BASE;
    const PMU_BASE: usize = PMU_BASE;
    const PMU_CORE_OFFSETS: &'static [Option<usize>] = &PMU_CORE_OFFSETS;

    const GIC_CONFIG: &'static GicConfig = &GicConfig {
        interrupts_config: &SECURE_INTERRUPTS,
    };

    type LogSinkImpl = LockedWriter<Uart16550>;
    type PsciPlatformImpl = AxPsciPlatformImpl;

    fn init_early(_arg0: u64, _arg1: u64, _arg2: u64, _arg3: u64) {
        // SAFETY: `BOOT_UART_BASE` is the base address of a 16550 UART, and nothing else accesses
        // that address range.
        let uart = unsafe { UniqueMmioPointer::new(NonNull::new(BOOT_UART_BASE).unwrap()) };
        logger::init(LockedWriter::new(console_init(
            uart,
            BOOT_UART_CLK_IN_HZ,
            CONSOLE_BAUDRATE,
        )))
        .expect("Failed to initialise logger");
    }

    unsafe fn create_gic() -> GicDriver<'static> {
        // SAFETY: `GICD_BASE` and `GICC_BASE` are the addresses of LMT's GICv2 frames, and our
        // caller guarantees there are no other drivers for them.
        unsafe { GicDriver::new(GICD_BASE, GICC_BASE, Self::GIC_CONFIG) }
    }

    fn handle_group0_interrupt(gic: &dyn InterruptController, int_id: IntId) {
        handle_unexpected_interrupt(gic, int_id);
    }

    fn secure_entry_point() -> EntryPointInfo {
        EntryPointInfo {
            pc: (DRAM_BASE + BL32_OFFSET) as usize,
            spsr: Spsr::D | Spsr::A | Spsr::I | Spsr::F | Spsr::M_AARCH64_EL1H,
            args: Default::default(),
        }
    }

    fn non_secure_entry_point() -> EntryPointInfo {
        EntryPointInfo {
            pc: (DRAM_BASE + BL33_OFFSET) as usize,
            spsr: Spsr::D | Spsr::A | Spsr::I | Spsr::F | Spsr::M_AARCH64_EL2H,
            args: Default::default(),
        }
    }

    unsafe fn psci_platform(sec_entrypoint: u64) -> AxPsciPlatformImpl {
        // SAFETY: Our caller guarantees that this is only called once. The trusted mailbox and PMU
        // are device memory which only the PSCI implementation accesses.
        unsafe {
            AxPsciPlatformImpl::from_platform(sec_entrypoint, CoresImpl::core_index(), Gic::get())
        }
    }
}
