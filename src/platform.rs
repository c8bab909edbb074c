// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Selection of the SoC variant and the hooks every variant implements.

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident::$plat_impl:ident) => {
        #[cfg(all(not(test), platform = $condition))]
        mod $mod;

        #[cfg(all(not(test), platform = $condition))]
        pub use $mod::$plat_impl as PlatformImpl;
    };
    (test, $mod:ident::$plat_impl:ident) => {
        #[cfg(test)]
        pub mod $mod;

        #[cfg(test)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

pub mod ax;
select_platform!(platform = "laguna", laguna::Laguna);
select_platform!(test, test::TestPlatform);

// LMT is built when no other platform is selected.
#[cfg(all(not(test), not(platform = "laguna")))]
mod lmt;
#[cfg(all(not(test), not(platform = "laguna")))]
pub use lmt::Lmt as PlatformImpl;

use crate::{
    context::EntryPointInfo,
    gicv2::{GicConfig, GicDriver, InterruptController},
    logger::LogSink,
    services::psci::PsciPlatformInterface,
    topology::ClusterTopology,
};
use arm_gic::IntId;

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type LogSinkImpl = <PlatformImpl as Platform>::LogSinkImpl;

/// The PSCI operations of the selected platform.
pub type PsciPlatformImpl = <PlatformImpl as Platform>::PsciPlatformImpl;

/// The local power state type of the selected platform.
pub type PlatformPowerState = <PsciPlatformImpl as PsciPlatformInterface>::PlatformPowerState;

/// The hooks implemented by all platforms.
pub trait Platform {
    /// Human readable name of the platform, printed at boot.
    const NAME: &'static str;

    /// The cluster and core layout, and how MPIDR values map onto it.
    const TOPOLOGY: ClusterTopology;

    /// The number of CPU cores.
    const CORE_COUNT: usize = Self::TOPOLOGY.core_count();

    /// MPIDR of the core which runs the cold boot path.
    const PRIMARY_CPU_MPIDR: u64;

    /// Base of the DRAM the normal world may execute from.
    const NS_DRAM_BASE: u64;

    /// Size of the DRAM the normal world may execute from.
    const NS_DRAM_SIZE: u64;

    /// Base address of the trusted mailbox in shared RAM.
    const TRUSTED_MAILBOX_BASE: usize;

    /// Base address of the power management unit.
    const PMU_BASE: usize;

    /// Offset from [`Self::PMU_BASE`] of the power control register of each core, indexed by
    /// linear core position. `None` means there is no way to power the core up.
    const PMU_CORE_OFFSETS: &'static [Option<usize>];

    /// The interrupts the GIC is set up with.
    const GIC_CONFIG: &'static GicConfig;

    /// Platform dependent LogSink implementation type for Logger.
    type LogSinkImpl: LogSink;

    /// Platform dependent PsciPlatformInterface implementation type.
    type PsciPlatformImpl: PsciPlatformInterface;

    /// Initialises the boot console and the logger.
    ///
    /// `arg0` to `arg3` are the values BL2 passed in x0 to x3. Any logs sent before this is
    /// called will be ignored.
    fn init_early(arg0: u64, arg1: u64, arg2: u64, arg3: u64);

    /// Creates instance of GIC driver.
    ///
    /// # Safety
    ///
    /// This must only be called once, to avoid creating aliases of the GIC driver.
    unsafe fn create_gic() -> GicDriver<'static>;

    /// Handles a Group 0 interrupt which has been acknowledged at EL3.
    ///
    /// The handler must signal the end of the interrupt to `gic`.
    fn handle_group0_interrupt(gic: &dyn InterruptController, int_id: IntId);

    /// Returns the entry point for the secure world, i.e. BL32.
    fn secure_entry_point() -> EntryPointInfo;

    /// Returns the entry point for the non-secure world, i.e. BL33.
    fn non_secure_entry_point() -> EntryPointInfo;

    /// Creates the PSCI platform implementation, publishing `sec_entrypoint` in the trusted
    /// mailbox as the address released cores jump to.
    ///
    /// # Safety
    ///
    /// This must only be called once, to avoid creating aliases of the trusted mailbox and the
    /// PMU. No secondary core may have been released yet.
    unsafe fn psci_platform(sec_entrypoint: u64) -> Self::PsciPlatformImpl;
}
