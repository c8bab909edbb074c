// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Identity of the current core and the entry points of the images BL31 hands over to.

use crate::platform::{Platform, PlatformImpl};
use arm_sysregs::{SpsrEl3 as Spsr, read_mpidr_el1};
use percore::Cores;

/// The security state of an image BL31 can return to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SecurityState {
    /// The secure world, i.e. BL32.
    Secure,
    /// The normal world, i.e. BL33.
    NonSecure,
}

/// Information about the first instruction executed by a lower EL image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryPointInfo {
    /// Address of the first instruction.
    pub pc: usize,
    /// Saved program status the image is entered with.
    pub spsr: Spsr,
    /// Values of x0 to x7 on entry.
    pub args: [u64; 8],
}

/// Implementation of the `Cores` trait to get the index of the current CPU core.
pub struct CoresImpl;

// SAFETY: This implementation never returns the same index for different cores because
// `core_position` is guaranteed not to.
unsafe impl Cores for CoresImpl {
    fn core_index() -> usize {
        let mpidr = read_mpidr_el1();
        PlatformImpl::TOPOLOGY
            .core_position(mpidr)
            .unwrap_or_else(|| panic!("Running on unknown core {:#x}", mpidr.bits()))
    }
}
