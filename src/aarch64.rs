// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Barrier, event and MMU control instructions used around power transitions.

use arm_sysregs::{SctlrEl3, read_sctlr_el3, write_sctlr_el3};
#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Issues a full system data synchronization barrier (`dsb sy`) instruction.
pub fn dsb_sy() {
    // SAFETY: `dsb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dsb sy", options(nostack));
    }
}

/// Issues an instruction synchronization barrier (`isb`) instruction.
pub fn isb() {
    // SAFETY: `isb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("isb", options(nostack));
    }
}

/// Sends an event to all cores in the system (`sev`).
pub fn sev() {
    // SAFETY: `sev` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("sev", options(nomem, nostack, preserves_flags));
    }
}

/// Waits for an event (`wfe`). Returns after an event is received or immediately if the event
/// register was already set.
pub fn wfe() {
    // SAFETY: `wfe` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("wfe", options(nomem, nostack, preserves_flags));
    }
}

/// Waits for an interrupt (`wfi`). Returns once an interrupt is pending for this core.
pub fn wfi() {
    // SAFETY: `wfi` does not violate safe Rust guarantees.
    #[cfg(all(target_arch = "aarch64", not(test)))]
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}

/// Turns off the EL3 MMU and data cache for the calling core.
///
/// # Safety
///
/// Caller must guarantee that it is safe to disable the MMU at the time of calling this function,
/// i.e. everything the core touches afterwards is identity mapped and does not rely on cached
/// data which has not been cleaned.
pub unsafe fn disable_mmu_el3() {
    let mut sctlr_el3 = read_sctlr_el3();
    sctlr_el3.remove(SctlrEl3::C | SctlrEl3::M);
    // SAFETY: `sctlr` is a valid and safe value for the EL3 system control register. Caller
    // promises that we can safely disable the MMU.
    unsafe {
        write_sctlr_el3(sctlr_el3);
    }
    isb();
    dsb_sy();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::SYSREG_LOCK;
    use arm_sysregs::fake::SYSREGS;

    #[test]
    fn disable_mmu_clears_mmu_and_cache_enables() {
        let _guard = SYSREG_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        SYSREGS.lock().unwrap().sctlr_el3 = SctlrEl3::C | SctlrEl3::M;

        // SAFETY: The MMU is faked in unit tests.
        unsafe {
            disable_mmu_el3();
        }

        assert!(
            !SYSREGS
                .lock()
                .unwrap()
                .sctlr_el3
                .intersects(SctlrEl3::C | SctlrEl3::M)
        );
    }
}
