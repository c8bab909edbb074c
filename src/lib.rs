// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Runtime power management for BL31 on the AX family of SoCs.
//!
//! The crate supplies the platform half of PSCI: validation of composite power states, the
//! per-core power domain operations, and the trusted mailbox protocol used to release parked
//! secondary cores. The generic PSCI state coordination lives in the calling framework, which
//! reaches this crate through [`bl31_setup`] and the [`PsciPlatformInterface`] implementation
//! returned by [`bl31_setup::setup_psci_ops`].

#![cfg_attr(not(test), no_std)]

pub mod aarch64;
pub mod bl31_setup;
pub mod console;
pub mod context;
mod debug;
pub mod gicv2;
pub mod logger;
pub mod mailbox;
pub mod platform;
pub mod services;
pub mod topology;

pub use services::psci::PsciPlatformInterface;

#[cfg(all(target_arch = "aarch64", not(test)))]
mod asm {
    /// This macro wraps a naked_asm block with `bti`, or any other universal
    /// prologue we'd still like added.
    ///
    /// Use this over `core::arch::naked_asm` by default, otherwise you may
    /// need to ensure that e.g. `bti` landing pads are in place yourself.
    macro_rules! naked_asm {
        ($($inner:tt)*) => {
           ::core::arch::naked_asm!("bti c", $($inner)*)
        }
    }
    pub(crate) use naked_asm;
}

#[cfg(all(target_arch = "aarch64", not(test)))]
pub(crate) use asm::naked_asm;
