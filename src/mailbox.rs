// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Trusted mailbox and holding pen protocol for releasing secondary cores.
//!
//! The mailbox starts with the warm boot entry point, followed by one hold entry per core. A
//! parked core waits in its holding pen with `wfe` until its entry reads [`HoldState::Go`], resets
//! the entry to [`HoldState::Wait`] and jumps to the entry point. Each hold entry has a single
//! writer, the core releasing the target, and a single reader, the target itself.

use crate::{
    aarch64::{dsb_sy, sev},
    platform::{Platform, PlatformImpl},
};
use arm_gic::UniqueMmioPointer;
use arm_psci::ErrorCode;
use log::{debug, trace};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use safe_mmio::{field, fields::ReadPureWrite};
use spin::mutex::SpinMutex;

/// Value of a core's hold entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum HoldState {
    /// The core must stay in its holding pen.
    Wait = 0,
    /// The core may leave its holding pen and jump to the warm boot entry point.
    Go = 1,
}

/// Layout of the trusted mailbox in shared RAM.
#[repr(C)]
pub struct MailboxRegisters {
    /// Warm boot entry point of released cores.
    pub entrypoint: ReadPureWrite<u64>,
    /// One [`HoldState`] per core, by core position.
    pub hold: [ReadPureWrite<u64>; PlatformImpl::CORE_COUNT],
}

/// The shared memory window holding the warm boot entry point and the hold entries.
pub struct TrustedMailbox {
    registers: SpinMutex<UniqueMmioPointer<'static, MailboxRegisters>>,
}

impl TrustedMailbox {
    /// Wraps the given mailbox.
    pub fn new(registers: UniqueMmioPointer<'static, MailboxRegisters>) -> Self {
        Self {
            registers: SpinMutex::new(registers),
        }
    }

    /// Returns the hold entry of the given core.
    ///
    /// Panics if there is no core at that position.
    fn hold_entry<'a>(
        registers: &'a mut UniqueMmioPointer<'static, MailboxRegisters>,
        core_index: usize,
    ) -> UniqueMmioPointer<'a, ReadPureWrite<u64>> {
        let Some(entry) = field!(*registers, hold).take(core_index) else {
            panic!("No hold entry for core {core_index}");
        };
        entry
    }

    /// Returns the physical address of the hold entry of the given core.
    pub fn hold_entry_address(&self, core_index: usize) -> usize {
        Self::hold_entry(&mut self.registers.lock(), core_index).ptr_mut() as usize
    }

    /// Returns the physical address of the warm boot entry point.
    pub fn entrypoint_address(&self) -> usize {
        let mut registers = self.registers.lock();
        field!(*registers, entrypoint).ptr_mut() as usize
    }

    /// Returns the published warm boot entry point.
    pub fn entrypoint(&self) -> u64 {
        let mut registers = self.registers.lock();
        field!(*registers, entrypoint).read()
    }

    fn set_entrypoint(&self, entrypoint: u64) {
        let mut registers = self.registers.lock();
        field!(*registers, entrypoint).write(entrypoint);
    }

    /// Returns the hold entry of the given core, or `None` if it has been corrupted.
    pub fn hold_state(&self, core_index: usize) -> Option<HoldState> {
        let value = Self::hold_entry(&mut self.registers.lock(), core_index).read();
        HoldState::try_from(value).ok()
    }

    fn set_hold_state(&self, core_index: usize, state: HoldState) {
        Self::hold_entry(&mut self.registers.lock(), core_index).write(state.into());
    }
}

/// Where a core is in the release handshake, as seen by this layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoreBootState {
    /// Waiting in the holding pen, or never started.
    Parked,
    /// GO has been written but the core hasn't reached `on_finish` yet.
    Released,
    /// Executing in the normal or secure world.
    Running,
}

/// Owns the trusted mailbox and tracks the release handshake of each core.
///
/// There is exactly one instance, created by the core which sets up PSCI before any other core
/// is released. The warm boot entry point is published when it is created and never changed.
pub struct BootCoordinator {
    mailbox: TrustedMailbox,
    cores: [SpinMutex<CoreBootState>; PlatformImpl::CORE_COUNT],
}

impl BootCoordinator {
    /// Publishes `secure_entrypoint` and resets all hold entries to WAIT. The calling core,
    /// `boot_core`, is recorded as running and all others as parked.
    pub fn new(mailbox: TrustedMailbox, secure_entrypoint: u64, boot_core: usize) -> Self {
        assert!(boot_core < PlatformImpl::CORE_COUNT);
        debug!("Publishing warm boot entry point {secure_entrypoint:#x}");

        mailbox.set_entrypoint(secure_entrypoint);
        for core_index in 0..PlatformImpl::CORE_COUNT {
            mailbox.set_hold_state(core_index, HoldState::Wait);
        }
        // Make the entry point visible before any core can observe GO.
        dsb_sy();

        Self {
            mailbox,
            cores: core::array::from_fn(|core_index| {
                SpinMutex::new(if core_index == boot_core {
                    CoreBootState::Running
                } else {
                    CoreBootState::Parked
                })
            }),
        }
    }

    /// Returns the mailbox.
    pub fn mailbox(&self) -> &TrustedMailbox {
        &self.mailbox
    }

    /// Returns the recorded state of the given core.
    pub fn core_state(&self, core_index: usize) -> CoreBootState {
        *self.cores[core_index].lock()
    }

    /// Releases a parked core from its holding pen.
    ///
    /// `power_up` is called once the hold entry has been set to GO and the event sent, to apply
    /// power to the core in case it is not already powered. It is not called if the core was
    /// already released or running.
    pub fn release(&self, core_index: usize, power_up: impl FnOnce()) -> Result<(), ErrorCode> {
        let mut state = self.cores[core_index].lock();
        match *state {
            CoreBootState::Running => return Err(ErrorCode::AlreadyOn),
            CoreBootState::Released => return Err(ErrorCode::OnPending),
            CoreBootState::Parked => {}
        }

        trace!("Releasing core {core_index}");
        self.mailbox.set_hold_state(core_index, HoldState::Go);
        // The GO must be visible before the event wakes the target.
        dsb_sy();
        sev();

        power_up();
        *state = CoreBootState::Released;
        Ok(())
    }

    /// Records that a released core has arrived in the runtime firmware.
    ///
    /// Panics if the core wasn't released, as this means `on_finish` was called twice or for a
    /// core that was never turned on.
    pub fn mark_running(&self, core_index: usize) {
        let mut state = self.cores[core_index].lock();
        assert_eq!(
            *state,
            CoreBootState::Released,
            "Core {core_index} finished powering on without having been released"
        );
        *state = CoreBootState::Running;
    }

    /// Records that a running core is about to go back into its holding pen.
    pub fn park(&self, core_index: usize) {
        let mut state = self.cores[core_index].lock();
        assert_eq!(
            *state,
            CoreBootState::Running,
            "Core {core_index} powering down while not running"
        );
        *state = CoreBootState::Parked;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    const ENTRYPOINT: u64 = 0x0e09_1000;

    fn fake_mailbox() -> TrustedMailbox {
        let registers = Box::leak(Box::new(MailboxRegisters {
            entrypoint: ReadPureWrite(0xdead_beef),
            hold: core::array::from_fn(|_| ReadPureWrite(0xdead_beef)),
        }));
        TrustedMailbox::new(UniqueMmioPointer::from(registers))
    }

    #[test]
    fn setup_publishes_entrypoint_and_waits() {
        let coordinator = BootCoordinator::new(fake_mailbox(), ENTRYPOINT, 0);

        assert_eq!(coordinator.mailbox().entrypoint(), ENTRYPOINT);
        for core_index in 0..PlatformImpl::CORE_COUNT {
            assert_eq!(
                coordinator.mailbox().hold_state(core_index),
                Some(HoldState::Wait)
            );
        }
        assert_eq!(coordinator.core_state(0), CoreBootState::Running);
        assert_eq!(coordinator.core_state(1), CoreBootState::Parked);
    }

    #[test]
    fn release_and_finish() {
        let coordinator = BootCoordinator::new(fake_mailbox(), ENTRYPOINT, 0);

        assert_eq!(coordinator.release(3, || {}), Ok(()));
        assert_eq!(coordinator.mailbox().hold_state(3), Some(HoldState::Go));
        assert_eq!(coordinator.mailbox().hold_state(2), Some(HoldState::Wait));
        assert_eq!(coordinator.core_state(3), CoreBootState::Released);
        assert_eq!(coordinator.release(3, || {}), Err(ErrorCode::OnPending));

        coordinator.mark_running(3);
        assert_eq!(coordinator.core_state(3), CoreBootState::Running);
        assert_eq!(coordinator.release(3, || {}), Err(ErrorCode::AlreadyOn));
        assert_eq!(coordinator.release(0, || {}), Err(ErrorCode::AlreadyOn));

        coordinator.park(3);
        assert_eq!(coordinator.core_state(3), CoreBootState::Parked);
        // The entry point is never touched by the handshake.
        assert_eq!(coordinator.mailbox().entrypoint(), ENTRYPOINT);
    }

    #[test]
    fn power_up_only_for_parked_cores() {
        let coordinator = BootCoordinator::new(fake_mailbox(), ENTRYPOINT, 0);
        let mut powered = Vec::new();

        assert_eq!(coordinator.release(1, || powered.push(1)), Ok(()));
        assert_eq!(
            coordinator.release(1, || powered.push(1)),
            Err(ErrorCode::OnPending)
        );
        assert_eq!(
            coordinator.release(0, || powered.push(0)),
            Err(ErrorCode::AlreadyOn)
        );
        assert_eq!(powered, [1]);
    }

    #[test]
    #[should_panic(expected = "without having been released")]
    fn finish_without_release() {
        let coordinator = BootCoordinator::new(fake_mailbox(), ENTRYPOINT, 0);
        coordinator.mark_running(2);
    }

    #[test]
    fn hold_entry_layout() {
        let mailbox = fake_mailbox();
        let base = mailbox.entrypoint_address();
        assert_eq!(mailbox.hold_entry_address(0), base + 8);
        assert_eq!(mailbox.hold_entry_address(2), base + 24);
        assert_eq!(offset_of!(MailboxRegisters, hold), 8);
        assert_eq!(
            size_of::<MailboxRegisters>(),
            8 + 8 * PlatformImpl::CORE_COUNT
        );
    }

    #[test]
    #[should_panic(expected = "No hold entry for core 8")]
    fn hold_entry_of_unknown_core() {
        fake_mailbox().hold_state(PlatformImpl::CORE_COUNT);
    }
}
