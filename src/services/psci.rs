// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The platform side of PSCI: the operations the generic PSCI implementation calls to validate
//! requests and to move power domains between states.

pub mod power_state;

use crate::platform::{Platform, PlatformImpl, PlatformPowerState, PsciPlatformImpl};
use arm_psci::{EntryPoint, ErrorCode, Mpidr};
use arm_sysregs::MpidrEl1;
use core::fmt::Debug;
use power_state::decode_state_id;

/// Platform-specific power state interface
///
/// The platform has to provide a platform-specific power state type which implements this trait
/// and all of the dependent traits.
///
/// The type has to implement the `Ord` trait in a way the states are in ascending order from
/// running state to power down state. Converting from `u8` must accept exactly the local state
/// values which may appear in a StateID.
pub trait PlatformPowerStateInterface:
    Debug + Clone + Copy + PartialEq + Ord + Into<usize> + TryFrom<u8>
{
    /// The deepest state, where the domain is powered off.
    const OFF: Self;
    /// The running state.
    const RUN: Self;

    /// Returns the type of the platform-specific power state.
    fn power_state_type(&self) -> PowerStateType;
}

/// PSCI platform interface
///
/// The operation table through which the generic PSCI implementation drives the platform. Calls
/// for a given core are made on that core, except for `power_domain_on` which is made by the core
/// requesting the power on.
pub trait PsciPlatformInterface {
    /// Count of all power domains
    const POWER_DOMAIN_COUNT: usize;
    /// Maximal power level in the system
    const MAX_POWER_LEVEL: usize;

    /// Platform-specific power state type
    type PlatformPowerState: PlatformPowerStateInterface;

    /// Returns the power domain topology as the count of child nodes in a BFS traversal order.
    fn topology() -> &'static [usize];

    /// Checks that `power_state` is one of the idle states the platform supports and returns the
    /// local state requested for each power level.
    fn validate_power_state(&self, power_state: u32) -> Result<PsciCompositePowerState, ErrorCode>;

    /// Checks that a non-secure entry point lies in memory the normal world may execute from.
    fn validate_ns_entrypoint(&self, entry: &EntryPoint) -> Result<(), ErrorCode>;

    /// Places the current CPU into standby state and continues execution on interrupt.
    /// The caller has to guarantee that `cpu_state` is a standby power state, otherwise
    /// `cpu_standby` should panic.
    fn cpu_standby(&self, cpu_state: PlatformPowerState);

    /// Turn on power domain, which is identified by its MPIDR.
    fn power_domain_on(&self, mpidr: Mpidr) -> Result<(), ErrorCode>;

    /// Perform platform-specific actions to turn this cpu off e.g. program the power controller.
    fn power_domain_off(&self, target_state: &PsciCompositePowerState);

    /// Prepares this CPU and its ancestors for a suspend to `target_state`.
    fn power_domain_suspend(&self, target_state: &PsciCompositePowerState);

    /// Enters the final low power state after `power_domain_off` or `power_domain_suspend`.
    fn power_domain_power_down_wfi(&self, target_state: &PsciCompositePowerState) -> !;

    /// Perform platform-specific actions after the CPU has been turned on.
    fn power_domain_on_finish(&self, previous_state: &PsciCompositePowerState);

    /// Performs platform-specific operations after a wake-up from a suspend.
    fn power_domain_suspend_finish(&self, previous_state: &PsciCompositePowerState);

    /// Shuts down the system.
    fn system_off(&self) -> !;

    /// Resets the system, the behavior is equivalent to a hardware power-cycle sequence.
    fn system_reset(&self) -> !;
}

/// Classification of a local power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStateType {
    /// The domain loses power and its context.
    PowerDown,
    /// The domain stops executing but keeps its context.
    StandbyOrRetention,
    /// The domain is running.
    Run,
}

/// Object for storing platform-specific power state for multiple power levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsciCompositePowerState {
    /// Local state of each power level, indexed by level.
    pub states: [PlatformPowerState; PsciPlatformImpl::MAX_POWER_LEVEL + 1],
}

impl PsciCompositePowerState {
    /// Index of the CPU level in `states`.
    pub const CPU_POWER_LEVEL: usize = 0;

    /// States set to OFF on all levels.
    pub const OFF: Self = Self {
        states: [PlatformPowerState::OFF; PsciPlatformImpl::MAX_POWER_LEVEL + 1],
    };

    /// States set to RUN on all levels.
    pub const RUN: Self = Self {
        states: [PlatformPowerState::RUN; PsciPlatformImpl::MAX_POWER_LEVEL + 1],
    };

    /// Creates a composite state from the local state of each level.
    pub fn new(states: [PlatformPowerState; PsciPlatformImpl::MAX_POWER_LEVEL + 1]) -> Self {
        Self { states }
    }

    /// Decodes a StateID into the local state of each level.
    ///
    /// Levels beyond the last non-zero group of the StateID are RUN. Returns `None` if the StateID
    /// covers more levels than the platform has or names an unknown local state.
    pub fn from_state_id(state_id: u32) -> Option<Self> {
        let local_states =
            decode_state_id::<{ PsciPlatformImpl::MAX_POWER_LEVEL + 1 }>(state_id)?;
        let mut composite_state = Self::RUN;
        for (state, local_state) in composite_state.states.iter_mut().zip(local_states) {
            *state = PlatformPowerState::try_from(local_state).ok()?;
        }
        Some(composite_state)
    }

    /// Returns the power state of the CPU level.
    pub fn cpu_level_state(&self) -> PlatformPowerState {
        self.states[Self::CPU_POWER_LEVEL]
    }

    /// Returns the power state of the highest level of the topology.
    pub fn highest_level_state(&self) -> PlatformPowerState {
        self.states[PsciPlatformImpl::MAX_POWER_LEVEL]
    }

    /// Find the highest power level which is not set to running state.
    pub fn find_highest_non_run_level(&self) -> Option<usize> {
        self.states
            .iter()
            .rposition(|state| state.power_state_type() != PowerStateType::Run)
    }

    /// Find the highest power level which is set to power down state.
    pub fn find_highest_power_down_level(&self) -> Option<usize> {
        self.states
            .iter()
            .rposition(|state| state.power_state_type() == PowerStateType::PowerDown)
    }

    /// Checks that the composite state does not violate any PSCI rules.
    pub fn is_valid_suspend_request(&self, is_power_down_state: bool) -> bool {
        // There should be a non-run level
        if self.find_highest_non_run_level().is_none() {
            return false;
        };

        // Higher levels must be in less than or equal power state
        if !self.states.is_sorted_by(|a, b| a >= b) {
            return false;
        }

        if is_power_down_state {
            // There must be a power down state
            self.find_highest_power_down_level().is_some()
        } else {
            // Retention state, there should not be a power state on any level
            self.find_highest_power_down_level().is_none()
        }
    }
}

/// Returns the corresponding linear core index for the given PSCI MPIDR value.
///
/// For any valid MPIDR this will return a unique value less than `Platform::CORE_COUNT`.
/// For any invalid MPIDR it will return `None`.
pub fn try_get_cpu_index_by_mpidr(psci_mpidr: Mpidr) -> Option<usize> {
    // The PSCI MPIDR value doesn't include the MT or U bits, but they might be important for how
    // the platform validates MPIDR values and calculates core position, so add them in.
    let mpidr = MpidrEl1::from_psci_mpidr(psci_mpidr.into());
    PlatformImpl::TOPOLOGY.core_position(mpidr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psci_composite_power_state() {
        let mut composite_state = PsciCompositePowerState::OFF;
        assert_eq!(PlatformPowerState::OFF, composite_state.cpu_level_state());

        assert_eq!(
            PlatformPowerState::OFF,
            composite_state.highest_level_state()
        );

        composite_state.states[PsciCompositePowerState::CPU_POWER_LEVEL] = PlatformPowerState::RUN;
        assert_eq!(PlatformPowerState::RUN, composite_state.cpu_level_state());

        composite_state = PsciCompositePowerState::OFF;
        assert_eq!(
            Some(PsciPlatformImpl::MAX_POWER_LEVEL),
            composite_state.find_highest_power_down_level()
        );
        assert_eq!(
            Some(PsciPlatformImpl::MAX_POWER_LEVEL),
            composite_state.find_highest_non_run_level()
        );

        composite_state.states[PsciPlatformImpl::MAX_POWER_LEVEL] = PlatformPowerState::RUN;
        assert_eq!(
            Some(PsciPlatformImpl::MAX_POWER_LEVEL - 1),
            composite_state.find_highest_power_down_level()
        );

        composite_state = PsciCompositePowerState::RUN;
        assert_eq!(None, composite_state.find_highest_power_down_level());
        assert_eq!(None, composite_state.find_highest_non_run_level());
        assert!(!composite_state.is_valid_suspend_request(false));

        composite_state = PsciCompositePowerState::OFF;
        composite_state.states[PsciCompositePowerState::CPU_POWER_LEVEL] = PlatformPowerState::RUN;
        assert!(!composite_state.is_valid_suspend_request(true));

        composite_state = PsciCompositePowerState::OFF;
        assert!(composite_state.is_valid_suspend_request(true));
        assert!(!composite_state.is_valid_suspend_request(false));

        composite_state = PsciCompositePowerState::RUN;
        composite_state.states[PsciCompositePowerState::CPU_POWER_LEVEL] = PlatformPowerState::OFF;
        assert!(composite_state.is_valid_suspend_request(true));
        assert!(!composite_state.is_valid_suspend_request(false));
    }

    #[test]
    fn composite_state_from_state_id() {
        assert_eq!(
            PsciCompositePowerState::from_state_id(0x22),
            Some(PsciCompositePowerState::OFF)
        );
        assert_eq!(
            PsciCompositePowerState::from_state_id(0),
            Some(PsciCompositePowerState::RUN)
        );

        let cpu_off = PsciCompositePowerState::from_state_id(0x02).unwrap();
        assert_eq!(cpu_off.cpu_level_state(), PlatformPowerState::OFF);
        assert_eq!(cpu_off.highest_level_state(), PlatformPowerState::RUN);

        // Unknown local state.
        assert_eq!(PsciCompositePowerState::from_state_id(0x09), None);
        // More levels than the platform has.
        assert_eq!(PsciCompositePowerState::from_state_id(0x222), None);
    }
}
