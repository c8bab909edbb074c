// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Power management shared by the AX SoCs: the local power states, the supported idle states, the
//! PMU and the PSCI platform operations.
//!
//! Each core and cluster can be running, in retention or off. Only the core level can enter
//! retention. There is no suspend path: a core loses its context when powered down and only comes
//! back through CPU_ON and the holding pen.

#[cfg(all(not(target_arch = "aarch64"), not(test)))]
use crate::aarch64::wfe;
#[cfg(all(target_arch = "aarch64", not(test)))]
use crate::{mailbox::HoldState, naked_asm};
use crate::{
    aarch64::{disable_mmu_el3, dsb_sy, wfi},
    console::Uart16550,
    context::CoresImpl,
    gicv2::{
        GIC_HIGHEST_SEC_PRIORITY, InterruptConfig, InterruptConfigEntry, InterruptController,
    },
    logger::LockedWriter,
    mailbox::{BootCoordinator, MailboxRegisters, TrustedMailbox},
    platform::{Platform, PlatformImpl},
    services::psci::{
        PlatformPowerStateInterface, PowerStateType, PsciCompositePowerState,
        PsciPlatformInterface,
        power_state::{IdleStateTable, PowerStateFormat, StateType, make_state_id},
        try_get_cpu_index_by_mpidr,
    },
    topology::MAX_CLUSTER_COUNT,
};
use arm_gic::{IntId, InterruptGroup, Trigger, UniqueMmioPointer};
use arm_psci::{EntryPoint, ErrorCode, Mpidr};
use arrayvec::ArrayVec;
use bitflags::bitflags;
use core::ptr::NonNull;
use log::{debug, error, info, trace, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use percore::Cores;
use safe_mmio::fields::ReadPureWrite;
use spin::{Lazy, mutex::SpinMutex};

/// Size of the PMU register frame.
pub const PMU_SIZE: usize = 0x1000;
/// Number of 32-bit registers in the PMU frame.
pub const PMU_REGISTER_COUNT: usize = PMU_SIZE / 4;

/// The PMU register frame.
pub type PmuRegisters = [ReadPureWrite<u32>; PMU_REGISTER_COUNT];

/// Local power state of a core or cluster, in order of increasing depth.
#[derive(
    Clone, Copy, Debug, Eq, IntoPrimitive, Ord, PartialEq, PartialOrd, TryFromPrimitive,
)]
#[repr(u8)]
pub enum AxPowerState {
    /// Running.
    Run = 0,
    /// Clock gated, context retained. Core level only.
    Retention = 1,
    /// Powered off.
    Off = 2,
}

impl PlatformPowerStateInterface for AxPowerState {
    const OFF: Self = Self::Off;
    const RUN: Self = Self::Run;

    fn power_state_type(&self) -> PowerStateType {
        match self {
            Self::Run => PowerStateType::Run,
            Self::Retention => PowerStateType::StandbyOrRetention,
            Self::Off => PowerStateType::PowerDown,
        }
    }
}

impl From<AxPowerState> for usize {
    fn from(value: AxPowerState) -> Self {
        u8::from(value).into()
    }
}

/// The layout of `power_state` parameters accepted by CPU_SUSPEND.
pub const POWER_STATE_FORMAT: PowerStateFormat = if cfg!(feature = "extended_state_id") {
    PowerStateFormat::Extended
} else {
    PowerStateFormat::Original
};

/// Builds the `power_state` parameter for the given core and cluster states.
const fn idle_state(cpu: AxPowerState, cluster: AxPowerState, state_type: StateType) -> u32 {
    let power_level = if matches!(cluster, AxPowerState::Run) {
        0
    } else {
        1
    };
    POWER_STATE_FORMAT.make_power_state(
        make_state_id([cpu as u8, cluster as u8]),
        power_level,
        state_type,
    )
}

/// The idle states the AX SoCs support, in ascending order.
pub const IDLE_STATES: IdleStateTable<4> = IdleStateTable::new([
    // Core in retention.
    idle_state(AxPowerState::Retention, AxPowerState::Run, StateType::Standby),
    // Core off.
    idle_state(AxPowerState::Off, AxPowerState::Run, StateType::PowerDown),
    // Core and cluster off.
    idle_state(AxPowerState::Off, AxPowerState::Off, StateType::PowerDown),
    0,
]);

/// Number of SGIs reserved for the secure world.
pub const SECURE_SGI_COUNT: usize = 8;
/// First SGI reserved for the secure world.
const FIRST_SECURE_SGI: u32 = 8;

/// SGIs 8 to 15 belong to the secure world and are signalled as FIQs.
pub const SECURE_INTERRUPTS: [InterruptConfigEntry; SECURE_SGI_COUNT] = {
    let config = InterruptConfig {
        priority: GIC_HIGHEST_SEC_PRIORITY,
        group: InterruptGroup::Group0,
        trigger: Trigger::Edge,
    };
    let mut interrupts = [(IntId::sgi(FIRST_SECURE_SGI), config); SECURE_SGI_COUNT];
    let mut i = 0;
    while i < SECURE_SGI_COUNT {
        interrupts[i].0 = IntId::sgi(FIRST_SECURE_SGI + i as u32);
        i += 1;
    }
    interrupts
};

const SECURE_UART_PRIORITY: u8 = 0x40;

/// The secure SGIs followed by the receive interrupt of a secure UART, which is level triggered
/// and signalled as an FIQ.
pub const fn secure_interrupts_with_uart(
    uart_interrupt: IntId,
) -> [InterruptConfigEntry; SECURE_SGI_COUNT + 1] {
    let uart_config = InterruptConfig {
        priority: SECURE_UART_PRIORITY,
        group: InterruptGroup::Group0,
        trigger: Trigger::Level,
    };
    let mut interrupts = [(uart_interrupt, uart_config); SECURE_SGI_COUNT + 1];
    let mut i = 0;
    while i < SECURE_SGI_COUNT {
        interrupts[i] = SECURE_INTERRUPTS[i];
        i += 1;
    }
    interrupts
}

/// Masks the interrupts of the secure UART which raised `int_id` and signals the end of the
/// interrupt.
pub fn handle_uart_interrupt(
    uart: &LockedWriter<Uart16550>,
    gic: &dyn InterruptController,
    int_id: IntId,
) {
    let masked = {
        let mut uart = uart.lock();
        let enabled = uart.enabled_interrupts();
        uart.disable_interrupts();
        enabled
    };
    info!("Secure UART interrupt {int_id:?}, masked {masked:?}");
    gic.end_of_interrupt(int_id);
}

/// Logs and ends an interrupt which no handler claims.
pub fn handle_unexpected_interrupt(gic: &dyn InterruptController, int_id: IntId) {
    error!("Unexpected Group 0 interrupt {int_id:?}");
    gic.end_of_interrupt(int_id);
}

bitflags! {
    /// Per-core power control register of the PMU.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct PmuCoreControl: u32 {
        const POWER_UP = 1 << 12;
    }
}

/// The power management unit, which gates power to each core.
pub struct Pmu {
    registers: SpinMutex<UniqueMmioPointer<'static, PmuRegisters>>,
}

impl Pmu {
    /// Creates a driver for the given PMU registers.
    pub fn new(registers: UniqueMmioPointer<'static, PmuRegisters>) -> Self {
        Self {
            registers: SpinMutex::new(registers),
        }
    }

    /// Returns the offset of the power control register of the given core, if it has one.
    pub fn core_offset(core_index: usize) -> Option<usize> {
        PlatformImpl::PMU_CORE_OFFSETS
            .get(core_index)
            .copied()
            .flatten()
    }

    /// Requests power for the core whose control register is at `offset`.
    pub fn power_up(&self, offset: usize) {
        let mut registers = self.registers.lock();
        let Some(mut control) = registers.get(offset / 4) else {
            error!("PMU offset {offset:#x} is outside of the register frame");
            return;
        };
        control.modify(|value| value | PmuCoreControl::POWER_UP.bits());
    }

    /// Reads the register at `offset`, if it is within the frame.
    pub fn read(&self, offset: usize) -> Option<u32> {
        self.registers
            .lock()
            .get(offset / 4)
            .map(|register| register.read())
    }
}

static POWER_DOMAIN_TREE: Lazy<ArrayVec<usize, { MAX_CLUSTER_COUNT + 1 }>> =
    Lazy::new(|| PlatformImpl::TOPOLOGY.power_domain_tree_desc());

/// The PSCI platform operations of the AX SoCs.
pub struct AxPsciPlatformImpl {
    coordinator: BootCoordinator,
    pmu: Pmu,
    gic: &'static dyn InterruptController,
}

impl AxPsciPlatformImpl {
    /// Message of the panic which stands in for entering the holding pen in unit tests.
    #[cfg(test)]
    pub const POWER_DOWN_WFI_MAGIC: &str = "POWER_DOWN_WFI_MAGIC";

    /// Creates the operations from their collaborators.
    pub fn new(
        coordinator: BootCoordinator,
        pmu: Pmu,
        gic: &'static dyn InterruptController,
    ) -> Self {
        Self {
            coordinator,
            pmu,
            gic,
        }
    }

    /// Creates the operations for the trusted mailbox and PMU at the platform's fixed addresses,
    /// publishing `sec_entrypoint` for released cores. `boot_core` is the calling core.
    ///
    /// # Safety
    ///
    /// This must only be called once, and the platform's trusted mailbox and PMU addresses must be
    /// identity mapped device memory which nothing else accesses.
    pub unsafe fn from_platform(
        sec_entrypoint: u64,
        boot_core: usize,
        gic: &'static dyn InterruptController,
    ) -> Self {
        let mailbox_base = PlatformImpl::TRUSTED_MAILBOX_BASE as *mut MailboxRegisters;
        // SAFETY: The caller guarantees that the mailbox is only claimed once and nothing else
        // accesses it.
        let mailbox = unsafe { UniqueMmioPointer::new(NonNull::new(mailbox_base).unwrap()) };
        let pmu_base = PlatformImpl::PMU_BASE as *mut PmuRegisters;
        // SAFETY: As above, for the PMU.
        let pmu = unsafe { UniqueMmioPointer::new(NonNull::new(pmu_base).unwrap()) };
        Self::new(
            BootCoordinator::new(TrustedMailbox::new(mailbox), sec_entrypoint, boot_core),
            Pmu::new(pmu),
            gic,
        )
    }

    /// Returns the boot coordinator.
    pub fn coordinator(&self) -> &BootCoordinator {
        &self.coordinator
    }

    /// Returns the PMU.
    pub fn pmu(&self) -> &Pmu {
        &self.pmu
    }
}

impl PsciPlatformInterface for AxPsciPlatformImpl {
    const POWER_DOMAIN_COUNT: usize = PlatformImpl::TOPOLOGY.power_domain_count();
    const MAX_POWER_LEVEL: usize = 1;

    type PlatformPowerState = AxPowerState;

    fn topology() -> &'static [usize] {
        POWER_DOMAIN_TREE.as_slice()
    }

    fn validate_power_state(&self, power_state: u32) -> Result<PsciCompositePowerState, ErrorCode> {
        let Some(power_state) = IDLE_STATES.find(power_state) else {
            warn!("Rejecting unsupported power state {power_state:#x}");
            return Err(ErrorCode::InvalidParameters);
        };

        let state_id = POWER_STATE_FORMAT.state_id(power_state);
        let composite_state = PsciCompositePowerState::from_state_id(state_id)
            .ok_or(ErrorCode::InvalidParameters)?;
        debug_assert!(composite_state.is_valid_suspend_request(
            POWER_STATE_FORMAT.state_type(power_state) == StateType::PowerDown
        ));
        trace!("Power state {power_state:#x} is {:?}", composite_state.states);
        Ok(composite_state)
    }

    fn validate_ns_entrypoint(&self, entry: &EntryPoint) -> Result<(), ErrorCode> {
        let address = entry.entry_point_address();
        let ns_dram =
            PlatformImpl::NS_DRAM_BASE..PlatformImpl::NS_DRAM_BASE + PlatformImpl::NS_DRAM_SIZE;
        if ns_dram.contains(&address) {
            Ok(())
        } else {
            warn!("Non-secure entry point {address:#x} is outside of DRAM");
            Err(ErrorCode::InvalidAddress)
        }
    }

    fn cpu_standby(&self, cpu_state: AxPowerState) {
        assert_eq!(cpu_state, AxPowerState::Retention);
        trace!("Core standby in {cpu_state:?}");

        dsb_sy();
        wfi();
    }

    fn power_domain_on(&self, mpidr: Mpidr) -> Result<(), ErrorCode> {
        let Some(core_index) = try_get_cpu_index_by_mpidr(mpidr) else {
            warn!("CPU_ON for unknown core {mpidr:?}");
            return Err(ErrorCode::InvalidParameters);
        };
        // Check before touching the mailbox, so that a core which can't be powered isn't left
        // half released.
        let Some(pmu_offset) = Pmu::core_offset(core_index) else {
            error!("Core {core_index} has no PMU power control register");
            return Err(ErrorCode::InvalidParameters);
        };

        debug!("Powering on core {core_index}");
        self.coordinator
            .release(core_index, || self.pmu.power_up(pmu_offset))
    }

    fn power_domain_off(&self, target_state: &PsciCompositePowerState) {
        assert_eq!(target_state.cpu_level_state(), AxPowerState::Off);
        trace!("Powering off core, target {:?}", target_state.states);

        self.gic.disable_cpu_interface();
    }

    fn power_domain_suspend(&self, target_state: &PsciCompositePowerState) {
        error!("Suspend to {:?} is not supported", target_state.states);
        panic!("Power domain suspend is not supported");
    }

    fn power_domain_power_down_wfi(&self, _target_state: &PsciCompositePowerState) -> ! {
        let core_index = CoresImpl::core_index();
        self.coordinator.park(core_index);
        let hold_entry = self.coordinator.mailbox().hold_entry_address(core_index);
        let entrypoint = self.coordinator.mailbox().entrypoint_address();

        // SAFETY: The core is about to wait in its holding pen, which only accesses the trusted
        // mailbox. The mailbox is device memory, so is identity mapped and uncached.
        unsafe {
            disable_mmu_el3();
        }
        enter_hold_pen(hold_entry, entrypoint)
    }

    fn power_domain_on_finish(&self, previous_state: &PsciCompositePowerState) {
        assert_eq!(previous_state.cpu_level_state(), AxPowerState::Off);

        let core_index = CoresImpl::core_index();
        self.coordinator.mark_running(core_index);
        self.gic.enable_cpu_interface();
        debug!("Core {core_index} is on");
    }

    fn power_domain_suspend_finish(&self, previous_state: &PsciCompositePowerState) {
        error!("Resume from {:?} is not supported", previous_state.states);
        panic!("Power domain suspend finish is not supported");
    }

    fn system_off(&self) -> ! {
        error!("System off is not supported on {}", PlatformImpl::NAME);
        panic!("System off is not supported");
    }

    fn system_reset(&self) -> ! {
        error!("System reset is not supported on {}", PlatformImpl::NAME);
        panic!("System reset is not supported");
    }
}

/// Sends the calling core back to its holding pen in the trusted mailbox.
#[cfg(not(test))]
fn enter_hold_pen(hold_entry: usize, entrypoint: usize) -> ! {
    // SAFETY: `hold_entry` and `entrypoint` are the addresses of this core's hold entry and the
    // published warm boot entry point in the trusted mailbox, and the MMU is off.
    unsafe { hold_pen(hold_entry as *mut u64, entrypoint as *const u64) }
}

/// Stands in for the holding pen in unit tests, with a panic which the test can catch.
#[cfg(test)]
fn enter_hold_pen(_hold_entry: usize, _entrypoint: usize) -> ! {
    panic!("{}", AxPsciPlatformImpl::POWER_DOWN_WFI_MAGIC);
}

/// Waits with `wfe` until the hold entry reads GO, resets it to WAIT and jumps to the address
/// stored at `entrypoint`.
///
/// # Safety
///
/// `hold_entry` and `entrypoint` must point into the trusted mailbox, and the MMU must be off.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[unsafe(naked)]
unsafe extern "C" fn hold_pen(hold_entry: *mut u64, entrypoint: *const u64) -> ! {
    naked_asm!(
    "0:",
        "ldr x2, [x0]",
        "cmp x2, #{HOLD_STATE_GO}",
        "b.eq 1f",
        "wfe",
        "b   0b",
    "1:",
        "mov x2, #{HOLD_STATE_WAIT}",
        "str x2, [x0]",
        "ldr x16, [x1]",
    // x16 is chosen to make this bti c compatible, not just bti j
        "br  x16",
        HOLD_STATE_GO = const HoldState::Go as u64,
        HOLD_STATE_WAIT = const HoldState::Wait as u64,
    );
}

/// Parks the core for good on hosts which can't run the holding pen.
///
/// # Safety
///
/// Always safe, the signature matches the AArch64 holding pen.
#[cfg(all(not(target_arch = "aarch64"), not(test)))]
unsafe fn hold_pen(_hold_entry: *mut u64, _entrypoint: *const u64) -> ! {
    loop {
        wfe();
    }
}
