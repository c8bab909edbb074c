// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! GICv2 set up and power management on top of the `arm-gic` driver.
//!
//! Secure interrupts are Group 0 and signalled as FIQs, everything else is left to the normal
//! world as Group 1.

use crate::{
    aarch64::{dsb_sy, isb},
    platform::{Platform, PlatformImpl},
};
use arm_gic::{
    IntId, InterruptGroup, Trigger, UniqueMmioPointer,
    gicv2::{
        GicV2,
        registers::{Gicc, Gicd},
    },
};
use bitflags::bitflags;
use core::{mem::offset_of, ptr::NonNull};
use log::{debug, warn};
use safe_mmio::fields::ReadPureWrite;
use spin::{Once, mutex::SpinMutex};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// The highest priority a secure interrupt can have.
pub const GIC_HIGHEST_SEC_PRIORITY: u8 = 0x00;
const GIC_PRI_MASK: u8 = 0xff;

/// Number of interrupt IDs private to each CPU: SGIs and PPIs.
const PRIVATE_INTERRUPT_COUNT: u32 = 32;

/// Number of byte wide interrupt target fields in GICD_ITARGETSR.
const TARGET_COUNT: usize = 1024;
/// GICD_ITARGETSR value which routes an SPI to CPU interface 0.
const PRIMARY_CPU_TARGET: u8 = 1 << 0;

/// GICC_CTLR register, as seen from the secure world.
#[derive(
    Clone, Copy, Debug, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq,
)]
#[repr(transparent)]
struct GiccCtlr(u32);

bitflags! {
    impl GiccCtlr: u32 {
        const ENABLE_GRP0 = 1 << 0;
        const ENABLE_GRP1 = 1 << 1;
        const FIQ_EN = 1 << 3;
        const FIQ_BYP_DIS_GRP0 = 1 << 5;
        const IRQ_BYP_DIS_GRP0 = 1 << 6;
        const FIQ_BYP_DIS_GRP1 = 1 << 7;
        const IRQ_BYP_DIS_GRP1 = 1 << 8;
    }
}

const BYPASS_DISABLE: GiccCtlr = GiccCtlr::FIQ_BYP_DIS_GRP0
    .union(GiccCtlr::IRQ_BYP_DIS_GRP0)
    .union(GiccCtlr::FIQ_BYP_DIS_GRP1)
    .union(GiccCtlr::IRQ_BYP_DIS_GRP1);

/// The configuration of a single interrupt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InterruptConfig {
    /// Interrupt priority.
    /// 0x00 is highest priority, 0xFF is the lowest.
    pub priority: u8,
    /// Interrupt group that this interrupt should belong to.
    pub group: InterruptGroup,
    /// To specify whether this interrupt should be edge or level triggered.
    pub trigger: Trigger,
}

/// An interrupt ID together with its configuration.
pub type InterruptConfigEntry = (IntId, InterruptConfig);

/// The configuration of the platform's GIC.
///
/// Interrupts which aren't listed are put in Group 1 and left disabled for the normal world to set
/// up. Priorities are written a whole GICD_IPRIORITYR word at a time, so listed interrupts which
/// share a word must have the same priority, and unlisted interrupts in that word keep the reset
/// priority 0.
pub struct GicConfig {
    /// This list specifies which interrupts will be configured to non-default setup.
    pub interrupts_config: &'static [InterruptConfigEntry],
}

impl GicConfig {
    fn get_interrupt_config(&self, int_id: IntId) -> Option<InterruptConfig> {
        self.interrupts_config
            .iter()
            .find(|(id, _)| *id == int_id)
            .map(|(_, cfg)| *cfg)
    }

    /// Returns whether all listed interrupts sharing a GICD_IPRIORITYR word have the same
    /// priority.
    pub fn has_consistent_priorities(&self) -> bool {
        self.interrupts_config.iter().all(|(id, cfg)| {
            self.interrupts_config.iter().all(|(other, other_cfg)| {
                u32::from(*id) / 4 != u32::from(*other) / 4 || cfg.priority == other_cfg.priority
            })
        })
    }
}

/// The interrupt controller operations needed around power transitions and at EL3.
pub trait InterruptController: Sync {
    /// Initialises the distributor, and the distributor interface and CPU interface of the calling
    /// CPU. Called once on the primary CPU.
    fn init(&self);

    /// Initialises the banked distributor state of the calling CPU and enables its CPU interface.
    fn enable_cpu_interface(&self);

    /// Disables the CPU interface of the calling CPU so that no more interrupts are signalled to
    /// it.
    fn disable_cpu_interface(&self);

    /// Acknowledges the highest priority pending Group 0 interrupt of the calling CPU, if any.
    fn acknowledge_interrupt(&self) -> Option<IntId>;

    /// Signals the end of handling of the given Group 0 interrupt.
    fn end_of_interrupt(&self, int_id: IntId);
}

/// A GICv2 driver together with the secure-only controls which `GicV2` doesn't provide: the
/// interrupt bypass and FIQ bits of GICC_CTLR, and SPI targets.
pub struct GicDriver<'a> {
    gic: GicV2<'a>,
    gicc_ctlr: UniqueMmioPointer<'a, ReadPureWrite<GiccCtlr>>,
    targets: UniqueMmioPointer<'a, [ReadPureWrite<u8>; TARGET_COUNT]>,
    config: &'static GicConfig,
}

impl GicDriver<'_> {
    /// Creates a driver for the GIC with the given distributor and CPU interface.
    ///
    /// # Safety
    ///
    /// `gicd` and `gicc` must point to the GIC distributor and CPU interface registers, mapped as
    /// device memory, and there must be no other aliases of them.
    pub unsafe fn new(gicd: *mut Gicd, gicc: *mut Gicc, config: &'static GicConfig) -> Self {
        // SAFETY: Our caller promises that `gicd` and `gicc` are valid and unaliased. `GicV2` only
        // writes GICC_CTLR in `setup`, which is never called, and never accesses GICD_ITARGETSR,
        // so the extra pointers to those registers don't overlap anything it uses.
        unsafe {
            Self {
                gic: GicV2::new(gicd, gicc),
                gicc_ctlr: UniqueMmioPointer::new(
                    NonNull::new(gicc.byte_add(offset_of!(Gicc, ctlr)).cast()).unwrap(),
                ),
                targets: UniqueMmioPointer::new(
                    NonNull::new(gicd.byte_add(offset_of!(Gicd, itargetsr)).cast()).unwrap(),
                ),
                config,
            }
        }
    }

    fn set_enabled(&mut self, int_id: IntId, enable: bool) {
        if let Err(e) = self.gic.enable_interrupt(int_id, enable) {
            warn!("{e}");
        }
    }

    fn configure(&mut self, int_id: IntId, cfg: &InterruptConfig) {
        self.gic.set_group(int_id, cfg.group);
        self.gic.set_interrupt_priority(int_id, cfg.priority);
        // SGIs are always edge triggered.
        if !int_id.is_sgi() {
            self.gic.set_trigger(int_id, cfg.trigger);
        }
    }

    /// Configure all available Shared Peripheral Interrupts (SPIs). Listed SPIs are targeted at
    /// the primary CPU and enabled.
    fn configure_spis(&mut self) {
        let num_spis = (self.gic.typer().num_irqs() - PRIVATE_INTERRUPT_COUNT) as usize;

        // Disable all SPIs before configuring them.
        for int_id in IntId::spis().take(num_spis) {
            self.set_enabled(int_id, false);
        }

        for int_id in IntId::spis().take(num_spis) {
            let Some(cfg) = self.config.get_interrupt_config(int_id) else {
                self.gic.set_group(int_id, InterruptGroup::Group1);
                continue;
            };
            self.configure(int_id, &cfg);
            if let Some(mut target) = self.targets.get(u32::from(int_id) as usize) {
                target.write(PRIMARY_CPU_TARGET);
            }
            self.set_enabled(int_id, true);
        }
    }

    fn init_distributor(&mut self) {
        debug_assert!(self.config.has_consistent_priorities());

        self.gic.enable_group0(false);
        self.gic.enable_group1(false);

        self.configure_spis();

        self.gic.enable_group0(true);
        self.gic.enable_group1(true);
    }

    /// Configure the banked SGIs and PPIs of the calling CPU.
    fn configure_private_interrupts(&mut self) {
        for int_id in IntId::private() {
            self.set_enabled(int_id, false);
        }

        for int_id in IntId::private() {
            match self.config.get_interrupt_config(int_id) {
                Some(cfg) => {
                    self.configure(int_id, &cfg);
                    self.set_enabled(int_id, true);
                }
                None => self.gic.set_group(int_id, InterruptGroup::Group1),
            }
        }
    }

    fn enable_cpu_interface(&mut self) {
        self.configure_private_interrupts();

        // Program the idle priority in the PMR.
        self.gic.set_priority_mask(GIC_PRI_MASK);
        // Group 1 enable belongs to the normal world, keep whatever it set.
        self.gicc_ctlr.modify(|ctlr| {
            (ctlr & GiccCtlr::ENABLE_GRP1)
                | GiccCtlr::ENABLE_GRP0
                | GiccCtlr::FIQ_EN
                | BYPASS_DISABLE
        });
        isb();
    }

    fn disable_cpu_interface(&mut self) {
        self.gicc_ctlr.modify(|ctlr| {
            (ctlr - (GiccCtlr::ENABLE_GRP0 | GiccCtlr::ENABLE_GRP1)) | BYPASS_DISABLE
        });

        // Synchronize accesses to the CPU interface before the core powers down.
        isb();
        dsb_sy();
    }
}

/// The global GIC, shared by all cores.
pub struct Gic {
    gic: SpinMutex<GicDriver<'static>>,
}

/// The GIC, once [`init`] has been called.
pub static GIC: Once<Gic> = Once::new();

impl Gic {
    /// Wraps a driver so that it can be shared between cores.
    pub fn new(gic: GicDriver<'static>) -> Self {
        Self {
            gic: SpinMutex::new(gic),
        }
    }

    /// Returns the global GIC.
    ///
    /// Panics if [`init`] hasn't been called yet.
    pub fn get() -> &'static Self {
        GIC.get().expect("GIC used before initialisation")
    }
}

impl InterruptController for Gic {
    fn init(&self) {
        let mut gic = self.gic.lock();
        gic.init_distributor();
        gic.enable_cpu_interface();
    }

    fn enable_cpu_interface(&self) {
        self.gic.lock().enable_cpu_interface();
    }

    fn disable_cpu_interface(&self) {
        self.gic.lock().disable_cpu_interface();
    }

    fn acknowledge_interrupt(&self) -> Option<IntId> {
        self.gic
            .lock()
            .gic
            .get_and_acknowledge_interrupt(InterruptGroup::Group0)
    }

    fn end_of_interrupt(&self, int_id: IntId) {
        self.gic
            .lock()
            .gic
            .end_interrupt(int_id, InterruptGroup::Group0);
    }
}

/// Creates the global GIC and initialises it from the calling CPU. This function should only be
/// called once early in the boot process. Subsequent calls will be ignored.
pub fn init() {
    let mut initialised = false;
    let gic = GIC.call_once(|| {
        initialised = true;
        // SAFETY: This is the only place where the GIC is created and there are no aliases.
        Gic::new(unsafe { PlatformImpl::create_gic() })
    });
    if initialised {
        gic.init();
        debug!("GICv2 initialised");
    }
}

/// Acknowledges the pending Group 0 interrupt and passes it to the platform's handler.
pub fn handle_group0_interrupt(gic: &dyn InterruptController) {
    let Some(int_id) = gic.acknowledge_interrupt() else {
        debug!("No Group 0 interrupt pending");
        return;
    };
    debug!("Group 0 interrupt {int_id:?} acknowledged");

    PlatformImpl::handle_group0_interrupt(gic, int_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        console::Ier,
        platform::test::{FAKE_SECURE_UART, FakeInterruptController, TestPlatform, fake_gic_frames},
    };
    use core::sync::atomic::Ordering;

    const SECURE_SGI: IntId = IntId::sgi(8);
    const SECURE_SPI: u32 = 40;

    static CONFIG: GicConfig = GicConfig {
        interrupts_config: &[
            (
                SECURE_SGI,
                InterruptConfig {
                    priority: GIC_HIGHEST_SEC_PRIORITY,
                    group: InterruptGroup::Group0,
                    trigger: Trigger::Edge,
                },
            ),
            (
                IntId::spi(SECURE_SPI - PRIVATE_INTERRUPT_COUNT),
                InterruptConfig {
                    priority: 0x10,
                    group: InterruptGroup::Group0,
                    trigger: Trigger::Edge,
                },
            ),
        ],
    };

    /// A driver over host memory, together with pointers to read the registers back.
    struct FakeGic {
        gicd: *mut Gicd,
        gicc: *mut Gicc,
        driver: GicDriver<'static>,
    }

    impl FakeGic {
        fn new(typer: u32) -> Self {
            let (gicd, gicc) = fake_gic_frames();
            // SAFETY: `gicd` points to leaked host memory the size of the distributor.
            unsafe {
                gicd.byte_add(offset_of!(Gicd, typer)).cast::<u32>().write(typer);
            }
            // SAFETY: The frames are leaked host memory, only read back through `distributor` and
            // `cpu_interface` while the driver isn't in use.
            let driver = unsafe { GicDriver::new(gicd, gicc, &CONFIG) };
            Self { gicd, gicc, driver }
        }

        fn distributor(&self, offset: usize) -> u32 {
            // SAFETY: All offsets used below are within the distributor frame.
            unsafe { self.gicd.byte_add(offset).cast::<u32>().read_volatile() }
        }

        fn distributor_byte(&self, offset: usize) -> u8 {
            // SAFETY: All offsets used below are within the distributor frame.
            unsafe { self.gicd.byte_add(offset).cast::<u8>().read_volatile() }
        }

        fn cpu_interface(&self, offset: usize) -> u32 {
            // SAFETY: All offsets used below are within the CPU interface frame.
            unsafe { self.gicc.byte_add(offset).cast::<u32>().read_volatile() }
        }

        fn gicc_ctlr(&self) -> GiccCtlr {
            GiccCtlr::from_bits_retain(self.cpu_interface(offset_of!(Gicc, ctlr)))
        }
    }

    #[test]
    fn private_interrupts() {
        let mut gic = FakeGic::new(0);
        gic.driver.enable_cpu_interface();

        // SGI 8 is secure, everything else non-secure.
        assert_eq!(gic.distributor(offset_of!(Gicd, igroupr)), !(1 << 8));
        assert_eq!(
            gic.distributor_byte(offset_of!(Gicd, ipriorityr) + 8),
            GIC_HIGHEST_SEC_PRIORITY
        );
        assert_eq!(gic.distributor(offset_of!(Gicd, isenabler)), 1 << 8);

        let ctlr = gic.gicc_ctlr();
        assert!(ctlr.contains(GiccCtlr::ENABLE_GRP0 | GiccCtlr::FIQ_EN | BYPASS_DISABLE));
        assert!(!ctlr.contains(GiccCtlr::ENABLE_GRP1));
        assert_eq!(gic.cpu_interface(offset_of!(Gicc, pmr)), 0xff);

        gic.driver.disable_cpu_interface();
        let ctlr = gic.gicc_ctlr();
        assert!(!ctlr.intersects(GiccCtlr::ENABLE_GRP0 | GiccCtlr::ENABLE_GRP1));
        assert!(ctlr.contains(BYPASS_DISABLE));
    }

    #[test]
    fn normal_world_group1_enable_is_kept() {
        let mut gic = FakeGic::new(0);
        // SAFETY: GICC_CTLR is within the fake CPU interface frame.
        unsafe {
            gic.gicc.cast::<u32>().write_volatile(GiccCtlr::ENABLE_GRP1.bits());
        }

        gic.driver.enable_cpu_interface();
        assert!(gic.gicc_ctlr().contains(GiccCtlr::ENABLE_GRP0 | GiccCtlr::ENABLE_GRP1));
    }

    #[test]
    fn shared_interrupts() {
        // 64 interrupt IDs.
        let mut gic = FakeGic::new(1);
        gic.driver.init_distributor();

        let spi = SECURE_SPI as usize;
        assert_eq!(
            gic.distributor(offset_of!(Gicd, igroupr) + 4),
            !(1 << (SECURE_SPI - 32))
        );
        assert_eq!(
            gic.distributor_byte(offset_of!(Gicd, ipriorityr) + spi),
            0x10
        );
        assert_eq!(gic.distributor_byte(offset_of!(Gicd, itargetsr) + spi), 1);
        assert_eq!(
            gic.distributor_byte(offset_of!(Gicd, itargetsr) + spi + 1),
            0
        );
        assert_eq!(
            gic.distributor(offset_of!(Gicd, icfgr) + 8),
            1 << ((SECURE_SPI % 16) * 2 + 1)
        );
        assert_eq!(
            gic.distributor(offset_of!(Gicd, isenabler) + 4),
            1 << (SECURE_SPI - 32)
        );
        // Group 0 and group 1 enables.
        assert_eq!(gic.distributor(offset_of!(Gicd, ctlr)), 0b11);
    }

    #[test]
    fn acknowledge_and_end_of_interrupt() {
        let fake = FakeGic::new(0);
        let iar = fake.gicc.wrapping_byte_add(offset_of!(Gicc, iar)).cast::<u32>();
        let eoir = fake.gicc.wrapping_byte_add(offset_of!(Gicc, eoir)).cast::<u32>();
        let gic = Gic::new(fake.driver);

        // SAFETY: IAR is within the fake CPU interface frame.
        unsafe { iar.write_volatile(IntId::SPECIAL_NONE.into()) };
        assert_eq!(gic.acknowledge_interrupt(), None);

        // SAFETY: As above.
        unsafe { iar.write_volatile(SECURE_SGI.into()) };
        assert_eq!(gic.acknowledge_interrupt(), Some(SECURE_SGI));
        gic.end_of_interrupt(SECURE_SGI);
        // SAFETY: EOIR is within the fake CPU interface frame.
        assert_eq!(unsafe { eoir.read_volatile() }, 8);
    }

    #[test]
    fn priorities_sharing_a_word() {
        assert!(CONFIG.has_consistent_priorities());
        assert!(TestPlatform::GIC_CONFIG.has_consistent_priorities());

        let config = InterruptConfig {
            priority: 0x40,
            group: InterruptGroup::Group0,
            trigger: Trigger::Level,
        };
        let mixed = GicConfig {
            interrupts_config: Vec::leak(vec![
                (IntId::spi(164), config),
                (
                    IntId::spi(165),
                    InterruptConfig {
                        priority: 0x50,
                        ..config
                    },
                ),
            ]),
        };
        assert!(!mixed.has_consistent_priorities());
    }

    #[test]
    fn group0_interrupt_goes_to_the_platform() {
        let gic = FakeInterruptController::default();
        gic.raise(TestPlatform::SECURE_UART_INTERRUPT);

        handle_group0_interrupt(&gic);
        assert_eq!(gic.acknowledge_count.load(Ordering::SeqCst), 1);
        assert_eq!(
            gic.last_eoi.load(Ordering::SeqCst),
            u32::from(TestPlatform::SECURE_UART_INTERRUPT)
        );
        assert_eq!(FAKE_SECURE_UART.lock().enabled_interrupts(), Ier::empty());

        // Nothing pending, nothing to end.
        gic.last_eoi.store(0, Ordering::SeqCst);
        handle_group0_interrupt(&gic);
        assert_eq!(gic.acknowledge_count.load(Ordering::SeqCst), 2);
        assert_eq!(gic.last_eoi.load(Ordering::SeqCst), 0);
    }
}
