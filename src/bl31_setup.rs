// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Entry points called by the BL31 framework while it sets itself up on the primary core.

use crate::{
    context::{EntryPointInfo, SecurityState},
    gicv2,
    platform::{Platform, PlatformImpl, PsciPlatformImpl},
    services::psci::PsciPlatformInterface,
};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{info, warn};

static PSCI_OPS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Brings up the boot console and logger, and reports where the next images will run.
///
/// `arg0` to `arg3` are the values BL2 passed in x0 to x3.
pub fn early_platform_setup(arg0: u64, arg1: u64, arg2: u64, arg3: u64) {
    PlatformImpl::init_early(arg0, arg1, arg2, arg3);

    info!("BL31 running on {}", PlatformImpl::NAME);
    info!(
        "BL31: Secure code at {:#010x}",
        PlatformImpl::secure_entry_point().pc
    );
    info!(
        "BL31: Non secure code at {:#010x}",
        PlatformImpl::non_secure_entry_point().pc
    );
}

/// Initialises the interrupt controller from the primary core.
pub fn platform_setup() {
    gicv2::init();
}

/// Returns the entry point of the image to run next in the given security state, or `None` if
/// there is no such image.
pub fn next_image_entry_point(security_state: SecurityState) -> Option<EntryPointInfo> {
    let entry_point = match security_state {
        SecurityState::Secure => PlatformImpl::secure_entry_point(),
        SecurityState::NonSecure => PlatformImpl::non_secure_entry_point(),
    };
    // None of the images can be at address 0.
    (entry_point.pc != 0).then_some(entry_point)
}

/// Returns the power domain tree: the number of clusters, then the number of cores in each cluster.
pub fn power_domain_tree_desc() -> &'static [usize] {
    PsciPlatformImpl::topology()
}

/// Creates the PSCI platform operations, publishing `sec_entrypoint` as the address cores jump to
/// when released from their holding pen.
///
/// Must be called on the primary core after [`platform_setup`] and before any other core is
/// released. Only the first call returns the operations, later calls return `None`.
pub fn setup_psci_ops(sec_entrypoint: u64) -> Option<PsciPlatformImpl> {
    if PSCI_OPS_INSTALLED.swap(true, Ordering::AcqRel) {
        warn!("PSCI operations have already been installed");
        return None;
    }
    info!("Warm boot entry point {sec_entrypoint:#x}");
    // SAFETY: The flag above makes sure this is only done once.
    Some(unsafe { PlatformImpl::psci_platform(sec_entrypoint) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::TestPlatform;

    #[test]
    fn psci_ops_are_installed_once() {
        let psci = setup_psci_ops(0x8000_1000).unwrap();
        assert_eq!(psci.coordinator().mailbox().entrypoint(), 0x8000_1000);
        assert!(setup_psci_ops(0x8000_2000).is_none());
    }

    #[test]
    fn next_images() {
        early_platform_setup(0, 0, 0, 0);
        let secure = next_image_entry_point(SecurityState::Secure).unwrap();
        assert_eq!(secure, TestPlatform::secure_entry_point());
        // The test platform has no BL33.
        assert_eq!(next_image_entry_point(SecurityState::NonSecure), None);
    }

    #[test]
    fn tree_desc() {
        assert_eq!(power_domain_tree_desc(), &[2, 4, 4]);
        assert_eq!(
            PsciPlatformImpl::POWER_DOMAIN_COUNT,
            power_domain_tree_desc().iter().sum::<usize>()
        );
    }
}
