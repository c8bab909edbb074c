// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Mapping between MPIDR affinity values and linear core positions.

use arm_sysregs::MpidrEl1;
use arrayvec::ArrayVec;

/// The largest number of clusters any supported SoC has.
pub const MAX_CLUSTER_COUNT: usize = 8;

/// Which MPIDR affinity fields identify the core and its cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AffinityLayout {
    /// The core is identified by Aff0 and the cluster by Aff1.
    ///
    /// Aff2 and Aff3 must be zero.
    CoreInAff0,
    /// Multi-threading style layout: the core is identified by Aff1 and the cluster by Aff2. This
    /// is what the AX cores report, with the thread field Aff0 always zero.
    ///
    /// Aff0 and Aff3 must be zero.
    CoreInAff1,
}

/// The shape of a platform's CPU power domain hierarchy: a system of identical clusters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClusterTopology {
    cluster_count: usize,
    cores_per_cluster: usize,
    layout: AffinityLayout,
}

impl ClusterTopology {
    /// Creates a topology with `cluster_count` clusters of `cores_per_cluster` cores each.
    ///
    /// Panics at compile time when used in a constant if either count is zero or there are more
    /// clusters than [`MAX_CLUSTER_COUNT`].
    pub const fn new(
        cluster_count: usize,
        cores_per_cluster: usize,
        layout: AffinityLayout,
    ) -> Self {
        assert!(cluster_count > 0 && cluster_count <= MAX_CLUSTER_COUNT);
        assert!(cores_per_cluster > 0 && cores_per_cluster <= u8::MAX as usize);
        Self {
            cluster_count,
            cores_per_cluster,
            layout,
        }
    }

    /// Returns the total number of cores.
    pub const fn core_count(&self) -> usize {
        self.cluster_count * self.cores_per_cluster
    }

    /// Returns the number of power domains: every cluster and every core. The clusters are the
    /// top level of the tree, there is no separate system domain.
    pub const fn power_domain_count(&self) -> usize {
        self.cluster_count + self.core_count()
    }

    /// Returns the linear position of the core with the given MPIDR, or `None` if the MPIDR does
    /// not name a core of this topology.
    ///
    /// The position is `cluster * cores_per_cluster + core`, which is unique for every valid MPIDR
    /// and less than [`Self::core_count`].
    pub fn core_position(&self, mpidr: MpidrEl1) -> Option<usize> {
        let (cluster, core, unused) = match self.layout {
            AffinityLayout::CoreInAff0 => (mpidr.aff1(), mpidr.aff0(), mpidr.aff2() | mpidr.aff3()),
            AffinityLayout::CoreInAff1 => (mpidr.aff2(), mpidr.aff1(), mpidr.aff0() | mpidr.aff3()),
        };
        let (cluster, core) = (usize::from(cluster), usize::from(core));

        if unused != 0 || cluster >= self.cluster_count || core >= self.cores_per_cluster {
            return None;
        }
        Some(cluster * self.cores_per_cluster + core)
    }

    /// Returns the MPIDR affinity bits of the core at the given linear position.
    ///
    /// This is the inverse of [`Self::core_position`], without the MT or U bits.
    pub fn mpidr_affinity(&self, position: usize) -> Option<u64> {
        if position >= self.core_count() {
            return None;
        }
        let cluster = (position / self.cores_per_cluster) as u64;
        let core = (position % self.cores_per_cluster) as u64;
        Some(match self.layout {
            AffinityLayout::CoreInAff0 => {
                (cluster << MpidrEl1::AFF1_SHIFT) | (core << MpidrEl1::AFF0_SHIFT)
            }
            AffinityLayout::CoreInAff1 => {
                (cluster << MpidrEl1::AFF2_SHIFT) | (core << MpidrEl1::AFF1_SHIFT)
            }
        })
    }

    /// Returns the power domain tree description expected by the generic PSCI code: the number of
    /// clusters under the system domain, followed by the number of cores in each cluster.
    pub fn power_domain_tree_desc(&self) -> ArrayVec<usize, { MAX_CLUSTER_COUNT + 1 }> {
        let mut desc = ArrayVec::new();
        desc.push(self.cluster_count);
        for _ in 0..self.cluster_count {
            desc.push(self.cores_per_cluster);
        }
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AX: ClusterTopology = ClusterTopology::new(2, 4, AffinityLayout::CoreInAff1);
    const FLAT: ClusterTopology = ClusterTopology::new(1, 4, AffinityLayout::CoreInAff0);
    const SINGLE_CLUSTER: ClusterTopology = ClusterTopology::new(1, 4, AffinityLayout::CoreInAff1);

    fn mpidr(value: u64) -> MpidrEl1 {
        MpidrEl1::from_bits_retain(value)
    }

    #[test]
    fn positions_of_valid_cores() {
        assert_eq!(AX.core_position(mpidr(0x0000)), Some(0));
        assert_eq!(AX.core_position(mpidr(0x0300)), Some(3));
        assert_eq!(AX.core_position(mpidr(0x1_0000)), Some(4));
        assert_eq!(AX.core_position(mpidr(0x1_0300)), Some(7));
        // The MT bit doesn't take part in the lookup.
        assert_eq!(AX.core_position(mpidr(0x100_0100)), Some(1));

        assert_eq!(FLAT.core_position(mpidr(0x2)), Some(2));
    }

    #[test]
    fn cores_outside_topology_are_rejected() {
        // Core index past the end of the cluster.
        assert_eq!(AX.core_position(mpidr(0x0400)), None);
        // Cluster index past the last cluster.
        assert_eq!(AX.core_position(mpidr(0x2_0000)), None);
        // Thread field must be zero.
        assert_eq!(AX.core_position(mpidr(0x0001)), None);
        // Aff3 must be zero.
        assert_eq!(AX.core_position(mpidr(0x1_0000_0000)), None);

        assert_eq!(FLAT.core_position(mpidr(0x4)), None);
        assert_eq!(FLAT.core_position(mpidr(0x100)), None);
        assert_eq!(FLAT.core_position(mpidr(0x1_0000)), None);
    }

    #[test]
    fn every_position_is_unique_and_in_range() {
        for topology in [AX, FLAT] {
            let mut seen = vec![false; topology.core_count()];
            for position in 0..topology.core_count() {
                let affinity = topology.mpidr_affinity(position).unwrap();
                let found = topology.core_position(mpidr(affinity)).unwrap();
                assert_eq!(found, position);
                assert!(!seen[found]);
                seen[found] = true;
            }
            assert_eq!(topology.mpidr_affinity(topology.core_count()), None);
        }
    }

    #[test]
    fn single_cluster_in_aff1() {
        assert_eq!(SINGLE_CLUSTER.core_position(mpidr(0x0200)), Some(2));
        assert_eq!(SINGLE_CLUSTER.core_position(mpidr(0x1_0000)), None);
        assert_eq!(SINGLE_CLUSTER.power_domain_tree_desc().as_slice(), &[1, 4]);
        assert_eq!(SINGLE_CLUSTER.power_domain_count(), 5);
    }

    #[test]
    fn tree_description() {
        assert_eq!(AX.power_domain_tree_desc().as_slice(), &[2, 4, 4]);
        assert_eq!(FLAT.power_domain_tree_desc().as_slice(), &[1, 4]);
        assert_eq!(AX.power_domain_count(), 10);
        assert_eq!(AX.core_count(), 8);
    }
}
