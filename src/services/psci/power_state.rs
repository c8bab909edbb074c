// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Packing of per-level local power states into PSCI `power_state` parameters, and the table of
//! `power_state` values a platform accepts.
//!
//! A StateID holds one local state per power level, [`LOCAL_PSTATE_WIDTH`] bits each, with the
//! CPU level in the least significant bits. Only a value which appears in the platform's
//! [`IdleStateTable`] is ever decoded.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Width in bits of the local state of a single power level within a StateID.
pub const LOCAL_PSTATE_WIDTH: u32 = 4;
/// Mask for the local state of a single power level within a StateID.
pub const LOCAL_PSTATE_MASK: u32 = (1 << LOCAL_PSTATE_WIDTH) - 1;

/// The StateType field of a PSCI `power_state` parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum StateType {
    /// Standby or retention, the core keeps its context.
    Standby = 0,
    /// Power down, the core loses its context and resumes through the warm boot entry point.
    PowerDown = 1,
}

/// The layout of the PSCI `power_state` parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PowerStateFormat {
    /// StateID in bits [15:0], StateType in bit 16 and PowerLevel in bits [25:24].
    Original,
    /// StateID in bits [27:0] and StateType in bit 30. There is no PowerLevel field, the level is
    /// implied by the StateID.
    Extended,
}

impl PowerStateFormat {
    const ORIGINAL_ID_MASK: u32 = 0xffff;
    const ORIGINAL_TYPE_SHIFT: u32 = 16;
    const ORIGINAL_LEVEL_SHIFT: u32 = 24;
    const ORIGINAL_LEVEL_MASK: u32 = 0x3;
    const EXTENDED_ID_MASK: u32 = 0x0fff_ffff;
    const EXTENDED_TYPE_SHIFT: u32 = 30;

    const fn type_shift(self) -> u32 {
        match self {
            Self::Original => Self::ORIGINAL_TYPE_SHIFT,
            Self::Extended => Self::EXTENDED_TYPE_SHIFT,
        }
    }

    /// Extracts the StateID field.
    pub const fn state_id(self, power_state: u32) -> u32 {
        match self {
            Self::Original => power_state & Self::ORIGINAL_ID_MASK,
            Self::Extended => power_state & Self::EXTENDED_ID_MASK,
        }
    }

    /// Extracts the StateType field.
    pub const fn state_type(self, power_state: u32) -> StateType {
        if (power_state >> self.type_shift()) & 1 == 0 {
            StateType::Standby
        } else {
            StateType::PowerDown
        }
    }

    /// Extracts the PowerLevel field, if the format has one.
    pub const fn power_level(self, power_state: u32) -> Option<usize> {
        match self {
            Self::Original => Some(
                ((power_state >> Self::ORIGINAL_LEVEL_SHIFT) & Self::ORIGINAL_LEVEL_MASK) as usize,
            ),
            Self::Extended => None,
        }
    }

    /// Builds a `power_state` parameter from its fields. `power_level` is ignored by the extended
    /// format.
    pub const fn make_power_state(
        self,
        state_id: u32,
        power_level: usize,
        state_type: StateType,
    ) -> u32 {
        let type_bit = (state_type as u32) << self.type_shift();
        match self {
            Self::Original => {
                assert!(state_id & !Self::ORIGINAL_ID_MASK == 0);
                assert!(power_level as u32 & !Self::ORIGINAL_LEVEL_MASK == 0);
                state_id | type_bit | ((power_level as u32) << Self::ORIGINAL_LEVEL_SHIFT)
            }
            Self::Extended => {
                assert!(state_id & !Self::EXTENDED_ID_MASK == 0);
                state_id | type_bit
            }
        }
    }
}

/// Packs local states, indexed by power level, into a StateID.
pub const fn make_state_id<const N: usize>(local_states: [u8; N]) -> u32 {
    assert!(N as u32 * LOCAL_PSTATE_WIDTH <= u32::BITS);
    let mut state_id = 0;
    let mut level = 0;
    while level < N {
        assert!(local_states[level] as u32 <= LOCAL_PSTATE_MASK);
        state_id |= (local_states[level] as u32) << (level as u32 * LOCAL_PSTATE_WIDTH);
        level += 1;
    }
    state_id
}

/// Unpacks a StateID into local states indexed by power level.
///
/// Levels are filled from the CPU level upwards for as long as non-zero bits remain, levels above
/// those stay 0. Returns `None` if the StateID has bits beyond the `N` levels the caller expects.
pub fn decode_state_id<const N: usize>(state_id: u32) -> Option<[u8; N]> {
    let mut local_states = [0; N];
    let mut remaining = state_id;
    let mut level = 0;
    while remaining != 0 {
        *local_states.get_mut(level)? = (remaining & LOCAL_PSTATE_MASK) as u8;
        remaining >>= LOCAL_PSTATE_WIDTH;
        level += 1;
    }
    Some(local_states)
}

/// The `power_state` values a platform accepts for `CPU_SUSPEND`.
///
/// The entries are sorted in ascending order and terminated by a single 0, which is reserved and
/// so can never be matched, not even by an all-RUN request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IdleStateTable<const N: usize> {
    entries: [u32; N],
}

impl<const N: usize> IdleStateTable<N> {
    /// Creates a table from a zero terminated list of `power_state` values.
    ///
    /// Panics, at compile time when used in a constant, if the list is not terminated, has an
    /// entry of 0 before the end, or is not strictly ascending.
    pub const fn new(entries: [u32; N]) -> Self {
        assert!(
            N > 0 && entries[N - 1] == 0,
            "Idle state table must end with 0"
        );
        let mut i = 0;
        while i + 1 < N {
            assert!(entries[i] != 0, "Idle state 0 is reserved");
            assert!(
                i == 0 || entries[i - 1] < entries[i],
                "Idle states must be in ascending order"
            );
            i += 1;
        }
        Self { entries }
    }

    /// Returns the valid entries, without the terminator.
    pub fn entries(&self) -> &[u32] {
        &self.entries[..N - 1]
    }

    /// Looks up `power_state` with a linear scan which stops at the terminator.
    pub fn find(&self, power_state: u32) -> Option<u32> {
        self.entries
            .iter()
            .take_while(|&&entry| entry != 0)
            .find(|&&entry| entry == power_state)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: IdleStateTable<4> = IdleStateTable::new([0x01, 0x0001_0002, 0x0101_0022, 0]);

    #[test]
    fn state_id_packing() {
        assert_eq!(make_state_id([1, 0]), 0x01);
        assert_eq!(make_state_id([2, 0]), 0x02);
        assert_eq!(make_state_id([2, 2]), 0x22);
        assert_eq!(make_state_id([0, 2, 1]), 0x120);

        assert_eq!(decode_state_id::<2>(0x01), Some([1, 0]));
        assert_eq!(decode_state_id::<2>(0x22), Some([2, 2]));
        assert_eq!(decode_state_id::<2>(0x99), Some([9, 9]));
        assert_eq!(decode_state_id::<2>(0), Some([0, 0]));
        assert_eq!(decode_state_id::<2>(0x222), None);
        assert_eq!(decode_state_id::<3>(0x222), Some([2, 2, 2]));
    }

    #[test]
    fn original_format_fields() {
        let format = PowerStateFormat::Original;
        let power_state = format.make_power_state(0x22, 1, StateType::PowerDown);
        assert_eq!(power_state, 0x0101_0022);
        assert_eq!(format.state_id(power_state), 0x22);
        assert_eq!(format.state_type(power_state), StateType::PowerDown);
        assert_eq!(format.power_level(power_state), Some(1));

        assert_eq!(format.make_power_state(0x01, 0, StateType::Standby), 0x01);
        assert_eq!(format.state_type(0x01), StateType::Standby);
        assert_eq!(format.power_level(0x01), Some(0));
    }

    #[test]
    fn extended_format_fields() {
        let format = PowerStateFormat::Extended;
        let power_state = format.make_power_state(0x22, 1, StateType::PowerDown);
        assert_eq!(power_state, 0x4000_0022);
        assert_eq!(format.state_id(power_state), 0x22);
        assert_eq!(format.state_type(power_state), StateType::PowerDown);
        assert_eq!(format.power_level(power_state), None);

        assert_eq!(
            format.make_power_state(0x02, 0, StateType::PowerDown),
            0x4000_0002
        );
    }

    #[test]
    fn table_lookup() {
        assert_eq!(TABLE.entries(), &[0x01, 0x0001_0002, 0x0101_0022]);
        assert_eq!(TABLE.find(0x0001_0002), Some(0x0001_0002));
        assert_eq!(TABLE.find(0x99), None);
        // The StateID alone is not enough when the type and level are part of the entry.
        assert_eq!(TABLE.find(0x22), None);
        assert_eq!(TABLE.find(0), None);
    }

    #[test]
    #[should_panic(expected = "ascending")]
    fn unsorted_table() {
        IdleStateTable::new([0x02, 0x01, 0]);
    }

    #[test]
    #[should_panic(expected = "end with 0")]
    fn unterminated_table() {
        IdleStateTable::new([0x01, 0x02]);
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn zero_entry_in_table() {
        IdleStateTable::new([0, 0x01, 0]);
    }
}
