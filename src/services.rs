// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Interfaces between the generic runtime services and the platform.

pub mod psci;
