// Copyright 2021 Centrifuge Foundation (centrifuge.io).
//
// This file is part of the Centrifuge chain project.
// Centrifuge is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version (see http://www.gnu.org/licenses).
// Centrifuge is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// Ensure we're `no_std` when compiling for WebAssembly.
#![cfg_attr(not(feature = "std"), no_std)]

pub use constants::*;
pub use types::*;

/// Common types shared by the pool settlement crates
pub mod types {
	/// PoolId type we use.
	pub type PoolId = u64;

	/// The type for indexing pool epochs.
	pub type PoolEpochId = u32;

	/// Balance of an account and of every pool ledger entry.
	pub type Balance = u128;

	/// A ratio expressed in hundredths of a percent.
	pub type BasisPoints = u32;
}

/// Common constants
pub mod constants {
	use super::types::BasisPoints;

	pub const MILLISECS_PER_SECOND: u64 = 1_000;

	pub const SECONDS_PER_MINUTE: u64 = 60;
	pub const SECONDS_PER_HOUR: u64 = SECONDS_PER_MINUTE * 60;
	pub const SECONDS_PER_DAY: u64 = SECONDS_PER_HOUR * 24;
	/// Accrual year used for fixed yield. Leap days are not counted.
	pub const SECONDS_PER_YEAR: u64 = SECONDS_PER_DAY * 365;

	/// 100% expressed in basis points.
	pub const HUNDRED_PERCENT_IN_BPS: BasisPoints = 10_000;
}
