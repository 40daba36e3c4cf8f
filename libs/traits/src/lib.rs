// Copyright 2021 Centrifuge GmbH (centrifuge.io).
// This file is part of Centrifuge chain project.

// Centrifuge is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version (see http://www.gnu.org/licenses).

// Centrifuge is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

//! # A common trait lib for centrifuge pool settlement
//!
//! This crate provides the seams between the settlement core and its
//! collaborators: the credit subsystem that reports profit and loss, the
//! protocol pause switch and the pool reserve used to move liquidity.

// Ensure we're `no_std` when compiling for WebAssembly.
#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::{dispatch::DispatchResult, scale_info::TypeInfo, Parameter, RuntimeDebug};
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use sp_runtime::{traits::Member, DispatchError};
use sp_std::fmt::Debug;

/// Traits related to time.
pub mod time;

pub use time::{Millis, Seconds, TimeAsSecs};

/// Aggregate result of the credit subsystem since its previous report.
#[derive(
	Encode, Decode, Clone, Copy, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen,
)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct ProfitLossReport<Balance> {
	/// Income earned by the pool.
	pub profit: Balance,
	/// Principal and income written off.
	pub loss: Balance,
	/// Amounts recovered on previously written off credit.
	pub recovery: Balance,
}

/// A trait implemented by the credit subsystem of a pool.
pub trait PoolProfitLoss<PoolId> {
	type Balance;

	/// Brings the credit book of `pool_id` up to date and returns everything
	/// accrued since the previous call. Every call consumes what it reports.
	fn refresh_and_report(pool_id: PoolId) -> Result<ProfitLossReport<Self::Balance>, DispatchError>;
}

/// Global switch halting every investor facing pool operation.
pub trait ProtocolPause {
	fn is_paused() -> bool;
}

impl ProtocolPause for () {
	fn is_paused() -> bool {
		false
	}
}

/// A trait that support pool inspection operations such as pool existence
/// checks.
pub trait PoolInspect<AccountId> {
	type PoolId: Parameter + Member + Debug + Copy + Default + TypeInfo + MaxEncodedLen;

	/// check if the pool exists
	fn pool_exists(pool_id: Self::PoolId) -> bool;
}

/// A trait that support pool reserve operations such as withdraw and deposit
pub trait PoolReserve<AccountId>: PoolInspect<AccountId> {
	type Balance;

	/// Withdraw `amount` from the reserve to the `to` account.
	fn withdraw(pool_id: Self::PoolId, to: AccountId, amount: Self::Balance) -> DispatchResult;

	/// Deposit `amount` from the `from` account into the reserve.
	fn deposit(pool_id: Self::PoolId, from: AccountId, amount: Self::Balance) -> DispatchResult;

	/// Liquidity that can be withdrawn right now.
	fn available_liquidity(pool_id: Self::PoolId) -> Result<Self::Balance, DispatchError>;
}
