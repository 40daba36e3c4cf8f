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

use cfg_traits::Seconds;
use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::{traits::Get, BoundedVec, RuntimeDebug};
use scale_info::TypeInfo;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use sp_arithmetic::{
	traits::{EnsureAdd, EnsureAddAssign, EnsureMul, EnsureSub, EnsureSubAssign},
	ArithmeticError,
};
use sp_runtime::traits::{AtLeast32BitUnsigned, One, Zero};

use crate::{
	tranches::{SeniorYieldTracker, Tranches},
	waterfall::{FirstLossCover, ProfitPolicy},
	LedgerError,
};

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub enum PoolStatus {
	Off,
	On,
}

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub enum EpochStatus {
	/// Requests and deposits are accepted.
	Open,
	/// A settlement is running. Persisted while the credit subsystem is
	/// queried so that nothing re-enters the pool.
	Closing,
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct EpochState<EpochId> {
	/// Id of the current epoch. Zero until the initial epoch is opened.
	pub current: EpochId,
	/// The epoch can be closed from this timestamp on.
	pub end_time: Seconds,
	pub status: EpochStatus,
}

impl<EpochId> EpochState<EpochId>
where
	EpochId: AtLeast32BitUnsigned + Copy,
{
	pub fn new() -> Self {
		Self {
			current: Zero::zero(),
			end_time: 0,
			status: EpochStatus::Open,
		}
	}

	pub fn is_opened(&self) -> bool {
		!self.current.is_zero()
	}

	pub fn is_closing(&self) -> bool {
		self.status == EpochStatus::Closing
	}

	/// Opens epoch 1, ending one period after `start`. Returns `false` if an
	/// epoch was already opened, in which case nothing changes.
	pub fn open_initial(&mut self, start: Seconds, period: Seconds) -> Result<bool, ArithmeticError> {
		if self.is_opened() {
			return Ok(false);
		}

		self.end_time = start.ensure_add(period)?;
		self.current = One::one();
		self.status = EpochStatus::Open;

		Ok(true)
	}

	/// Moves to the next epoch. The new end time is the old one plus the
	/// smallest whole number of periods that lies after `now`.
	pub fn advance(&mut self, now: Seconds, period: Seconds) -> Result<(), ArithmeticError> {
		let elapsed = now.saturating_sub(self.end_time);
		let periods = elapsed
			.checked_div(period)
			.ok_or(ArithmeticError::DivisionByZero)?
			.ensure_add(1)?;

		self.end_time.ensure_add_assign(periods.ensure_mul(period)?)?;
		self.current.ensure_add_assign(One::one())?;
		self.status = EpochStatus::Open;

		Ok(())
	}
}

impl<EpochId> Default for EpochState<EpochId>
where
	EpochId: AtLeast32BitUnsigned + Copy,
{
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct PoolParameters {
	/// Length of an epoch in seconds.
	pub epoch_period: Seconds,
	/// Senior assets may be at most this multiple of junior assets.
	pub max_senior_junior_ratio: u32,
	/// Number of epochs a redemption request has to wait before it is
	/// served ahead of younger requests. Zero disables the lockout.
	pub withdrawal_lockout_epochs: u32,
	pub profit_policy: ProfitPolicy,
}

impl PoolParameters {
	pub fn is_valid(&self) -> bool {
		self.epoch_period > 0 && self.profit_policy.is_valid()
	}
}

#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct ReserveDetails<Balance> {
	/// Liquidity held by the pool.
	pub total: Balance,
	/// Part of `total` promised to processed redemptions and not yet
	/// withdrawn.
	pub reserved: Balance,
}

impl<Balance> ReserveDetails<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy,
{
	pub fn available(&self) -> Result<Balance, ArithmeticError> {
		self.total.ensure_sub(self.reserved)
	}

	pub fn deposit(&mut self, amount: Balance) -> Result<(), ArithmeticError> {
		self.total.ensure_add_assign(amount)
	}

	/// Takes unreserved liquidity out of the pool.
	pub fn withdraw(&mut self, amount: Balance) -> Result<(), LedgerError> {
		if amount > self.available()? {
			return Err(LedgerError::InsufficientLiquidity);
		}

		Ok(self.total.ensure_sub_assign(amount)?)
	}

	pub fn reserve(&mut self, amount: Balance) -> Result<(), LedgerError> {
		if amount > self.available()? {
			return Err(LedgerError::InsufficientLiquidity);
		}

		Ok(self.reserved.ensure_add_assign(amount)?)
	}

	/// Pays out previously reserved liquidity.
	pub fn release(&mut self, amount: Balance) -> Result<(), ArithmeticError> {
		self.reserved.ensure_sub_assign(amount)?;
		self.total.ensure_sub_assign(amount)
	}
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[scale_info(skip_type_params(MaxCovers))]
pub struct PoolDetails<Balance, EpochId, MaxCovers>
where
	MaxCovers: Get<u32>,
{
	pub status: PoolStatus,
	pub parameters: PoolParameters,
	pub epoch: EpochState<EpochId>,
	pub tranches: Tranches<Balance>,
	/// Only moves under a fixed senior yield policy.
	pub tracker: SeniorYieldTracker<Balance>,
	/// First loss covers in loss absorption order.
	pub covers: BoundedVec<FirstLossCover<Balance>, MaxCovers>,
	pub reserve: ReserveDetails<Balance>,
}

impl<Balance, EpochId, MaxCovers> PoolDetails<Balance, EpochId, MaxCovers>
where
	Balance: AtLeast32BitUnsigned + Copy,
	EpochId: AtLeast32BitUnsigned + Copy,
	MaxCovers: Get<u32>,
{
	pub fn is_enabled(&self) -> bool {
		self.status == PoolStatus::On
	}

	/// Sum of what tranches and covers hold.
	pub fn total_value(&self) -> Result<Balance, ArithmeticError> {
		self.covers.iter().try_fold(
			self.tranches.senior.assets.ensure_add(self.tranches.junior.assets)?,
			|acc, cover| acc.ensure_add(cover.asset),
		)
	}
}
