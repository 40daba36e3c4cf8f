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

use cfg_primitives::{BasisPoints, HUNDRED_PERCENT_IN_BPS, SECONDS_PER_YEAR};
use cfg_traits::Seconds;
use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::RuntimeDebug;
use scale_info::TypeInfo;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use sp_arithmetic::{
	traits::{EnsureAdd, EnsureAddAssign, EnsureMul, EnsureSub, EnsureSubAssign},
	ArithmeticError, MultiplyRational, Rounding,
};
use sp_runtime::{
	traits::{AtLeast32BitUnsigned, CheckedMul, One, Saturating, Zero},
	FixedPointNumber, FixedPointOperand,
};

use crate::{mul_div, LedgerError};

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub enum Tranche {
	Senior,
	Junior,
}

/// Book of a single tranche.
#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct TrancheState<Balance> {
	/// Value held by the tranche.
	pub assets: Balance,
	/// Loss absorbed by the tranche and not yet recovered.
	pub loss: Balance,
	/// Outstanding shares, including shares escrowed for redemption.
	pub supply: Balance,
}

impl<Balance> TrancheState<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	pub fn price(&self) -> SharePrice<Balance> {
		SharePrice {
			assets: self.assets,
			supply: self.supply,
		}
	}

	/// Adds `amount` to the tranche and returns the shares it buys.
	pub fn deposit(&mut self, amount: Balance) -> Result<Balance, LedgerError> {
		let shares = self.price().shares_for(amount)?;
		self.assets.ensure_add_assign(amount)?;
		self.supply.ensure_add_assign(shares)?;

		Ok(shares)
	}

	/// Pays out `amount` for `shares`, burning them.
	pub fn redeem(&mut self, shares: Balance, amount: Balance) -> Result<(), ArithmeticError> {
		self.assets.ensure_sub_assign(amount)?;
		self.supply.ensure_sub_assign(shares)
	}
}

/// Exchange rate between tranche value and tranche shares.
///
/// An empty tranche trades one to one.
#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub struct SharePrice<Balance> {
	pub assets: Balance,
	pub supply: Balance,
}

impl<Balance> SharePrice<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	/// Shares worth `amount`, rounded down.
	pub fn shares_for(&self, amount: Balance) -> Result<Balance, LedgerError> {
		if self.supply.is_zero() {
			return Ok(amount);
		}
		if self.assets.is_zero() {
			return Err(LedgerError::TrancheWipedOut);
		}

		Ok(mul_div(amount, self.supply, self.assets, Rounding::Down)?)
	}

	/// Value of `shares`, rounded down.
	pub fn amount_for(&self, shares: Balance) -> Result<Balance, ArithmeticError> {
		if self.supply.is_zero() {
			return Ok(shares);
		}

		mul_div(shares, self.assets, self.supply, Rounding::Down)
	}

	pub fn to_ratio<Ratio>(&self) -> Result<Ratio, ArithmeticError>
	where
		Ratio: FixedPointNumber<Inner = Balance>,
		Balance: FixedPointOperand,
	{
		if self.supply.is_zero() {
			return Ok(Ratio::one());
		}

		Ratio::checked_from_rational(self.assets, self.supply).ok_or(ArithmeticError::Overflow)
	}
}

#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct Tranches<Balance> {
	pub senior: TrancheState<Balance>,
	pub junior: TrancheState<Balance>,
}

impl<Balance> Tranches<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	pub fn get(&self, tranche: Tranche) -> &TrancheState<Balance> {
		match tranche {
			Tranche::Senior => &self.senior,
			Tranche::Junior => &self.junior,
		}
	}

	pub fn get_mut(&mut self, tranche: Tranche) -> &mut TrancheState<Balance> {
		match tranche {
			Tranche::Senior => &mut self.senior,
			Tranche::Junior => &mut self.junior,
		}
	}

	pub fn total_assets(&self) -> Result<Balance, ArithmeticError> {
		self.senior.assets.ensure_add(self.junior.assets)
	}

	/// Whether `senior <= junior * max_ratio` holds.
	pub fn within_leverage(&self, max_ratio: u32) -> bool {
		self.junior
			.assets
			.checked_mul(&Balance::from(max_ratio))
			.map_or(true, |max_senior| self.senior.assets <= max_senior)
	}

	/// Junior value that can leave the pool without breaking the leverage
	/// covenant. Junior must keep at least `ceil(senior / max_ratio)`.
	pub fn junior_redeemable(&self, max_ratio: u32) -> Result<Balance, ArithmeticError> {
		if self.senior.assets.is_zero() {
			return Ok(self.junior.assets);
		}
		if max_ratio == 0 {
			return Ok(Zero::zero());
		}

		let min_junior = mul_div(
			self.senior.assets,
			One::one(),
			Balance::from(max_ratio),
			Rounding::Up,
		)?;

		Ok(self.junior.assets.saturating_sub(min_junior))
	}
}

/// Yield owed to the senior tranche under a fixed yield policy.
#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct SeniorYieldTracker<Balance> {
	/// Principal the yield accrues on.
	pub total_assets: Balance,
	/// Accrued yield not yet paid out of profit.
	pub unpaid_yield: Balance,
	pub last_updated: Seconds,
}

impl<Balance> SeniorYieldTracker<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational + From<u64>,
{
	pub fn new(total_assets: Balance, now: Seconds) -> Self {
		Self {
			total_assets,
			unpaid_yield: Zero::zero(),
			last_updated: now,
		}
	}

	/// Accrues `total_assets * yield_bps * elapsed / (year * 10_000)`.
	/// A timestamp at or before the last update is a no-op.
	pub fn accrue(&mut self, now: Seconds, yield_bps: BasisPoints) -> Result<(), ArithmeticError> {
		if now <= self.last_updated {
			return Ok(());
		}

		let elapsed = now.ensure_sub(self.last_updated)?;
		let rate_time = Balance::from(yield_bps).ensure_mul(Balance::from(elapsed))?;
		let denominator = Balance::from(SECONDS_PER_YEAR)
			.ensure_mul(Balance::from(HUNDRED_PERCENT_IN_BPS))?;

		let accrued = mul_div(self.total_assets, rate_time, denominator, Rounding::Down)?;
		self.unpaid_yield.ensure_add_assign(accrued)?;
		self.last_updated = now;

		Ok(())
	}

	/// Accrues up to `now` on the old principal, then rebases on
	/// `total_assets`.
	pub fn refresh(
		&mut self,
		now: Seconds,
		yield_bps: BasisPoints,
		total_assets: Balance,
	) -> Result<(), ArithmeticError> {
		self.accrue(now, yield_bps)?;
		self.total_assets = total_assets;

		Ok(())
	}

	/// Pays unpaid yield out of `profit` and returns the paid part.
	pub fn pay(&mut self, profit: Balance) -> Result<Balance, ArithmeticError> {
		let paid = profit.min(self.unpaid_yield);
		self.unpaid_yield.ensure_sub_assign(paid)?;

		Ok(paid)
	}
}
