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

//! Allocation of profit, loss and recoveries across the capital layers of a
//! pool.
//!
//! Profit flows top down: the senior tranche takes its share according to
//! the pool's [`ProfitPolicy`] and the junior share is split between the
//! junior tranche and the first loss covers. Loss flows bottom up, first loss
//! covers in list order, then junior, then senior. Recoveries undo losses in
//! the opposite order, so the cover that absorbed last is restored first.

use cfg_primitives::{BasisPoints, HUNDRED_PERCENT_IN_BPS};
use cfg_traits::{ProfitLossReport, Seconds};
use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::RuntimeDebug;
use scale_info::TypeInfo;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use sp_arithmetic::{
	traits::{EnsureAdd, EnsureAddAssign, EnsureSub, EnsureSubAssign},
	ArithmeticError, MultiplyRational, Rounding,
};
use sp_runtime::traits::{AtLeast32BitUnsigned, Zero};
use sp_std::{vec, vec::Vec};

use crate::{
	mul_div,
	tranches::{SeniorYieldTracker, TrancheState, Tranches},
	LedgerError,
};

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub enum ProfitPolicy {
	/// Senior is paid a fixed annual yield first, junior takes the rest.
	FixedSeniorYield { yield_bps: BasisPoints },
	/// Profit is shared in proportion to assets, then `risk_adjustment_bps`
	/// of the senior share is handed to junior.
	RiskAdjusted { risk_adjustment_bps: BasisPoints },
}

impl ProfitPolicy {
	pub fn is_valid(&self) -> bool {
		match self {
			ProfitPolicy::FixedSeniorYield { yield_bps } => *yield_bps <= HUNDRED_PERCENT_IN_BPS,
			ProfitPolicy::RiskAdjusted {
				risk_adjustment_bps,
			} => *risk_adjustment_bps <= HUNDRED_PERCENT_IN_BPS,
		}
	}
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct FirstLossCoverConfig<Balance> {
	/// Share of every loss event the cover takes.
	pub cover_rate_per_loss_bps: BasisPoints,
	/// Most the cover takes out of a single loss event.
	pub cover_cap_per_loss: Balance,
	/// Weight of a unit of cover assets when sharing junior profit.
	pub risk_yield_multiplier_bps: BasisPoints,
}

impl<Balance> FirstLossCoverConfig<Balance> {
	pub fn is_valid(&self) -> bool {
		self.cover_rate_per_loss_bps <= HUNDRED_PERCENT_IN_BPS
	}
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct FirstLossCover<Balance> {
	pub asset: Balance,
	/// Loss absorbed and not yet recovered.
	pub covered_loss: Balance,
	pub config: FirstLossCoverConfig<Balance>,
}

impl<Balance> FirstLossCover<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	pub fn new(config: FirstLossCoverConfig<Balance>) -> Self {
		Self {
			asset: Zero::zero(),
			covered_loss: Zero::zero(),
			config,
		}
	}

	/// Most this cover can take out of a loss event of size `loss`.
	pub fn loss_capacity(&self, loss: Balance) -> Result<Balance, ArithmeticError> {
		let by_rate = mul_div(
			loss,
			Balance::from(self.config.cover_rate_per_loss_bps),
			Balance::from(HUNDRED_PERCENT_IN_BPS),
			Rounding::Down,
		)?;

		Ok(by_rate.min(self.config.cover_cap_per_loss).min(self.asset))
	}

	pub fn profit_weight(&self) -> Result<Balance, ArithmeticError> {
		mul_div(
			self.asset,
			Balance::from(self.config.risk_yield_multiplier_bps),
			Balance::from(HUNDRED_PERCENT_IN_BPS),
			Rounding::Down,
		)
	}
}

/// How an amount was spread over the layers, covers in list order.
#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub struct Distribution<Balance> {
	pub senior: Balance,
	pub junior: Balance,
	pub covers: Vec<Balance>,
}

impl<Balance: AtLeast32BitUnsigned + Copy> Distribution<Balance> {
	fn empty(num_covers: usize) -> Self {
		Self {
			senior: Zero::zero(),
			junior: Zero::zero(),
			covers: vec![Zero::zero(); num_covers],
		}
	}

	pub fn total(&self) -> Result<Balance, ArithmeticError> {
		self.covers
			.iter()
			.try_fold(self.senior.ensure_add(self.junior)?, |acc, amount| {
				acc.ensure_add(*amount)
			})
	}
}

#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub struct WaterfallOutcome<Balance> {
	pub profit: Distribution<Balance>,
	pub loss: Distribution<Balance>,
	pub recovery: Distribution<Balance>,
}

/// Applies a profit and loss report: profit first, then loss, then
/// recovery.
pub fn apply_profit_and_loss<Balance>(
	policy: &ProfitPolicy,
	tranches: &mut Tranches<Balance>,
	covers: &mut [FirstLossCover<Balance>],
	tracker: &mut SeniorYieldTracker<Balance>,
	now: Seconds,
	report: &ProfitLossReport<Balance>,
) -> Result<WaterfallOutcome<Balance>, LedgerError>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational + From<u64>,
{
	let profit = distribute_profit(policy, tranches, covers, tracker, now, report.profit)?;
	let loss = distribute_loss(tranches, covers, report.loss)?;
	let recovery = distribute_loss_recovery(tranches, covers, report.recovery)?;

	let Tranches { senior, junior } = &mut *tranches;
	move_orphaned_assets(senior, junior)?;
	move_orphaned_assets(junior, senior)?;

	if let ProfitPolicy::FixedSeniorYield { .. } = policy {
		tracker.total_assets = tranches.senior.assets;
	}

	Ok(WaterfallOutcome {
		profit,
		loss,
		recovery,
	})
}

/// A tranche without shares has nobody to hold its assets for. They go to
/// the other tranche while that one has holders, otherwise they stay and the
/// next depositor buys them at par.
fn move_orphaned_assets<Balance>(
	from: &mut TrancheState<Balance>,
	to: &mut TrancheState<Balance>,
) -> Result<(), ArithmeticError>
where
	Balance: AtLeast32BitUnsigned + Copy,
{
	if from.supply.is_zero() && !to.supply.is_zero() && !from.assets.is_zero() {
		to.assets.ensure_add_assign(from.assets)?;
		from.assets = Zero::zero();
	}

	Ok(())
}

pub fn distribute_profit<Balance>(
	policy: &ProfitPolicy,
	tranches: &mut Tranches<Balance>,
	covers: &mut [FirstLossCover<Balance>],
	tracker: &mut SeniorYieldTracker<Balance>,
	now: Seconds,
	profit: Balance,
) -> Result<Distribution<Balance>, LedgerError>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational + From<u64>,
{
	let senior_profit = match *policy {
		ProfitPolicy::FixedSeniorYield { yield_bps } => {
			tracker.accrue(now, yield_bps)?;
			tracker.pay(profit)?
		}
		ProfitPolicy::RiskAdjusted {
			risk_adjustment_bps,
		} => {
			let total_assets = tranches.total_assets()?;
			if total_assets.is_zero() {
				Zero::zero()
			} else {
				let pro_rata = mul_div(
					profit,
					tranches.senior.assets,
					total_assets,
					Rounding::Down,
				)?;
				let kept_bps = HUNDRED_PERCENT_IN_BPS.ensure_sub(risk_adjustment_bps)?;

				mul_div(
					pro_rata,
					Balance::from(kept_bps),
					Balance::from(HUNDRED_PERCENT_IN_BPS),
					Rounding::Down,
				)?
			}
		}
	};

	let junior_profit = profit.ensure_sub(senior_profit)?;
	tranches.senior.assets.ensure_add_assign(senior_profit)?;

	let mut distribution = Distribution::empty(covers.len());
	distribution.senior = senior_profit;
	distribution.junior =
		split_junior_profit(&mut tranches.junior, covers, junior_profit, &mut distribution.covers)?;

	Ok(distribution)
}

/// Shares `junior_profit` between the covers, weighted by
/// `asset * multiplier`, and the junior tranche, weighted by its assets.
/// Junior keeps the rounding remainder. Returns the junior part.
fn split_junior_profit<Balance>(
	junior: &mut TrancheState<Balance>,
	covers: &mut [FirstLossCover<Balance>],
	junior_profit: Balance,
	cover_profits: &mut [Balance],
) -> Result<Balance, ArithmeticError>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	let weights = covers
		.iter()
		.map(|cover| cover.profit_weight())
		.collect::<Result<Vec<_>, _>>()?;
	let total_weight = weights
		.iter()
		.try_fold(junior.assets, |acc, weight| acc.ensure_add(*weight))?;

	let mut remaining = junior_profit;
	if !total_weight.is_zero() {
		for ((cover, weight), paid) in covers.iter_mut().zip(weights).zip(cover_profits.iter_mut()) {
			let share = mul_div(junior_profit, weight, total_weight, Rounding::Down)?;
			cover.asset.ensure_add_assign(share)?;
			remaining.ensure_sub_assign(share)?;
			*paid = share;
		}
	}

	junior.assets.ensure_add_assign(remaining)?;

	Ok(remaining)
}

pub fn distribute_loss<Balance>(
	tranches: &mut Tranches<Balance>,
	covers: &mut [FirstLossCover<Balance>],
	loss: Balance,
) -> Result<Distribution<Balance>, LedgerError>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	let mut distribution = Distribution::empty(covers.len());
	let mut remaining = loss;

	for (cover, absorbed) in covers.iter_mut().zip(distribution.covers.iter_mut()) {
		let amount = cover.loss_capacity(loss)?.min(remaining);
		cover.asset.ensure_sub_assign(amount)?;
		cover.covered_loss.ensure_add_assign(amount)?;
		remaining.ensure_sub_assign(amount)?;
		*absorbed = amount;
	}

	distribution.junior = absorb_loss(&mut tranches.junior, &mut remaining)?;
	distribution.senior = absorb_loss(&mut tranches.senior, &mut remaining)?;

	if !remaining.is_zero() {
		return Err(LedgerError::LossExceedsPoolAssets);
	}

	Ok(distribution)
}

fn absorb_loss<Balance>(
	tranche: &mut TrancheState<Balance>,
	remaining: &mut Balance,
) -> Result<Balance, ArithmeticError>
where
	Balance: AtLeast32BitUnsigned + Copy,
{
	let amount = tranche.assets.min(*remaining);
	tranche.assets.ensure_sub_assign(amount)?;
	tranche.loss.ensure_add_assign(amount)?;
	remaining.ensure_sub_assign(amount)?;

	Ok(amount)
}

pub fn distribute_loss_recovery<Balance>(
	tranches: &mut Tranches<Balance>,
	covers: &mut [FirstLossCover<Balance>],
	recovery: Balance,
) -> Result<Distribution<Balance>, LedgerError>
where
	Balance: AtLeast32BitUnsigned + Copy,
{
	let mut distribution = Distribution::empty(covers.len());
	let mut remaining = recovery;

	distribution.senior = recover_loss(&mut tranches.senior, &mut remaining)?;
	distribution.junior = recover_loss(&mut tranches.junior, &mut remaining)?;

	for (cover, recovered) in covers
		.iter_mut()
		.zip(distribution.covers.iter_mut())
		.rev()
	{
		let amount = cover.covered_loss.min(remaining);
		cover.asset.ensure_add_assign(amount)?;
		cover.covered_loss.ensure_sub_assign(amount)?;
		remaining.ensure_sub_assign(amount)?;
		*recovered = amount;
	}

	// Anything recovered beyond the recorded losses belongs to the residual
	// holder.
	tranches.junior.assets.ensure_add_assign(remaining)?;
	distribution.junior.ensure_add_assign(remaining)?;

	Ok(distribution)
}

fn recover_loss<Balance>(
	tranche: &mut TrancheState<Balance>,
	remaining: &mut Balance,
) -> Result<Balance, ArithmeticError>
where
	Balance: AtLeast32BitUnsigned + Copy,
{
	let amount = tranche.loss.min(*remaining);
	tranche.assets.ensure_add_assign(amount)?;
	tranche.loss.ensure_sub_assign(amount)?;
	remaining.ensure_sub_assign(amount)?;

	Ok(amount)
}
