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

//! Redemption bookkeeping of a single tranche.
//!
//! Requests are batched per epoch into a [`RedemptionSummary`]. The
//! [`RedemptionLedger`] keeps the summaries that still wait for liquidity and
//! serves them strictly oldest first. Investors hold a [`RedemptionRecord`]
//! that is brought up to date lazily from the summary history whenever they
//! interact with the pool.

use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::{traits::Get, BoundedVec, RuntimeDebug};
use scale_info::TypeInfo;
use sp_arithmetic::{
	traits::{EnsureAdd, EnsureAddAssign, EnsureSub, EnsureSubAssign},
	ArithmeticError, MultiplyRational, Rounding,
};
use sp_runtime::traits::{AtLeast32BitUnsigned, Zero};
use sp_std::vec::Vec;

use crate::{mul_div, tranches::SharePrice, LedgerError};

#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct RedemptionSummary<EpochId, Balance> {
	pub epoch_id: EpochId,
	pub total_shares_requested: Balance,
	pub total_shares_processed: Balance,
	pub total_amount_processed: Balance,
}

impl<EpochId, Balance> RedemptionSummary<EpochId, Balance>
where
	Balance: AtLeast32BitUnsigned + Copy,
{
	pub fn new(epoch_id: EpochId) -> Self {
		Self {
			epoch_id,
			total_shares_requested: Zero::zero(),
			total_shares_processed: Zero::zero(),
			total_amount_processed: Zero::zero(),
		}
	}

	pub fn unprocessed_shares(&self) -> Result<Balance, ArithmeticError> {
		self.total_shares_requested
			.ensure_sub(self.total_shares_processed)
	}

	pub fn is_processed(&self) -> bool {
		self.total_shares_processed >= self.total_shares_requested
	}
}

/// Part of a summary already credited to investor records.
#[derive(
	Encode, Decode, Clone, Copy, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen,
)]
pub struct RedemptionCredit<Balance> {
	pub shares: Balance,
	pub amount: Balance,
}

/// Result of one processing pass over a ledger.
#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub struct ProcessedRedemptions<EpochId, Balance> {
	pub shares: Balance,
	pub amount: Balance,
	/// Summaries changed by the pass, in their new state.
	pub touched: Vec<RedemptionSummary<EpochId, Balance>>,
}

impl<EpochId, Balance> ProcessedRedemptions<EpochId, Balance>
where
	EpochId: PartialEq,
	Balance: AtLeast32BitUnsigned + Copy,
{
	pub fn empty() -> Self {
		Self {
			shares: Zero::zero(),
			amount: Zero::zero(),
			touched: Vec::new(),
		}
	}

	/// Folds a later pass into this one. A summary touched by both passes is
	/// kept in its latest state.
	pub fn merge(&mut self, other: Self) -> Result<(), ArithmeticError> {
		self.shares.ensure_add_assign(other.shares)?;
		self.amount.ensure_add_assign(other.amount)?;

		for summary in other.touched {
			match self
				.touched
				.iter_mut()
				.find(|known| known.epoch_id == summary.epoch_id)
			{
				Some(known) => *known = summary,
				None => self.touched.push(summary),
			}
		}

		Ok(())
	}
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[scale_info(skip_type_params(MaxEpochs))]
pub struct RedemptionLedger<EpochId, Balance, MaxEpochs>
where
	MaxEpochs: Get<u32>,
{
	/// Number of summaries ever created and not cancelled.
	pub num_summaries: u32,
	/// Position of the oldest unprocessed summary in the history.
	pub first_unprocessed_index: u32,
	/// Summaries with shares left to process, oldest first.
	pub unprocessed: BoundedVec<RedemptionSummary<EpochId, Balance>, MaxEpochs>,
}

impl<EpochId, Balance, MaxEpochs> Default for RedemptionLedger<EpochId, Balance, MaxEpochs>
where
	MaxEpochs: Get<u32>,
{
	fn default() -> Self {
		Self {
			num_summaries: 0,
			first_unprocessed_index: 0,
			unprocessed: BoundedVec::default(),
		}
	}
}

impl<EpochId, Balance, MaxEpochs> RedemptionLedger<EpochId, Balance, MaxEpochs>
where
	EpochId: AtLeast32BitUnsigned + Copy,
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
	MaxEpochs: Get<u32>,
{
	/// Adds `shares` to the summary of `epoch_id` and returns the summary.
	pub fn add_request(
		&mut self,
		epoch_id: EpochId,
		shares: Balance,
	) -> Result<RedemptionSummary<EpochId, Balance>, LedgerError> {
		match self.unprocessed.last_mut() {
			Some(summary) if summary.epoch_id == epoch_id => {
				summary.total_shares_requested.ensure_add_assign(shares)?;
				Ok(summary.clone())
			}
			_ => {
				let mut summary = RedemptionSummary::new(epoch_id);
				summary.total_shares_requested = shares;
				self.unprocessed
					.try_push(summary.clone())
					.map_err(|_| LedgerError::TooManyUnprocessedEpochs)?;
				self.num_summaries.ensure_add_assign(1)?;
				Ok(summary)
			}
		}
	}

	/// Takes `shares` back out of the summary of `epoch_id`, which has to be
	/// the newest one. Returns the summary left, or `None` if it was emptied
	/// and dropped.
	pub fn cancel_request(
		&mut self,
		epoch_id: EpochId,
		shares: Balance,
	) -> Result<Option<RedemptionSummary<EpochId, Balance>>, LedgerError> {
		let summary = self
			.unprocessed
			.last_mut()
			.filter(|summary| summary.epoch_id == epoch_id)
			.filter(|summary| summary.total_shares_processed.is_zero())
			.filter(|summary| summary.total_shares_requested >= shares)
			.ok_or(LedgerError::InsufficientRequestedShares)?;

		summary.total_shares_requested.ensure_sub_assign(shares)?;
		if !summary.total_shares_requested.is_zero() {
			return Ok(Some(summary.clone()));
		}

		self.unprocessed.pop();
		self.num_summaries.ensure_sub_assign(1)?;

		Ok(None)
	}

	/// Serves unprocessed summaries oldest first at `price` until `budget`
	/// runs out. Summaries of epochs after `mature_until` are left alone, as
	/// is everything behind a summary that could not be cleared.
	pub fn process(
		&mut self,
		budget: Balance,
		price: &SharePrice<Balance>,
		mature_until: Option<EpochId>,
	) -> Result<ProcessedRedemptions<EpochId, Balance>, LedgerError> {
		let mut processed = ProcessedRedemptions::empty();
		if price.assets.is_zero() {
			return Ok(processed);
		}

		let mut budget_left = budget;
		let mut cleared: u32 = 0;

		for summary in self.unprocessed.iter_mut() {
			if matches!(mature_until, Some(until) if summary.epoch_id > until) {
				break;
			}

			let shares = summary
				.unprocessed_shares()?
				.min(price.shares_for(budget_left)?);

			if !shares.is_zero() {
				let amount = price.amount_for(shares)?;

				summary.total_shares_processed.ensure_add_assign(shares)?;
				summary.total_amount_processed.ensure_add_assign(amount)?;
				budget_left.ensure_sub_assign(amount)?;

				processed.shares.ensure_add_assign(shares)?;
				processed.amount.ensure_add_assign(amount)?;
				processed.touched.push(summary.clone());
			}

			if !summary.is_processed() {
				break;
			}

			cleared.ensure_add_assign(1)?;
		}

		if cleared > 0 {
			self.unprocessed.retain(|summary| !summary.is_processed());
			self.first_unprocessed_index.ensure_add_assign(cleared)?;
		}

		Ok(processed)
	}

	pub fn unprocessed_shares(&self) -> Result<Balance, ArithmeticError> {
		self.unprocessed
			.iter()
			.try_fold(Balance::zero(), |acc, summary| {
				acc.ensure_add(summary.unprocessed_shares()?)
			})
	}
}

/// An investor's shares requested in one epoch and what has been credited
/// for them so far.
#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct EpochRequest<EpochId, Balance> {
	pub epoch_id: EpochId,
	pub num_shares: Balance,
	pub shares_processed: Balance,
	pub amount_processed: Balance,
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
#[scale_info(skip_type_params(MaxRequests))]
pub struct RedemptionRecord<EpochId, Balance, MaxRequests>
where
	MaxRequests: Get<u32>,
{
	/// Oldest epoch with shares of this investor still pending.
	pub next_epoch_id_to_process: EpochId,
	/// Shares requested and not yet processed.
	pub num_shares_requested: Balance,
	/// Deposit principal backing `num_shares_requested`.
	pub principal_requested: Balance,
	pub total_amount_processed: Balance,
	pub total_amount_withdrawn: Balance,
	/// Pending requests, oldest first.
	pub requests: BoundedVec<EpochRequest<EpochId, Balance>, MaxRequests>,
}

impl<EpochId, Balance, MaxRequests> RedemptionRecord<EpochId, Balance, MaxRequests>
where
	EpochId: AtLeast32BitUnsigned + Copy,
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
	MaxRequests: Get<u32>,
{
	pub fn new(current_epoch: EpochId) -> Self {
		Self {
			next_epoch_id_to_process: current_epoch,
			num_shares_requested: Zero::zero(),
			principal_requested: Zero::zero(),
			total_amount_processed: Zero::zero(),
			total_amount_withdrawn: Zero::zero(),
			requests: BoundedVec::default(),
		}
	}

	/// Credits the investor's share of everything processed since the last
	/// interaction. `summary_of` returns the current state of the summary of
	/// an epoch and what investors were credited from it so far. Returns the
	/// new credit of every summary this record drew from.
	///
	/// Shares are credited pro rata and rounded down. Whoever completes the
	/// credit of a fully processed summary also takes its rounding remainder,
	/// so the investors of a summary are paid exactly what it processed.
	pub fn advance<F>(
		&mut self,
		current_epoch: EpochId,
		mut summary_of: F,
	) -> Result<Vec<(EpochId, RedemptionCredit<Balance>)>, ArithmeticError>
	where
		F: FnMut(
			EpochId,
		) -> Option<(RedemptionSummary<EpochId, Balance>, RedemptionCredit<Balance>)>,
	{
		let mut credits = Vec::new();

		for request in self.requests.iter_mut() {
			let (summary, mut credit) = match summary_of(request.epoch_id) {
				Some((summary, credit)) if !summary.total_shares_requested.is_zero() => {
					(summary, credit)
				}
				_ => continue,
			};

			let shares_processed = mul_div(
				request.num_shares,
				summary.total_shares_processed,
				summary.total_shares_requested,
				Rounding::Down,
			)?;
			let mut amount_processed = mul_div(
				request.num_shares,
				summary.total_amount_processed,
				summary.total_shares_requested,
				Rounding::Down,
			)?;

			let new_shares = shares_processed.ensure_sub(request.shares_processed)?;
			credit.shares.ensure_add_assign(new_shares)?;

			if summary.is_processed() && credit.shares == summary.total_shares_processed {
				let credited = credit
					.amount
					.ensure_add(amount_processed.ensure_sub(request.amount_processed)?)?;
				amount_processed
					.ensure_add_assign(summary.total_amount_processed.ensure_sub(credited)?)?;
			}

			let new_amount = amount_processed.ensure_sub(request.amount_processed)?;
			if new_shares.is_zero() && new_amount.is_zero() {
				continue;
			}
			credit.amount.ensure_add_assign(new_amount)?;

			let principal = if new_shares == self.num_shares_requested {
				self.principal_requested
			} else {
				mul_div(
					self.principal_requested,
					new_shares,
					self.num_shares_requested,
					Rounding::Down,
				)?
			};

			self.num_shares_requested.ensure_sub_assign(new_shares)?;
			self.principal_requested.ensure_sub_assign(principal)?;
			self.total_amount_processed.ensure_add_assign(new_amount)?;

			request.shares_processed = shares_processed;
			request.amount_processed = amount_processed;
			credits.push((request.epoch_id, credit));
		}

		self.requests
			.retain(|request| request.shares_processed < request.num_shares);
		self.next_epoch_id_to_process = self
			.requests
			.first()
			.map_or(current_epoch, |request| request.epoch_id);

		Ok(credits)
	}

	pub fn add_request(
		&mut self,
		epoch_id: EpochId,
		shares: Balance,
		principal: Balance,
	) -> Result<(), LedgerError> {
		match self.requests.last_mut() {
			Some(request) if request.epoch_id == epoch_id => {
				request.num_shares.ensure_add_assign(shares)?;
			}
			_ => {
				self.requests
					.try_push(EpochRequest {
						epoch_id,
						num_shares: shares,
						shares_processed: Zero::zero(),
						amount_processed: Zero::zero(),
					})
					.map_err(|_| LedgerError::TooManyPendingRequests)?;
			}
		}

		if self.requests.len() == 1 {
			self.next_epoch_id_to_process = epoch_id;
		}
		self.num_shares_requested.ensure_add_assign(shares)?;
		self.principal_requested.ensure_add_assign(principal)?;

		Ok(())
	}

	/// Takes back `shares` requested in `epoch_id`, which has to be the
	/// newest request. Returns the principal released with them.
	pub fn cancel_request(&mut self, epoch_id: EpochId, shares: Balance) -> Result<Balance, LedgerError> {
		let request = self
			.requests
			.last_mut()
			.filter(|request| request.epoch_id == epoch_id)
			.filter(|request| request.shares_processed.is_zero())
			.filter(|request| request.num_shares >= shares)
			.ok_or(LedgerError::InsufficientRequestedShares)?;

		request.num_shares.ensure_sub_assign(shares)?;
		if request.num_shares.is_zero() {
			self.requests.pop();
		}

		let principal = if shares == self.num_shares_requested {
			self.principal_requested
		} else {
			mul_div(
				self.principal_requested,
				shares,
				self.num_shares_requested,
				Rounding::Down,
			)?
		};

		self.num_shares_requested.ensure_sub_assign(shares)?;
		self.principal_requested.ensure_sub_assign(principal)?;
		if self.requests.is_empty() {
			self.next_epoch_id_to_process = epoch_id;
		}

		Ok(principal)
	}

	pub fn withdrawable(&self) -> Result<Balance, ArithmeticError> {
		self.total_amount_processed
			.ensure_sub(self.total_amount_withdrawn)
	}

	/// Marks everything processed as withdrawn and returns the amount.
	pub fn withdraw_all(&mut self) -> Result<Balance, ArithmeticError> {
		let amount = self.withdrawable()?;
		self.total_amount_withdrawn = self.total_amount_processed;

		Ok(amount)
	}
}

/// Shares an investor holds in a tranche, outside of redemption escrow.
#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct ShareAccount<Balance> {
	pub shares: Balance,
	/// Amount deposited for `shares`.
	pub principal: Balance,
}

impl<Balance> ShareAccount<Balance>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
{
	pub fn mint(&mut self, shares: Balance, principal: Balance) -> Result<(), ArithmeticError> {
		self.shares.ensure_add_assign(shares)?;
		self.principal.ensure_add_assign(principal)
	}

	/// Moves `shares` out of the account and returns the principal that goes
	/// with them.
	pub fn escrow(&mut self, shares: Balance) -> Result<Balance, LedgerError> {
		if shares > self.shares {
			return Err(LedgerError::InsufficientShares);
		}

		let principal = if shares == self.shares {
			self.principal
		} else {
			mul_div(self.principal, shares, self.shares, Rounding::Down)?
		};

		self.shares.ensure_sub_assign(shares)?;
		self.principal.ensure_sub_assign(principal)?;

		Ok(principal)
	}
}
