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

use cfg_traits::{ProfitLossReport, Seconds};
use frame_support::{traits::Get, RuntimeDebug};
use sp_arithmetic::{traits::CheckedSub, MultiplyRational};
use sp_runtime::traits::AtLeast32BitUnsigned;

use crate::{
	pool_types::PoolDetails,
	redemption::{ProcessedRedemptions, RedemptionLedger},
	tranches::Tranche,
	waterfall::{apply_profit_and_loss, ProfitPolicy, WaterfallOutcome},
	LedgerError,
};

#[derive(Clone, PartialEq, Eq, RuntimeDebug)]
pub struct SettlementOutcome<EpochId, Balance> {
	/// The epoch that was closed.
	pub epoch_id: EpochId,
	pub waterfall: WaterfallOutcome<Balance>,
	pub senior: ProcessedRedemptions<EpochId, Balance>,
	pub junior: ProcessedRedemptions<EpochId, Balance>,
}

/// Settles the current epoch of `pool`: applies the profit and loss report,
/// serves both redemption ledgers from the available liquidity and opens the
/// next epoch.
///
/// Nothing is rolled back on error. Callers run this against copies or
/// inside a storage transaction.
pub fn settle_epoch<Balance, EpochId, MaxCovers, MaxEpochs>(
	pool: &mut PoolDetails<Balance, EpochId, MaxCovers>,
	senior_ledger: &mut RedemptionLedger<EpochId, Balance, MaxEpochs>,
	junior_ledger: &mut RedemptionLedger<EpochId, Balance, MaxEpochs>,
	report: &ProfitLossReport<Balance>,
	now: Seconds,
) -> Result<SettlementOutcome<EpochId, Balance>, LedgerError>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational + From<u64>,
	EpochId: AtLeast32BitUnsigned + Copy,
	MaxCovers: Get<u32>,
	MaxEpochs: Get<u32>,
{
	let epoch_id = pool.epoch.current;
	let policy = pool.parameters.profit_policy;

	let waterfall = apply_profit_and_loss(
		&policy,
		&mut pool.tranches,
		pool.covers.iter_mut().into_slice(),
		&mut pool.tracker,
		now,
		report,
	)?;

	let mut senior = ProcessedRedemptions::empty();
	let mut junior = ProcessedRedemptions::empty();

	// Requests made at least `lockout` epochs ago go first, across both
	// tranches. Whatever is left serves the younger ones.
	let lockout = pool.parameters.withdrawal_lockout_epochs;
	if lockout > 0 {
		if let Some(mature_until) = epoch_id.checked_sub(&EpochId::from(lockout)) {
			senior.merge(redeem(pool, Tranche::Senior, senior_ledger, Some(mature_until))?)?;
			junior.merge(redeem(pool, Tranche::Junior, junior_ledger, Some(mature_until))?)?;
		}
	}

	senior.merge(redeem(pool, Tranche::Senior, senior_ledger, None)?)?;
	junior.merge(redeem(pool, Tranche::Junior, junior_ledger, None)?)?;

	if let ProfitPolicy::FixedSeniorYield { yield_bps } = policy {
		pool.tracker
			.refresh(now, yield_bps, pool.tranches.senior.assets)?;
	}

	pool.epoch.advance(now, pool.parameters.epoch_period)?;

	Ok(SettlementOutcome {
		epoch_id,
		waterfall,
		senior,
		junior,
	})
}

/// One processing pass over a tranche ledger. Senior may take up to its
/// assets, junior only what keeps the leverage covenant. Later passes only
/// shrink senior, so a covenant kept here stays kept.
fn redeem<Balance, EpochId, MaxCovers, MaxEpochs>(
	pool: &mut PoolDetails<Balance, EpochId, MaxCovers>,
	tranche: Tranche,
	ledger: &mut RedemptionLedger<EpochId, Balance, MaxEpochs>,
	mature_until: Option<EpochId>,
) -> Result<ProcessedRedemptions<EpochId, Balance>, LedgerError>
where
	Balance: AtLeast32BitUnsigned + Copy + MultiplyRational,
	EpochId: AtLeast32BitUnsigned + Copy,
	MaxCovers: Get<u32>,
	MaxEpochs: Get<u32>,
{
	let available = pool.reserve.available()?;
	let redeemable = match tranche {
		Tranche::Senior => pool.tranches.senior.assets,
		Tranche::Junior => pool
			.tranches
			.junior_redeemable(pool.parameters.max_senior_junior_ratio)?,
	};

	let price = pool.tranches.get(tranche).price();
	let processed = ledger.process(available.min(redeemable), &price, mature_until)?;

	pool.tranches
		.get_mut(tranche)
		.redeem(processed.shares, processed.amount)?;
	pool.reserve.reserve(processed.amount)?;

	Ok(processed)
}
