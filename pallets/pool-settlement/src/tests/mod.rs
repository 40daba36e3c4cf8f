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

use cfg_traits::{PoolInspect, PoolReserve};
use frame_support::{assert_noop, assert_ok};
use sp_runtime::{traits::BadOrigin, FixedPointNumber, FixedU128};

use super::*;
use crate::{
	mock::*,
	pool_types::{EpochStatus, PoolParameters, PoolStatus},
	tranches::Tranche,
	waterfall::{FirstLossCoverConfig, ProfitPolicy},
};


pub(crate) fn risk_adjusted() -> PoolParameters {
	PoolParameters {
		epoch_period: EPOCH_PERIOD,
		max_senior_junior_ratio: 4,
		withdrawal_lockout_epochs: 0,
		profit_policy: ProfitPolicy::RiskAdjusted {
			risk_adjustment_bps: 8_000,
		},
	}
}

pub(crate) fn cover_config(rate_bps: u32, cap: Balance, multiplier_bps: u32) -> FirstLossCoverConfig<Balance> {
	FirstLossCoverConfig {
		cover_rate_per_loss_bps: rate_bps,
		cover_cap_per_loss: cap,
		risk_yield_multiplier_bps: multiplier_bps,
	}
}

pub(crate) fn create_pool(parameters: PoolParameters, covers: Vec<FirstLossCoverConfig<Balance>>) {
	assert_ok!(PoolSettlement::create_pool(
		RuntimeOrigin::root(),
		POOL_ID,
		parameters,
		covers
	));
}

pub(crate) fn setup_pool(parameters: PoolParameters) {
	create_pool(parameters, vec![]);
	assert_ok!(PoolSettlement::enable_pool(
		RuntimeOrigin::root(),
		POOL_ID,
		START_DATE
	));
}

pub(crate) fn invest(who: MockAccountId, tranche: Tranche, amount: Balance) {
	assert_ok!(PoolSettlement::deposit(
		RuntimeOrigin::signed(who),
		POOL_ID,
		tranche,
		amount
	));
}

pub(crate) fn request(who: MockAccountId, tranche: Tranche, shares: Balance) {
	assert_ok!(PoolSettlement::request_redemption(
		RuntimeOrigin::signed(who),
		POOL_ID,
		tranche,
		shares
	));
}

pub(crate) fn borrow(amount: Balance) {
	assert_ok!(<PoolSettlement as PoolReserve<MockAccountId>>::withdraw(
		POOL_ID, BORROWER, amount
	));
}

pub(crate) fn repay(amount: Balance) {
	assert_ok!(<PoolSettlement as PoolReserve<MockAccountId>>::deposit(
		POOL_ID, BORROWER, amount
	));
}

pub(crate) fn advance_to_epoch_end() {
	let (_, end_time) = PoolSettlement::current_epoch(POOL_ID).unwrap();
	if end_time > now() {
		advance_secs(end_time - now());
	}
}

pub(crate) fn close() {
	advance_to_epoch_end();
	assert_ok!(PoolSettlement::close_epoch(
		RuntimeOrigin::signed(KEEPER),
		POOL_ID
	));
}

pub(crate) fn pool() -> PoolDetailsOf<Runtime> {
	PoolSettlement::pool(POOL_ID).unwrap()
}

pub(crate) fn total_value() -> Balance {
	pool().total_value().unwrap()
}

/// No summary is served while an older one of the same tranche waits.
pub(crate) fn assert_fifo(tranche: Tranche) {
	let mut partial = false;
	for summary in PoolSettlement::unprocessed_epochs(POOL_ID, tranche) {
		assert!(!partial || summary.total_shares_processed == 0);
		partial |= summary.total_shares_processed < summary.total_shares_requested;
	}
}

#[test]
fn create_pool_requires_admin() {
	new_test_ext().execute_with(|| {
		assert_noop!(
			PoolSettlement::create_pool(
				RuntimeOrigin::signed(JUNIOR_INVESTOR),
				POOL_ID,
				risk_adjusted(),
				vec![]
			),
			BadOrigin
		);
	});
}

#[test]
fn create_pool_validates_input() {
	new_test_ext().execute_with(|| {
		let mut parameters = risk_adjusted();
		parameters.epoch_period = 0;
		assert_noop!(
			PoolSettlement::create_pool(RuntimeOrigin::root(), POOL_ID, parameters, vec![]),
			Error::<Runtime>::InvalidPoolParameters
		);

		assert_noop!(
			PoolSettlement::create_pool(
				RuntimeOrigin::root(),
				POOL_ID,
				risk_adjusted(),
				vec![cover_config(10_001, 100, 0)]
			),
			Error::<Runtime>::InvalidCoverConfig
		);

		assert_noop!(
			PoolSettlement::create_pool(
				RuntimeOrigin::root(),
				POOL_ID,
				risk_adjusted(),
				vec![cover_config(1_000, 100, 0); 4]
			),
			Error::<Runtime>::TooManyCovers
		);

		create_pool(risk_adjusted(), vec![cover_config(1_000, 100, 0); 3]);
		assert!(PoolSettlement::pool_exists(POOL_ID));
		assert_eq!(pool().status, PoolStatus::Off);
		assert_eq!(pool().covers.len(), 3);

		assert_noop!(
			PoolSettlement::create_pool(RuntimeOrigin::root(), POOL_ID, risk_adjusted(), vec![]),
			Error::<Runtime>::PoolInUse
		);
	});
}

#[test]
fn enable_opens_the_initial_epoch_once() {
	new_test_ext().execute_with(|| {
		create_pool(risk_adjusted(), vec![]);
		assert_eq!(PoolSettlement::current_epoch(POOL_ID), None);

		assert_ok!(PoolSettlement::enable_pool(
			RuntimeOrigin::root(),
			POOL_ID,
			START_DATE
		));
		assert_eq!(
			PoolSettlement::current_epoch(POOL_ID),
			Some((1, START_DATE + EPOCH_PERIOD))
		);
		System::assert_last_event(
			Event::EpochOpened {
				pool_id: POOL_ID,
				epoch_id: 1,
				end_time: START_DATE + EPOCH_PERIOD,
			}
			.into(),
		);

		assert_ok!(PoolSettlement::disable_pool(RuntimeOrigin::root(), POOL_ID));
		assert_eq!(pool().status, PoolStatus::Off);

		assert_ok!(PoolSettlement::enable_pool(
			RuntimeOrigin::root(),
			POOL_ID,
			START_DATE + 10 * EPOCH_PERIOD
		));
		assert_eq!(pool().status, PoolStatus::On);
		assert_eq!(
			PoolSettlement::current_epoch(POOL_ID),
			Some((1, START_DATE + EPOCH_PERIOD))
		);
		System::assert_last_event(Event::Enabled { pool_id: POOL_ID }.into());

		assert_ok!(PoolSettlement::open_initial_epoch(POOL_ID, START_DATE + 1));
		assert_eq!(
			PoolSettlement::current_epoch(POOL_ID),
			Some((1, START_DATE + EPOCH_PERIOD))
		);
	});
}

#[test]
fn unknown_pools_are_rejected() {
	new_test_ext().execute_with(|| {
		assert_noop!(
			PoolSettlement::enable_pool(RuntimeOrigin::root(), POOL_ID, START_DATE),
			Error::<Runtime>::NoSuchPool
		);
		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			Error::<Runtime>::NoSuchPool
		);
		assert_noop!(
			PoolSettlement::deposit(
				RuntimeOrigin::signed(JUNIOR_INVESTOR),
				POOL_ID,
				Tranche::Junior,
				100
			),
			Error::<Runtime>::NoSuchPool
		);
		assert!(!PoolSettlement::pool_exists(POOL_ID));
	});
}

#[test]
fn close_before_end_time_fails() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());

		advance_secs(EPOCH_PERIOD - 1);
		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			Error::<Runtime>::EpochEndTimeNotReached
		);

		advance_secs(1);
		assert_ok!(PoolSettlement::close_epoch(
			RuntimeOrigin::signed(KEEPER),
			POOL_ID
		));
		assert_eq!(
			PoolSettlement::current_epoch(POOL_ID),
			Some((2, START_DATE + 2 * EPOCH_PERIOD))
		);
	});
}

#[test]
fn late_close_keeps_the_epoch_grid() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());

		advance_secs(3 * EPOCH_PERIOD + 5);
		assert_ok!(PoolSettlement::close_epoch(
			RuntimeOrigin::signed(KEEPER),
			POOL_ID
		));
		assert_eq!(
			PoolSettlement::current_epoch(POOL_ID),
			Some((2, START_DATE + 4 * EPOCH_PERIOD))
		);
	});
}

#[test]
fn disabled_pool_rejects_everything() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 1_000);
		assert_ok!(PoolSettlement::disable_pool(RuntimeOrigin::root(), POOL_ID));
		advance_to_epoch_end();

		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			Error::<Runtime>::PoolDisabled
		);
		assert_noop!(
			PoolSettlement::request_redemption(
				RuntimeOrigin::signed(JUNIOR_INVESTOR),
				POOL_ID,
				Tranche::Junior,
				100
			),
			Error::<Runtime>::PoolDisabled
		);
		assert_noop!(
			PoolSettlement::deposit(
				RuntimeOrigin::signed(JUNIOR_INVESTOR),
				POOL_ID,
				Tranche::Junior,
				100
			),
			Error::<Runtime>::PoolDisabled
		);
	});
}

#[test]
fn paused_protocol_rejects_everything() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 1_000);
		advance_to_epoch_end();
		Paused::set(true);

		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			Error::<Runtime>::ProtocolPaused
		);
		assert_noop!(
			PoolSettlement::request_redemption(
				RuntimeOrigin::signed(JUNIOR_INVESTOR),
				POOL_ID,
				Tranche::Junior,
				100
			),
			Error::<Runtime>::ProtocolPaused
		);

		Paused::set(false);
		assert_ok!(PoolSettlement::close_epoch(
			RuntimeOrigin::signed(KEEPER),
			POOL_ID
		));
	});
}

#[test]
fn close_requires_an_opened_epoch() {
	new_test_ext().execute_with(|| {
		create_pool(risk_adjusted(), vec![]);
		Pool::<Runtime>::mutate(POOL_ID, |pool| {
			pool.as_mut().unwrap().status = PoolStatus::On;
		});

		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			Error::<Runtime>::EpochNotOpened
		);
		assert_noop!(
			PoolSettlement::deposit(
				RuntimeOrigin::signed(JUNIOR_INVESTOR),
				POOL_ID,
				Tranche::Junior,
				100
			),
			Error::<Runtime>::EpochNotOpened
		);
	});
}

#[test]
fn reserve_only_lends_unreserved_liquidity() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 1_000);
		request(JUNIOR_INVESTOR, Tranche::Junior, 400);
		close();

		assert_eq!(pool().reserve.reserved, 400);
		assert_eq!(PoolSettlement::available_liquidity(POOL_ID), Ok(600));
		assert_noop!(
			<PoolSettlement as PoolReserve<MockAccountId>>::withdraw(POOL_ID, BORROWER, 601),
			Error::<Runtime>::InsufficientLiquidity
		);

		borrow(600);
		System::assert_last_event(
			Event::LiquidityWithdrawn {
				pool_id: POOL_ID,
				to: BORROWER,
				amount: 600,
			}
			.into(),
		);
		assert_eq!(PoolSettlement::available_liquidity(POOL_ID), Ok(0));

		repay(250);
		assert_eq!(PoolSettlement::available_liquidity(POOL_ID), Ok(250));
		assert_eq!(pool().reserve.total, 650);
	});
}

#[test]
fn settlement_is_not_reentrant() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 1_000);
		request(JUNIOR_INVESTOR, Tranche::Junior, 100);
		AttemptReentry::set(true);

		close();

		let outcomes = ReentryOutcomes::get();
		assert_eq!(outcomes.len(), 6);
		for outcome in outcomes {
			assert_eq!(
				outcome,
				Err(Error::<Runtime>::SettlementInProgress.into())
			);
		}

		assert_eq!(pool().epoch.status, EpochStatus::Open);
		assert_eq!(pool().tranches.junior.assets, 900);
	});
}

#[test]
fn failed_report_leaves_no_trace() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 1_000);
		request(JUNIOR_INVESTOR, Tranche::Junior, 100);
		advance_to_epoch_end();
		FakeProfitLoss::set_failing(POOL_ID, true);

		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			cfg_test_utils::mocks::profit_loss::Error::<Runtime>::RefreshFailed
		);
		assert_eq!(pool().epoch.status, EpochStatus::Open);
		assert_eq!(FakeProfitLoss::calls(POOL_ID), 0);

		FakeProfitLoss::set_failing(POOL_ID, false);
		assert_ok!(PoolSettlement::close_epoch(
			RuntimeOrigin::signed(KEEPER),
			POOL_ID
		));
		assert_eq!(FakeProfitLoss::calls(POOL_ID), 1);
	});
}

#[test]
fn loss_beyond_pool_assets_aborts_the_close() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 1_000);
		invest(SENIOR_INVESTOR, Tranche::Senior, 2_000);
		advance_to_epoch_end();
		FakeProfitLoss::set_report(POOL_ID, 0, 3_001, 0);

		assert_noop!(
			PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), POOL_ID),
			Error::<Runtime>::LossExceedsPoolAssets
		);
		assert_eq!(FakeProfitLoss::pending(POOL_ID).loss, 3_001);
		assert_eq!(PoolSettlement::last_settlement(POOL_ID), None);
	});
}

#[test]
fn settlement_reports_prices() {
	new_test_ext().execute_with(|| {
		setup_pool(risk_adjusted());
		invest(JUNIOR_INVESTOR, Tranche::Junior, 250_000);
		invest(SENIOR_INVESTOR, Tranche::Senior, 800_000);
		FakeProfitLoss::set_report(POOL_ID, 12_387, 0, 0);
		close();

		let info = PoolSettlement::last_settlement(POOL_ID).unwrap();
		assert_eq!(info.epoch_id, 1);
		assert_eq!(info.settled_at, START_DATE + EPOCH_PERIOD);
		assert_eq!(info.senior_assets, 801_887);
		assert_eq!(info.junior_assets, 260_500);
		assert_eq!(
			info.senior_price,
			FixedU128::checked_from_rational(801_887u128, 800_000u128).unwrap()
		);
		assert_eq!(
			PoolSettlement::share_price(POOL_ID, Tranche::Junior),
			FixedU128::checked_from_rational(260_500u128, 250_000u128)
		);
		assert_eq!(info.unprocessed_shares, 0);

		System::assert_has_event(
			Event::ProfitLossApplied {
				pool_id: POOL_ID,
				epoch_id: 1,
				profit: 12_387,
				loss: 0,
				recovery: 0,
			}
			.into(),
		);
		System::assert_last_event(
			Event::EpochOpened {
				pool_id: POOL_ID,
				epoch_id: 2,
				end_time: START_DATE + 2 * EPOCH_PERIOD,
			}
			.into(),
		);
	});
}
