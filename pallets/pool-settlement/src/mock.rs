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

pub use cfg_primitives::{Balance, PoolEpochId, PoolId};
use cfg_primitives::{MILLISECS_PER_SECOND, SECONDS_PER_DAY};
use cfg_traits::{Millis, PoolProfitLoss, PoolReserve, ProfitLossReport, ProtocolPause, Seconds};
use frame_support::{dispatch::DispatchResult, parameter_types, traits::GenesisBuild};
use frame_system::EnsureRoot;
use sp_core::H256;
use sp_runtime::{
	testing::Header,
	traits::{BlakeTwo256, IdentityLookup},
	DispatchError, FixedU128,
};

use crate::{self as pallet_pool_settlement, tranches::Tranche, Config};

type UncheckedExtrinsic = frame_system::mocking::MockUncheckedExtrinsic<Runtime>;
type Block = frame_system::mocking::MockBlock<Runtime>;

pub type MockAccountId = u64;

frame_support::construct_runtime!(
	pub enum Runtime where
		Block = Block,
		NodeBlock = Block,
		UncheckedExtrinsic = UncheckedExtrinsic,
	{
		System: frame_system::{Pallet, Call, Config, Storage, Event<T>},
		Timestamp: pallet_timestamp::{Pallet, Call, Storage, Inherent},
		FakeProfitLoss: cfg_test_utils::mocks::profit_loss::{Pallet, Storage},
		PoolSettlement: pallet_pool_settlement::{Pallet, Call, Storage, Event<T>},
	}
);

parameter_types! {
	pub const BlockHashCount: u64 = 250;
	pub const SS58Prefix: u8 = 42;
}

impl frame_system::Config for Runtime {
	type AccountData = ();
	type AccountId = MockAccountId;
	type BaseCallFilter = frame_support::traits::Everything;
	type BlockHashCount = BlockHashCount;
	type BlockLength = ();
	type BlockNumber = u64;
	type BlockWeights = ();
	type DbWeight = ();
	type Hash = H256;
	type Hashing = BlakeTwo256;
	type Header = Header;
	type Index = u64;
	type Lookup = IdentityLookup<Self::AccountId>;
	type MaxConsumers = frame_support::traits::ConstU32<16>;
	type OnKilledAccount = ();
	type OnNewAccount = ();
	type OnSetCode = ();
	type PalletInfo = PalletInfo;
	type RuntimeCall = RuntimeCall;
	type RuntimeEvent = RuntimeEvent;
	type RuntimeOrigin = RuntimeOrigin;
	type SS58Prefix = SS58Prefix;
	type SystemWeightInfo = ();
	type Version = ();
}

impl pallet_timestamp::Config for Runtime {
	type MinimumPeriod = ();
	type Moment = Millis;
	type OnTimestampSet = ();
	type WeightInfo = ();
}

impl cfg_test_utils::mocks::profit_loss::Config for Runtime {
	type Balance = Balance;
	type PoolId = PoolId;
}

parameter_types! {
	pub static Paused: bool = false;
	pub static AttemptReentry: bool = false;
	pub static ReentryOutcomes: Vec<DispatchResult> = vec![];
}

pub struct MockPause;

impl ProtocolPause for MockPause {
	fn is_paused() -> bool {
		Paused::get()
	}
}

/// Reports whatever `FakeProfitLoss` has queued. With `AttemptReentry` set it
/// first calls back into the pool and keeps the outcomes in
/// `ReentryOutcomes`.
pub struct ReentrantProfitLoss;

impl PoolProfitLoss<PoolId> for ReentrantProfitLoss {
	type Balance = Balance;

	fn refresh_and_report(pool_id: PoolId) -> Result<ProfitLossReport<Balance>, DispatchError> {
		if AttemptReentry::get() {
			ReentryOutcomes::set(vec![
				PoolSettlement::close_epoch(RuntimeOrigin::signed(KEEPER), pool_id),
				PoolSettlement::request_redemption(
					RuntimeOrigin::signed(JUNIOR_INVESTOR),
					pool_id,
					Tranche::Junior,
					1,
				),
				PoolSettlement::cancel_redemption_request(
					RuntimeOrigin::signed(JUNIOR_INVESTOR),
					pool_id,
					Tranche::Junior,
					1,
				),
				PoolSettlement::deposit(
					RuntimeOrigin::signed(JUNIOR_INVESTOR),
					pool_id,
					Tranche::Junior,
					1,
				),
				PoolSettlement::withdraw_after_redemption(
					RuntimeOrigin::signed(JUNIOR_INVESTOR),
					pool_id,
					Tranche::Junior,
				),
				<PoolSettlement as PoolReserve<MockAccountId>>::withdraw(pool_id, BORROWER, 1),
			]);
		}

		FakeProfitLoss::refresh_and_report(pool_id)
	}
}

parameter_types! {
	#[derive(Debug, Eq, PartialEq, scale_info::TypeInfo, Clone)]
	pub const MaxFirstLossCovers: u32 = 3;
	#[derive(Debug, Eq, PartialEq, scale_info::TypeInfo, Clone)]
	pub const MaxUnprocessedEpochs: u32 = 8;
}

impl Config for Runtime {
	type AdminOrigin = EnsureRoot<MockAccountId>;
	type Balance = Balance;
	type BalanceRatio = FixedU128;
	type EpochId = PoolEpochId;
	type MaxFirstLossCovers = MaxFirstLossCovers;
	type MaxUnprocessedEpochs = MaxUnprocessedEpochs;
	type PoolId = PoolId;
	type ProfitLoss = ReentrantProfitLoss;
	type ProtocolPause = MockPause;
	type RuntimeEvent = RuntimeEvent;
	type Time = Timestamp;
	type WeightInfo = ();
}

pub const START_DATE: Seconds = 1640991600; // 2022.01.01
pub const EPOCH_PERIOD: Seconds = SECONDS_PER_DAY;

pub const POOL_ID: PoolId = 0;
pub const JUNIOR_INVESTOR: MockAccountId = 1;
pub const SENIOR_INVESTOR: MockAccountId = 2;
pub const OTHER_INVESTOR: MockAccountId = 3;
pub const COVER_PROVIDER: MockAccountId = 4;
pub const BORROWER: MockAccountId = 5;
pub const KEEPER: MockAccountId = 6;
pub const THIRD_INVESTOR: MockAccountId = 7;

// Build genesis storage according to the mock runtime.
pub fn new_test_ext() -> sp_io::TestExternalities {
	let storage = frame_system::GenesisConfig::default()
		.build_storage::<Runtime>()
		.unwrap();

	let mut ext = sp_io::TestExternalities::new(storage);
	ext.execute_with(|| {
		System::set_block_number(1);
		Timestamp::set_timestamp(START_DATE * MILLISECS_PER_SECOND);
	});
	ext
}

pub fn now() -> Seconds {
	Timestamp::now() / MILLISECS_PER_SECOND
}

pub fn advance_secs(seconds: Seconds) {
	Timestamp::set_timestamp(Timestamp::now() + seconds * MILLISECS_PER_SECOND);
}
