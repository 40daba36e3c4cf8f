// Copyright 2021 Centrifuge Foundation (centrifuge.io).
// This file is part of Centrifuge chain project.

// Centrifuge is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version (see http://www.gnu.org/licenses).

// Centrifuge is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

//! # Pool settlement pallet
//!
//! Accounting core of a two tranche lending pool. Once per epoch the pool is
//! settled: the credit subsystem reports profit, loss and recoveries, the
//! waterfall spreads them over the senior tranche, the junior tranche and the
//! first loss covers, and pending redemption requests of both tranches are
//! served from the available liquidity without breaking the senior to junior
//! leverage covenant.
//!
//! Investors deposit into a tranche for shares, request redemption of shares
//! during an open epoch and withdraw what settlements have processed for them.
#![cfg_attr(not(feature = "std"), no_std)]

use cfg_traits::{PoolProfitLoss, ProtocolPause, Seconds, TimeAsSecs};
use codec::{Decode, Encode, HasCompact, MaxEncodedLen};
use frame_support::{dispatch::DispatchResult, ensure, transactional, BoundedVec, RuntimeDebug};
use frame_system::pallet_prelude::*;
pub use pallet::*;
use pool_types::{EpochState, EpochStatus, PoolDetails, PoolParameters, PoolStatus};
use redemption::{
	RedemptionCredit, RedemptionLedger, RedemptionRecord, RedemptionSummary, ShareAccount,
};
use scale_info::TypeInfo;
use sp_arithmetic::{ArithmeticError, MultiplyRational, Rounding};
use sp_runtime::{
	traits::{AtLeast32BitUnsigned, EnsureAdd, EnsureAddAssign, Zero},
	DispatchError, FixedPointNumber, FixedPointOperand,
};
use sp_std::vec::Vec;
use tranches::{SeniorYieldTracker, Tranche};
use waterfall::{FirstLossCover, FirstLossCoverConfig, ProfitPolicy};
pub use weights::*;

mod impls;

#[cfg(test)]
mod mock;
pub mod pool_types;
pub mod redemption;
pub mod settlement;
#[cfg(test)]
mod tests;
pub mod tranches;
pub mod waterfall;
pub mod weights;

pub const LOG_TARGET: &str = "runtime::pool-settlement";

/// Failures of the pure ledger code, lifted into pallet errors at the
/// dispatch boundary.
#[derive(Clone, Copy, PartialEq, Eq, RuntimeDebug)]
pub enum LedgerError {
	Arithmetic(ArithmeticError),
	InsufficientLiquidity,
	InsufficientShares,
	InsufficientRequestedShares,
	LossExceedsPoolAssets,
	TooManyPendingRequests,
	TooManyUnprocessedEpochs,
	TrancheWipedOut,
}

impl From<ArithmeticError> for LedgerError {
	fn from(err: ArithmeticError) -> Self {
		LedgerError::Arithmetic(err)
	}
}

/// `value * numerator / denominator` without intermediate overflow.
pub fn mul_div<Balance>(
	value: Balance,
	numerator: Balance,
	denominator: Balance,
	rounding: Rounding,
) -> Result<Balance, ArithmeticError>
where
	Balance: MultiplyRational + Zero,
{
	if denominator.is_zero() {
		return Err(ArithmeticError::DivisionByZero);
	}

	value
		.multiply_rational(numerator, denominator, rounding)
		.ok_or(ArithmeticError::Overflow)
}

/// State of a pool right after its latest settlement.
#[derive(Encode, Decode, Clone, PartialEq, Eq, RuntimeDebug, TypeInfo, MaxEncodedLen)]
pub struct SettlementInfo<EpochId, Balance, BalanceRatio> {
	/// The epoch that was closed.
	pub epoch_id: EpochId,
	pub settled_at: Seconds,
	pub senior_assets: Balance,
	pub junior_assets: Balance,
	pub senior_price: BalanceRatio,
	pub junior_price: BalanceRatio,
	/// Shares of both tranches still waiting for liquidity.
	pub unprocessed_shares: Balance,
}

pub type PoolDetailsOf<T> = PoolDetails<
	<T as Config>::Balance,
	<T as Config>::EpochId,
	<T as Config>::MaxFirstLossCovers,
>;

pub type RedemptionLedgerOf<T> = RedemptionLedger<
	<T as Config>::EpochId,
	<T as Config>::Balance,
	<T as Config>::MaxUnprocessedEpochs,
>;

pub type RedemptionSummaryOf<T> =
	RedemptionSummary<<T as Config>::EpochId, <T as Config>::Balance>;

pub type RedemptionRecordOf<T> = RedemptionRecord<
	<T as Config>::EpochId,
	<T as Config>::Balance,
	<T as Config>::MaxUnprocessedEpochs,
>;

pub type RedemptionCreditsOf<T> =
	Vec<(<T as Config>::EpochId, RedemptionCredit<<T as Config>::Balance>)>;

pub type SettlementInfoOf<T> = SettlementInfo<
	<T as Config>::EpochId,
	<T as Config>::Balance,
	<T as Config>::BalanceRatio,
>;

#[frame_support::pallet]
pub mod pallet {
	use frame_support::pallet_prelude::*;

	use super::*;

	#[pallet::config]
	pub trait Config: frame_system::Config {
		type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

		type Balance: Member
			+ Parameter
			+ AtLeast32BitUnsigned
			+ Default
			+ Copy
			+ MaxEncodedLen
			+ FixedPointOperand
			+ From<u64>
			+ TypeInfo
			+ MultiplyRational;

		/// A fixed-point number used to report share prices
		type BalanceRatio: Member
			+ Parameter
			+ Default
			+ Copy
			+ TypeInfo
			+ FixedPointNumber<Inner = Self::Balance>
			+ MaxEncodedLen;

		type PoolId: Member
			+ Parameter
			+ Default
			+ Copy
			+ HasCompact
			+ MaxEncodedLen
			+ core::fmt::Debug;

		type EpochId: Member
			+ Parameter
			+ AtLeast32BitUnsigned
			+ Default
			+ Copy
			+ HasCompact
			+ MaxEncodedLen
			+ TypeInfo;

		/// The credit subsystem reporting profit and loss at every close
		type ProfitLoss: PoolProfitLoss<Self::PoolId, Balance = Self::Balance>;

		type ProtocolPause: ProtocolPause;

		type Time: TimeAsSecs;

		/// The origin permitted to create, enable and disable pools
		type AdminOrigin: EnsureOrigin<Self::RuntimeOrigin>;

		/// Max number of first loss covers of a pool
		#[pallet::constant]
		type MaxFirstLossCovers: Get<u32> + Member + TypeInfo;

		/// Max number of epochs with unprocessed redemptions per tranche
		#[pallet::constant]
		type MaxUnprocessedEpochs: Get<u32> + Member + TypeInfo;

		/// Weight Information
		type WeightInfo: WeightInfo;
	}

	#[pallet::pallet]
	#[pallet::generate_store(pub(super) trait Store)]
	pub struct Pallet<T>(_);

	#[pallet::storage]
	#[pallet::getter(fn pool)]
	pub type Pool<T: Config> = StorageMap<_, Blake2_128Concat, T::PoolId, PoolDetailsOf<T>>;

	#[pallet::storage]
	pub type RedemptionLedgers<T: Config> = StorageDoubleMap<
		_,
		Blake2_128Concat,
		T::PoolId,
		Blake2_128Concat,
		Tranche,
		RedemptionLedgerOf<T>,
		ValueQuery,
	>;

	/// Every redemption summary a tranche ever had, including the
	/// processed ones.
	#[pallet::storage]
	pub type RedemptionSummaries<T: Config> = StorageDoubleMap<
		_,
		Blake2_128Concat,
		(T::PoolId, Tranche),
		Twox64Concat,
		T::EpochId,
		RedemptionSummaryOf<T>,
	>;

	/// What investor records were credited so far from each summary.
	#[pallet::storage]
	pub type RedemptionCredits<T: Config> = StorageDoubleMap<
		_,
		Blake2_128Concat,
		(T::PoolId, Tranche),
		Twox64Concat,
		T::EpochId,
		RedemptionCredit<T::Balance>,
		ValueQuery,
	>;

	/// Redemption records as of the last interaction of each investor.
	#[pallet::storage]
	pub type RedemptionRecords<T: Config> = StorageDoubleMap<
		_,
		Blake2_128Concat,
		(T::PoolId, Tranche),
		Blake2_128Concat,
		T::AccountId,
		RedemptionRecordOf<T>,
	>;

	#[pallet::storage]
	pub type ShareAccounts<T: Config> = StorageDoubleMap<
		_,
		Blake2_128Concat,
		(T::PoolId, Tranche),
		Blake2_128Concat,
		T::AccountId,
		ShareAccount<T::Balance>,
		ValueQuery,
	>;

	#[pallet::storage]
	#[pallet::getter(fn last_settlement)]
	pub type LastSettlement<T: Config> =
		StorageMap<_, Blake2_128Concat, T::PoolId, SettlementInfoOf<T>>;

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		/// A pool was created.
		Created {
			pool_id: T::PoolId,
			parameters: PoolParameters,
		},
		/// A pool was enabled.
		Enabled { pool_id: T::PoolId },
		/// A pool was disabled.
		Disabled { pool_id: T::PoolId },
		/// An epoch was opened.
		EpochOpened {
			pool_id: T::PoolId,
			epoch_id: T::EpochId,
			end_time: Seconds,
		},
		/// Shares were issued for a deposit.
		Deposited {
			pool_id: T::PoolId,
			tranche: Tranche,
			who: T::AccountId,
			amount: T::Balance,
			shares: T::Balance,
		},
		/// A first loss cover was funded.
		CoverDeposited {
			pool_id: T::PoolId,
			cover_index: u32,
			who: T::AccountId,
			amount: T::Balance,
		},
		/// Shares were put up for redemption.
		RedemptionRequested {
			pool_id: T::PoolId,
			tranche: Tranche,
			who: T::AccountId,
			epoch_id: T::EpochId,
			shares: T::Balance,
		},
		/// A redemption request was reduced.
		RedemptionCancelled {
			pool_id: T::PoolId,
			tranche: Tranche,
			who: T::AccountId,
			epoch_id: T::EpochId,
			shares: T::Balance,
		},
		/// Processed redemptions were paid out.
		RedemptionWithdrawn {
			pool_id: T::PoolId,
			tranche: Tranche,
			who: T::AccountId,
			amount: T::Balance,
		},
		/// The profit and loss report of a close was applied.
		ProfitLossApplied {
			pool_id: T::PoolId,
			epoch_id: T::EpochId,
			profit: T::Balance,
			loss: T::Balance,
			recovery: T::Balance,
		},
		/// An epoch was settled.
		EpochSettled {
			pool_id: T::PoolId,
			epoch_id: T::EpochId,
			senior_assets: T::Balance,
			junior_assets: T::Balance,
			senior_price: T::BalanceRatio,
			junior_price: T::BalanceRatio,
			unprocessed_shares: T::Balance,
		},
		/// Liquidity left the pool reserve.
		LiquidityWithdrawn {
			pool_id: T::PoolId,
			to: T::AccountId,
			amount: T::Balance,
		},
		/// Liquidity entered the pool reserve.
		LiquidityDeposited {
			pool_id: T::PoolId,
			from: T::AccountId,
			amount: T::Balance,
		},
	}

	#[pallet::error]
	pub enum Error<T> {
		/// A pool with this ID does not exist
		NoSuchPool,
		/// A pool with this ID is already in use
		PoolInUse,
		/// The pool is not enabled
		PoolDisabled,
		/// The protocol is paused
		ProtocolPaused,
		/// The pool has no open epoch yet
		EpochNotOpened,
		/// The current epoch can not be closed before its end time
		EpochEndTimeNotReached,
		/// The pool is being settled
		SettlementInProgress,
		/// Pool parameters are out of range
		InvalidPoolParameters,
		/// A first loss cover configuration is out of range
		InvalidCoverConfig,
		/// More first loss covers than allowed
		TooManyCovers,
		/// No first loss cover at this index
		NoSuchCover,
		/// The amount is zero or buys no shares
		ZeroAmount,
		/// The account holds fewer shares than requested
		InsufficientShares,
		/// Fewer shares were requested in the current epoch than cancelled
		InsufficientRequestedShares,
		/// Nothing was processed for the account since its last withdrawal
		NoWithdrawableAmount,
		/// Too many epochs with unprocessed redemptions
		TooManyUnprocessedEpochs,
		/// Too many epochs with pending requests of a single account
		TooManyPendingRequests,
		/// The senior to junior ratio would exceed the pool maximum
		LeverageCovenantViolated,
		/// The reported loss exceeds everything the pool holds
		LossExceedsPoolAssets,
		/// The tranche has shares outstanding but no assets
		TrancheWipedOut,
		/// Not enough unreserved liquidity
		InsufficientLiquidity,
	}

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		/// Create a new pool, disabled until `enable_pool` is called.
		///
		/// Covers are listed in the order they absorb losses.
		#[pallet::weight(T::WeightInfo::create_pool(T::MaxFirstLossCovers::get()))]
		#[pallet::call_index(0)]
		pub fn create_pool(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			parameters: PoolParameters,
			covers: Vec<FirstLossCoverConfig<T::Balance>>,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;

			ensure!(!Pool::<T>::contains_key(pool_id), Error::<T>::PoolInUse);
			ensure!(parameters.is_valid(), Error::<T>::InvalidPoolParameters);
			ensure!(
				covers.iter().all(|config| config.is_valid()),
				Error::<T>::InvalidCoverConfig
			);

			let covers = BoundedVec::<_, T::MaxFirstLossCovers>::try_from(
				covers
					.into_iter()
					.map(FirstLossCover::new)
					.collect::<Vec<_>>(),
			)
			.map_err(|_| Error::<T>::TooManyCovers)?;

			Pool::<T>::insert(
				pool_id,
				PoolDetails {
					status: PoolStatus::Off,
					parameters: parameters.clone(),
					epoch: EpochState::new(),
					tranches: Default::default(),
					tracker: SeniorYieldTracker::new(Zero::zero(), T::Time::now()),
					covers,
					reserve: Default::default(),
				},
			);

			Self::deposit_event(Event::Created {
				pool_id,
				parameters,
			});

			Ok(())
		}

		/// Enable a pool and open its initial epoch starting at
		/// `start_time`. Enabling a pool that already had an epoch keeps its
		/// epoch as is.
		#[pallet::weight(T::WeightInfo::enable_pool())]
		#[pallet::call_index(1)]
		pub fn enable_pool(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			start_time: Seconds,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;

			Pool::<T>::try_mutate(pool_id, |pool| -> DispatchResult {
				let pool = pool.as_mut().ok_or(Error::<T>::NoSuchPool)?;
				ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);
				pool.status = PoolStatus::On;

				Ok(())
			})?;

			Self::deposit_event(Event::Enabled { pool_id });

			Self::open_initial_epoch(pool_id, start_time)
		}

		#[pallet::weight(T::WeightInfo::disable_pool())]
		#[pallet::call_index(2)]
		pub fn disable_pool(origin: OriginFor<T>, pool_id: T::PoolId) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;

			Pool::<T>::try_mutate(pool_id, |pool| -> DispatchResult {
				let pool = pool.as_mut().ok_or(Error::<T>::NoSuchPool)?;
				ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);
				pool.status = PoolStatus::Off;

				Ok(())
			})?;

			Self::deposit_event(Event::Disabled { pool_id });

			Ok(())
		}

		/// Deposit `amount` into a tranche for shares at the current share
		/// price.
		#[pallet::weight(T::WeightInfo::deposit())]
		#[pallet::call_index(3)]
		pub fn deposit(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			tranche: Tranche,
			amount: T::Balance,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			ensure!(!amount.is_zero(), Error::<T>::ZeroAmount);

			let mut pool = Pool::<T>::get(pool_id).ok_or(Error::<T>::NoSuchPool)?;
			Self::ensure_accepting(&pool)?;

			let shares = pool
				.tranches
				.get_mut(tranche)
				.deposit(amount)
				.map_err(Self::ledger_error)?;
			ensure!(!shares.is_zero(), Error::<T>::ZeroAmount);

			if tranche == Tranche::Senior {
				ensure!(
					pool.tranches
						.within_leverage(pool.parameters.max_senior_junior_ratio),
					Error::<T>::LeverageCovenantViolated
				);

				if let ProfitPolicy::FixedSeniorYield { yield_bps } = pool.parameters.profit_policy
				{
					pool.tracker.refresh(
						T::Time::now(),
						yield_bps,
						pool.tranches.senior.assets,
					)?;
				}
			}

			pool.reserve.deposit(amount)?;

			let mut account = ShareAccounts::<T>::get((pool_id, tranche), &who);
			account.mint(shares, amount)?;

			Pool::<T>::insert(pool_id, pool);
			ShareAccounts::<T>::insert((pool_id, tranche), &who, account);

			Self::deposit_event(Event::Deposited {
				pool_id,
				tranche,
				who,
				amount,
				shares,
			});

			Ok(())
		}

		/// Fund the first loss cover at `cover_index`.
		#[pallet::weight(T::WeightInfo::deposit_cover())]
		#[pallet::call_index(4)]
		pub fn deposit_cover(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			cover_index: u32,
			amount: T::Balance,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			ensure!(!amount.is_zero(), Error::<T>::ZeroAmount);

			Pool::<T>::try_mutate(pool_id, |pool| -> DispatchResult {
				let pool = pool.as_mut().ok_or(Error::<T>::NoSuchPool)?;
				Self::ensure_accepting(pool)?;

				let cover = pool
					.covers
					.get_mut(cover_index as usize)
					.ok_or(Error::<T>::NoSuchCover)?;
				cover.asset.ensure_add_assign(amount)?;
				pool.reserve.deposit(amount)?;

				Ok(())
			})?;

			Self::deposit_event(Event::CoverDeposited {
				pool_id,
				cover_index,
				who,
				amount,
			});

			Ok(())
		}

		/// Put `shares` up for redemption in the current epoch.
		///
		/// The shares leave the account right away. They are paid out at
		/// the price of the settlement that processes them.
		#[pallet::weight(T::WeightInfo::request_redemption(T::MaxUnprocessedEpochs::get()))]
		#[pallet::call_index(5)]
		pub fn request_redemption(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			tranche: Tranche,
			shares: T::Balance,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			ensure!(!shares.is_zero(), Error::<T>::ZeroAmount);

			let pool = Pool::<T>::get(pool_id).ok_or(Error::<T>::NoSuchPool)?;
			Self::ensure_accepting(&pool)?;
			let epoch_id = pool.epoch.current;

			let mut account = ShareAccounts::<T>::get((pool_id, tranche), &who);
			let principal = account.escrow(shares).map_err(Self::ledger_error)?;

			let (mut record, credits) = Self::caught_up_record(pool_id, tranche, &who, epoch_id)?
				.unwrap_or_else(|| (RedemptionRecord::new(epoch_id), Vec::new()));
			record
				.add_request(epoch_id, shares, principal)
				.map_err(Self::ledger_error)?;

			let mut ledger = RedemptionLedgers::<T>::get(pool_id, tranche);
			let summary = ledger
				.add_request(epoch_id, shares)
				.map_err(Self::ledger_error)?;

			ShareAccounts::<T>::insert((pool_id, tranche), &who, account);
			RedemptionRecords::<T>::insert((pool_id, tranche), &who, record);
			Self::store_credits(pool_id, tranche, credits);
			RedemptionLedgers::<T>::insert(pool_id, tranche, ledger);
			RedemptionSummaries::<T>::insert((pool_id, tranche), epoch_id, summary);

			Self::deposit_event(Event::RedemptionRequested {
				pool_id,
				tranche,
				who,
				epoch_id,
				shares,
			});

			Ok(())
		}

		/// Take back shares requested in the current epoch.
		#[pallet::weight(T::WeightInfo::cancel_redemption_request())]
		#[pallet::call_index(6)]
		pub fn cancel_redemption_request(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			tranche: Tranche,
			shares: T::Balance,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			ensure!(!shares.is_zero(), Error::<T>::ZeroAmount);

			let pool = Pool::<T>::get(pool_id).ok_or(Error::<T>::NoSuchPool)?;
			Self::ensure_accepting(&pool)?;
			let epoch_id = pool.epoch.current;

			let (mut record, credits) = Self::caught_up_record(pool_id, tranche, &who, epoch_id)?
				.ok_or(Error::<T>::InsufficientRequestedShares)?;
			let principal = record
				.cancel_request(epoch_id, shares)
				.map_err(Self::ledger_error)?;

			let mut ledger = RedemptionLedgers::<T>::get(pool_id, tranche);
			let summary = ledger
				.cancel_request(epoch_id, shares)
				.map_err(Self::ledger_error)?;

			let mut account = ShareAccounts::<T>::get((pool_id, tranche), &who);
			account.mint(shares, principal)?;

			ShareAccounts::<T>::insert((pool_id, tranche), &who, account);
			RedemptionRecords::<T>::insert((pool_id, tranche), &who, record);
			Self::store_credits(pool_id, tranche, credits);
			RedemptionLedgers::<T>::insert(pool_id, tranche, ledger);
			match summary {
				Some(summary) => {
					RedemptionSummaries::<T>::insert((pool_id, tranche), epoch_id, summary)
				}
				None => RedemptionSummaries::<T>::remove((pool_id, tranche), epoch_id),
			}

			Self::deposit_event(Event::RedemptionCancelled {
				pool_id,
				tranche,
				who,
				epoch_id,
				shares,
			});

			Ok(())
		}

		/// Pay out everything settlements processed for the caller and
		/// release it from the reserve.
		#[pallet::weight(T::WeightInfo::withdraw_after_redemption(T::MaxUnprocessedEpochs::get()))]
		#[pallet::call_index(7)]
		pub fn withdraw_after_redemption(
			origin: OriginFor<T>,
			pool_id: T::PoolId,
			tranche: Tranche,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;

			let mut pool = Pool::<T>::get(pool_id).ok_or(Error::<T>::NoSuchPool)?;
			Self::ensure_accepting(&pool)?;

			let (mut record, credits) =
				Self::caught_up_record(pool_id, tranche, &who, pool.epoch.current)?
					.ok_or(Error::<T>::NoWithdrawableAmount)?;
			let amount = record.withdraw_all()?;
			ensure!(!amount.is_zero(), Error::<T>::NoWithdrawableAmount);

			pool.reserve.release(amount)?;

			Pool::<T>::insert(pool_id, pool);
			RedemptionRecords::<T>::insert((pool_id, tranche), &who, record);
			Self::store_credits(pool_id, tranche, credits);

			Self::deposit_event(Event::RedemptionWithdrawn {
				pool_id,
				tranche,
				who,
				amount,
			});

			Ok(())
		}

		/// Close the current epoch once its end time has passed.
		///
		/// Pulls the profit and loss report from the credit subsystem, runs
		/// the waterfall, processes pending redemptions of both tranches
		/// and opens the next epoch. Either all of it happens or nothing.
		#[pallet::weight(T::WeightInfo::close_epoch(
			T::MaxFirstLossCovers::get(),
			T::MaxUnprocessedEpochs::get()
		))]
		#[transactional]
		#[pallet::call_index(8)]
		pub fn close_epoch(origin: OriginFor<T>, pool_id: T::PoolId) -> DispatchResult {
			ensure_signed(origin)?;

			let mut pool = Pool::<T>::get(pool_id).ok_or(Error::<T>::NoSuchPool)?;
			ensure!(pool.is_enabled(), Error::<T>::PoolDisabled);

			if T::ProtocolPause::is_paused() {
				log::warn!(
					target: LOG_TARGET,
					"Close of pool {:?} rejected: protocol paused",
					pool_id
				);
				return Err(Error::<T>::ProtocolPaused.into());
			}

			ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);
			ensure!(pool.epoch.is_opened(), Error::<T>::EpochNotOpened);

			let now = T::Time::now();
			ensure!(
				now >= pool.epoch.end_time,
				Error::<T>::EpochEndTimeNotReached
			);

			// Persisted so that anything the credit subsystem calls back into
			// sees the settlement.
			pool.epoch.status = EpochStatus::Closing;
			Pool::<T>::insert(pool_id, &pool);

			let report = T::ProfitLoss::refresh_and_report(pool_id)?;

			let mut senior_ledger = RedemptionLedgers::<T>::get(pool_id, Tranche::Senior);
			let mut junior_ledger = RedemptionLedgers::<T>::get(pool_id, Tranche::Junior);

			let outcome = settlement::settle_epoch(
				&mut pool,
				&mut senior_ledger,
				&mut junior_ledger,
				&report,
				now,
			)
			.map_err(Self::ledger_error)?;

			log::debug!(
				target: LOG_TARGET,
				"Pool {:?} epoch {:?}: profit {:?}, loss {:?}, recovery {:?}",
				pool_id,
				outcome.epoch_id,
				outcome.waterfall.profit,
				outcome.waterfall.loss,
				outcome.waterfall.recovery,
			);

			for (tranche, processed) in [
				(Tranche::Senior, &outcome.senior),
				(Tranche::Junior, &outcome.junior),
			] {
				for summary in processed.touched.iter() {
					RedemptionSummaries::<T>::insert(
						(pool_id, tranche),
						summary.epoch_id,
						summary,
					);
				}
			}

			let info = SettlementInfo {
				epoch_id: outcome.epoch_id,
				settled_at: now,
				senior_assets: pool.tranches.senior.assets,
				junior_assets: pool.tranches.junior.assets,
				senior_price: pool.tranches.senior.price().to_ratio()?,
				junior_price: pool.tranches.junior.price().to_ratio()?,
				unprocessed_shares: senior_ledger
					.unprocessed_shares()?
					.ensure_add(junior_ledger.unprocessed_shares()?)?,
			};

			RedemptionLedgers::<T>::insert(pool_id, Tranche::Senior, senior_ledger);
			RedemptionLedgers::<T>::insert(pool_id, Tranche::Junior, junior_ledger);
			Pool::<T>::insert(pool_id, &pool);
			LastSettlement::<T>::insert(pool_id, info.clone());

			Self::deposit_event(Event::ProfitLossApplied {
				pool_id,
				epoch_id: outcome.epoch_id,
				profit: report.profit,
				loss: report.loss,
				recovery: report.recovery,
			});
			Self::deposit_event(Event::EpochSettled {
				pool_id,
				epoch_id: info.epoch_id,
				senior_assets: info.senior_assets,
				junior_assets: info.junior_assets,
				senior_price: info.senior_price,
				junior_price: info.junior_price,
				unprocessed_shares: info.unprocessed_shares,
			});

			log::debug!(
				target: LOG_TARGET,
				"Pool {:?} settled epoch {:?}, next ends at {}",
				pool_id,
				outcome.epoch_id,
				pool.epoch.end_time,
			);

			Self::deposit_event(Event::EpochOpened {
				pool_id,
				epoch_id: pool.epoch.current,
				end_time: pool.epoch.end_time,
			});

			Ok(())
		}
	}

	impl<T: Config> Pallet<T> {
		/// Opens the first epoch of a pool. Does nothing if the pool already
		/// had one.
		pub fn open_initial_epoch(pool_id: T::PoolId, start_time: Seconds) -> DispatchResult {
			Pool::<T>::try_mutate(pool_id, |pool| -> DispatchResult {
				let pool = pool.as_mut().ok_or(Error::<T>::NoSuchPool)?;

				if pool
					.epoch
					.open_initial(start_time, pool.parameters.epoch_period)?
				{
					log::debug!(
						target: LOG_TARGET,
						"Pool {:?} opened its initial epoch, ends at {}",
						pool_id,
						pool.epoch.end_time,
					);

					Self::deposit_event(Event::EpochOpened {
						pool_id,
						epoch_id: pool.epoch.current,
						end_time: pool.epoch.end_time,
					});
				}

				Ok(())
			})
		}

		/// Id and end time of the open epoch.
		pub fn current_epoch(pool_id: T::PoolId) -> Option<(T::EpochId, Seconds)> {
			Pool::<T>::get(pool_id)
				.filter(|pool| pool.epoch.is_opened())
				.map(|pool| (pool.epoch.current, pool.epoch.end_time))
		}

		/// Summaries with shares still waiting for liquidity, oldest first.
		pub fn unprocessed_epochs(pool_id: T::PoolId, tranche: Tranche) -> Vec<RedemptionSummaryOf<T>> {
			RedemptionLedgers::<T>::get(pool_id, tranche)
				.unprocessed
				.into_inner()
		}

		pub fn first_unprocessed_epoch_index(pool_id: T::PoolId, tranche: Tranche) -> u32 {
			RedemptionLedgers::<T>::get(pool_id, tranche).first_unprocessed_index
		}

		pub fn redemption_summary(
			pool_id: T::PoolId,
			tranche: Tranche,
			epoch_id: T::EpochId,
		) -> Option<RedemptionSummaryOf<T>> {
			RedemptionSummaries::<T>::get((pool_id, tranche), epoch_id)
		}

		/// The redemption record of `who`, brought up to date with every
		/// settlement so far. Nothing is written.
		pub fn redemption_record(
			pool_id: T::PoolId,
			tranche: Tranche,
			who: &T::AccountId,
		) -> Option<RedemptionRecordOf<T>> {
			let current = Pool::<T>::get(pool_id)?.epoch.current;
			Self::caught_up_record(pool_id, tranche, who, current)
				.ok()
				.flatten()
				.map(|(record, _)| record)
		}

		pub fn withdrawable_amount(
			pool_id: T::PoolId,
			tranche: Tranche,
			who: &T::AccountId,
		) -> T::Balance {
			Self::redemption_record(pool_id, tranche, who)
				.and_then(|record| record.withdrawable().ok())
				.unwrap_or_default()
		}

		pub fn share_account(
			pool_id: T::PoolId,
			tranche: Tranche,
			who: &T::AccountId,
		) -> ShareAccount<T::Balance> {
			ShareAccounts::<T>::get((pool_id, tranche), who)
		}

		/// Value of one share of `tranche`.
		pub fn share_price(pool_id: T::PoolId, tranche: Tranche) -> Option<T::BalanceRatio> {
			Pool::<T>::get(pool_id)?
				.tranches
				.get(tranche)
				.price()
				.to_ratio()
				.ok()
		}

		pub(crate) fn ensure_accepting(pool: &PoolDetailsOf<T>) -> DispatchResult {
			ensure!(pool.is_enabled(), Error::<T>::PoolDisabled);
			ensure!(!T::ProtocolPause::is_paused(), Error::<T>::ProtocolPaused);
			ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);
			ensure!(pool.epoch.is_opened(), Error::<T>::EpochNotOpened);

			Ok(())
		}

		pub(crate) fn caught_up_record(
			pool_id: T::PoolId,
			tranche: Tranche,
			who: &T::AccountId,
			current_epoch: T::EpochId,
		) -> Result<Option<(RedemptionRecordOf<T>, RedemptionCreditsOf<T>)>, DispatchError> {
			RedemptionRecords::<T>::get((pool_id, tranche), who)
				.map(|mut record| -> Result<_, DispatchError> {
					let credits = record.advance(current_epoch, |epoch_id| {
						RedemptionSummaries::<T>::get((pool_id, tranche), epoch_id).map(|summary| {
							(
								summary,
								RedemptionCredits::<T>::get((pool_id, tranche), epoch_id),
							)
						})
					})?;

					Ok((record, credits))
				})
				.transpose()
		}

		fn store_credits(pool_id: T::PoolId, tranche: Tranche, credits: RedemptionCreditsOf<T>) {
			for (epoch_id, credit) in credits {
				RedemptionCredits::<T>::insert((pool_id, tranche), epoch_id, credit);
			}
		}

		pub(crate) fn ledger_error(err: LedgerError) -> DispatchError {
			match err {
				LedgerError::Arithmetic(err) => err.into(),
				LedgerError::InsufficientLiquidity => Error::<T>::InsufficientLiquidity.into(),
				LedgerError::InsufficientShares => Error::<T>::InsufficientShares.into(),
				LedgerError::InsufficientRequestedShares => {
					Error::<T>::InsufficientRequestedShares.into()
				}
				LedgerError::LossExceedsPoolAssets => Error::<T>::LossExceedsPoolAssets.into(),
				LedgerError::TooManyPendingRequests => Error::<T>::TooManyPendingRequests.into(),
				LedgerError::TooManyUnprocessedEpochs => {
					Error::<T>::TooManyUnprocessedEpochs.into()
				}
				LedgerError::TrancheWipedOut => Error::<T>::TrancheWipedOut.into(),
			}
		}
	}
}
