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

//! A storage backed stand-in for the credit subsystem of a pool.
//!
//! Tests queue profit, loss and recovery per pool with the setters below.
//! Every `refresh_and_report` call hands out what was queued and resets it,
//! so a report is never counted twice.

pub use pallet::*;

#[frame_support::pallet]
pub mod pallet {
	use cfg_traits::{PoolProfitLoss, ProfitLossReport};
	use frame_support::pallet_prelude::*;
	use sp_runtime::traits::{AtLeast32BitUnsigned, EnsureAdd};

	#[pallet::config]
	pub trait Config: frame_system::Config {
		type PoolId: Member + Parameter + Default + Copy + MaxEncodedLen;

		type Balance: Member
			+ Parameter
			+ Default
			+ Copy
			+ MaxEncodedLen
			+ AtLeast32BitUnsigned
			+ MaybeSerializeDeserialize;
	}

	#[pallet::pallet]
	#[pallet::generate_store(pub(super) trait Store)]
	pub struct Pallet<T>(_);

	#[pallet::storage]
	pub type Pending<T: Config> =
		StorageMap<_, Blake2_128Concat, T::PoolId, ProfitLossReport<T::Balance>, ValueQuery>;

	#[pallet::storage]
	pub type Calls<T: Config> = StorageMap<_, Blake2_128Concat, T::PoolId, u32, ValueQuery>;

	#[pallet::storage]
	pub type Failing<T: Config> = StorageMap<_, Blake2_128Concat, T::PoolId, bool, ValueQuery>;

	#[pallet::error]
	pub enum Error<T> {
		/// The credit book could not be refreshed
		RefreshFailed,
	}

	impl<T: Config> Pallet<T> {
		pub fn set_report(
			pool_id: T::PoolId,
			profit: T::Balance,
			loss: T::Balance,
			recovery: T::Balance,
		) {
			Pending::<T>::insert(
				pool_id,
				ProfitLossReport {
					profit,
					loss,
					recovery,
				},
			);
		}

		pub fn add_profit(pool_id: T::PoolId, amount: T::Balance) -> DispatchResult {
			Pending::<T>::try_mutate(pool_id, |report| {
				report.profit = report.profit.ensure_add(amount)?;
				Ok(())
			})
		}

		pub fn set_failing(pool_id: T::PoolId, failing: bool) {
			Failing::<T>::insert(pool_id, failing);
		}

		pub fn pending(pool_id: T::PoolId) -> ProfitLossReport<T::Balance> {
			Pending::<T>::get(pool_id)
		}

		pub fn calls(pool_id: T::PoolId) -> u32 {
			Calls::<T>::get(pool_id)
		}
	}

	impl<T: Config> PoolProfitLoss<T::PoolId> for Pallet<T> {
		type Balance = T::Balance;

		fn refresh_and_report(
			pool_id: T::PoolId,
		) -> Result<ProfitLossReport<Self::Balance>, DispatchError> {
			Calls::<T>::mutate(pool_id, |calls| *calls = calls.saturating_add(1));
			ensure!(!Failing::<T>::get(pool_id), Error::<T>::RefreshFailed);

			Ok(Pending::<T>::take(pool_id))
		}
	}
}
