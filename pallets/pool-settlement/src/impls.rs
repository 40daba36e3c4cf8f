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

use super::*;

impl<T: Config> PoolInspect<T::AccountId> for Pallet<T> {
	type PoolId = T::PoolId;

	fn pool_exists(pool_id: Self::PoolId) -> bool {
		Pool::<T>::contains_key(pool_id)
	}
}

/// Liquidity moves of the credit subsystem. Only unreserved liquidity can
/// leave the pool, and nothing moves while the pool is being settled.
impl<T: Config> PoolReserve<T::AccountId> for Pallet<T> {
	type Balance = T::Balance;

	fn withdraw(pool_id: Self::PoolId, to: T::AccountId, amount: Self::Balance) -> DispatchResult {
		Pool::<T>::try_mutate(pool_id, |pool| -> DispatchResult {
			let pool = pool.as_mut().ok_or(Error::<T>::NoSuchPool)?;
			ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);

			pool.reserve.withdraw(amount).map_err(Self::ledger_error)
		})?;

		Self::deposit_event(Event::LiquidityWithdrawn {
			pool_id,
			to,
			amount,
		});

		Ok(())
	}

	fn deposit(pool_id: Self::PoolId, from: T::AccountId, amount: Self::Balance) -> DispatchResult {
		Pool::<T>::try_mutate(pool_id, |pool| -> DispatchResult {
			let pool = pool.as_mut().ok_or(Error::<T>::NoSuchPool)?;
			ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);

			Ok(pool.reserve.deposit(amount)?)
		})?;

		Self::deposit_event(Event::LiquidityDeposited {
			pool_id,
			from,
			amount,
		});

		Ok(())
	}

	fn available_liquidity(pool_id: Self::PoolId) -> Result<Self::Balance, DispatchError> {
		let pool = Pool::<T>::get(pool_id).ok_or(Error::<T>::NoSuchPool)?;
		ensure!(!pool.epoch.is_closing(), Error::<T>::SettlementInProgress);

		Ok(pool.reserve.available()?)
	}
}
