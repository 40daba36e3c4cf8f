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

use frame_support::weights::Weight;

pub trait WeightInfo {
	fn create_pool(n: u32) -> Weight;
	fn enable_pool() -> Weight;
	fn disable_pool() -> Weight;
	fn deposit() -> Weight;
	fn deposit_cover() -> Weight;
	fn request_redemption(n: u32) -> Weight;
	fn cancel_redemption_request() -> Weight;
	fn withdraw_after_redemption(n: u32) -> Weight;
	fn close_epoch(n: u32, m: u32) -> Weight;
}

impl WeightInfo for () {
	fn create_pool(_: u32) -> Weight {
		Weight::zero()
	}

	fn enable_pool() -> Weight {
		Weight::zero()
	}

	fn disable_pool() -> Weight {
		Weight::zero()
	}

	fn deposit() -> Weight {
		Weight::zero()
	}

	fn deposit_cover() -> Weight {
		Weight::zero()
	}

	fn request_redemption(_: u32) -> Weight {
		Weight::zero()
	}

	fn cancel_redemption_request() -> Weight {
		Weight::zero()
	}

	fn withdraw_after_redemption(_: u32) -> Weight {
		Weight::zero()
	}

	fn close_epoch(_: u32, _: u32) -> Weight {
		Weight::zero()
	}
}
