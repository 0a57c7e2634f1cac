// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

use std::{
	ops::Add,
	time::{Duration, Instant},
};

/// A point on the monotonic clock.
///
/// Deadlines are always absolute: a clock slip between computing a
/// deadline and sleeping on it cannot suppress a timeout fire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Instant);

impl Timestamp {
	pub fn now() -> Timestamp {
		Timestamp(Instant::now())
	}

	/// The timestamp `delay` from now.
	pub fn from_now(delay: Duration) -> Timestamp {
		Timestamp(Instant::now() + delay)
	}

	/// Time left until this timestamp, zero if it already passed.
	pub fn remaining(&self) -> Duration {
		self.0.saturating_duration_since(Instant::now())
	}

	pub fn is_due(&self) -> bool {
		self.remaining() == Duration::ZERO
	}

	pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
		self.0.saturating_duration_since(earlier.0)
	}
}

impl Add<Duration> for Timestamp {
	type Output = Timestamp;

	fn add(self, delay: Duration) -> Timestamp {
		Timestamp(self.0 + delay)
	}
}
