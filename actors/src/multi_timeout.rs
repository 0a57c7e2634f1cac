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

use std::time::Duration;

use common::Timestamp;

use crate::{Actor, ActorContext, TimeoutQueue};

type Callback = Box<dyn FnMut(&mut MultiTimeoutOps<'_>, i64) + Send>;

/// Maps external `i64` keys to independent deadlines.
///
/// One actor, one timeout wheel slot: the earliest keyed deadline is
/// mirrored into the actor's own timeout, and expirations are delivered
/// to the callback on the owning scheduler, in deadline order.
pub struct MultiTimeout {
	queue: TimeoutQueue<i64>,
	callback: Option<Callback>,
}

/// The control view handed to the callback.
///
/// A callback may cancel or re-arm any key, including the one that just
/// fired; the actor's wheel slot is re-armed once after the batch.
pub struct MultiTimeoutOps<'a> {
	queue: &'a mut TimeoutQueue<i64>,
}

impl MultiTimeoutOps<'_> {
	pub fn set_timeout_in(&mut self, key: i64, delay: Duration) {
		self.queue.set(key, Timestamp::from_now(delay));
	}

	pub fn set_timeout_at(&mut self, key: i64, deadline: Timestamp) {
		self.queue.set(key, deadline);
	}

	pub fn cancel_timeout(&mut self, key: i64) -> bool {
		self.queue.cancel(key)
	}

	pub fn has_timeout(&self, key: i64) -> bool {
		self.queue.has(key)
	}
}

impl Default for MultiTimeout {
	fn default() -> Self {
		MultiTimeout::new()
	}
}

impl MultiTimeout {
	pub fn new() -> MultiTimeout {
		MultiTimeout { queue: TimeoutQueue::new(), callback: None }
	}

	pub fn set_callback(
		&mut self,
		callback: impl FnMut(&mut MultiTimeoutOps<'_>, i64) + Send + 'static,
	) {
		self.callback = Some(Box::new(callback));
	}

	pub fn set_timeout_in(&mut self, ctx: &mut ActorContext<Self>, key: i64, delay: Duration) {
		self.set_timeout_at(ctx, key, Timestamp::from_now(delay));
	}

	pub fn set_timeout_at(&mut self, ctx: &mut ActorContext<Self>, key: i64, deadline: Timestamp) {
		self.queue.set(key, deadline);
		self.rearm(ctx);
	}

	pub fn cancel_timeout(&mut self, ctx: &mut ActorContext<Self>, key: i64) -> bool {
		let canceled = self.queue.cancel(key);
		self.rearm(ctx);
		canceled
	}

	pub fn has_timeout(&self, key: i64) -> bool {
		self.queue.has(key)
	}

	/// Mirrors the earliest keyed deadline into the actor's wheel slot.
	fn rearm(&mut self, ctx: &mut ActorContext<Self>) {
		match self.queue.next_deadline() {
			Some(deadline) => ctx.set_timeout_at(deadline),
			None => ctx.cancel_timeout(),
		}
	}
}

impl Actor for MultiTimeout {
	fn on_timeout(&mut self, ctx: &mut ActorContext<Self>) {
		if let Some(mut callback) = self.callback.take() {
			// pop one key at a time so a callback canceling a sibling
			// key prevents its firing
			while let Some(deadline) = self.queue.next_deadline() {
				if deadline > Timestamp::now() {
					break;
				}
				let Some(key) = self.queue.pop_next() else {
					break;
				};
				let mut ops = MultiTimeoutOps { queue: &mut self.queue };
				callback(&mut ops, key);
			}
			self.callback = Some(callback);
		}
		self.rearm(ctx);
	}
}
