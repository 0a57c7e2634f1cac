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

use std::{sync::Arc, time::Duration};

use common::Timestamp;
use tracing::debug;

use crate::{
	handle::{ActorId, ActorLink, ActorOwn, ActorShared},
	scheduler::SchedulerHost,
	Actor,
};

/// The scheduler-local handle an actor works through inside a hook.
///
/// It only exists for the duration of a turn on the actor's home
/// scheduler (or while the main guard is held), which is what makes the
/// same-scheduler operations safe by construction: there is no way to
/// reach the scheduler state from anywhere else.
pub struct ActorContext<'a, A: Actor> {
	link: &'a Arc<ActorLink<A>>,
	host: &'a mut SchedulerHost,
}

impl<'a, A: Actor> ActorContext<'a, A> {
	pub(crate) fn new(link: &'a Arc<ActorLink<A>>, host: &'a mut SchedulerHost) -> Self {
		ActorContext { link, host }
	}

	/// A weak handle to this actor.
	pub fn actor_id(&self) -> ActorId<A> {
		ActorId::from_link(self.link.clone())
	}

	/// A lifetime-keeping handle to this actor, tagged with
	/// `link_token`. Hand it to a dependent so this actor learns which
	/// dependency disappeared.
	pub fn actor_shared(&self, link_token: u64) -> ActorShared<A> {
		ActorShared::new(self.link.clone(), link_token)
	}

	pub fn name(&self) -> &str {
		self.link.info.name()
	}

	pub fn scheduler_index(&self) -> usize {
		self.host.index
	}

	pub fn now(&self) -> Timestamp {
		Timestamp::now()
	}

	/// Requests this actor's stop. The transition to `Closing` happens
	/// immediately; `on_close` runs once the current hook returns.
	pub fn stop(&mut self) {
		if self.link.info.request_close() {
			debug!(actor = %self.link.info.name(), "stop-requested");
		}
	}

	/// Requests global termination of the runtime. Every scheduler
	/// delivers the outstanding stop events to its actors and exits.
	pub fn finish(&mut self) {
		self.host.terminate.kill();
		for client in self.host.clients.iter() {
			client.finish();
		}
	}

	/// Arms this actor's timeout, replacing any previous deadline.
	pub fn set_timeout_in(&mut self, delay: Duration) {
		self.set_timeout_at(Timestamp::from_now(delay));
	}

	pub fn set_timeout_at(&mut self, deadline: Timestamp) {
		self.link.info.bump_timeout_generation();
		self.host.wheel.set(self.link.info.uid(), deadline);
	}

	pub fn cancel_timeout(&mut self) {
		self.link.info.bump_timeout_generation();
		self.host.wheel.cancel(self.link.info.uid());
	}

	pub fn has_timeout(&self) -> bool {
		self.host.wheel.has(self.link.info.uid())
	}

	/// Creates an actor on this scheduler.
	pub fn create_actor<B: Actor>(&mut self, name: &str, actor: B) -> ActorOwn<B> {
		let index = self.host.index;
		self.host.create_actor_on_scheduler(index, name, actor)
	}

	/// Creates an actor pinned to the scheduler at `index`.
	pub fn create_actor_on_scheduler<B: Actor>(
		&mut self,
		index: usize,
		name: &str,
		actor: B,
	) -> ActorOwn<B> {
		self.host.create_actor_on_scheduler(index, name, actor)
	}

	/// Synchronously borrows another actor hosted on this scheduler.
	///
	/// The escape hatch for the rare case where a deferred send is not
	/// an option; prefer `send_closure`. Returns `None` if the target
	/// lives elsewhere, already closed, or is this actor itself.
	pub fn with_local<B: Actor, R>(
		&mut self,
		id: &ActorId<B>,
		f: impl for<'b> FnOnce(&mut B, &mut ActorContext<'b, B>) -> R,
	) -> Option<R> {
		self.host.with_actor(id, f)
	}
}
