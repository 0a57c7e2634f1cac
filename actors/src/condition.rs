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

use crate::{promise::set_promises, Actor, ActorContext, ActorId, ActorOwn, Promise};

/// Parks promises until the condition is set.
///
/// `wait` queues a promise; `set_true` releases every parked promise
/// with `Ok(())` by closing the helper actor. Promises queued after
/// `set_true` resolve immediately.
pub struct Condition {
	actor_id: ActorId<ConditionHelper>,
	own_actor: Option<ActorOwn<ConditionHelper>>,
}

#[derive(Default)]
struct ConditionHelper {
	pending_promises: Vec<Promise<()>>,
}

impl Actor for ConditionHelper {
	fn on_close(&mut self, _ctx: &mut ActorContext<Self>) {
		set_promises(&mut self.pending_promises);
	}
}

impl Condition {
	pub fn new<A: Actor>(ctx: &mut ActorContext<'_, A>) -> Condition {
		let own_actor = ctx.create_actor("condition_helper", ConditionHelper::default());
		Condition { actor_id: own_actor.actor_id(), own_actor: Some(own_actor) }
	}

	pub fn wait(&self, mut promise: Promise<()>) {
		if self.own_actor.is_none() {
			return promise.set_value(());
		}
		self.actor_id.send_closure(move |helper: &mut ConditionHelper, _ctx| {
			helper.pending_promises.push(promise);
		});
	}

	pub fn set_true(&mut self) {
		assert!(self.own_actor.is_some(), "a condition can only be set once");
		self.own_actor = None;
	}
}
