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

use crate::ActorContext;

/// The unit of scheduling.
///
/// An actor is pinned to one scheduler for its whole life and owns its
/// state exclusively: hooks run one at a time, always on the home
/// scheduler, never concurrently with each other. Within a hook the
/// actor may send events (always deferred), create new actors, adjust
/// its own timeout or request its own stop through the context.
///
/// All hooks are optional. Hooks do not return results: an actor signals
/// failure by calling `ctx.stop()` or by resolving a promise with an
/// error. A panicking hook takes the process down; the runtime offers no
/// isolation between actors.
pub trait Actor: Send + Sized + 'static {
	/// A name identifying the type of actor.
	///
	/// Ideally respecting the `SnakeCase` convention. It does not need
	/// to be unique: instance ids get a random suffix.
	fn name(&self) -> String {
		std::any::type_name::<Self>().to_string()
	}

	/// Runs before any other event, right after the actor was adopted by
	/// its scheduler.
	fn on_start(&mut self, _ctx: &mut ActorContext<Self>) {}

	/// Handles a raw payload tag, posted through `send_event` or by an
	/// armed [`crate::Future`].
	fn on_event(&mut self, _ctx: &mut ActorContext<Self>, _tag: u64) {}

	/// The per-actor timeout expired.
	fn on_timeout(&mut self, _ctx: &mut ActorContext<Self>) {}

	/// The owning handle was dropped. Stops the actor unless overridden.
	fn on_hangup(&mut self, ctx: &mut ActorContext<Self>) {
		ctx.stop();
	}

	/// The last clone of a shared handle group was dropped. The token
	/// tells which dependency went away.
	fn on_shared_hangup(&mut self, _ctx: &mut ActorContext<Self>, _token: u64) {}

	/// Last hook of the actor's life, right before the body is
	/// destroyed. Undelivered mailbox events are dropped afterwards.
	fn on_close(&mut self, _ctx: &mut ActorContext<Self>) {}
}
