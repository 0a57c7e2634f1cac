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

use std::fmt;

use crate::{Actor, ActorContext};

/// A type-erased message with its handler captured.
///
/// Messages can have different types but somehow need to be pushed to a
/// queue with a single element type. Implementing `EventHandler` captures
/// the right handling code behind a `Box<dyn EventHandler<A>>` before the
/// message enters the mailbox.
pub trait EventHandler<A: Actor>: Send + 'static {
	/// Runs exclusively on the target actor's home scheduler.
	fn handle(self: Box<Self>, actor: &mut A, ctx: &mut ActorContext<A>);

	fn debug_msg(&self) -> String {
		"<custom>".to_string()
	}
}

pub type EventClosure<A> =
	Box<dyn for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) + Send + 'static>;

/// A message directed at one actor.
///
/// Events within one mailbox are processed strictly FIFO. Whatever the
/// variant, the handling code runs on the actor's home scheduler and
/// never concurrently with another hook of the same actor.
pub enum Event<A: Actor> {
	/// First event of every actor; drives `on_start`.
	Start,
	/// Requests the transition to `Closing`. Idempotent.
	Stop,
	/// The owning handle was dropped.
	Hangup,
	/// The last clone of a shared handle group was dropped; carries the
	/// group's link token.
	SharedHangup(u64),
	/// A per-actor timeout fired. The generation stamp discards
	/// deliveries made stale by a later re-arm or cancel.
	Timeout { generation: u64 },
	/// A pre-built payload tag; the cheapest event, no allocation.
	Raw(u64),
	/// A closure to run on the actor.
	Closure(EventClosure<A>),
	/// A user-defined message behind a type-erased handler.
	Custom(Box<dyn EventHandler<A>>),
}

impl<A: Actor> Event<A> {
	pub fn closure(
		f: impl for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) + Send + 'static,
	) -> Event<A> {
		Event::Closure(Box::new(f))
	}
}

impl<A: Actor> fmt::Debug for Event<A> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Event::Start => write!(f, "Start"),
			Event::Stop => write!(f, "Stop"),
			Event::Hangup => write!(f, "Hangup"),
			Event::SharedHangup(token) => write!(f, "SharedHangup({token})"),
			Event::Timeout { generation } => write!(f, "Timeout({generation})"),
			Event::Raw(tag) => write!(f, "Raw({tag})"),
			Event::Closure(_) => write!(f, "Closure"),
			Event::Custom(handler) => write!(f, "Custom({})", handler.debug_msg()),
		}
	}
}
