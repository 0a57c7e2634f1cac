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

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::{Actor, Event};

/// The FIFO event queue of one actor.
///
/// The producer side may be touched from any thread; the consumer side
/// is touched only by the actor's home scheduler. The queue is unbounded
/// and `enqueue` never fails: contention is expressed as queueing, never
/// as an error surfaced to the sender.
pub(crate) struct Mailbox<A: Actor> {
	queue: Mutex<VecDeque<Event<A>>>,
}

impl<A: Actor> Mailbox<A> {
	pub(crate) fn new() -> Mailbox<A> {
		Mailbox { queue: Mutex::new(VecDeque::new()) }
	}

	/// Appends an event.
	///
	/// Returns true iff the queue went from empty to non-empty: the
	/// producer must then notify the home scheduler, and exactly one
	/// producer observes the transition.
	pub(crate) fn enqueue(&self, event: Event<A>) -> bool {
		let mut queue = self.queue.lock();
		queue.push_back(event);
		queue.len() == 1
	}

	/// Pops up to `limit` events in FIFO order into `out`.
	///
	/// Home scheduler only.
	pub(crate) fn drain(&self, limit: usize, out: &mut Vec<Event<A>>) {
		let mut queue = self.queue.lock();
		let count = limit.min(queue.len());
		out.extend(queue.drain(..count));
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.queue.lock().is_empty()
	}

	/// Drops every queued event. Called once the actor closed.
	pub(crate) fn clear(&self) {
		self.queue.lock().clear();
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.queue.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::Mailbox;
	use crate::{Actor, Event};

	struct Nop;

	impl Actor for Nop {}

	#[test]
	fn test_mailbox_reports_empty_to_non_empty() {
		let mailbox: Mailbox<Nop> = Mailbox::new();
		assert!(mailbox.enqueue(Event::Raw(1)));
		assert!(!mailbox.enqueue(Event::Raw(2)));
		let mut out = Vec::new();
		mailbox.drain(16, &mut out);
		assert_eq!(out.len(), 2);
		assert!(mailbox.is_empty());
		assert!(mailbox.enqueue(Event::Raw(3)));
	}

	#[test]
	fn test_mailbox_fifo_order() {
		let mailbox: Mailbox<Nop> = Mailbox::new();
		for tag in 0..100u64 {
			mailbox.enqueue(Event::Raw(tag));
		}
		let mut out = Vec::new();
		mailbox.drain(60, &mut out);
		mailbox.drain(60, &mut out);
		let tags: Vec<u64> = out
			.into_iter()
			.map(|event| match event {
				Event::Raw(tag) => tag,
				other => panic!("unexpected event {other:?}"),
			})
			.collect();
		assert_eq!(tags, (0..100).collect::<Vec<u64>>());
	}

	#[test]
	fn test_mailbox_drain_respects_limit() {
		let mailbox: Mailbox<Nop> = Mailbox::new();
		for tag in 0..10u64 {
			mailbox.enqueue(Event::Raw(tag));
		}
		let mut out = Vec::new();
		mailbox.drain(4, &mut out);
		assert_eq!(out.len(), 4);
		assert_eq!(mailbox.len(), 6);
		mailbox.clear();
		assert!(mailbox.is_empty());
	}
}
