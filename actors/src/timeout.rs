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
	cmp::{Ordering, Reverse},
	collections::{BinaryHeap, HashMap},
	hash::Hash,
};

use common::Timestamp;

/// A min-heap of pending deadlines, keyed by `K`.
///
/// Each key holds at most one deadline; setting it again replaces the
/// previous one. Cancellation races are resolved with a generation
/// stamp: stale heap entries are skipped lazily, so `cancel` and `set`
/// are O(log n) without a heap rebuild.
///
/// Every scheduler owns one wheel keyed by actor uid; `MultiTimeout`
/// instantiates the same structure keyed by `i64`.
pub struct TimeoutQueue<K> {
	heap: BinaryHeap<Reverse<Entry<K>>>,
	live: HashMap<K, Slot>,
	next_generation: u64,
}

struct Slot {
	deadline: Timestamp,
	generation: u64,
}

struct Entry<K> {
	deadline: Timestamp,
	generation: u64,
	key: K,
}

impl<K> PartialEq for Entry<K> {
	fn eq(&self, other: &Self) -> bool {
		self.deadline == other.deadline && self.generation == other.generation
	}
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<K> Ord for Entry<K> {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.deadline, self.generation).cmp(&(other.deadline, other.generation))
	}
}

impl<K: Copy + Eq + Hash> Default for TimeoutQueue<K> {
	fn default() -> Self {
		TimeoutQueue::new()
	}
}

impl<K: Copy + Eq + Hash> TimeoutQueue<K> {
	pub fn new() -> TimeoutQueue<K> {
		TimeoutQueue { heap: BinaryHeap::new(), live: HashMap::new(), next_generation: 0 }
	}

	/// Arms `key` at `deadline`, replacing any previous deadline.
	pub fn set(&mut self, key: K, deadline: Timestamp) {
		self.next_generation += 1;
		let generation = self.next_generation;
		self.live.insert(key, Slot { deadline, generation });
		self.heap.push(Reverse(Entry { deadline, generation, key }));
	}

	/// Disarms `key`. Returns true iff it was armed.
	pub fn cancel(&mut self, key: K) -> bool {
		self.live.remove(&key).is_some()
	}

	pub fn has(&self, key: K) -> bool {
		self.live.contains_key(&key)
	}

	pub fn get(&self, key: K) -> Option<Timestamp> {
		self.live.get(&key).map(|slot| slot.deadline)
	}

	/// The earliest live deadline; tells the scheduler how long it may
	/// block. Drops stale heap entries on the way.
	pub fn next_deadline(&mut self) -> Option<Timestamp> {
		while let Some(Reverse(head)) = self.heap.peek() {
			let is_live = self
				.live
				.get(&head.key)
				.is_some_and(|slot| slot.generation == head.generation);
			if is_live {
				return Some(head.deadline);
			}
			self.heap.pop();
		}
		None
	}

	/// Pops every key with `deadline <= now` into `expired`, in deadline
	/// order. Each pop disarms the key; at most one fire per `set`.
	pub fn pop_due(&mut self, now: Timestamp, expired: &mut Vec<K>) {
		while let Some(deadline) = self.next_deadline() {
			if deadline > now {
				break;
			}
			if let Some(key) = self.pop_next() {
				expired.push(key);
			}
		}
	}

	/// Pops the earliest live key, disarming it, whatever its deadline.
	pub fn pop_next(&mut self) -> Option<K> {
		self.next_deadline()?;
		let Reverse(head) = self.heap.pop()?;
		self.live.remove(&head.key);
		Some(head.key)
	}

	pub fn is_empty(&self) -> bool {
		self.live.is_empty()
	}

	pub fn len(&self) -> usize {
		self.live.len()
	}
}
