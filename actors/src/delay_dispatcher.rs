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

use std::{collections::VecDeque, time::Duration};

use common::Timestamp;

use crate::{Actor, ActorContext, Promise};

struct DelayedItem<T> {
	item: T,
	promise: Promise<T>,
	delay: Duration,
}

/// A rate-paced FIFO work queue.
///
/// Each queued item carries the promise it is delivered through; at most
/// one item is dispatched per `default_delay` (overridable per item).
/// Closing the dispatcher flushes the remaining queue immediately.
pub struct DelayDispatcher<T: Send + 'static> {
	queue: VecDeque<DelayedItem<T>>,
	wakeup_at: Option<Timestamp>,
	default_delay: Duration,
}

impl<T: Send + 'static> DelayDispatcher<T> {
	pub fn new(default_delay: Duration) -> DelayDispatcher<T> {
		DelayDispatcher { queue: VecDeque::new(), wakeup_at: None, default_delay }
	}

	pub fn send(&mut self, ctx: &mut ActorContext<Self>, item: T, promise: Promise<T>) {
		let delay = self.default_delay;
		self.send_with_delay(ctx, item, promise, delay);
	}

	pub fn send_with_delay(
		&mut self,
		ctx: &mut ActorContext<Self>,
		item: T,
		promise: Promise<T>,
		delay: Duration,
	) {
		self.queue.push_back(DelayedItem { item, promise, delay });
		self.process(ctx);
	}

	pub fn queue_len(&self) -> usize {
		self.queue.len()
	}

	fn process(&mut self, ctx: &mut ActorContext<Self>) {
		loop {
			let now = Timestamp::now();
			if let Some(wakeup_at) = self.wakeup_at {
				if now < wakeup_at {
					if !self.queue.is_empty() {
						ctx.set_timeout_at(wakeup_at);
					}
					return;
				}
			}
			let Some(entry) = self.queue.pop_front() else {
				return;
			};
			let DelayedItem { item, mut promise, delay } = entry;
			promise.set_value(item);
			self.wakeup_at = Some(now + delay);
		}
	}
}

impl<T: Send + 'static> Actor for DelayDispatcher<T> {
	fn on_timeout(&mut self, ctx: &mut ActorContext<Self>) {
		self.process(ctx);
	}

	fn on_close(&mut self, _ctx: &mut ActorContext<Self>) {
		// drain without pacing
		while let Some(entry) = self.queue.pop_front() {
			let DelayedItem { item, mut promise, .. } = entry;
			promise.set_value(item);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::{Arc, Mutex},
		time::{Duration, Instant},
	};

	use super::DelayDispatcher;
	use crate::{tests::run_until_finished, Actor, ActorContext, Promise, Runtime};

	struct Driver {
		delivered: Arc<Mutex<Vec<(u32, Instant)>>>,
	}

	impl Actor for Driver {
		fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
			let dispatcher = ctx.create_actor(
				"delay_dispatcher",
				DelayDispatcher::<u32>::new(Duration::from_millis(40)),
			);
			let driver_id = ctx.actor_id();
			let dispatcher_id = dispatcher.actor_id();
			for index in 0..3u32 {
				let delivered = self.delivered.clone();
				let driver_id = driver_id.clone();
				let promise = Promise::from_fn(move |result| {
					let item = result.expect("the dispatcher delivers every queued item");
					delivered.lock().unwrap().push((item, Instant::now()));
					if item == 2 {
						driver_id.send_event(0);
					}
				});
				dispatcher_id.send_closure(
					move |dispatcher: &mut DelayDispatcher<u32>, ctx| {
						dispatcher.send(ctx, index, promise);
					},
				);
			}
			// the dispatcher outlives this scope unowned; it is closed by
			// the runtime finish
			dispatcher.release();
		}

		fn on_event(&mut self, ctx: &mut ActorContext<Self>, _tag: u64) {
			ctx.finish();
		}
	}

	#[test]
	fn test_delay_dispatcher_paces_deliveries() {
		let runtime = Runtime::new(0, 0);
		let delivered = Arc::new(Mutex::new(Vec::new()));
		{
			let mut guard = runtime.main_guard().unwrap();
			guard.create_actor("driver", Driver { delivered: delivered.clone() }).release();
		}
		run_until_finished(&runtime);
		let delivered = delivered.lock().unwrap();
		let items: Vec<u32> = delivered.iter().map(|(item, _)| *item).collect();
		assert_eq!(items, vec![0, 1, 2]);
		// paced: one item per default_delay
		for pair in delivered.windows(2) {
			let gap = pair[1].1.duration_since(pair[0].1);
			assert!(gap >= Duration::from_millis(39), "gap was {gap:?}");
		}
	}

	struct FlushDriver {
		delivered: Arc<Mutex<Vec<u32>>>,
	}

	impl Actor for FlushDriver {
		fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
			let dispatcher = ctx.create_actor(
				"delay_dispatcher",
				DelayDispatcher::<u32>::new(Duration::from_secs(3600)),
			);
			let dispatcher_id = dispatcher.actor_id();
			let driver_id = ctx.actor_id();
			for index in 0..5u32 {
				let delivered = self.delivered.clone();
				let driver_id = driver_id.clone();
				let promise = Promise::from_fn(move |result| {
					if let Ok(item) = result {
						delivered.lock().unwrap().push(item);
						if item == 4 {
							driver_id.send_event(0);
						}
					}
				});
				dispatcher_id.send_closure(
					move |dispatcher: &mut DelayDispatcher<u32>, ctx| {
						dispatcher.send(ctx, index, promise);
					},
				);
			}
			// dropping the owner closes the dispatcher, which flushes the
			// queue without waiting an hour per item
			drop(dispatcher);
		}

		fn on_event(&mut self, ctx: &mut ActorContext<Self>, _tag: u64) {
			ctx.finish();
		}
	}

	#[test]
	fn test_delay_dispatcher_drains_on_close() {
		let runtime = Runtime::new(0, 0);
		let delivered = Arc::new(Mutex::new(Vec::new()));
		{
			let mut guard = runtime.main_guard().unwrap();
			guard
				.create_actor("flush_driver", FlushDriver { delivered: delivered.clone() })
				.release();
		}
		run_until_finished(&runtime);
		assert_eq!(delivered.lock().unwrap().as_slice(), &[0, 1, 2, 3, 4]);
	}
}
