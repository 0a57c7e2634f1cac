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

use tracing::debug;

use crate::{promise_future, Actor, ActorContext, Error, Future, Promise};

const RESULT_TAG: u64 = 1;

/// Runs a promise-producing operation and replies to the caller,
/// retrying when the operation goes away without an answer.
///
/// Each attempt arms a fresh future to itself and hands the paired
/// promise to `do_run`. A resolution with `LostPromise` or `Hangup`
/// burns one try; exhausting the budget (2 tries by default) replies
/// with the fixed "Requested data is inaccessible" error. The actor
/// stops itself right after replying, whatever the outcome.
pub struct RequestActor<T: Send + 'static> {
	do_run: Box<dyn FnMut(Promise<T>) + Send>,
	reply: Promise<T>,
	tries_left: u32,
	future: Option<Future<T>>,
}

impl<T: Send + 'static> RequestActor<T> {
	pub fn new(do_run: impl FnMut(Promise<T>) + Send + 'static, reply: Promise<T>) -> Self {
		RequestActor { do_run: Box::new(do_run), reply, tries_left: 2, future: None }
	}

	pub fn set_tries(&mut self, tries: u32) {
		self.tries_left = tries;
	}

	fn attempt(&mut self, ctx: &mut ActorContext<Self>) {
		if self.tries_left == 0 {
			self.reply.set_error(Error::msg("Requested data is inaccessible"));
			return ctx.stop();
		}
		self.tries_left -= 1;
		let (promise, mut future) = promise_future::<T>();
		future.set_event(ctx.actor_id(), RESULT_TAG);
		self.future = Some(future);
		(self.do_run)(promise);
	}
}

impl<T: Send + 'static> Actor for RequestActor<T> {
	fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
		self.attempt(ctx);
	}

	fn on_event(&mut self, ctx: &mut ActorContext<Self>, tag: u64) {
		if tag != RESULT_TAG {
			return;
		}
		let Some(mut future) = self.future.take() else {
			return;
		};
		match future.move_as_result() {
			Ok(value) => {
				self.reply.set_value(value);
				ctx.stop();
			},
			Err(Error::LostPromise) | Err(Error::Hangup) => {
				// the operation was dropped without an answer
				debug!(actor = %ctx.name(), tries_left = self.tries_left, "request-retry");
				self.attempt(ctx);
			},
			Err(error) => {
				self.reply.set_error(error);
				ctx.stop();
			},
		}
	}

	fn on_hangup(&mut self, ctx: &mut ActorContext<Self>) {
		self.reply.set_error(Error::Hangup);
		ctx.stop();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	};

	use super::RequestActor;
	use crate::{tests::run_until_finished, Error, Promise, Result, Runtime};

	#[test]
	fn test_request_actor_replies_after_exhausting_retries() {
		let runtime = Runtime::new(0, 0);
		let attempts = Arc::new(AtomicUsize::new(0));
		let replies: Arc<Mutex<Vec<Result<u32>>>> = Arc::new(Mutex::new(Vec::new()));
		{
			let mut guard = runtime.main_guard().unwrap();
			let attempts_clone = attempts.clone();
			let replies_clone = replies.clone();
			let stopper = guard.create_actor("finisher", crate::tests::FinishOnEvent).release();
			let reply = Promise::from_fn(move |result: Result<u32>| {
				replies_clone.lock().unwrap().push(result);
				stopper.send_event(0);
			});
			let do_run = move |promise: Promise<u32>| {
				attempts_clone.fetch_add(1, Ordering::SeqCst);
				// never resolves: the promise is dropped right here
				drop(promise);
			};
			guard.create_actor("request", RequestActor::new(do_run, reply)).release();
		}
		run_until_finished(&runtime);
		assert_eq!(attempts.load(Ordering::SeqCst), 2);
		let replies = replies.lock().unwrap();
		assert_eq!(replies.len(), 1);
		assert_eq!(replies[0], Err(Error::msg("Requested data is inaccessible")));
	}

	#[test]
	fn test_request_actor_replies_with_the_value() {
		let runtime = Runtime::new(0, 0);
		let replies: Arc<Mutex<Vec<Result<u32>>>> = Arc::new(Mutex::new(Vec::new()));
		{
			let mut guard = runtime.main_guard().unwrap();
			let replies_clone = replies.clone();
			let stopper = guard.create_actor("finisher", crate::tests::FinishOnEvent).release();
			let reply = Promise::from_fn(move |result: Result<u32>| {
				replies_clone.lock().unwrap().push(result);
				stopper.send_event(0);
			});
			let do_run = move |mut promise: Promise<u32>| {
				promise.set_value(217);
			};
			guard.create_actor("request", RequestActor::new(do_run, reply)).release();
		}
		run_until_finished(&runtime);
		assert_eq!(replies.lock().unwrap().as_slice(), &[Ok(217)]);
	}
}
