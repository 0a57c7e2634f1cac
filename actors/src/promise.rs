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

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use parking_lot::Mutex;

use crate::{Actor, ActorId, Error, Result};

/// The single-shot writable endpoint of a result channel.
///
/// A promise resolves exactly once: later `set_value`/`set_error` calls
/// are silent no-ops, and dropping an unresolved promise resolves it
/// with [`Error::LostPromise`] so the consumer side never waits forever.
pub struct Promise<T = ()> {
	resolver: Option<Box<dyn Resolver<T>>>,
}

trait Resolver<T>: Send {
	fn resolve(self: Box<Self>, result: Result<T>);

	fn is_cancellable(&self) -> bool {
		false
	}

	fn is_canceled(&self) -> bool {
		false
	}
}

impl<T> Default for Promise<T> {
	/// An already-detached promise: resolutions go nowhere.
	fn default() -> Self {
		Promise { resolver: None }
	}
}

impl<T: Send + 'static> Promise<T> {
	/// A lambda promise: `f` is invoked on the resolving thread, not on
	/// any actor. Ordering guarantees degrade accordingly.
	pub fn from_fn(f: impl FnOnce(Result<T>) + Send + 'static) -> Promise<T> {
		Promise { resolver: Some(Box::new(FnResolver(f))) }
	}

	/// Like [`Promise::from_fn`], carrying a cancellation token the
	/// producer may inspect through [`Promise::is_canceled`] to resolve
	/// early with [`Error::Canceled`].
	pub fn cancellable_from_fn(
		token: CancellationToken,
		f: impl FnOnce(Result<T>) + Send + 'static,
	) -> Promise<T> {
		Promise { resolver: Some(Box::new(CancellableResolver { token, f: FnResolver(f) })) }
	}

	pub fn set_value(&mut self, value: T) {
		self.set_result(Ok(value));
	}

	pub fn set_error(&mut self, error: Error) {
		self.set_result(Err(error));
	}

	pub fn set_result(&mut self, result: Result<T>) {
		if let Some(resolver) = self.resolver.take() {
			resolver.resolve(result);
		}
	}

	/// Detaches without resolving; the consumer observes a lost promise
	/// only if nobody else resolves the underlying slot.
	pub fn reset(&mut self) {
		self.resolver = None;
	}

	pub fn is_pending(&self) -> bool {
		self.resolver.is_some()
	}

	pub fn is_cancellable(&self) -> bool {
		self.resolver.as_ref().is_some_and(|resolver| resolver.is_cancellable())
	}

	pub fn is_canceled(&self) -> bool {
		self.resolver.as_ref().is_some_and(|resolver| resolver.is_canceled())
	}
}

impl Promise<()> {
	/// Resolves every child as soon as this promise resolves; an error
	/// is cloned into each child.
	pub fn join(promises: Vec<Promise<()>>) -> Promise<()> {
		Promise { resolver: Some(Box::new(JoinResolver { promises })) }
	}
}

impl<T> Drop for Promise<T> {
	fn drop(&mut self) {
		if let Some(resolver) = self.resolver.take() {
			resolver.resolve(Err(Error::LostPromise));
		}
	}
}

struct FnResolver<F>(F);

impl<T, F> Resolver<T> for FnResolver<F>
where
	F: FnOnce(Result<T>) + Send,
{
	fn resolve(self: Box<Self>, result: Result<T>) {
		(self.0)(result);
	}
}

struct CancellableResolver<F> {
	token: CancellationToken,
	f: FnResolver<F>,
}

impl<T, F> Resolver<T> for CancellableResolver<F>
where
	F: FnOnce(Result<T>) + Send,
{
	fn resolve(self: Box<Self>, result: Result<T>) {
		Box::new(self.f).resolve(result);
	}

	fn is_cancellable(&self) -> bool {
		true
	}

	fn is_canceled(&self) -> bool {
		self.token.is_canceled()
	}
}

struct JoinResolver {
	promises: Vec<Promise<()>>,
}

impl Resolver<()> for JoinResolver {
	fn resolve(mut self: Box<Self>, result: Result<()>) {
		match result {
			Ok(()) => set_promises(&mut self.promises),
			Err(error) => fail_promises(&mut self.promises, error),
		}
	}
}

/// Guarantees that `promise` resolves with `result` unless it was
/// explicitly resolved first.
pub fn safe_promise<T: Send + 'static>(promise: Promise<T>, result: Result<T>) -> Promise<T> {
	Promise { resolver: Some(Box::new(SafeResolver { promise: Some(promise), fallback: Some(result) })) }
}

struct SafeResolver<T> {
	promise: Option<Promise<T>>,
	fallback: Option<Result<T>>,
}

impl<T: Send + 'static> Resolver<T> for SafeResolver<T> {
	fn resolve(mut self: Box<Self>, result: Result<T>) {
		let Some(mut promise) = self.promise.take() else {
			return;
		};
		// dropping the wrapper arrives here as the lost-promise
		// sentinel; that is exactly when the guaranteed result applies
		let result = match result {
			Err(Error::LostPromise) =>
				self.fallback.take().unwrap_or_else(|| Err(Error::LostPromise)),
			other => other,
		};
		promise.set_result(result);
	}
}

impl<T> Drop for SafeResolver<T> {
	fn drop(&mut self) {
		if let (Some(promise), Some(fallback)) = (self.promise.as_mut(), self.fallback.take()) {
			// no `T: Send` bound in a Drop impl; go through the resolver
			if let Some(resolver) = promise.resolver.take() {
				resolver.resolve(fallback);
			}
		}
	}
}

/// Resolves each promise with `Ok(())`, leaving the vector empty.
pub fn set_promises(promises: &mut Vec<Promise<()>>) {
	for mut promise in promises.drain(..) {
		promise.set_value(());
	}
}

/// Fails each promise with a clone of `error`, leaving the vector empty.
pub fn fail_promises<T: Send + 'static>(promises: &mut Vec<Promise<T>>, error: Error) {
	for mut promise in promises.drain(..) {
		promise.set_error(error.clone());
	}
}

/// A flag a producer may poll to abandon work whose consumer lost
/// interest. Clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancellationToken {
	canceled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> CancellationToken {
		CancellationToken::default()
	}

	pub fn cancel(&self) {
		self.canceled.store(true, Ordering::SeqCst);
	}

	pub fn is_canceled(&self) -> bool {
		self.canceled.load(Ordering::SeqCst)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FutureState {
	Waiting,
	Ready,
	Taken,
}

/// The single-shot readable endpoint paired with a promise.
///
/// Arming it with `set_event` makes the resolution post `Raw(tag)` to
/// the given actor, which then picks the result up inside `on_event`.
/// State transitions are monotone: `Waiting` → `Ready` → `Taken`.
pub struct Future<T> {
	slot: Arc<Slot<T>>,
}

struct Slot<T> {
	state: Mutex<SlotState<T>>,
}

enum SlotState<T> {
	Waiting { on_ready: Option<Box<dyn FnOnce() + Send>> },
	Ready(Result<T>),
	Taken,
}

/// Creates a paired one-shot channel.
pub fn promise_future<T: Send + 'static>() -> (Promise<T>, Future<T>) {
	let slot = Arc::new(Slot { state: Mutex::new(SlotState::Waiting { on_ready: None }) });
	let promise = Promise { resolver: Some(Box::new(SlotResolver { slot: slot.clone() })) };
	(promise, Future { slot })
}

struct SlotResolver<T> {
	slot: Arc<Slot<T>>,
}

impl<T: Send> Resolver<T> for SlotResolver<T> {
	fn resolve(self: Box<Self>, result: Result<T>) {
		let mut state = self.slot.state.lock();
		let on_ready = match &mut *state {
			SlotState::Waiting { on_ready } => on_ready.take(),
			// the future was closed; the result is dropped
			_ => return,
		};
		*state = SlotState::Ready(result);
		drop(state);
		if let Some(notify) = on_ready {
			notify();
		}
	}
}

impl<T: Send + 'static> Future<T> {
	pub fn state(&self) -> FutureState {
		match &*self.slot.state.lock() {
			SlotState::Waiting { .. } => FutureState::Waiting,
			SlotState::Ready(_) => FutureState::Ready,
			SlotState::Taken => FutureState::Taken,
		}
	}

	pub fn is_ready(&self) -> bool {
		self.state() == FutureState::Ready
	}

	pub fn is_error(&self) -> bool {
		matches!(&*self.slot.state.lock(), SlotState::Ready(Err(_)))
	}

	/// Arms delivery: once the promise resolves, `Raw(tag)` is posted to
	/// `actor_id` (from whatever thread resolved it). If the result is
	/// already there, the event is posted immediately.
	pub fn set_event<A: Actor>(&mut self, actor_id: ActorId<A>, tag: u64) {
		let mut state = self.slot.state.lock();
		let already_ready = match &mut *state {
			SlotState::Waiting { on_ready } => {
				let armed_id = actor_id.clone();
				*on_ready = Some(Box::new(move || armed_id.send_event(tag)));
				false
			},
			SlotState::Ready(_) => true,
			SlotState::Taken => false,
		};
		drop(state);
		if already_ready {
			actor_id.send_event(tag);
		}
	}

	/// Takes the result. Panics if the future is not `Ready`; calling
	/// this out of turn is a programming error.
	pub fn move_as_result(&mut self) -> Result<T> {
		let mut state = self.slot.state.lock();
		match std::mem::replace(&mut *state, SlotState::Taken) {
			SlotState::Ready(result) => result,
			other => {
				*state = other;
				panic!("move_as_result called on a future that is not ready");
			},
		}
	}

	/// Takes the value. Panics on an error resolution.
	pub fn move_as_ok(&mut self) -> T {
		match self.move_as_result() {
			Ok(value) => value,
			Err(error) => panic!("move_as_ok called on a future resolved with `{error}`"),
		}
	}

	/// Detaches the future; a late resolution is silently dropped.
	pub fn close(&mut self) {
		*self.slot.state.lock() = SlotState::Taken;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	};

	use super::*;

	#[test]
	fn test_promise_resolves_exactly_once() {
		let hits = Arc::new(AtomicUsize::new(0));
		let hits_clone = hits.clone();
		let mut promise = Promise::from_fn(move |result: Result<u64>| {
			assert_eq!(result, Ok(42));
			hits_clone.fetch_add(1, Ordering::SeqCst);
		});
		assert!(promise.is_pending());
		promise.set_value(42);
		assert!(!promise.is_pending());
		promise.set_value(43);
		promise.set_error(Error::msg("late"));
		drop(promise);
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_dropped_promise_is_lost() {
		let seen = Arc::new(Mutex::new(None));
		let seen_clone = seen.clone();
		let promise = Promise::from_fn(move |result: Result<()>| {
			*seen_clone.lock().unwrap() = Some(result);
		});
		drop(promise);
		assert_eq!(*seen.lock().unwrap(), Some(Err(Error::LostPromise)));
	}

	#[test]
	fn test_future_holds_result_after_resolution() {
		let (mut promise, mut future) = promise_future::<String>();
		assert_eq!(future.state(), FutureState::Waiting);
		promise.set_value("done".to_string());
		assert_eq!(future.state(), FutureState::Ready);
		assert!(!future.is_error());
		assert_eq!(future.move_as_ok(), "done");
		assert_eq!(future.state(), FutureState::Taken);
	}

	#[test]
	fn test_future_observes_lost_promise() {
		let (promise, mut future) = promise_future::<()>();
		drop(promise);
		assert!(future.is_ready());
		assert!(future.is_error());
		assert_eq!(future.move_as_result(), Err(Error::LostPromise));
	}

	#[test]
	fn test_closed_future_drops_late_resolution() {
		let (mut promise, mut future) = promise_future::<u32>();
		future.close();
		promise.set_value(1);
		assert_eq!(future.state(), FutureState::Taken);
	}

	#[test]
	fn test_join_fans_out_errors() {
		let results = Arc::new(Mutex::new(Vec::new()));
		let children: Vec<Promise<()>> = (0..3)
			.map(|_| {
				let results = results.clone();
				Promise::from_fn(move |result: Result<()>| {
					results.lock().unwrap().push(result);
				})
			})
			.collect();
		let mut joined = Promise::join(children);
		joined.set_error(Error::msg("boom"));
		let results = results.lock().unwrap();
		assert_eq!(results.len(), 3);
		assert!(results.iter().all(|result| result == &Err(Error::msg("boom"))));
	}

	#[test]
	fn test_safe_promise_falls_back_on_drop() {
		let seen = Arc::new(Mutex::new(None));
		let seen_clone = seen.clone();
		let inner = Promise::from_fn(move |result: Result<u32>| {
			*seen_clone.lock().unwrap() = Some(result);
		});
		let safe = safe_promise(inner, Ok(7));
		drop(safe);
		assert_eq!(*seen.lock().unwrap(), Some(Ok(7)));

		let seen = Arc::new(Mutex::new(None));
		let seen_clone = seen.clone();
		let inner = Promise::from_fn(move |result: Result<u32>| {
			*seen_clone.lock().unwrap() = Some(result);
		});
		let mut safe = safe_promise(inner, Ok(7));
		safe.set_value(13);
		assert_eq!(*seen.lock().unwrap(), Some(Ok(13)));
	}

	#[test]
	fn test_cancellation_token_is_visible_through_the_promise() {
		let token = CancellationToken::new();
		let promise = Promise::cancellable_from_fn(token.clone(), |_result: Result<()>| {});
		assert!(promise.is_cancellable());
		assert!(!promise.is_canceled());
		token.cancel();
		assert!(promise.is_canceled());
		drop(promise);
	}

	#[test]
	fn test_set_and_fail_promises() {
		let oks = Arc::new(AtomicUsize::new(0));
		let errs = Arc::new(AtomicUsize::new(0));
		let make = |oks: Arc<AtomicUsize>, errs: Arc<AtomicUsize>| {
			Promise::from_fn(move |result: Result<()>| match result {
				Ok(()) => {
					oks.fetch_add(1, Ordering::SeqCst);
				},
				Err(_) => {
					errs.fetch_add(1, Ordering::SeqCst);
				},
			})
		};
		let mut promises = vec![
			make(oks.clone(), errs.clone()),
			make(oks.clone(), errs.clone()),
		];
		set_promises(&mut promises);
		assert!(promises.is_empty());
		assert_eq!(oks.load(Ordering::SeqCst), 2);

		let mut promises = vec![make(oks.clone(), errs.clone())];
		fail_promises(&mut promises, Error::Canceled);
		assert_eq!(errs.load(Ordering::SeqCst), 1);
	}
}
