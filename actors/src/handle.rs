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
	fmt,
	sync::{
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
};

use crate::{
	actor_state::{ActorState, AtomicState},
	event::EventHandler,
	mailbox::Mailbox,
	scheduler::SchedulerClient,
	Actor, ActorContext, Event,
};

pub(crate) type ActorUid = u64;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Control block shared by every handle to one actor.
///
/// The block outlives the actor body: handles hold it through an `Arc`,
/// so it is reclaimed only when the last handle is gone. The counters
/// are the only cross-thread mutable state besides the mailbox.
pub(crate) struct ActorInfo {
	uid: ActorUid,
	name: String,
	sched_index: usize,
	state: AtomicState,
	has_owner: AtomicBool,
	shared_count: AtomicUsize,
	timeout_generation: AtomicU64,
}

impl ActorInfo {
	pub(crate) fn uid(&self) -> ActorUid {
		self.uid
	}

	pub(crate) fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn sched_index(&self) -> usize {
		self.sched_index
	}

	pub(crate) fn state(&self) -> ActorState {
		self.state.get_state()
	}

	pub(crate) fn mark_started(&self) {
		self.state.start();
	}

	pub(crate) fn request_close(&self) -> bool {
		self.state.request_close()
	}

	pub(crate) fn mark_closed(&self) {
		self.state.close();
	}

	pub(crate) fn timeout_generation(&self) -> u64 {
		self.timeout_generation.load(Ordering::Acquire)
	}

	pub(crate) fn bump_timeout_generation(&self) -> u64 {
		self.timeout_generation.fetch_add(1, Ordering::AcqRel) + 1
	}

	#[allow(dead_code)]
	pub(crate) fn has_owner(&self) -> bool {
		self.has_owner.load(Ordering::SeqCst)
	}

	#[allow(dead_code)]
	pub(crate) fn shared_count(&self) -> usize {
		self.shared_count.load(Ordering::SeqCst)
	}
}

/// Typed producer-side view of one actor: control block, mailbox and the
/// client of the home scheduler.
pub(crate) struct ActorLink<A: Actor> {
	pub(crate) info: ActorInfo,
	pub(crate) mailbox: Mailbox<A>,
	pub(crate) scheduler: SchedulerClient,
}

impl<A: Actor> ActorLink<A> {
	pub(crate) fn new(name: String, scheduler: SchedulerClient) -> Arc<Self> {
		Arc::new(ActorLink {
			info: ActorInfo {
				uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
				name,
				sched_index: scheduler.index(),
				state: AtomicState::default(),
				has_owner: AtomicBool::new(false),
				shared_count: AtomicUsize::new(0),
				timeout_generation: AtomicU64::new(0),
			},
			mailbox: Mailbox::new(),
			scheduler,
		})
	}

	/// Appends an event to the mailbox and wakes the home scheduler on
	/// the empty to non-empty transition.
	///
	/// Events posted to a `Closing` or `Closed` actor are dropped
	/// silently; `Stop` in particular is idempotent.
	pub(crate) fn enqueue(&self, event: Event<A>) {
		if !self.info.state().is_alive() {
			return;
		}
		if self.mailbox.enqueue(event) {
			self.scheduler.notify_ready(self.info.uid);
		}
	}
}

/// The exclusive owner of an actor. Move-only: at most one per actor.
///
/// Dropping it delivers `Hangup`, which stops the actor unless its
/// `on_hangup` decides otherwise; the close then runs `Hangup` → `Stop`
/// → `on_close` in that order.
pub struct ActorOwn<A: Actor> {
	link: Option<Arc<ActorLink<A>>>,
}

impl<A: Actor> ActorOwn<A> {
	pub(crate) fn new(link: Arc<ActorLink<A>>) -> ActorOwn<A> {
		link.info.has_owner.store(true, Ordering::SeqCst);
		ActorOwn { link: Some(link) }
	}

	fn link(&self) -> &Arc<ActorLink<A>> {
		self.link.as_ref().expect("an ActorOwn always holds its link until dropped or released")
	}

	pub fn actor_id(&self) -> ActorId<A> {
		ActorId { link: self.link().clone() }
	}

	/// Creates a lifetime-keeping handle tagged with `link_token`. The
	/// token is echoed in the `SharedHangup` event once the last clone
	/// of this share goes away.
	pub fn shared(&self, link_token: u64) -> ActorShared<A> {
		ActorShared::new(self.link().clone(), link_token)
	}

	/// Detaches the owner without stopping the actor; it keeps running
	/// until it stops itself or the runtime finishes.
	pub fn release(mut self) -> ActorId<A> {
		let link = self
			.link
			.take()
			.expect("an ActorOwn always holds its link until dropped or released");
		link.info.has_owner.store(false, Ordering::SeqCst);
		ActorId { link }
	}
}

impl<A: Actor> Drop for ActorOwn<A> {
	fn drop(&mut self) {
		if let Some(link) = self.link.take() {
			link.info.has_owner.store(false, Ordering::SeqCst);
			link.enqueue(Event::Hangup);
		}
	}
}

impl<A: Actor> fmt::Debug for ActorOwn<A> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_tuple("ActorOwn").field(&self.link().info.name()).finish()
	}
}

struct SharedGroup<A: Actor> {
	token: u64,
	link: Arc<ActorLink<A>>,
}

impl<A: Actor> Drop for SharedGroup<A> {
	fn drop(&mut self) {
		self.link.info.shared_count.fetch_sub(1, Ordering::SeqCst);
		self.link.enqueue(Event::SharedHangup(self.token));
	}
}

/// A non-owning but lifetime-keeping handle, clonable at will.
///
/// All clones of one `ActorShared` form a group carrying the link token
/// chosen at creation; the target receives `SharedHangup(token)` when
/// the last clone of the group is dropped. A manager handing a distinct
/// token to each worker can tell which of them went away.
pub struct ActorShared<A: Actor> {
	group: Arc<SharedGroup<A>>,
}

impl<A: Actor> ActorShared<A> {
	pub(crate) fn new(link: Arc<ActorLink<A>>, token: u64) -> ActorShared<A> {
		link.info.shared_count.fetch_add(1, Ordering::SeqCst);
		ActorShared { group: Arc::new(SharedGroup { token, link }) }
	}

	pub fn token(&self) -> u64 {
		self.group.token
	}

	pub fn actor_id(&self) -> ActorId<A> {
		ActorId { link: self.group.link.clone() }
	}
}

impl<A: Actor> Clone for ActorShared<A> {
	fn clone(&self) -> Self {
		ActorShared { group: self.group.clone() }
	}
}

/// A weak handle: holding it does not keep the actor alive.
///
/// Sends through an id targeting a `Closing`/`Closed` actor are dropped
/// silently; `upgrade` makes the liveness check explicit when the caller
/// cares.
pub struct ActorId<A: Actor> {
	link: Arc<ActorLink<A>>,
}

impl<A: Actor> Clone for ActorId<A> {
	fn clone(&self) -> Self {
		ActorId { link: self.link.clone() }
	}
}

impl<A: Actor> ActorId<A> {
	pub(crate) fn from_link(link: Arc<ActorLink<A>>) -> ActorId<A> {
		ActorId { link }
	}

	pub(crate) fn uid(&self) -> ActorUid {
		self.link.info.uid()
	}

	pub fn name(&self) -> &str {
		self.link.info.name()
	}

	pub fn state(&self) -> ActorState {
		self.link.info.state()
	}

	pub fn scheduler_index(&self) -> usize {
		self.link.info.sched_index()
	}

	/// Returns a send-capable reference while the actor still accepts
	/// events.
	pub fn upgrade(&self) -> Option<ActorRef<A>> {
		if self.link.info.state().is_alive() {
			Some(ActorRef { link: self.link.clone() })
		} else {
			None
		}
	}

	/// Posts a pre-built `Raw` payload. The fastest send: no allocation.
	pub fn send_event(&self, tag: u64) {
		self.link.enqueue(Event::Raw(tag));
	}

	/// Requests the target's stop after its pending events; duplicates
	/// and sends to an already closing actor are no-ops.
	pub fn send_stop(&self) {
		self.link.enqueue(Event::Stop);
	}

	/// Defers a closure onto the target's mailbox; it runs exclusively
	/// on the target's scheduler.
	pub fn send_closure<F>(&self, f: F)
	where
		F: for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) + Send + 'static,
	{
		self.link.enqueue(Event::Closure(Box::new(f)));
	}

	/// Identical to `send_closure`; the name survives from the days when
	/// local sends could run synchronously.
	pub fn send_closure_later<F>(&self, f: F)
	where
		F: for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) + Send + 'static,
	{
		self.send_closure(f);
	}

	/// Defers a plain lambda; it runs on the target's scheduler without
	/// touching the actor state.
	pub fn send_lambda<F>(&self, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.link.enqueue(Event::closure(move |_, _| f()));
	}

	pub fn send_custom(&self, handler: Box<dyn EventHandler<A>>) {
		self.link.enqueue(Event::Custom(handler));
	}
}

impl<A: Actor> fmt::Debug for ActorId<A> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_tuple("ActorId").field(&self.link.info.name()).finish()
	}
}

/// A send-capable reference obtained from [`ActorId::upgrade`].
pub struct ActorRef<A: Actor> {
	link: Arc<ActorLink<A>>,
}

impl<A: Actor> Clone for ActorRef<A> {
	fn clone(&self) -> Self {
		ActorRef { link: self.link.clone() }
	}
}

impl<A: Actor> ActorRef<A> {
	pub fn actor_id(&self) -> ActorId<A> {
		ActorId { link: self.link.clone() }
	}

	pub fn send_event(&self, tag: u64) {
		self.link.enqueue(Event::Raw(tag));
	}

	pub fn send_closure<F>(&self, f: F)
	where
		F: for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) + Send + 'static,
	{
		self.link.enqueue(Event::Closure(Box::new(f)));
	}

	pub fn send_closure_later<F>(&self, f: F)
	where
		F: for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) + Send + 'static,
	{
		self.send_closure(f);
	}

	pub fn send_custom(&self, handler: Box<dyn EventHandler<A>>) {
		self.link.enqueue(Event::Custom(handler));
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::{ActorLink, ActorOwn};
	use crate::{
		scheduler::{CoreMessage, SchedulerClient},
		Actor, ActorState,
	};

	struct Nop;

	impl Actor for Nop {}

	fn test_link() -> (Arc<ActorLink<Nop>>, flume::Receiver<CoreMessage>) {
		let (tx, rx) = flume::unbounded();
		(ActorLink::new("nop-test".to_string(), SchedulerClient::new(0, tx)), rx)
	}

	#[test]
	fn test_owner_flag_follows_the_own_handle() {
		let (link, _rx) = test_link();
		assert!(!link.info.has_owner());
		let own = ActorOwn::new(link.clone());
		assert!(link.info.has_owner());
		let id = own.release();
		assert!(!link.info.has_owner());
		// releasing does not close the actor
		assert_eq!(id.state(), ActorState::Created);
		assert!(id.upgrade().is_some());
	}

	#[test]
	fn test_dropping_the_owner_posts_a_hangup() {
		let (link, _rx) = test_link();
		let own = ActorOwn::new(link.clone());
		assert!(link.mailbox.is_empty());
		drop(own);
		assert!(!link.info.has_owner());
		assert_eq!(link.mailbox.len(), 1);
	}

	#[test]
	fn test_shared_count_tracks_groups_not_clones() {
		let (link, _rx) = test_link();
		let own = ActorOwn::new(link.clone());
		let first = own.shared(7);
		let second = own.shared(9);
		assert_eq!(link.info.shared_count(), 2);
		let first_clone = first.clone();
		assert_eq!(link.info.shared_count(), 2);
		drop(first);
		// a live clone keeps the group alive
		assert_eq!(link.info.shared_count(), 2);
		drop(first_clone);
		assert_eq!(link.info.shared_count(), 1);
		assert_eq!(second.token(), 9);
	}
}
