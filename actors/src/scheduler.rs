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
	any::Any,
	collections::{HashMap, VecDeque},
	sync::Arc,
	time::Duration,
};

use common::{new_quid, TerimateSignal, Timestamp};
use tracing::{debug, info};

use crate::{
	actor_context::ActorContext,
	actor_state::ActorState,
	handle::{ActorId, ActorLink, ActorOwn, ActorUid},
	timeout::TimeoutQueue,
	Actor, Event, MAILBOX_BATCH,
};

/// Control messages of a scheduler's cross-thread inbox.
///
/// Actor events themselves go straight into the target mailbox; the
/// inbox only carries the bookkeeping that must reach the home
/// scheduler thread.
pub(crate) enum CoreMessage {
	/// A freshly created actor cell to adopt.
	Register(Box<dyn AnyCell>),
	/// The mailbox of a hosted actor went from empty to non-empty.
	Ready(ActorUid),
	/// Global termination was requested.
	Finish,
}

/// Cheap cloneable handle addressing one scheduler from any thread.
#[derive(Clone)]
pub(crate) struct SchedulerClient {
	index: usize,
	tx: flume::Sender<CoreMessage>,
}

impl SchedulerClient {
	pub(crate) fn new(index: usize, tx: flume::Sender<CoreMessage>) -> SchedulerClient {
		SchedulerClient { index, tx }
	}

	pub(crate) fn index(&self) -> usize {
		self.index
	}

	/// Wakes the scheduler for a mailbox that just became non-empty.
	/// A send can only fail once the scheduler exited, and events posted
	/// after the finish are dropped by contract.
	pub(crate) fn notify_ready(&self, uid: ActorUid) {
		let _ = self.tx.send(CoreMessage::Ready(uid));
	}

	pub(crate) fn register(&self, cell: Box<dyn AnyCell>) {
		let _ = self.tx.send(CoreMessage::Register(cell));
	}

	pub(crate) fn finish(&self) {
		let _ = self.tx.send(CoreMessage::Finish);
	}
}

/// Type-erased actor cell: the body plus the consumer side of its
/// mailbox, owned by the home scheduler.
pub(crate) trait AnyCell: Send + 'static {
	fn uid(&self) -> ActorUid;
	fn state(&self) -> ActorState;
	fn mailbox_is_empty(&self) -> bool;
	/// Posts a `Timeout` event stamped with the current generation.
	fn deliver_timeout(&self);
	/// Drains the mailbox to completion, dispatching hooks.
	fn process(&mut self, host: &mut SchedulerHost) -> CellState;
	/// Requests the close and runs `on_close` immediately.
	fn close(&mut self, host: &mut SchedulerHost);
	fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) enum CellState {
	Alive,
	Closed,
}

pub(crate) struct ActorCell<A: Actor> {
	actor: Option<A>,
	link: Arc<ActorLink<A>>,
}

impl<A: Actor> ActorCell<A> {
	pub(crate) fn new(actor: A, link: Arc<ActorLink<A>>) -> ActorCell<A> {
		ActorCell { actor: Some(actor), link }
	}

	fn dispatch(&mut self, event: Event<A>, host: &mut SchedulerHost) {
		let Some(actor) = self.actor.as_mut() else {
			return;
		};
		let mut ctx = ActorContext::new(&self.link, host);
		match event {
			Event::Start => {
				self.link.info.mark_started();
				actor.on_start(&mut ctx);
			},
			Event::Stop => {
				self.link.info.request_close();
			},
			Event::Hangup => actor.on_hangup(&mut ctx),
			Event::SharedHangup(token) => actor.on_shared_hangup(&mut ctx, token),
			Event::Timeout { generation } => {
				// a later re-arm or cancel makes this delivery stale
				if generation == self.link.info.timeout_generation() {
					actor.on_timeout(&mut ctx);
				}
			},
			Event::Raw(tag) => actor.on_event(&mut ctx, tag),
			Event::Closure(f) => f(actor, &mut ctx),
			Event::Custom(handler) => handler.handle(actor, &mut ctx),
		}
	}

	fn finish_close(&mut self, host: &mut SchedulerHost) {
		if let Some(actor) = self.actor.as_mut() {
			let mut ctx = ActorContext::new(&self.link, host);
			actor.on_close(&mut ctx);
		}
		self.actor = None;
		self.link.info.mark_closed();
		self.link.mailbox.clear();
		host.wheel.cancel(self.link.info.uid());
		debug!(actor = %self.link.info.name(), "actor-closed");
	}

	/// Runs `f` against the actor body if it is still around. The safe
	/// same-scheduler borrow behind `with_local`.
	pub(crate) fn with_actor<R>(
		&mut self,
		host: &mut SchedulerHost,
		f: impl for<'a> FnOnce(&mut A, &mut ActorContext<'a, A>) -> R,
	) -> Option<R> {
		let actor = self.actor.as_mut()?;
		let mut ctx = ActorContext::new(&self.link, host);
		Some(f(actor, &mut ctx))
	}
}

impl<A: Actor> AnyCell for ActorCell<A> {
	fn uid(&self) -> ActorUid {
		self.link.info.uid()
	}

	fn state(&self) -> ActorState {
		self.link.info.state()
	}

	fn mailbox_is_empty(&self) -> bool {
		self.link.mailbox.is_empty()
	}

	fn deliver_timeout(&self) {
		let generation = self.link.info.timeout_generation();
		self.link.enqueue(Event::Timeout { generation });
	}

	fn process(&mut self, host: &mut SchedulerHost) -> CellState {
		let mut batch: Vec<Event<A>> = Vec::new();
		loop {
			self.link.mailbox.drain(*MAILBOX_BATCH, &mut batch);
			if batch.is_empty() {
				return CellState::Alive;
			}
			for event in batch.drain(..) {
				self.dispatch(event, host);
				if !self.link.info.state().is_alive() {
					// cancellation takes effect at the hook boundary;
					// the rest of the batch is dropped
					self.finish_close(host);
					return CellState::Closed;
				}
			}
		}
	}

	fn close(&mut self, host: &mut SchedulerHost) {
		self.link.info.request_close();
		self.finish_close(host);
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}
}

/// The scheduler-local state reachable from hooks through the context:
/// the timeout wheel, the home set and the sibling scheduler clients.
pub(crate) struct SchedulerHost {
	pub(crate) index: usize,
	pub(crate) wheel: TimeoutQueue<ActorUid>,
	pub(crate) cells: HashMap<ActorUid, Box<dyn AnyCell>>,
	pub(crate) clients: Arc<Vec<SchedulerClient>>,
	pub(crate) terminate: TerimateSignal,
}

impl SchedulerHost {
	pub(crate) fn create_actor_on_scheduler<A: Actor>(
		&mut self,
		index: usize,
		name: &str,
		actor: A,
	) -> ActorOwn<A> {
		assert!(
			index < self.clients.len(),
			"scheduler index {index} out of range (count: {})",
			self.clients.len()
		);
		let client = self.clients[index].clone();
		let link = ActorLink::new(new_quid(name), client);
		debug!(actor = %link.info.name(), scheduler = index, "spawn-actor");
		let own = ActorOwn::new(link.clone());
		link.enqueue(Event::Start);
		let cell: Box<dyn AnyCell> = Box::new(ActorCell::new(actor, link));
		if index == self.index {
			self.cells.insert(cell.uid(), cell);
		} else {
			self.clients[index].register(cell);
		}
		own
	}

	/// Borrows another actor hosted on this scheduler, synchronously.
	///
	/// Only legal while that actor is not executing, which holds by
	/// construction: the running actor's cell is taken out of the home
	/// set for the duration of its turn. Returns `None` for actors of
	/// other schedulers, closed actors, or the caller itself.
	pub(crate) fn with_actor<B: Actor, R>(
		&mut self,
		id: &ActorId<B>,
		f: impl for<'a> FnOnce(&mut B, &mut ActorContext<'a, B>) -> R,
	) -> Option<R> {
		if id.scheduler_index() != self.index {
			return None;
		}
		let uid = id.uid();
		let mut cell_box = self.cells.remove(&uid)?;
		let result = match cell_box.as_any_mut().downcast_mut::<ActorCell<B>>() {
			Some(cell) => cell.with_actor(self, f),
			None => None,
		};
		match cell_box.state() {
			state if state.is_alive() => {
				self.cells.insert(uid, cell_box);
			},
			ActorState::Closing => cell_box.close(self),
			_ => {},
		}
		result
	}
}

/// One cooperative event loop, bound to one OS thread.
pub(crate) struct SchedulerCore {
	rx: flume::Receiver<CoreMessage>,
	host: SchedulerHost,
	ready: VecDeque<ActorUid>,
	expired: Vec<ActorUid>,
	finished: bool,
}

impl SchedulerCore {
	pub(crate) fn new(
		index: usize,
		rx: flume::Receiver<CoreMessage>,
		clients: Arc<Vec<SchedulerClient>>,
		terminate: TerimateSignal,
	) -> SchedulerCore {
		SchedulerCore {
			rx,
			host: SchedulerHost { index, wheel: TimeoutQueue::new(), cells: HashMap::new(), clients, terminate },
			ready: VecDeque::new(),
			expired: Vec::new(),
			finished: false,
		}
	}

	pub(crate) fn index(&self) -> usize {
		self.host.index
	}

	pub(crate) fn host_mut(&mut self) -> &mut SchedulerHost {
		&mut self.host
	}

	/// Thread main of a non-main scheduler.
	pub(crate) fn run_worker(&mut self) {
		while !self.finished {
			self.tick(None);
		}
	}

	/// Advances this scheduler for at most `max_wait`. Returns true iff
	/// a subsequent call is expected to make progress.
	pub(crate) fn run_once(&mut self, max_wait: Duration) -> bool {
		let budget = Timestamp::from_now(max_wait);
		loop {
			self.tick(Some(budget));
			if self.finished || budget.is_due() {
				break;
			}
		}
		!self.finished
	}

	/// Guard entry: adopt pending registrations, then borrow the actor.
	pub(crate) fn with_actor<B: Actor, R>(
		&mut self,
		id: &ActorId<B>,
		f: impl for<'a> FnOnce(&mut B, &mut ActorContext<'a, B>) -> R,
	) -> Option<R> {
		self.drain_inbox();
		self.host.with_actor(id, f)
	}

	/// One pass of the main loop: fire due timeouts, move inbox entries,
	/// drain every ready mailbox, then sleep until the next deadline, an
	/// external wake, or the caller's budget.
	fn tick(&mut self, budget: Option<Timestamp>) {
		if self.host.terminate.is_dead() {
			self.shutdown();
			return;
		}
		self.fire_due_timeouts(Timestamp::now());
		self.drain_inbox();
		while let Some(uid) = self.ready.pop_front() {
			self.process_actor(uid);
			self.drain_inbox();
			if self.host.terminate.is_dead() {
				self.shutdown();
				return;
			}
		}
		let wheel_deadline = self.host.wheel.next_deadline();
		let wait = match (wheel_deadline, budget) {
			(Some(wheel), Some(budget)) => Some(wheel.min(budget).remaining()),
			(Some(wheel), None) => Some(wheel.remaining()),
			(None, Some(budget)) => Some(budget.remaining()),
			(None, None) => None,
		};
		match wait {
			Some(wait) => match self.rx.recv_timeout(wait) {
				Ok(message) => self.handle_message(message),
				Err(flume::RecvTimeoutError::Timeout) => {},
				Err(flume::RecvTimeoutError::Disconnected) => self.host.terminate.kill(),
			},
			None => match self.rx.recv() {
				Ok(message) => self.handle_message(message),
				Err(flume::RecvError::Disconnected) => self.host.terminate.kill(),
			},
		}
	}

	fn fire_due_timeouts(&mut self, now: Timestamp) {
		self.expired.clear();
		self.host.wheel.pop_due(now, &mut self.expired);
		for &uid in &self.expired {
			if let Some(cell) = self.host.cells.get(&uid) {
				cell.deliver_timeout();
			}
		}
	}

	fn drain_inbox(&mut self) {
		while let Ok(message) = self.rx.try_recv() {
			self.handle_message(message);
		}
	}

	fn handle_message(&mut self, message: CoreMessage) {
		match message {
			CoreMessage::Register(cell) => {
				let uid = cell.uid();
				// the ready notification may have arrived first and been
				// dropped; re-derive it from the mailbox
				let has_pending = !cell.mailbox_is_empty();
				self.host.cells.insert(uid, cell);
				if has_pending {
					self.ready.push_back(uid);
				}
			},
			CoreMessage::Ready(uid) => self.ready.push_back(uid),
			CoreMessage::Finish => self.host.terminate.kill(),
		}
	}

	fn process_actor(&mut self, uid: ActorUid) {
		let Some(mut cell) = self.host.cells.remove(&uid) else {
			return;
		};
		match cell.process(&mut self.host) {
			CellState::Alive => {
				self.host.cells.insert(uid, cell);
			},
			CellState::Closed => {},
		}
	}

	/// Delivers the in-flight work, closes every hosted actor and exits.
	/// Events posted from here on are dropped.
	fn shutdown(&mut self) {
		if self.finished {
			return;
		}
		self.drain_inbox();
		while let Some(uid) = self.ready.pop_front() {
			self.process_actor(uid);
			self.drain_inbox();
		}
		let uids: Vec<ActorUid> = self.host.cells.keys().copied().collect();
		for uid in uids {
			if let Some(mut cell) = self.host.cells.remove(&uid) {
				cell.close(&mut self.host);
			}
		}
		self.finished = true;
		info!(scheduler = self.host.index, "scheduler-finished");
	}
}
