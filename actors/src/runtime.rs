use std::{sync::Arc, thread, time::Duration};

use anyhow::Context;
use common::TerimateSignal;
use parking_lot::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::{
	actor_context::ActorContext,
	handle::{ActorId, ActorOwn},
	scheduler::{SchedulerClient, SchedulerCore},
	Actor, Error, Result,
};

/// The top-level context in which actors are spawned.
///
/// A runtime owns a fixed-size array of schedulers: the main scheduler
/// at index 0, driven by `run_main` on the caller's thread, plus
/// `extra_thread_count` schedulers each running on its own OS thread.
/// The count is immutable after construction.
///
/// It is *not* a singleton: unit tests all have their own runtime and
/// hence can be executed in parallel.
pub struct Runtime {
	terminate: TerimateSignal,
	clients: Arc<Vec<SchedulerClient>>,
	main: Mutex<SchedulerCore>,
	workers: Mutex<Vec<SchedulerCore>>,
	threads: Mutex<Vec<thread::JoinHandle<()>>>,
	extra_main_thread_count: usize,
}

impl Runtime {
	/// Creates a runtime with `1 + extra_thread_count` schedulers.
	///
	/// `extra_main_thread_count` is reserved for additional cooperative
	/// stacks on the main OS thread; it is accepted and recorded but
	/// spawns nothing.
	pub fn new(extra_thread_count: usize, extra_main_thread_count: usize) -> Runtime {
		let scheduler_count = 1 + extra_thread_count;
		let terminate = TerimateSignal::default();
		let mut clients = Vec::with_capacity(scheduler_count);
		let mut receivers = Vec::with_capacity(scheduler_count);
		for index in 0..scheduler_count {
			let (tx, rx) = flume::unbounded();
			clients.push(SchedulerClient::new(index, tx));
			receivers.push(rx);
		}
		let clients = Arc::new(clients);
		let mut cores: Vec<SchedulerCore> = receivers
			.into_iter()
			.enumerate()
			.map(|(index, rx)| {
				SchedulerCore::new(index, rx, clients.clone(), terminate.clone())
			})
			.collect();
		let main = cores.remove(0);
		Runtime {
			terminate,
			clients,
			main: Mutex::new(main),
			workers: Mutex::new(cores),
			threads: Mutex::new(Vec::new()),
			extra_main_thread_count,
		}
	}

	pub fn scheduler_count(&self) -> usize {
		self.clients.len()
	}

	pub fn extra_main_thread_count(&self) -> usize {
		self.extra_main_thread_count
	}

	/// Spawns one OS thread per non-main scheduler.
	pub fn start(&self) -> anyhow::Result<()> {
		let mut workers = self.workers.lock();
		let mut threads = self.threads.lock();
		for mut core in workers.drain(..) {
			let index = core.index();
			let handle = thread::Builder::new()
				.name(format!("actor-scheduler-{index}"))
				.spawn(move || core.run_worker())
				.with_context(|| format!("failed to spawn the thread of scheduler {index}"))?;
			threads.push(handle);
		}
		Ok(())
	}

	/// Advances the main scheduler by at most `max_wait`.
	///
	/// Returns true iff a subsequent call is expected to make progress,
	/// i.e. global termination was not requested yet.
	pub fn run_main(&self, max_wait: Duration) -> bool {
		self.main.lock().run_once(max_wait)
	}

	pub fn is_finished(&self) -> bool {
		self.terminate.is_dead()
	}

	/// Requests global termination, drains the main scheduler on the
	/// calling thread and joins the worker threads.
	///
	/// An actor requesting termination from inside a hook uses
	/// [`ActorContext::finish`] instead; `Runtime::finish` is the final
	/// call on the thread that drives `run_main`.
	pub fn finish(&self) {
		self.terminate.kill();
		for client in self.clients.iter() {
			client.finish();
		}
		{
			let mut main = self.main.lock();
			main.run_once(Duration::ZERO);
		}
		let mut threads = self.threads.lock();
		for handle in threads.drain(..) {
			if handle.join().is_err() {
				error!("a scheduler thread panicked during finish");
			}
		}
		info!("runtime-finished");
	}

	/// Scoped access to the main scheduler for non-actor code.
	///
	/// While the guard is held the calling thread is treated as if it
	/// were running on scheduler 0: it may create actors and borrow
	/// local ones. The main scheduler cannot advance until the guard is
	/// released. Do not acquire it from inside a hook.
	pub fn main_guard(&self) -> Result<MainGuard<'_>> {
		if self.terminate.is_dead() {
			return Err(Error::AlreadyClosed);
		}
		Ok(MainGuard { core: self.main.lock() })
	}
}

impl Drop for Runtime {
	fn drop(&mut self) {
		self.finish();
	}
}

/// See [`Runtime::main_guard`].
pub struct MainGuard<'a> {
	core: MutexGuard<'a, SchedulerCore>,
}

impl MainGuard<'_> {
	/// Creates an actor on the main scheduler.
	pub fn create_actor<A: Actor>(&mut self, name: &str, actor: A) -> ActorOwn<A> {
		self.core.host_mut().create_actor_on_scheduler(0, name, actor)
	}

	pub fn create_actor_on_scheduler<A: Actor>(
		&mut self,
		index: usize,
		name: &str,
		actor: A,
	) -> ActorOwn<A> {
		self.core.host_mut().create_actor_on_scheduler(index, name, actor)
	}

	/// Synchronously borrows an actor hosted on the main scheduler.
	pub fn with_local<A: Actor, R>(
		&mut self,
		id: &ActorId<A>,
		f: impl for<'b> FnOnce(&mut A, &mut ActorContext<'b, A>) -> R,
	) -> Option<R> {
		self.core.with_actor(id, f)
	}
}
