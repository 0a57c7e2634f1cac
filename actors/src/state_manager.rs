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

use std::time::Duration;

use common::Timestamp;
use tracing::debug;

use crate::{
	promise::{fail_promises, set_promises},
	Actor, ActorContext, Error, Promise, SleepActor,
};

/// The kind of network the client currently sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetType {
	Other,
	WiFi,
	Mobile,
	MobileRoaming,
	None,
	Unknown,
}

/// Aggregated connection state, ordered from worst to best.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
	WaitingForNetwork,
	ConnectingToProxy,
	Connecting,
	Updating,
	Ready,
}

/// Observer of the aggregated inputs.
///
/// A callback returning `false` is removed from the list; registering a
/// one-shot observer is just returning `false` on the first delivery.
/// Invocation order matches registration order.
pub trait StateCallback: Send {
	fn on_state(&mut self, _state: ConnectionState) -> bool {
		true
	}

	fn on_network(&mut self, _network_type: NetType, _generation: u32) -> bool {
		true
	}

	fn on_online(&mut self, _is_online: bool) -> bool {
		true
	}

	fn on_logging_out(&mut self, _is_logging_out: bool) -> bool {
		true
	}
}

#[derive(Clone, Copy)]
enum Flag {
	Online,
	State,
	Network,
	LoggingOut,
}

/// Folds `{network, sync, proxy, connect counters}` into one
/// [`ConnectionState`], debounced with hysteresis: a transition to a
/// better state waits `UP_DELAY`, to a worse one `DOWN_DELAY`, measured
/// from the moment the pending state appeared. An `Unknown` network type
/// bypasses the debounce entirely.
pub struct StateManager {
	sync_flag: bool,
	network_flag: bool,
	network_type: NetType,
	network_generation: u32,
	online_flag: bool,
	use_proxy: bool,
	is_logging_out: bool,
	connect_cnt: usize,
	connect_proxy_cnt: usize,

	pending_state: Option<ConnectionState>,
	pending_timestamp: Option<Timestamp>,
	flush_state: Option<ConnectionState>,

	callbacks: Vec<Box<dyn StateCallback>>,

	was_sync: bool,
	wait_first_sync: Vec<Promise<()>>,
}

const UP_DELAY: Duration = Duration::from_millis(50);
const DOWN_DELAY: Duration = Duration::from_millis(300);

impl Default for StateManager {
	fn default() -> Self {
		StateManager::new()
	}
}

impl StateManager {
	pub fn new() -> StateManager {
		StateManager {
			sync_flag: true,
			network_flag: true,
			network_type: NetType::Unknown,
			network_generation: 1,
			online_flag: false,
			use_proxy: false,
			is_logging_out: false,
			connect_cnt: 0,
			connect_proxy_cnt: 0,
			pending_state: None,
			pending_timestamp: None,
			flush_state: None,
			callbacks: Vec::new(),
			was_sync: false,
			wait_first_sync: Vec::new(),
		}
	}

	pub fn on_synchronized(&mut self, ctx: &mut ActorContext<Self>, is_synchronized: bool) {
		if self.sync_flag != is_synchronized {
			self.sync_flag = is_synchronized;
			self.flush(ctx);
		}
		if self.sync_flag && !self.was_sync {
			self.was_sync = true;
			set_promises(&mut self.wait_first_sync);
		}
	}

	pub fn on_network_updated(&mut self, ctx: &mut ActorContext<Self>) {
		self.do_on_network(ctx, self.network_type, true);
	}

	pub fn on_network(&mut self, ctx: &mut ActorContext<Self>, new_network_type: NetType) {
		self.do_on_network(ctx, new_network_type, true);
	}

	fn do_on_network(
		&mut self,
		ctx: &mut ActorContext<Self>,
		new_network_type: NetType,
		inc_generation: bool,
	) {
		let new_network_flag = new_network_type != NetType::None;
		if self.network_flag != new_network_flag {
			self.network_flag = new_network_flag;
			self.flush(ctx);
		}
		self.network_type = new_network_type;
		if inc_generation {
			self.network_generation += 1;
		}
		self.notify(Flag::Network);
	}

	pub fn on_online(&mut self, is_online: bool) {
		self.online_flag = is_online;
		self.notify(Flag::Online);
	}

	pub fn on_proxy(&mut self, ctx: &mut ActorContext<Self>, use_proxy: bool) {
		self.use_proxy = use_proxy;
		self.on_network(ctx, self.network_type);
		self.flush(ctx);
	}

	pub fn on_logging_out(&mut self, is_logging_out: bool) {
		self.is_logging_out = is_logging_out;
		self.notify(Flag::LoggingOut);
	}

	pub fn inc_connect(&mut self, ctx: &mut ActorContext<Self>, to_proxy: bool) {
		let cnt = if to_proxy { &mut self.connect_proxy_cnt } else { &mut self.connect_cnt };
		*cnt += 1;
		if *cnt == 1 {
			self.flush(ctx);
		}
	}

	pub fn dec_connect(&mut self, ctx: &mut ActorContext<Self>, to_proxy: bool) {
		let cnt = if to_proxy { &mut self.connect_proxy_cnt } else { &mut self.connect_cnt };
		assert!(*cnt > 0);
		*cnt -= 1;
		if *cnt == 0 {
			self.flush(ctx);
		}
	}

	/// Registers a callback after replaying the current network, online
	/// and state values to it; it is dropped right away if any of those
	/// deliveries returns `false`.
	pub fn add_callback(&mut self, mut callback: Box<dyn StateCallback>) {
		if callback.on_network(self.network_type, self.network_generation)
			&& callback.on_online(self.online_flag)
			&& callback.on_state(self.real_state())
		{
			self.callbacks.push(callback);
		}
	}

	/// Resolves `promise` once the first `sync = true` is seen;
	/// immediately if it already was.
	pub fn wait_first_sync(&mut self, mut promise: Promise<()>) {
		if self.was_sync {
			return promise.set_value(());
		}
		self.wait_first_sync.push(promise);
	}

	pub fn close(&mut self, ctx: &mut ActorContext<Self>) {
		ctx.stop();
	}

	fn real_state(&self) -> ConnectionState {
		if !self.network_flag {
			return ConnectionState::WaitingForNetwork;
		}
		if self.connect_cnt == 0 {
			if self.use_proxy && self.connect_proxy_cnt == 0 {
				return ConnectionState::ConnectingToProxy;
			}
			return ConnectionState::Connecting;
		}
		if !self.sync_flag {
			return ConnectionState::Updating;
		}
		ConnectionState::Ready
	}

	fn notify(&mut self, flag: Flag) {
		let online_flag = self.online_flag;
		let flush_state = self.flush_state;
		let network_type = self.network_type;
		let network_generation = self.network_generation;
		let is_logging_out = self.is_logging_out;
		self.callbacks.retain_mut(|callback| match flag {
			Flag::Online => callback.on_online(online_flag),
			Flag::State => match flush_state {
				Some(state) => callback.on_state(state),
				None => true,
			},
			Flag::Network => callback.on_network(network_type, network_generation),
			Flag::LoggingOut => callback.on_logging_out(is_logging_out),
		});
	}

	fn on_network_soft(&mut self, ctx: &mut ActorContext<Self>) {
		if self.network_type == NetType::Unknown {
			debug!("auto-promoting the unknown network type to Other");
			self.do_on_network(ctx, NetType::Other, false);
		}
	}

	fn flush(&mut self, ctx: &mut ActorContext<Self>) {
		let now = Timestamp::now();
		let state = self.real_state();
		if self.pending_state != Some(state) {
			self.pending_state = Some(state);
			if self.pending_timestamp.is_none() {
				self.pending_timestamp = Some(now);
			}
		}
		if self.pending_state != self.flush_state {
			let mut delay = Duration::ZERO;
			if let (Some(pending), Some(flushed)) = (self.pending_state, self.flush_state) {
				delay = if pending > flushed { UP_DELAY } else { DOWN_DELAY };
				if self.network_type == NetType::Unknown {
					delay = Duration::ZERO;
				}
			}
			let pending_timestamp =
				self.pending_timestamp.expect("a pending state always carries a timestamp");
			let deadline = pending_timestamp + delay;
			if now >= deadline {
				self.pending_timestamp = None;
				self.flush_state = self.pending_state;
				self.notify(Flag::State);
			} else {
				ctx.set_timeout_at(deadline);
			}
		} else {
			self.pending_timestamp = None;
		}
	}
}

impl Actor for StateManager {
	fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
		// an Unknown network type is soft-promoted to Other after 1s
		let actor_id = ctx.actor_id();
		let promise = Promise::from_fn(move |_result| {
			actor_id.send_closure(|manager: &mut StateManager, ctx| {
				manager.on_network_soft(ctx);
			});
		});
		ctx.create_actor("net_type_soft", SleepActor::new(Duration::from_secs(1), promise))
			.release();
		self.flush(ctx);
	}

	fn on_timeout(&mut self, ctx: &mut ActorContext<Self>) {
		self.flush(ctx);
	}

	fn on_close(&mut self, _ctx: &mut ActorContext<Self>) {
		fail_promises(&mut self.wait_first_sync, Error::Hangup);
	}
}

#[cfg(test)]
mod tests {
	use std::{
		sync::{Arc, Mutex},
		time::{Duration, Instant},
	};

	use super::{ConnectionState, NetType, StateCallback, StateManager};
	use crate::{
		tests::run_until_finished, Actor, ActorContext, ActorId, Error, Promise, Result, Runtime,
	};

	struct RecordingCallback {
		states: Arc<Mutex<Vec<(ConnectionState, Instant)>>>,
	}

	impl StateCallback for RecordingCallback {
		fn on_state(&mut self, state: ConnectionState) -> bool {
			self.states.lock().unwrap().push((state, Instant::now()));
			true
		}
	}

	struct Driver {
		manager: Option<ActorId<StateManager>>,
		states: Arc<Mutex<Vec<(ConnectionState, Instant)>>>,
		network_flip_at: Arc<Mutex<Option<Instant>>>,
	}

	impl Actor for Driver {
		fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
			let manager = ctx.create_actor("state_manager", StateManager::new()).release();
			let states = self.states.clone();
			manager.send_closure(move |manager: &mut StateManager, ctx| {
				manager.on_synchronized(ctx, false);
				manager.on_network(ctx, NetType::None);
				manager.add_callback(Box::new(RecordingCallback { states }));
			});
			let network_flip_at = self.network_flip_at.clone();
			manager.send_closure(move |manager: &mut StateManager, ctx| {
				*network_flip_at.lock().unwrap() = Some(Instant::now());
				manager.on_network(ctx, NetType::Other);
			});
			self.manager = Some(manager);
			ctx.set_timeout_in(Duration::from_millis(300));
		}

		fn on_timeout(&mut self, ctx: &mut ActorContext<Self>) {
			ctx.finish();
		}
	}

	#[test]
	fn test_state_manager_debounces_the_up_transition() {
		let runtime = Runtime::new(0, 0);
		let states = Arc::new(Mutex::new(Vec::new()));
		let network_flip_at = Arc::new(Mutex::new(None));
		{
			let mut guard = runtime.main_guard().unwrap();
			guard
				.create_actor(
					"driver",
					Driver {
						manager: None,
						states: states.clone(),
						network_flip_at: network_flip_at.clone(),
					},
				)
				.release();
		}
		run_until_finished(&runtime);

		let states = states.lock().unwrap();
		let flip_at = network_flip_at.lock().unwrap().expect("the network was flipped");
		let reported: Vec<ConnectionState> = states.iter().map(|(state, _)| *state).collect();
		assert_eq!(
			reported,
			vec![ConnectionState::WaitingForNetwork, ConnectionState::Connecting]
		);
		// the up transition is held back by the hysteresis
		let (_, connecting_at) = states[1];
		assert!(connecting_at.duration_since(flip_at) >= Duration::from_millis(50));
	}

	struct SyncProbe {
		results: Arc<Mutex<Vec<Result<()>>>>,
	}

	impl Actor for SyncProbe {
		fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
			let manager = ctx.create_actor("state_manager", StateManager::new()).release();
			let early = self.results.clone();
			let late = self.results.clone();
			let driver_id = ctx.actor_id();
			manager.send_closure(move |manager: &mut StateManager, ctx| {
				manager.wait_first_sync(Promise::from_fn(move |result| {
					early.lock().unwrap().push(result);
				}));
				manager.on_synchronized(ctx, true);
				// already synchronized: resolves immediately
				manager.wait_first_sync(Promise::from_fn(move |result| {
					late.lock().unwrap().push(result);
					driver_id.send_event(0);
				}));
			});
		}

		fn on_event(&mut self, ctx: &mut ActorContext<Self>, _tag: u64) {
			ctx.finish();
		}
	}

	#[test]
	fn test_wait_first_sync() {
		let runtime = Runtime::new(0, 0);
		let results = Arc::new(Mutex::new(Vec::new()));
		{
			let mut guard = runtime.main_guard().unwrap();
			guard.create_actor("sync_probe", SyncProbe { results: results.clone() }).release();
		}
		run_until_finished(&runtime);
		assert_eq!(results.lock().unwrap().as_slice(), &[Ok(()), Ok(())]);
	}

	struct OneShot {
		deliveries: Arc<Mutex<Vec<bool>>>,
	}

	impl StateCallback for OneShot {
		fn on_online(&mut self, is_online: bool) -> bool {
			self.deliveries.lock().unwrap().push(is_online);
			// one-shot: drop after the first delivery
			false
		}
	}

	#[test]
	fn test_one_shot_callback_is_removed() {
		let mut manager = StateManager::new();
		let deliveries = Arc::new(Mutex::new(Vec::new()));
		// a callback refusing the replay is never registered
		manager.add_callback(Box::new(OneShot { deliveries: deliveries.clone() }));
		manager.on_online(true);
		manager.on_online(false);
		// only the replay delivery got through
		assert_eq!(deliveries.lock().unwrap().as_slice(), &[false]);
	}

	#[test]
	fn test_close_fails_first_sync_waiters() {
		let runtime = Runtime::new(0, 0);
		let results = Arc::new(Mutex::new(Vec::new()));
		{
			let mut guard = runtime.main_guard().unwrap();
			let manager = guard.create_actor("state_manager", StateManager::new());
			let results_clone = results.clone();
			let id = manager.actor_id();
			id.send_closure(move |manager: &mut StateManager, _ctx| {
				manager.wait_first_sync(Promise::from_fn(move |result| {
					results_clone.lock().unwrap().push(result);
				}));
			});
			id.send_closure(|manager: &mut StateManager, ctx| {
				manager.close(ctx);
				ctx.finish();
			});
			manager.release();
		}
		run_until_finished(&runtime);
		assert_eq!(results.lock().unwrap().as_slice(), &[Err(Error::Hangup)]);
	}
}
