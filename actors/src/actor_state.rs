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

use std::sync::atomic::{AtomicU32, Ordering};

#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum ActorState {
	/// The actor is registered and its `Start` event is still pending.
	Created = 0,
	/// `on_start` ran; the actor processes events normally.
	Running = 1,
	/// A stop was requested; `on_close` runs at the next hook boundary.
	Closing = 2,
	/// The actor body was destroyed. The control block may outlive it
	/// while weak handles are around.
	Closed = 3,
}

impl From<u32> for ActorState {
	fn from(actor_state_u32: u32) -> Self {
		match actor_state_u32 {
			0 => ActorState::Created,
			1 => ActorState::Running,
			2 => ActorState::Closing,
			3 => ActorState::Closed,
			_ => {
				panic!(
					"Found forbidden u32 value for ActorState `{actor_state_u32}`. This should \
					 never happen."
				);
			},
		}
	}
}

impl From<ActorState> for AtomicState {
	fn from(state: ActorState) -> Self {
		AtomicState(AtomicU32::from(state as u32))
	}
}

impl ActorState {
	/// The actor accepts events: it is either waiting for its `Start`
	/// event or already running.
	pub fn is_alive(&self) -> bool {
		matches!(self, ActorState::Created | ActorState::Running)
	}

	pub fn is_closed(&self) -> bool {
		*self == ActorState::Closed
	}
}

/// Transitions go strictly forward; a closed actor never comes back.
pub(crate) struct AtomicState(AtomicU32);

impl Default for AtomicState {
	fn default() -> Self {
		AtomicState(AtomicU32::new(ActorState::Created as u32))
	}
}

impl AtomicState {
	pub(crate) fn start(&self) {
		let _ = self.0.compare_exchange(
			ActorState::Created as u32,
			ActorState::Running as u32,
			Ordering::SeqCst,
			Ordering::SeqCst,
		);
	}

	/// Requests the close. Returns true iff this call initiated it.
	pub(crate) fn request_close(&self) -> bool {
		self.0
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
				if ActorState::from(state).is_alive() {
					return Some(ActorState::Closing as u32);
				}
				None
			})
			.is_ok()
	}

	pub(crate) fn close(&self) {
		self.0.fetch_max(ActorState::Closed as u32, Ordering::Release);
	}

	pub fn get_state(&self) -> ActorState {
		ActorState::from(self.0.load(Ordering::Acquire))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	enum Operation {
		Start,
		RequestClose,
		Close,
	}

	impl Operation {
		fn apply(&self, state: &AtomicState) {
			match self {
				Operation::Start => state.start(),
				Operation::RequestClose => {
					state.request_close();
				},
				Operation::Close => state.close(),
			}
		}
	}

	#[track_caller]
	fn test_transition(from_state: ActorState, op: Operation, expected_state: ActorState) {
		let state = AtomicState::from(from_state);
		op.apply(&state);
		assert_eq!(state.get_state(), expected_state);
	}

	#[test]
	fn test_atomic_state_goes_forward_only() {
		test_transition(ActorState::Created, Operation::Start, ActorState::Running);
		test_transition(ActorState::Created, Operation::RequestClose, ActorState::Closing);
		test_transition(ActorState::Running, Operation::RequestClose, ActorState::Closing);
		test_transition(ActorState::Closing, Operation::Close, ActorState::Closed);

		test_transition(ActorState::Running, Operation::Start, ActorState::Running);
		test_transition(ActorState::Closing, Operation::Start, ActorState::Closing);
		test_transition(ActorState::Closing, Operation::RequestClose, ActorState::Closing);
		test_transition(ActorState::Closed, Operation::Start, ActorState::Closed);
		test_transition(ActorState::Closed, Operation::RequestClose, ActorState::Closed);
		test_transition(ActorState::Closed, Operation::Close, ActorState::Closed);
	}

	#[test]
	fn test_request_close_reports_initiation() {
		let state = AtomicState::default();
		assert!(state.request_close());
		assert!(!state.request_close());
		state.close();
		assert!(!state.request_close());
	}

	#[test]
	fn test_is_alive() {
		assert!(ActorState::Created.is_alive());
		assert!(ActorState::Running.is_alive());
		assert!(!ActorState::Closing.is_alive());
		assert!(!ActorState::Closed.is_alive());
		assert!(ActorState::Closed.is_closed());
	}
}
