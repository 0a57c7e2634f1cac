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

#![deny(clippy::disallowed_methods)]

//! actors is a cooperative multi-scheduler actor runtime.
//!
//! It solves the following problem:
//! - run many small state machines on a fixed set of OS threads.
//! - pass typed messages between them without locks in user code.
//! - tie object lifetime to ownership handles instead of garbage collection.
//! - integrate one-shot promises with the message pipeline.
//!
//! Each scheduler owns one OS thread and drives a cooperative event loop.
//! An actor is pinned to one scheduler for its whole life and processes
//! its mailbox strictly in FIFO order; a hook always runs to completion
//! before anything else touches the actor.

use std::num::NonZeroUsize;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::{info, warn};

mod actor;
mod actor_context;
mod actor_state;
mod condition;
mod delay_dispatcher;
mod event;
mod handle;
mod mailbox;
mod multi_promise;
mod multi_timeout;
mod promise;
mod query_merger;
mod request_actor;
mod runtime;
pub(crate) mod scheduler;
mod sleep_actor;
mod state_manager;
mod timeout;


pub use actor::Actor;
pub use actor_context::ActorContext;
pub use actor_state::ActorState;
pub use condition::Condition;
pub use delay_dispatcher::DelayDispatcher;
pub use event::{Event, EventHandler};
pub use handle::{ActorId, ActorOwn, ActorRef, ActorShared};
pub use multi_promise::MultiPromise;
pub use multi_timeout::{MultiTimeout, MultiTimeoutOps};
pub use promise::{
	fail_promises, promise_future, safe_promise, set_promises, CancellationToken, Future,
	FutureState, Promise,
};
pub use query_merger::QueryMerger;
pub use request_actor::RequestActor;
pub use runtime::{MainGuard, Runtime};
pub use sleep_actor::SleepActor;
pub use state_manager::{ConnectionState, NetType, StateCallback, StateManager};
pub use timeout::TimeoutQueue;

/// Number of events a scheduler pops from a mailbox in one batch.
///
/// A mailbox is still drained to completion within one turn; the batch
/// size only bounds how long the mailbox lock is held at a time.
pub static MAILBOX_BATCH: Lazy<usize> = Lazy::new(mailbox_batch_from_env_or_default);

/// Returns the mailbox drain batch size:
/// - Derived from `ACTORS_MAILBOX_BATCH` if set and valid.
/// - Defaults to 128 events.
fn mailbox_batch_from_env_or_default() -> usize {
	match std::env::var("ACTORS_MAILBOX_BATCH") {
		Ok(batch_str) => {
			if let Ok(batch) = batch_str.parse::<NonZeroUsize>() {
				info!("set the mailbox drain batch to {batch} events");
				return batch.get();
			} else {
				warn!(
					"failed to parse `ACTORS_MAILBOX_BATCH={batch_str}` as an integer > 0, using \
					 default batch (128)"
				);
			};
		},
		Err(std::env::VarError::NotUnicode(os_str)) => {
			warn!(
				"failed to parse `ACTORS_MAILBOX_BATCH={os_str:?}` as a valid unicode string, \
				 using default batch (128)"
			);
		},
		Err(std::env::VarError::NotPresent) => {},
	}
	128
}

/// Errors emitted by the runtime itself.
///
/// Everything else is a user-domain error and travels as `Error::Msg`
/// inside a [`Promise`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
	/// The cancellation token attached to a promise became active.
	#[error("canceled")]
	Canceled,
	/// A promise was dropped without being resolved.
	#[error("lost promise")]
	LostPromise,
	/// The peer went away: its owner handle was dropped or its scheduler
	/// is closing.
	#[error("hangup")]
	Hangup,
	/// The runtime already finished; no actors can be created or reached.
	#[error("already closed")]
	AlreadyClosed,
	#[error("{0}")]
	Msg(String),
}

impl Error {
	pub fn msg(msg: impl Into<String>) -> Error {
		Error::Msg(msg.into())
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
