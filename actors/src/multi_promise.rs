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

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Error, Promise, Result};

/// Composes many child promises into one completion.
///
/// `get_promise` hands out child promises; once every child resolved,
/// each promise registered through `add_promise` resolves with `Ok(())`
/// or with the first child error (suppressed when `ignore_errors` is
/// set). Output promises added after completion resolve immediately.
///
/// Hand out all children before the first one may resolve, or keep one
/// child as a guard until the fan-out is fully built; otherwise the
/// composition completes early.
#[derive(Clone, Default)]
pub struct MultiPromise {
	inner: Arc<Mutex<MultiPromiseState>>,
}

#[derive(Default)]
struct MultiPromiseState {
	outputs: Vec<Promise<()>>,
	pending_children: usize,
	total_children: usize,
	first_error: Option<Error>,
	ignore_errors: bool,
}

impl MultiPromiseState {
	fn completion(&self) -> Result<()> {
		if self.ignore_errors {
			return Ok(());
		}
		match &self.first_error {
			Some(error) => Err(error.clone()),
			None => Ok(()),
		}
	}
}

impl MultiPromise {
	pub fn new() -> MultiPromise {
		MultiPromise::default()
	}

	/// Errors reported by children are swallowed and the composition
	/// resolves `Ok(())` regardless.
	pub fn set_ignore_errors(&self, ignore_errors: bool) {
		self.inner.lock().ignore_errors = ignore_errors;
	}

	/// Number of child promises handed out so far.
	pub fn promise_count(&self) -> usize {
		self.inner.lock().total_children
	}

	/// A new child promise. The composition completes once every child
	/// handed out has resolved, whatever the thread it resolves from.
	pub fn get_promise(&self) -> Promise<()> {
		{
			let mut state = self.inner.lock();
			state.pending_children += 1;
			state.total_children += 1;
		}
		let inner = self.inner.clone();
		Promise::from_fn(move |result| {
			let mut state = inner.lock();
			state.pending_children -= 1;
			if let Err(error) = result {
				if state.first_error.is_none() {
					state.first_error = Some(error);
				}
			}
			if state.pending_children == 0 {
				let mut outputs = std::mem::take(&mut state.outputs);
				let completion = state.completion();
				drop(state);
				for output in &mut outputs {
					output.set_result(completion.clone());
				}
			}
		})
	}

	/// Registers an output promise. Resolves immediately if every child
	/// already resolved (or none was ever handed out).
	pub fn add_promise(&self, mut promise: Promise<()>) {
		let mut state = self.inner.lock();
		if state.pending_children == 0 {
			let completion = state.completion();
			drop(state);
			promise.set_result(completion);
			return;
		}
		state.outputs.push(promise);
	}
}
