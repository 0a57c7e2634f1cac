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

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::{
	promise::{fail_promises, set_promises},
	Actor, ActorContext, Promise, Result,
};

type MergeFunction =
	Box<dyn for<'a> FnMut(&mut ActorContext<'a, QueryMerger>, Vec<i64>, Promise<()>) + Send>;

/// Merges homogeneous queries into batched requests.
///
/// Concurrent queries for the same id attach to the same in-flight
/// request; distinct pending ids are popped into batches of at most
/// `max_merged_query_count`, with at most `max_concurrent_query_count`
/// merged requests outstanding. Every promise attached to an id resolves
/// with the result of the batch that carried it.
pub struct QueryMerger {
	query_count: usize,
	max_concurrent_query_count: usize,
	max_merged_query_count: usize,
	merge_function: Option<MergeFunction>,
	pending_queries: VecDeque<i64>,
	queries: HashMap<i64, Vec<Promise<()>>>,
}

impl QueryMerger {
	pub fn new(max_concurrent_query_count: usize, max_merged_query_count: usize) -> QueryMerger {
		assert!(max_concurrent_query_count > 0);
		assert!(max_merged_query_count > 0);
		QueryMerger {
			query_count: 0,
			max_concurrent_query_count,
			max_merged_query_count,
			merge_function: None,
			pending_queries: VecDeque::new(),
			queries: HashMap::new(),
		}
	}

	/// The pluggable merge call. It receives a batch of unique ids and a
	/// promise to resolve once the merged request completed.
	pub fn set_merge_function(
		&mut self,
		merge_function: impl for<'a> FnMut(&mut ActorContext<'a, QueryMerger>, Vec<i64>, Promise<()>)
			+ Send
			+ 'static,
	) {
		self.merge_function = Some(Box::new(merge_function));
	}

	pub fn add_query(
		&mut self,
		ctx: &mut ActorContext<Self>,
		query_id: i64,
		promise: Promise<()>,
		source: &str,
	) {
		debug!(query_id, source, "add-query");
		assert_ne!(query_id, 0);
		let query_promises = self.queries.entry(query_id).or_default();
		query_promises.push(promise);
		if query_promises.len() != 1 {
			// duplicate query, just wait
			return;
		}
		self.pending_queries.push_back(query_id);
		self.process_pending(ctx);
	}

	fn send_query(&mut self, ctx: &mut ActorContext<Self>, query_ids: Vec<i64>) {
		debug!(?query_ids, "send-query");
		self.query_count += 1;
		let actor_id = ctx.actor_id();
		let completed_ids = query_ids.clone();
		let promise = Promise::from_fn(move |result| {
			actor_id.send_closure(move |merger: &mut QueryMerger, ctx| {
				merger.on_query_result(ctx, completed_ids, result);
			});
		});
		let merge_function = self
			.merge_function
			.as_mut()
			.expect("a merge function must be set before queries are added");
		merge_function(ctx, query_ids, promise);
	}

	fn on_query_result(
		&mut self,
		ctx: &mut ActorContext<Self>,
		query_ids: Vec<i64>,
		result: Result<()>,
	) {
		debug!(?query_ids, is_error = result.is_err(), "query-result");
		self.query_count -= 1;
		for query_id in query_ids {
			let mut promises = self
				.queries
				.remove(&query_id)
				.expect("a merged query is tracked until its batch completes");
			match &result {
				Ok(()) => set_promises(&mut promises),
				Err(error) => fail_promises(&mut promises, error.clone()),
			}
		}
		self.process_pending(ctx);
	}

	fn process_pending(&mut self, ctx: &mut ActorContext<Self>) {
		if self.query_count == self.max_concurrent_query_count {
			return;
		}
		let mut query_ids = Vec::new();
		while let Some(query_id) = self.pending_queries.pop_front() {
			query_ids.push(query_id);
			if query_ids.len() == self.max_merged_query_count {
				self.send_query(ctx, std::mem::take(&mut query_ids));
				if self.query_count == self.max_concurrent_query_count {
					break;
				}
			}
		}
		if !query_ids.is_empty() {
			self.send_query(ctx, query_ids);
		}
	}
}

impl Actor for QueryMerger {}

#[cfg(test)]
mod tests {
	use std::{
		collections::HashSet,
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc, Mutex,
		},
		time::Duration,
	};

	use rand::Rng;

	use super::QueryMerger;
	use crate::{
		tests::run_until_finished, Actor, ActorContext, ActorOwn, Promise, Runtime, SleepActor,
	};

	const MAX_CONCURRENT_QUERY_COUNT: usize = 5;
	const MAX_MERGED_QUERY_COUNT: usize = 3;
	const MAX_QUERY_COUNT: usize = 1000;

	#[derive(Default)]
	struct Stats {
		current_query_count: AtomicUsize,
		max_seen_concurrency: AtomicUsize,
		completed_query_count: AtomicUsize,
	}

	struct MergeStress {
		merger: Option<ActorOwn<QueryMerger>>,
		stats: Arc<Stats>,
		in_flight_ids: Arc<Mutex<HashSet<i64>>>,
		total_query_count: usize,
	}

	impl MergeStress {
		fn add_some_queries(&mut self, ctx: &mut ActorContext<Self>) {
			let merger_id = self.merger.as_ref().map(ActorOwn::actor_id);
			let Some(merger_id) = merger_id else {
				return;
			};
			let mut rng = rand::thread_rng();
			let added_queries = rng.gen_range(1..=3);
			let mut query_count = 0;
			while query_count < added_queries && self.total_query_count < MAX_QUERY_COUNT {
				query_count += 1;
				self.total_query_count += 1;
				let query_id = rng.gen_range(1..=20i64);
				let stats = self.stats.clone();
				let driver_id = ctx.actor_id();
				let promise = Promise::from_fn(move |result| {
					assert_eq!(result, Ok(()));
					let completed =
						stats.completed_query_count.fetch_add(1, Ordering::SeqCst) + 1;
					if completed == MAX_QUERY_COUNT {
						driver_id.send_event(0);
					} else {
						driver_id.send_event(1);
					}
				});
				merger_id.send_closure(move |merger: &mut QueryMerger, ctx| {
					merger.add_query(ctx, query_id, promise, "MergeStress::add_some_queries");
				});
			}
		}
	}

	impl Actor for MergeStress {
		fn on_start(&mut self, ctx: &mut ActorContext<Self>) {
			let stats = self.stats.clone();
			let in_flight_ids = self.in_flight_ids.clone();
			let mut merger = QueryMerger::new(MAX_CONCURRENT_QUERY_COUNT, MAX_MERGED_QUERY_COUNT);
			merger.set_merge_function(move |ctx, query_ids, mut promise| {
				assert!(!query_ids.is_empty());
				assert!(query_ids.len() <= MAX_MERGED_QUERY_COUNT);
				{
					let mut in_flight = in_flight_ids.lock().unwrap();
					for query_id in &query_ids {
						// each id is in at most one in-flight batch
						assert!(in_flight.insert(*query_id));
					}
				}
				let current =
					stats.current_query_count.fetch_add(1, Ordering::SeqCst) + 1;
				stats.max_seen_concurrency.fetch_max(current, Ordering::SeqCst);
				assert!(current <= MAX_CONCURRENT_QUERY_COUNT);
				let stats = stats.clone();
				let in_flight_ids = in_flight_ids.clone();
				let complete = Promise::from_fn(move |result| {
					assert_eq!(result, Ok(()));
					let mut in_flight = in_flight_ids.lock().unwrap();
					for query_id in &query_ids {
						assert!(in_flight.remove(query_id));
					}
					stats.current_query_count.fetch_sub(1, Ordering::SeqCst);
					promise.set_value(());
				});
				ctx.create_actor(
					"complete_merge_query",
					SleepActor::new(Duration::from_millis(20), complete),
				)
				.release();
			});
			self.merger = Some(ctx.create_actor("query_merger", merger));
			self.add_some_queries(ctx);
		}

		fn on_event(&mut self, ctx: &mut ActorContext<Self>, tag: u64) {
			if tag == 0 {
				assert_eq!(self.stats.current_query_count.load(Ordering::SeqCst), 0);
				ctx.finish();
			} else {
				self.add_some_queries(ctx);
			}
		}
	}

	#[test]
	fn test_query_merger_stress() {
		let runtime = Runtime::new(0, 0);
		let stats = Arc::new(Stats::default());
		{
			let mut guard = runtime.main_guard().unwrap();
			guard
				.create_actor(
					"merge_stress",
					MergeStress {
						merger: None,
						stats: stats.clone(),
						in_flight_ids: Arc::new(Mutex::new(HashSet::new())),
						total_query_count: 0,
					},
				)
				.release();
		}
		run_until_finished(&runtime);
		assert_eq!(stats.completed_query_count.load(Ordering::SeqCst), MAX_QUERY_COUNT);
		assert!(stats.max_seen_concurrency.load(Ordering::SeqCst) <= MAX_CONCURRENT_QUERY_COUNT);
		assert!(stats.max_seen_concurrency.load(Ordering::SeqCst) >= 2);
	}
}
