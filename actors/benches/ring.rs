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

use actors::{Actor, ActorContext, ActorId, Runtime};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

struct RingNode {
	next: Option<ActorId<RingNode>>,
}

impl Actor for RingNode {
	fn on_event(&mut self, ctx: &mut ActorContext<Self>, tag: u64) {
		if tag == 0 {
			ctx.finish();
			return;
		}
		if let Some(next) = &self.next {
			next.send_event(tag - 1);
		}
	}
}

fn run_ring(node_count: usize, hops: u64) {
	let runtime = Runtime::new(0, 0);
	let mut owns = Vec::with_capacity(node_count);
	let mut ids = Vec::with_capacity(node_count);
	{
		let mut guard = runtime.main_guard().expect("the runtime was just created");
		for _ in 0..node_count {
			let own = guard.create_actor("ring_node", RingNode { next: None });
			ids.push(own.actor_id());
			owns.push(own);
		}
		for index in 0..node_count {
			let next = ids[(index + 1) % node_count].clone();
			ids[index].send_closure(move |node: &mut RingNode, _ctx| {
				node.next = Some(next);
			});
		}
		ids[0].send_event(hops);
	}
	while runtime.run_main(Duration::from_millis(10)) {}
	runtime.finish();
}

fn bench_ring(c: &mut Criterion) {
	c.bench_function("ring_504_nodes_1000_hops", |b| {
		b.iter(|| run_ring(black_box(504), black_box(1000)))
	});
}

criterion_group!(benches, bench_ring);
criterion_main!(benches);
