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

use tracing::debug;

/// A shared flag signalling that the runtime should wind down.
///
/// Every scheduler holds a clone. Once killed, a signal never comes back
/// to life: schedulers observing a dead signal deliver the outstanding
/// stop events to their actors and exit.
#[derive(Clone)]
pub struct TerimateSignal {
	alive: Arc<AtomicBool>,
}

impl Default for TerimateSignal {
	fn default() -> Self {
		TerimateSignal { alive: Arc::new(AtomicBool::new(true)) }
	}
}

impl TerimateSignal {
	pub fn is_alive(&self) -> bool {
		self.alive.load(Ordering::Relaxed)
	}

	pub fn is_dead(&self) -> bool {
		!self.is_alive()
	}

	pub fn kill(&self) {
		debug!("terminate-signal-activated");
		self.alive.store(false, Ordering::Relaxed);
	}
}
