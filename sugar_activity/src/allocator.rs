/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Allocation of activity correlation tokens.

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::reference::ActivityToken;

static GLOBAL: LazyLock<ActivityHandleAllocator> = LazyLock::new(ActivityHandleAllocator::new);

/// Hands out correlation tokens for activity instances. Tokens are
/// strictly increasing and never reused. Clones share the same sequence.
#[derive(Clone, Debug)]
pub struct ActivityHandleAllocator {
    next: Arc<AtomicU64>,
}

impl ActivityHandleAllocator {
    /// A new allocator whose first token is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// A new allocator whose first token is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    /// The process-wide allocator. Factories use it unless told otherwise,
    /// so that tokens are unique across all factories in the process.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Allocate the next token.
    pub fn allocate(&self) -> ActivityToken {
        ActivityToken(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ActivityHandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
