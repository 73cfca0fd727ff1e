use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Produces backtest names when the caller does not supply one. Every call must return a name
/// no other call (on any thread) has returned.
pub trait NameGenerator: Send + Sync {
    fn next_name(&self) -> String;
}

#[derive(Debug, Default)]
pub struct UuidNames;

impl NameGenerator for UuidNames {
    fn next_name(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ...
#[derive(Debug)]
pub struct SequentialNames {
    prefix: String,
    last: AtomicU64,
}

impl SequentialNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            last: AtomicU64::new(0),
        }
    }
}

impl NameGenerator for SequentialNames {
    fn next_name(&self) -> String {
        let next = self.last.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, next)
    }
}
