// Repository layer: the persisted call log and its aggregates.

use sqlx::sqlite::SqlitePool;

mod call_log;

pub use call_log::{CallOutcome, PendingCallLog};

#[cfg(test)]
pub(crate) mod test_helpers;

#[derive(Clone)]
pub struct CallLogRepository {
    pub(crate) pool: SqlitePool,
}

impl CallLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}
