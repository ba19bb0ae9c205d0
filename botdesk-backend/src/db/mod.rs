mod sqlite;
mod tables;

pub use sqlite::Database;
pub(crate) use sqlite::{date_at, opt_time_at, parsed_at, time_at, to_db_date, to_db_time};
pub(crate) use tables::{AgentUpdate, BucketWrite, Checkpoint};

#[cfg(test)]
pub(crate) use sqlite::test_support;
