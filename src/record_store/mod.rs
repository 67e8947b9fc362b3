mod hash;
mod models;
mod schema;
mod store;
mod trait_def;

pub use hash::content_hash;
pub use models::*;
pub use schema::RECORDS_VERSIONED_SCHEMAS;
pub use store::{Clock, SqliteRecordStore};
pub use trait_def::RecordStore;
