mod bson;
mod collection;
pub mod errors;
pub mod transaction;

pub use bson::Id;
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
