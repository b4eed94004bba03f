mod dedup;
mod repository;
mod schema;

pub use dedup::DedupStore;
pub use repository::Repository;
