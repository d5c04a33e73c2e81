/// Persistent player profile scores.
pub mod profile_store;
/// Storage abstraction layer for database operations.
pub mod storage;
