// Adapters layer: concrete implementations for external systems (database, storage, http).

pub mod db;
pub mod http;
pub mod storage;
