// Infrastructure adapters for the application ports

pub mod clock;
pub mod http_client;
pub mod snapshot_store;
