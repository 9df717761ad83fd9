pub mod cache;
pub mod config;
pub mod directory;
pub mod events;
pub mod fetch;
pub mod friends;
pub mod manager;
pub mod profiles;
pub mod worker;

pub use config::SyncConfig;
pub use events::SyncEvent;
pub use fetch::{FetchDispatcher, HttpTransport, Transport};
pub use manager::SyncCore;
