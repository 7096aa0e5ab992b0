// Swisync synchronization authority plumbing

pub mod client;
pub mod listener;
pub mod protocol;

pub use client::SwisyncClient;
pub use listener::NotificationListener;
pub use protocol::{SyncNotification, SyncOperation, SyncRequest};
