// Vigil core library
// Live security-alert feed client for the dashboard backend

pub mod alert;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod subscriptions;
pub mod transport;

// Re-export commonly used types
pub use alert::{Actor, PackageInfo, SecurityAlert, Severity};
pub use client::{ConnectionState, FeedClient, FeedEvent};
pub use config::FeedConfig;
pub use error::{FeedError, FeedResult};
pub use feed::{AlertFeed, FeedMetrics};
pub use subscriptions::{Repository, RepositorySubscription, SubscriptionClient};
pub use transport::{FrameStream, Transport, WsTransport};
