//! Watch fan-out: Subscription Index (spec §4.5) + Watch Broadcaster
//! (spec §4.6), consuming the Filesystem Engine's raw change-event stream.

pub mod broadcaster;
pub mod frame;
pub mod rate_limit;
pub mod subscription;

pub use broadcaster::{BroadcasterConfig, SubscriberState, WatchBroadcaster};
pub use frame::{ClientFrame, ServerFrame};
pub use rate_limit::{RateLimitConfig, RateLimited};
pub use subscription::{SubscribeError, SubscriptionIndex};
