//! Row-level change notifications and the subscription that keeps a live
//! view fresh.
//!
//! * [`feed`] defines the transport ([`ChangeFeed`]) and an in-process
//!   implementation backed by a broadcast channel.
//! * [`machine`] is the pure subscription state machine.
//! * [`driver`] runs the machine against a feed and a [`Clock`].

pub mod driver;
pub mod feed;
pub mod machine;

pub use driver::{run, Clock, LiveEvent, TokioClock};
pub use feed::{
    BroadcastFeed, ChangeEvent, ChangeFeed, ChangeKind, FeedError, FeedFilter,
    Subscription,
};
pub use machine::{Action, LiveStatus, Machine, RetryPolicy};
