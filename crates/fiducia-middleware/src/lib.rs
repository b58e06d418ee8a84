//! `fiducia-middleware` – in-process message routing.
//!
//! Carries odometry estimates, transform broadcasts and alerts from the
//! estimator to whoever consumes them, without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
