//! Subscription matching and notification delivery: quartier extraction,
//! criteria matching, live connection registry, and the dispatcher that
//! persists then pushes.

mod dispatcher;
mod matcher;
pub mod quartier;
mod registry;

pub use dispatcher::NotificationDispatcher;
pub use matcher::{prestataires_concernes, residents_concernes};
pub use registry::{group_for, ConnectionRegistry, EventFrame, Subscription};
