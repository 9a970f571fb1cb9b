//! Ad engine facade and its transports.
//!
//! [`AdEngine`] ties slot resolution, rotation, the lifecycle service and
//! engagement analytics to one store. Outbox events are delivered by the
//! [`OutboxDispatcher`]; owner notifications go out through
//! [`NatsNotifier`] and payment callbacks arrive through
//! [`PaymentConsumer`].

pub mod engine;
pub mod notifier;
pub mod outbox;
pub mod payments;

pub use engine::AdEngine;
pub use notifier::NatsNotifier;
pub use outbox::OutboxDispatcher;
pub use payments::{PaymentConsumer, PaymentEvent};
