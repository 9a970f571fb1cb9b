//! Ad serving primitives: campaign pricing, slot resolution and weighted
//! rotation. Everything here is synchronous and side-effect free apart from
//! metrics.

pub mod pricing;
pub mod rotation;
pub mod slots;

pub use pricing::PricingEngine;
pub use rotation::RotationSelector;
pub use slots::{SlotResolver, SlotRule};
