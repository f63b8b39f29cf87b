//! Facilities to process the messages received by
//! [`AmqpDriver::consume`](crate::driver::AmqpDriver::consume).
//! Check out [`DeliveryHandler`] as a starting point.
pub use delivery::MessageDelivery;
pub use handler::{ClosureHandler, DeliveryHandler};
pub use session::ConsumeSession;

mod delivery;
mod handler;
mod session;
