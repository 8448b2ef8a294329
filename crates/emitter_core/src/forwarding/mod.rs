//! # Forwarding
//!
//! Plumbing that routes events from one place to another:
//!
//! - [`EventMultiplexer`] fans many input events into one output
//! - [`EventBufferer`] holds back deliveries while a closure runs
//! - [`Relay`] forwards from an input event that can be swapped at any time
//!
//! The multiplexer and the relay only subscribe to their inputs while their
//! own output has listeners.

mod bufferer;
mod multiplexer;
mod relay;

#[cfg(test)]
mod tests;

pub use bufferer::EventBufferer;
pub use multiplexer::EventMultiplexer;
pub use relay::Relay;
