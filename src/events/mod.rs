//! Event fan-out: in-process hub plus the optional broker sink.

pub mod bus;
pub mod hub;

pub use bus::EventBus;
pub use hub::EventHub;
