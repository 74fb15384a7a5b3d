//! Runtime events: types and broadcast bus.
//!
//! The supervisor publishes an [`Event`] for every state transition and
//! every action it takes; [`Bus`] fans them out to any number of
//! subscribers. The built-in consumer is the
//! [`Observer`](crate::observer::Observer) pump spawned by the supervisor,
//! but tests and embedding programs can subscribe directly to follow the
//! lifecycle.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
