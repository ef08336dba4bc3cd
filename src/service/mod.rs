//! The maintenance service: operation handlers, factory-reset worker, events.

pub mod events;
pub mod power;
pub mod warehouse;
pub mod worker;
