//! SOS server: operator routing, transport bindings, event bus and the
//! HTTP surface that ties them together.

pub mod binding;
pub mod context;
pub mod event;
pub mod network;
pub mod service;

pub use context::{SosContext, SosContextBuilder};

#[cfg(test)]
mod testing;
