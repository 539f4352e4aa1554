//! Ports: the contracts a transport implements to plug into the engine.
//!
//! A [`Component`] is registered under a URI scheme and turns URIs into
//! [`Endpoint`]s. An endpoint manufactures [`Producer`]s (send only) and
//! [`Consumer`]s (receive and dispatch to a [`Processor`]).
pub mod component;
pub mod processor;

pub use component::{Component, Consumer, Endpoint, Producer};
pub use processor::Processor;
