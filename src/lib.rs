//! Courier - A lightweight message routing and mediation engine.
//!
//! Courier moves messages between transports along user-defined **routes**. A route binds
//! one source endpoint to an ordered chain of processors; every message entering the
//! source is wrapped in an [`Exchange`] and pushed through the chain, usually ending in a
//! send to one or more destination endpoints. Transports plug in as [`ports::Component`]s
//! registered under a URI scheme (`mem:`, `file:`, `http:` ship with the crate).
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier::{Context, adapters::MemoryComponent};
//!
//! # #[tokio::main] async fn main() -> courier::Result<()> {
//! let ctx = Context::new();
//! let memory = Arc::new(MemoryComponent::new());
//! ctx.add_component("mem", memory.clone()).await;
//!
//! ctx.create_route_builder()
//!     .set_id("uppercase")
//!     .from("mem:in")
//!     .await?
//!     .process_fn(|ex| {
//!         let upper = ex.body().to_string().to_uppercase();
//!         ex.set_body(upper);
//!         Ok(())
//!     })
//!     .to("mem:out")
//!     .await?;
//!
//! ctx.start().await?;
//! let mut ex = ctx.create_exchange();
//! ex.set_body("hello");
//! memory.queue("in").push(ex);
//! // ... later
//! ctx.stop().await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (transport implementations)
//! while keeping the engine itself (messages, routes, the registry and the context) inside
//! `core`. Configuration files can describe routes declaratively; see [`config`].
//!
//! # Error Handling
//! Engine APIs return [`Result`] with the domain [`Error`]. Configuration loading and the
//! binary use `eyre::Result` with context attached through `WrapErr`.
//!
//! # Concurrency
//! All lifetimes are expressed with `tokio_util::sync::CancellationToken`. Component lookup
//! uses `scc::HashMap`; the route list of a context is an `ArcSwap` snapshot.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the types most users need
pub use crate::{
    adapters::{FileComponent, HttpComponent, MemoryComponent},
    core::{
        ComponentRegistry, Context, Error, Exchange, Message, Result, Route, RouteBuilder,
        RouteStatus, Value, keys,
    },
    ports::{Component, Consumer, Endpoint, Processor, Producer},
};
