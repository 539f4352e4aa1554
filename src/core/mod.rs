pub mod context;
pub mod error;
pub mod exchange;
pub mod message;
pub mod processors;
pub mod registry;
pub mod route;
pub mod route_builder;
pub mod value;

pub use context::Context;
pub use error::{BoxError, Error, LifecycleAction, Result};
pub use exchange::{Exchange, keys};
pub use message::Message;
pub use processors::{FnProcessor, SendTo};
pub use registry::ComponentRegistry;
pub use route::{Route, RouteStatus};
pub use route_builder::RouteBuilder;
pub use value::Value;
