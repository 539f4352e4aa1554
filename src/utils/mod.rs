pub mod shutdown;

pub use shutdown::{ShutdownReason, ShutdownSignal};
