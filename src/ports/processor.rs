use async_trait::async_trait;

use crate::core::{Exchange, Result};

/// A step that consumes and mutates an exchange, or fails.
///
/// Routes implement this trait themselves so a route can be used as a step of another
/// route, and so a consumer can dispatch straight into a route.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Process the exchange in place.
    ///
    /// # Arguments
    /// * `exchange` - The unit of work to mutate
    ///
    /// # Returns
    /// An error aborts the remaining steps of the chain for this exchange only
    async fn process(&self, exchange: &mut Exchange) -> Result<()>;
}
