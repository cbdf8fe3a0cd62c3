//! The cloud side of the fleet: creating and terminating instances.

use std::future::Future;
use std::pin::Pin;

use skygrid_state::{Hub, Node};

/// Boxed future returned by [`Provisioner`] methods.
pub type ProvisionFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Creates and destroys compute instances. Injected for testability.
///
/// Returned resources must carry fresh, unique ids. A hub comes back with no
/// nodes attached.
pub trait Provisioner: Send + Sync {
    /// Start a hub of `class` sized for `requested_nodes` nodes.
    fn provision_hub<'a>(
        &'a self,
        class: &'a str,
        requested_nodes: u32,
    ) -> ProvisionFuture<'a, Hub>;

    /// Start `count` nodes.
    fn provision_nodes(&self, count: usize) -> ProvisionFuture<'_, Vec<Node>>;

    /// Terminate the instance `id`.
    fn terminate<'a>(&'a self, id: &'a str) -> ProvisionFuture<'a, ()>;
}
