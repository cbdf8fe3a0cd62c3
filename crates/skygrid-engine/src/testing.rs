//! In-memory provisioner for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use skygrid_state::{Clock, Hub, Node};

use crate::provisioner::{ProvisionFuture, Provisioner};

/// Hands out sequential `i-00000001`-style ids and records terminations.
///
/// Addresses are derived from the id so scripted probes can be keyed
/// before the resource exists: instance `n` lives at `10.0.{n / 256}.{n % 256}`.
pub struct FakeProvisioner {
    clock: Arc<dyn Clock>,
    next: AtomicU64,
    fail_hubs: Mutex<bool>,
    fail_nodes: Mutex<bool>,
    fail_terminate: Mutex<bool>,
    node_delay: Mutex<Duration>,
    terminated: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next: AtomicU64::new(1),
            fail_hubs: Mutex::new(false),
            fail_nodes: Mutex::new(false),
            fail_terminate: Mutex::new(false),
            node_delay: Mutex::new(Duration::ZERO),
            terminated: Mutex::new(Vec::new()),
        }
    }

    /// Address the `n`th provisioned instance will get.
    pub fn address_of(n: u64) -> String {
        format!("10.0.{}.{}", n / 256, n % 256)
    }

    pub fn fail_hubs(&self, fail: bool) {
        *self.fail_hubs.lock() = fail;
    }

    pub fn fail_nodes(&self, fail: bool) {
        *self.fail_nodes.lock() = fail;
    }

    pub fn fail_terminate(&self, fail: bool) {
        *self.fail_terminate.lock() = fail;
    }

    /// Make `provision_nodes` take `delay` before answering.
    pub fn delay_nodes(&self, delay: Duration) {
        *self.node_delay.lock() = delay;
    }

    /// Number of instances created so far.
    pub fn provisioned(&self) -> u64 {
        self.next.load(Ordering::SeqCst) - 1
    }

    /// Ids passed to `terminate`, in call order, including failed calls.
    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().clone()
    }

    fn next_instance(&self) -> (String, String) {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        (format!("i-{n:08}"), Self::address_of(n))
    }
}

impl Provisioner for FakeProvisioner {
    fn provision_hub<'a>(
        &'a self,
        class: &'a str,
        requested_nodes: u32,
    ) -> ProvisionFuture<'a, Hub> {
        Box::pin(async move {
            if *self.fail_hubs.lock() {
                anyhow::bail!("no {class} capacity");
            }
            let (id, address) = self.next_instance();
            Ok(Hub::new(id, class, address, self.clock.now(), requested_nodes))
        })
    }

    fn provision_nodes(&self, count: usize) -> ProvisionFuture<'_, Vec<Node>> {
        Box::pin(async move {
            let delay = *self.node_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if *self.fail_nodes.lock() {
                anyhow::bail!("no node capacity for {count} nodes");
            }
            let now = self.clock.now();
            Ok((0..count)
                .map(|_| {
                    let (id, address) = self.next_instance();
                    Node::new(id, address, now)
                })
                .collect())
        })
    }

    fn terminate<'a>(&'a self, id: &'a str) -> ProvisionFuture<'a, ()> {
        Box::pin(async move {
            self.terminated.lock().push(id.to_string());
            if *self.fail_terminate.lock() {
                anyhow::bail!("terminate {id}: instance busy");
            }
            Ok(())
        })
    }
}
