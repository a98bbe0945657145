//! Member records and their delivery workers.
//!
//! Every registered node gets one worker thread that sends it requests in
//! submission order. Replication to a secondary is therefore FIFO per node
//! even when the broker does not wait for it.

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;

use super::registry::Registry;
use crate::error::{CacheError, Result};
use crate::network::Link;
use crate::node::NodeId;
use crate::protocol::{Reply, Request};

/// One request queued for a node
struct Job {
    request: Request,

    /// Where to deliver the outcome; `None` for fire-and-forget
    done: Option<Sender<Result<Reply>>>,
}

/// A registered node as seen by the broker
#[derive(Clone)]
pub struct Member {
    id: NodeId,
    address: String,

    /// Distinguishes re-registrations of the same identity
    generation: u64,

    link: Arc<dyn Link>,
    jobs: Sender<Job>,
}

impl Member {
    /// Create the record and start its worker
    pub(crate) fn spawn(
        id: NodeId,
        address: impl Into<String>,
        generation: u64,
        link: Arc<dyn Link>,
        registry: Weak<RwLock<Registry>>,
        evict_unreachable: bool,
    ) -> Result<Self> {
        let (jobs, queue) = channel::unbounded();

        let worker = Worker {
            id: id.clone(),
            generation,
            link: Arc::clone(&link),
            registry,
            evict_unreachable,
        };
        thread::Builder::new()
            .name(format!("member-{}", id))
            .spawn(move || worker.run(queue))?;

        Ok(Self {
            id,
            address: address.into(),
            generation,
            link,
            jobs,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a request and return where its outcome will arrive
    pub fn submit(&self, request: Request) -> Result<Receiver<Result<Reply>>> {
        let (done, outcome) = channel::bounded(1);
        self.enqueue(Job {
            request,
            done: Some(done),
        })?;
        Ok(outcome)
    }

    /// Queue a request without waiting; failures are only logged
    pub fn send(&self, request: Request) -> Result<()> {
        self.enqueue(Job {
            request,
            done: None,
        })
    }

    /// Queue a request and wait for its reply
    pub fn call(&self, request: Request) -> Result<Reply> {
        let outcome = self.submit(request)?;
        outcome
            .recv()
            .map_err(|_| CacheError::Unreachable(self.address.clone()))?
    }

    /// Close the connection, logging instead of failing
    pub fn close(&self) {
        if let Err(e) = self.link.close() {
            tracing::warn!("Closing connection to node {} failed: {}", self.id, e);
        }
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        self.jobs
            .send(job)
            .map_err(|_| CacheError::Unreachable(self.address.clone()))
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Drains one member's queue; exits once every `Member` clone is gone
struct Worker {
    id: NodeId,
    generation: u64,
    link: Arc<dyn Link>,
    registry: Weak<RwLock<Registry>>,
    evict_unreachable: bool,
}

impl Worker {
    fn run(self, queue: Receiver<Job>) {
        for job in queue.iter() {
            let result = self.link.call(&job.request);

            if let Err(e) = &result {
                if self.evict_unreachable && e.is_unreachable() {
                    self.evict();
                }
            }

            match job.done {
                Some(done) => {
                    let _ = done.send(result);
                }
                None => match result.and_then(Reply::into_result) {
                    Ok(_) => {
                        tracing::trace!("Background '{}' on node {} done", job.request.action, self.id)
                    }
                    Err(e) => tracing::warn!(
                        "Background '{}' on node {} failed: {}",
                        job.request.action,
                        self.id,
                        e
                    ),
                },
            }
        }
        tracing::debug!("Worker for node {} exiting", self.id);
    }

    fn evict(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let removed = registry.write().remove_generation(&self.id, self.generation);
        if let Some(member) = removed {
            tracing::warn!("Node {} is unreachable, removed from membership", self.id);
            member.close();
        }
    }
}
