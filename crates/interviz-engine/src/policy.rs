//! Region coordination between concurrent jobs.
//!
//! Under [`RegionPolicy::Isolated`] each job gets a cloned mapset, so a
//! narrowed region is only ever visible to the job that narrowed it.
//! Under [`RegionPolicy::Exclusive`] jobs share the worker's `PERMANENT`
//! session and a read/write lock orders them: region-narrowing jobs hold
//! the write side for their whole critical section, all others the read
//! side.

use interviz_core::config::RegionPolicy;
use interviz_core::error::{InterVizError, Result};
use interviz_core::models::Job;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::ports::EngineSpace;
use crate::workspace::Workspace;

pub struct RegionCoordinator {
    policy: RegionPolicy,
    workspace: Arc<Workspace>,
    lock: Arc<RwLock<()>>,
}

impl RegionCoordinator {
    pub fn new(policy: RegionPolicy, workspace: Arc<Workspace>) -> Self {
        Self {
            policy,
            workspace,
            lock: Arc::new(RwLock::new(())),
        }
    }

    /// Obtain the session `job` runs in, waiting for the region if needed
    pub async fn acquire(&self, job: &Job, worker_session: &EngineSpace) -> Result<Lease> {
        match self.policy {
            RegionPolicy::Isolated => {
                let workspace = Arc::clone(&self.workspace);
                let job_id = job.id.clone();
                let space = tokio::task::spawn_blocking(move || workspace.isolate(&job_id))
                    .await
                    .map_err(|e| InterVizError::computation("mapset clone", e.to_string()))??;
                Ok(Lease {
                    space,
                    guard: Guard::Isolated(Arc::clone(&self.workspace)),
                    released: false,
                })
            }
            RegionPolicy::Exclusive => {
                let guard = if job.kind().narrows_region() {
                    Guard::Writer(Arc::clone(&self.lock).write_owned().await)
                } else {
                    Guard::Reader(Arc::clone(&self.lock).read_owned().await)
                };
                Ok(Lease {
                    space: worker_session.clone(),
                    guard,
                    released: false,
                })
            }
        }
    }
}

enum Guard {
    /// Owns a cloned mapset, deleted on release
    Isolated(Arc<Workspace>),
    Reader(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Writer(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// Right to run one job in a session.
///
/// [`Lease::release`] gives the region back: the cloned mapset is deleted
/// or the lock is released. A lease dropped without it, as when its job is
/// cancelled, deletes the mapset inline.
pub struct Lease {
    space: EngineSpace,
    guard: Guard,
    released: bool,
}

impl Lease {
    pub fn space(&self) -> &EngineSpace {
        &self.space
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self.guard, Guard::Writer(_))
    }

    pub async fn release(mut self) {
        if let Guard::Isolated(workspace) = &self.guard {
            let workspace = Arc::clone(workspace);
            let space = self.space.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || workspace.release(&space)).await {
                tracing::warn!(mapset = %self.space.mapset, error = %e, "Mapset release failed");
            }
        }
        self.released = true;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Guard::Isolated(workspace) = &self.guard {
            workspace.release(&self.space);
        }
    }
}
