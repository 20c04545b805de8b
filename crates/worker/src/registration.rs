//! Registration: the installing, waiting and active versions for one scope.
//!
//! ### Waiting
//! An installed version waits while the active one still controls pages. It
//! activates as soon as one of these holds:
//! - it asked to skip waiting (config flag after install, or a `SKIP_WAITING` message)
//! - there is no active version
//! - the last page controlled by the active version closed
//!
//! ### Locking
//! `slots` is always taken before `clients`. Activation holds the `slots`
//! write lock throughout, so fetches arriving meanwhile wait for the new
//! version instead of reaching one that is being retired.

use std::sync::Arc;

use precache_core::{Error, Request};
use tokio::sync::RwLock;
use url::Url;

use crate::clients::{ClientId, Clients};
use crate::events::{Command, EventOutcome, WorkerEvent};
use crate::lifecycle::WorkerId;
use crate::router::FetchOutcome;
use crate::worker::ServiceWorker;

#[derive(Default)]
struct Slots {
    installing: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    active: Option<Arc<ServiceWorker>>,
}

pub struct Registration {
    scope: Url,
    slots: RwLock<Slots>,
    clients: RwLock<Clients>,
}

impl Registration {
    pub fn new(scope: Url) -> Self {
        Self { scope, slots: RwLock::new(Slots::default()), clients: RwLock::new(Clients::new()) }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub async fn installing(&self) -> Option<Arc<ServiceWorker>> {
        self.slots.read().await.installing.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.slots.read().await.waiting.clone()
    }

    pub async fn active(&self) -> Option<Arc<ServiceWorker>> {
        self.slots.read().await.active.clone()
    }

    /// Install `worker` and activate it if nothing holds it back.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` when another version is mid-install, or
    /// the install error. A failed install leaves the active version in place.
    pub async fn register(&self, worker: ServiceWorker) -> Result<EventOutcome, Error> {
        {
            let mut slots = self.slots.write().await;
            if let Some(current) = &slots.installing {
                return Err(Error::InvalidState(format!("{} is still installing", current.id())));
            }
            slots.installing = Some(Arc::new(worker));
        }

        self.dispatch(WorkerEvent::Install).await
    }

    /// Deliver one lifecycle event.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, Error> {
        match event {
            WorkerEvent::Install => self.install().await,
            WorkerEvent::Activate => {
                if let Some(pruned) = self.try_activate().await? {
                    return Ok(EventOutcome::Activated { pruned });
                }
                if self.waiting().await.is_some() { Ok(EventOutcome::Waiting) } else { Ok(EventOutcome::Idle) }
            }
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetch(self.handle_fetch(&request).await?)),
            WorkerEvent::Message(command) => {
                let target = {
                    let slots = self.slots.read().await;
                    slots.waiting.clone().or_else(|| slots.active.clone())
                };
                if let Some(worker) = target {
                    worker.handle_message(command);
                }
                let activated = self.try_activate().await?.is_some();
                Ok(EventOutcome::Message { command, activated })
            }
        }
    }

    async fn install(&self) -> Result<EventOutcome, Error> {
        let Some(worker) = self.installing().await else {
            return Ok(EventOutcome::Idle);
        };

        let result = worker.install().await;

        {
            let mut slots = self.slots.write().await;
            slots.installing = None;
            let replaced = if result.is_ok() { slots.waiting.replace(worker.clone()) } else { None };
            if let Some(previous) = replaced {
                previous.retire().await;
            }
        }

        result?;
        let activated = self.try_activate().await?.is_some();
        Ok(EventOutcome::Installed { activated })
    }

    /// Activate the waiting version if it may stop waiting.
    ///
    /// Returns the pruned cache names when an activation happened.
    pub async fn try_activate(&self) -> Result<Option<Vec<String>>, Error> {
        let mut slots = self.slots.write().await;
        let Some(waiting) = slots.waiting.clone() else {
            return Ok(None);
        };

        let may_activate = waiting.skip_waiting_requested()
            || match &slots.active {
                None => true,
                Some(active) => self.clients.read().await.controlled_by(active.id()) == 0,
            };
        if !may_activate {
            tracing::debug!(worker = %waiting.id(), "waiting for pages of the active version to close");
            return Ok(None);
        }

        slots.waiting = None;
        let pruned = waiting.begin_activation().await?;

        if let Some(previous) = slots.active.take() {
            previous.retire().await;
        }

        let claimed = self.clients.write().await.claim(waiting.id(), &self.scope);
        waiting.complete_activation().await?;
        tracing::info!(
            worker = %waiting.id(),
            version = %waiting.settings().version,
            pruned = pruned.len(),
            claimed,
            "worker activated"
        );

        slots.active = Some(waiting);
        Ok(Some(pruned))
    }

    /// Route a fetch from a page through the active version.
    ///
    /// Without an active version every request passes through.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        let Some(active) = self.active().await else {
            return Ok(FetchOutcome::Passthrough);
        };
        active.handle_fetch(request).await
    }

    /// Deliver a JSON message posted by a page.
    ///
    /// Malformed or unknown messages are dropped with a debug log and yield `None`.
    pub async fn post_message(&self, payload: &str) -> Result<Option<EventOutcome>, Error> {
        let command = match Command::from_json(payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring message");
                return Ok(None);
            }
        };
        self.dispatch(WorkerEvent::Message(command)).await.map(Some)
    }

    /// Track a newly opened page. It is controlled by the active version, if any.
    pub async fn add_client(&self, url: Url) -> ClientId {
        let slots = self.slots.read().await;
        let controller = slots
            .active
            .as_ref()
            .filter(|_| url.origin() == self.scope.origin())
            .map(|active| active.id());
        self.clients.write().await.add(url, controller)
    }

    /// Forget a closed page; closing the last page of the active version
    /// releases a waiting one.
    pub async fn remove_client(&self, id: ClientId) -> Result<(), Error> {
        let removed = self.clients.write().await.remove(id);
        if removed.is_some() {
            self.try_activate().await?;
        }
        Ok(())
    }

    pub async fn controller_of(&self, id: ClientId) -> Option<WorkerId> {
        self.clients.read().await.get(id).and_then(|c| c.controller)
    }
}
