//! Page clients within a registration's scope.

use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use crate::lifecycle::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An open page.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    /// Worker version serving this page's fetches, if any.
    pub controller: Option<WorkerId>,
}

/// Open pages, in the order they were opened.
#[derive(Debug, Default)]
pub struct Clients {
    clients: Vec<Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened page.
    pub fn add(&mut self, url: Url, controller: Option<WorkerId>) -> ClientId {
        let id = ClientId::next();
        self.clients.push(Client { id, url, controller });
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Number of pages controlled by `worker`.
    pub fn controlled_by(&self, worker: WorkerId) -> usize {
        self.clients.iter().filter(|c| c.controller == Some(worker)).count()
    }

    /// Make `worker` the controller of every page on `scope`'s origin.
    ///
    /// Returns how many pages changed controller.
    pub fn claim(&mut self, worker: WorkerId, scope: &Url) -> usize {
        let mut claimed = 0;
        for client in self.clients.iter_mut().filter(|c| c.url.origin() == scope.origin()) {
            if client.controller != Some(worker) {
                client.controller = Some(worker);
                claimed += 1;
            }
        }
        claimed
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }
}
