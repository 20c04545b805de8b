//! Lifecycle events and page-to-worker commands.

use precache_core::{Error, Request};
use serde::{Deserialize, Serialize};

use crate::router::FetchOutcome;

/// A command posted by a page to the worker.
///
/// On the wire this is a JSON object tagged by `type`:
/// `{ "type": "SKIP_WAITING" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Stop waiting for the old version's pages to close and activate now.
    SkipWaiting,
}

impl Command {
    /// Decode a posted message.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMessage` for malformed JSON or an unknown `type`.
    pub fn from_json(payload: &str) -> Result<Self, Error> {
        serde_json::from_str(payload).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// Events delivered to a registration.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Install the pending version.
    Install,
    /// Activate the waiting version if nothing holds it back.
    Activate,
    /// An intercepted request from a page.
    Fetch(Request),
    Message(Command),
}

/// What handling a `WorkerEvent` led to.
#[derive(Debug)]
pub enum EventOutcome {
    /// Install succeeded; `activated` is set when the version went straight to active.
    Installed { activated: bool },
    /// The waiting version became active after deleting the `pruned` instances.
    Activated { pruned: Vec<String> },
    /// A version is installed but the current one still controls pages.
    Waiting,
    /// Nothing to install or activate.
    Idle,
    Fetch(FetchOutcome),
    Message { command: Command, activated: bool },
}
