//! Offline-caching worker for the portfolio site.
//!
//! A `Registration` owns the installing, waiting and active versions of the
//! worker together with the page clients in its scope. Each `ServiceWorker`
//! precaches the static assets on install, prunes superseded cache instances
//! on activation and answers intercepted fetches through its `Router`.
//!
//! ```text
//! Registration
//!     ├── installing / waiting / active (ServiceWorker)
//!     │       ├── Router ── CacheStore + Network
//!     │       └── Maintenance (background bound enforcement)
//!     └── Clients
//! ```

pub mod clients;
pub mod events;
pub mod lifecycle;
pub mod maintenance;
pub mod registration;
pub mod router;
pub mod settings;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use clients::{Client, ClientId, Clients};
pub use events::{Command, EventOutcome, WorkerEvent};
pub use lifecycle::{WorkerId, WorkerState};
pub use maintenance::Maintenance;
pub use registration::Registration;
pub use router::{FetchOutcome, ResponseSource, Router};
pub use settings::WorkerSettings;
pub use worker::ServiceWorker;
