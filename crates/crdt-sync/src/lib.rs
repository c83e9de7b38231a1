//! # crdt-sync
//!
//! Keeps [`crdt_graph`] replicas in sync across agents.
//!
//! A [`SyncManager`] owns a set of named CRDTs. Local mutations made through
//! a [`Replica`] are debounced and broadcast through a [`Transport`]; a
//! periodic timer re-broadcasts everything to heal lost messages. Payloads
//! from peers are merged with [`SyncHandle::on_remote_update`], in any
//! order and any number of times.
//!
//! ```
//! use crdt_graph::prelude::*;
//! use crdt_sync::{MemoryTransport, SyncConfig, SyncManager};
//!
//! let manager = SyncManager::new(SyncConfig::default(), MemoryTransport::new());
//! let graph = manager.register("graph", KnowledgeGraph::new("agent-a")).unwrap();
//!
//! graph
//!     .mutate(|g| g.add_node("n1", Properties::new()))
//!     .unwrap();
//! assert!(graph.read(|g| g.has_node("n1")));
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod transport;

pub use config::SyncConfig;
pub use error::{SyncError, TransportError};
pub use manager::{Replica, SyncHandle, SyncManager, SyncStats};
pub use transport::{Broadcast, MemoryTransport, Transport};
