//! Convenient re-exports for common usage.
//!
//! ```
//! use crdt_graph::prelude::*;
//! ```

pub use crate::clock::{ClockOrdering, VectorClock};
pub use crate::wire::WireCrdt;
pub use crate::AnyCrdt;
pub use crate::Crdt;
pub use crate::CrdtError;
pub use crate::GCounter;
pub use crate::KnowledgeGraph;
pub use crate::LWWRegister;
pub use crate::MVRegister;
pub use crate::ORMap;
pub use crate::ORSet;
pub use crate::PNCounter;
pub use crate::Properties;
pub use crate::Replicated;
