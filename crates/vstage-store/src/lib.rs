//! Object store seam for vstage.
//!
//! A stage never writes content into a store itself. It hands the store a
//! [`CommitDescriptor`]: the target object and version, the new state, and a
//! [`ContentSource`] the store pulls bytes and fixity from while it performs
//! its own durable write. The store asks only for digests it does not
//! already hold.
//!
//! # Key Types
//!
//! - [`ObjectStore`] -- What a store must offer to accept commits
//! - [`ContentSource`] -- Pull-based access to staged content and fixity
//! - [`CommitDescriptor`] -- The validated hand-off from a stage
//! - [`ObjectSnapshot`] -- A store's view of an object's head version
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding

pub mod commit;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use commit::{CommitDescriptor, CommitReceipt, ContentRef};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use snapshot::ObjectSnapshot;
pub use traits::{ContentSource, ObjectStore};
