//! Client for a work-item tracking server: batched reads, JSON-Patch field
//! updates and relation management.

pub mod blocking;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod parse;
pub mod patch;
pub mod transport;

pub use client::{WorkItemClient, WorkItemService, DEFAULT_BATCH_SIZE};
pub use error::{ClientError, ParseError, Result, TransportError};
pub use model::{
    CommitOutcome, FieldStore, FieldValue, IdentityRef, PendingFields, RelationLink,
    RelationLinks, RelationType, WorkItem, WorkItemType,
};
pub use patch::{Expand, PatchOptions};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
