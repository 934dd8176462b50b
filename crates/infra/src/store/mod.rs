//! Document-store boundary and the access layer built on it.
//!
//! - `collection`: the driver-facing contract (filter/update documents,
//!   upsert, atomic find-and-modify)
//! - `in_memory`: an in-process collection for tests/dev
//! - `bounded`: deadline race wrapped around every store call
//! - `access`: generic CRUD primitives with uniform logging and error
//!   translation, used by the repositories

pub mod access;
pub mod bounded;
pub mod collection;
pub mod error;
pub mod in_memory;
mod query;

pub use access::StoreAccess;
pub use bounded::run_bounded;
pub use collection::{
    Document, DocumentCollection, FindOneAndUpdateOptions, InsertManyOutcome, ModifyReply,
    ReturnDocument, SortDirection, UpdateOutcome,
};
pub use error::StoreError;
pub use in_memory::InMemoryCollection;
