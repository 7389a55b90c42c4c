//! In-memory control plane
//!
//! `MemoryCloud` implements the full `CloudClient` trait against
//! in-process state. It backs every integration test (with a mutation
//! counter and scripted fault injection) and, through JSON persistence,
//! lets the CLI run whole reconciliation passes locally without touching
//! a real account.
//!
//! Control-plane quirks the engine must tolerate are reproduced here:
//! duplicate creates raise `AlreadyExists`, duplicate event bindings
//! raise `Conflict` naming the existing binding, gateway lookups by a
//! non-unique name raise `Ambiguous`, and a table with streams enabled
//! materializes its stream identity.

mod cloud;
mod error;
mod persist;

pub use cloud::MemoryCloud;
pub use error::{PersistError, Result};
