//! Persisted runtime state
//!
//! One JSON document per workspace, keyed by repository name. It is loaded in
//! full, mutated in memory and rewritten in full. Saves go through a temp file
//! and an atomic rename while an advisory lock is held, but there is no
//! cross-process merge: concurrent invocations are last-writer-wins.

mod model;
mod store;

pub use model::{Repository, State};
pub use store::StateStore;
pub(crate) use model::normalize;
