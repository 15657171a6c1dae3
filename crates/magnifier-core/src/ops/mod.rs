//! Transformation operations.
//!
//! Each operation locates its target by id, validates it, then works on a
//! clone of the owning function so the original stays untouched, and
//! finally re-indexes the clone and returns its new id. Deletion is the one
//! operation that mutates in place.
//!
//! Validation happens before anything is cloned, so a rejected request
//! allocates no ids. A failure after cloning erases the clones and the hook
//! functions before returning.

mod delete;
mod devirtualize;
mod inline;
mod optimize;
mod substitute;
