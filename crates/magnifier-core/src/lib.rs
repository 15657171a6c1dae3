//! Magnifier core: identity-preserving exploration of magnifier IR.
//!
//! An [`Explorer`] owns every ingested module and gives each function,
//! argument, instruction and block a numeric id. Operations never mutate a
//! function in place (deletion aside): they clone it, transform the clone,
//! and hand back the clone's new id. Original ids survive every clone, so a
//! value can always be traced back to what it was derived from.
//!
//! Value replacements made along the way are reported to a
//! [`SubstitutionObserver`], which may also override them.

pub mod annotate;
pub mod config;
pub mod decompile;
pub mod error;
pub mod explorer;
pub mod hooks;
pub mod id;
pub mod index;
pub mod observer;
mod ops;
pub mod resolver;

pub use annotate::IdCommentWriter;
pub use config::ExplorerConfig;
pub use decompile::{
    Anchor, DecompileResult, DecompiledFunction, Decompiler, Provenance, ProvenanceEntry,
    ProvenanceKind,
};
pub use error::{
    DecompileError, DeletionError, DevirtualizeError, ExplorerError, ExplorerResult, InlineError,
    OptimizationError, SubstitutionError,
};
pub use explorer::{Explorer, FunctionKind};
pub use id::{INVALID_VALUE_ID, IdKind, Node, ValueId};
pub use index::Lookup;
pub use observer::{
    NullSubstitutionObserver, SubstitutionKind, SubstitutionObserver, SubstitutionSite,
};
pub use resolver::{DirectCallResolver, FunctionResolver, LinkingResolver};
