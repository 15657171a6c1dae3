//! Magnifier IR crate.
//!
//! An arena-based SSA IR (`cranelift-entity` maps with explicit use-chains)
//! together with everything the exploration engine needs to mutate it: a
//! textual parser and printer, function cloning and module import, a call
//! inliner, a constant folder, optimization pipelines and a verifier.

// === Core data model ===
pub mod context;
pub mod instructions;
pub mod refs;
pub mod types;

// === Text format ===
pub mod parser;
pub mod printer;

// === Transformations ===
pub mod body;
pub mod clone;
pub mod fold;
pub mod inline;
pub mod passes;
pub mod verify;

pub use clone::{
    CloneMap, ImportMap, OwnedModule, clone_function, import_module, import_module_into,
};
pub use context::{InstData, IrContext, Use};
pub use fold::fold_instruction;
pub use inline::{InlineFailure, InlineOptions, InlinedCall, inline_call};
pub use instructions::{BinaryOp, InstKind, IntPredicate};
pub use parser::{ParseError, parse_module, parse_module_into};
pub use passes::{OptLevel, PassStats, optimize_function};
pub use printer::{
    Annotator, FunctionNames, NoAnnotations, print_function, print_inst, print_module,
    print_module_with,
};
pub use refs::{BlockRef, FuncRef, InstRef, ModuleRef, ValueDef, ValueRef};
pub use types::{Signature, Type};
pub use verify::{VerifyError, VerifyReport, verify_function, verify_module};
