//! Decompiler boundary.
//!
//! A decompiler gets a private copy of the module that holds the selected
//! function and reports source ranges keyed by handles into that copy. The
//! explorer maps those handles back to ids; it never interprets the code.

use std::collections::HashMap;
use std::ops::Range;

use magnifier_ir::{FuncRef, InstRef, OwnedModule, ValueRef, import_module};
use serde::Serialize;
use tracing::debug;

use crate::error::{DecompileError, ExplorerError, ExplorerResult};
use crate::explorer::Explorer;
use crate::id::{INVALID_VALUE_ID, ValueId};

/// What a source range stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceKind {
    /// A statement produced from an instruction.
    Statement,
    /// The declaration of a value.
    Value,
    /// A use of an instruction's value.
    Use,
    /// The type of a declared value.
    Type,
}

/// The IR object a source range came from, as a handle into the module the
/// decompiler was given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Instruction(InstRef),
    Argument(ValueRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    /// Byte range in [`DecompiledFunction::code`].
    pub range: Range<usize>,
    pub kind: ProvenanceKind,
    pub anchor: Anchor,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecompiledFunction {
    pub code: String,
    pub provenance: Vec<Provenance>,
}

pub trait Decompiler {
    /// Decompile `func` of `module`. Failures are reported as plain text.
    fn decompile(
        &mut self,
        module: &OwnedModule,
        func: FuncRef,
    ) -> Result<DecompiledFunction, String>;
}

/// One provenance range, re-keyed by explorer id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProvenanceEntry {
    pub start: usize,
    pub end: usize,
    pub kind: ProvenanceKind,
    pub id: ValueId,
}

/// Decompiled code of an indexed function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecompileResult {
    pub function_id: ValueId,
    pub code: String,
    pub entries: Vec<ProvenanceEntry>,
}

impl Explorer {
    /// Decompile function `id` through `decompiler`.
    ///
    /// Ranges whose anchor has no id (for example anything outside the
    /// selected function) are dropped.
    pub fn decompile_function(
        &self,
        id: ValueId,
        decompiler: &mut dyn Decompiler,
    ) -> ExplorerResult<DecompileResult, DecompileError> {
        let func = self
            .resolve_function(id)
            .ok_or(ExplorerError::new(id, DecompileError::IdNotFound))?;
        let module = self.ctx.func_module(func);
        let (copy, map) = import_module(&self.ctx, module);
        let copied_func = *map
            .funcs
            .get(&func)
            .expect("import maps every function of the module");

        let insts: HashMap<InstRef, InstRef> =
            map.insts.iter().map(|(&from, &to)| (to, from)).collect();
        let args: HashMap<ValueRef, ValueRef> =
            map.args.iter().map(|(&from, &to)| (to, from)).collect();

        let decompiled = decompiler
            .decompile(&copy, copied_func)
            .map_err(|message| ExplorerError::new(id, DecompileError::DecompilerFailed(message)))?;

        let entries: Vec<ProvenanceEntry> = decompiled
            .provenance
            .into_iter()
            .filter_map(|p| {
                let id = match p.anchor {
                    Anchor::Instruction(i) => self.instruction_id(*insts.get(&i)?),
                    Anchor::Argument(v) => self.argument_id(*args.get(&v)?),
                };
                (id != INVALID_VALUE_ID).then_some(ProvenanceEntry {
                    start: p.range.start,
                    end: p.range.end,
                    kind: p.kind,
                    id,
                })
            })
            .collect();
        debug!(id, entries = entries.len(), "decompiled function");

        Ok(DecompileResult {
            function_id: id,
            code: decompiled.code,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnifier_ir::InstKind;

    /// Emits one line per instruction and marks the whole line.
    struct Lines;

    impl Decompiler for Lines {
        fn decompile(
            &mut self,
            module: &OwnedModule,
            func: FuncRef,
        ) -> Result<DecompiledFunction, String> {
            let ctx = module.context();
            let mut out = DecompiledFunction::default();
            for inst in ctx.func_insts(func) {
                let start = out.code.len();
                out.code.push_str(ctx.inst_kind(inst).mnemonic());
                out.provenance.push(Provenance {
                    range: start..out.code.len(),
                    kind: ProvenanceKind::Statement,
                    anchor: Anchor::Instruction(inst),
                });
                out.code.push('\n');
            }
            let first = ctx.func_params(func)[0];
            out.provenance.push(Provenance {
                range: 0..0,
                kind: ProvenanceKind::Value,
                anchor: Anchor::Argument(first),
            });
            Ok(out)
        }
    }

    struct Broken;

    impl Decompiler for Broken {
        fn decompile(&mut self, _: &OwnedModule, _: FuncRef) -> Result<DecompiledFunction, String> {
            Err("no output".to_owned())
        }
    }

    #[test]
    fn provenance_is_rekeyed_by_explorer_ids() {
        let mut explorer = Explorer::new();
        explorer
            .load_module(
                "m",
                "define i32 @f(i32 %a) {\nentry:\n  %b = mul i32 %a, 3\n  ret i32 %b\n}\n",
            )
            .unwrap();
        let result = explorer.decompile_function(1, &mut Lines).unwrap();
        assert_eq!(result.code, "mul\nret\n");
        let ids: Vec<_> = result.entries.iter().map(|e| (e.kind, e.id)).collect();
        assert_eq!(
            ids,
            [
                (ProvenanceKind::Statement, 3),
                (ProvenanceKind::Statement, 4),
                (ProvenanceKind::Value, 2),
            ]
        );
        assert!(matches!(
            explorer.context().inst_kind(explorer.resolve_instruction(3).unwrap()),
            InstKind::Binary(_)
        ));
    }

    #[test]
    fn decompiler_failures_are_reported() {
        let mut explorer = Explorer::new();
        explorer
            .load_module("m", "define void @f() {\nentry:\n  ret void\n}\n")
            .unwrap();
        let err = explorer.decompile_function(1, &mut Broken).unwrap_err();
        assert_eq!(err.error, DecompileError::DecompilerFailed("no output".to_owned()));
        assert_eq!(
            explorer.decompile_function(9, &mut Broken).unwrap_err().error,
            DecompileError::IdNotFound
        );
    }
}
