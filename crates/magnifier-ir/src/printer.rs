//! Text format printer.
//!
//! Prints IR in the format accepted by [`crate::parser`]:
//!
//! ```text
//! define i32 @add(i32 %a, i32 %b) {
//! entry:
//!   %sum = add i32 %a, %b
//!   ret i32 %sum
//! }
//! ```
//!
//! Callers can decorate the output through an [`Annotator`] without the
//! printer knowing what the decorations mean.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write};

use crate::context::IrContext;
use crate::instructions::InstKind;
use crate::refs::*;
use crate::types::Type;

/// Hooks for decorating printed functions.
///
/// Every method has an empty default, so implementors only override what
/// they need. Methods that take `out` write whole lines, newline included.
pub trait Annotator {
    /// Lines printed above the function signature.
    fn function_header(
        &mut self,
        _ctx: &IrContext,
        _func: FuncRef,
        _names: &FunctionNames,
        _out: &mut String,
    ) {
    }

    /// Lines printed right after a block's label.
    fn block_start(&mut self, _ctx: &IrContext, _block: BlockRef, _out: &mut String) {}

    /// Lines printed after a block's last instruction.
    fn block_end(&mut self, _ctx: &IrContext, _block: BlockRef, _out: &mut String) {}

    /// Trailing comment for an instruction, without the leading `; `.
    fn inst_comment(&mut self, _ctx: &IrContext, _inst: InstRef) -> Option<String> {
        None
    }
}

/// An annotator that adds nothing.
pub struct NoAnnotations;

impl Annotator for NoAnnotations {}

/// Printable names for the values and blocks of one function.
///
/// Explicit names are kept (made unique with a `.N` suffix when they
/// collide); unnamed values are numbered and unlabeled blocks get `bbN`.
pub struct FunctionNames {
    values: HashMap<ValueRef, String>,
    blocks: HashMap<BlockRef, String>,
}

impl FunctionNames {
    pub fn new(ctx: &IrContext, func: FuncRef) -> Self {
        let mut locals: Vec<ValueRef> = ctx.func_params(func).to_vec();
        locals.extend(
            ctx.func_insts(func)
                .into_iter()
                .filter_map(|i| ctx.inst_result(i)),
        );

        let values = assign_names(locals.iter().map(|&v| (v, ctx.value_name(v))), |n| {
            n.to_string()
        });
        let blocks = assign_names(
            ctx.func_blocks(func).iter().map(|&b| (b, ctx.block_label(b))),
            |n| format!("bb{n}"),
        );
        Self { values, blocks }
    }

    fn empty() -> Self {
        Self {
            values: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    /// Local name of a parameter or instruction result, without `%`.
    pub fn local(&self, v: ValueRef) -> Option<&str> {
        self.values.get(&v).map(String::as_str)
    }

    pub fn block(&self, b: BlockRef) -> &str {
        self.blocks.get(&b).map(String::as_str).unwrap_or("bb?")
    }

    /// Operand text for `v`: `%name`, a literal, `@func` or `undef`.
    pub fn operand(&self, ctx: &IrContext, v: ValueRef) -> String {
        match ctx.value_def(v) {
            ValueDef::Inst(_) | ValueDef::Arg(..) => match self.local(v) {
                Some(name) => format!("%{name}"),
                None => "%?".to_owned(),
            },
            ValueDef::Const(ty, bits) => format_const(ty, bits),
            ValueDef::Func(f) => format!("@{}", ctx.func_name(f)),
            ValueDef::Undef(_) => "undef".to_owned(),
        }
    }
}

fn assign_names<'a, K: Copy + Eq + std::hash::Hash>(
    items: impl Iterator<Item = (K, Option<&'a str>)> + Clone,
    fresh: impl Fn(usize) -> String,
) -> HashMap<K, String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut names: HashMap<K, String> = HashMap::new();

    for (key, name) in items.clone() {
        let Some(name) = name else { continue };
        let mut candidate = name.to_owned();
        let mut n = 1;
        while used.contains(&candidate) {
            candidate = format!("{name}.{n}");
            n += 1;
        }
        used.insert(candidate.clone());
        names.insert(key, candidate);
    }

    let mut next = 0;
    for (key, name) in items {
        if name.is_some() {
            continue;
        }
        let mut candidate = fresh(next);
        while used.contains(&candidate) {
            next += 1;
            candidate = fresh(next);
        }
        next += 1;
        used.insert(candidate.clone());
        names.insert(key, candidate);
    }
    names
}

fn format_const(ty: Type, bits: u64) -> String {
    if ty == Type::I1 {
        if bits != 0 { "true" } else { "false" }.to_owned()
    } else {
        ty.sign_extend(bits).to_string()
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print one function (definition or declaration).
pub fn print_function(ctx: &IrContext, func: FuncRef, annotator: &mut dyn Annotator) -> String {
    let mut out = String::new();
    write_function(ctx, func, annotator, &mut out).expect("fmt::Write to String never fails");
    out
}

/// Print every function of a module, separated by blank lines.
pub fn print_module(ctx: &IrContext, module: ModuleRef) -> String {
    print_module_with(ctx, module, &mut NoAnnotations)
}

/// Print every function of a module through an annotator.
pub fn print_module_with(
    ctx: &IrContext,
    module: ModuleRef,
    annotator: &mut dyn Annotator,
) -> String {
    ctx.module_funcs(module)
        .iter()
        .map(|&f| print_function(ctx, f, annotator))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print a single instruction without indentation or annotations.
///
/// Names are resolved in the instruction's current function.
pub fn print_inst(ctx: &IrContext, inst: InstRef) -> String {
    let names = match ctx.inst_func(inst) {
        Some(f) => FunctionNames::new(ctx, f),
        None => FunctionNames::empty(),
    };
    let mut out = String::new();
    write_inst(ctx, &names, inst, &mut out).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Writers
// ============================================================================

fn write_function(
    ctx: &IrContext,
    func: FuncRef,
    annotator: &mut dyn Annotator,
    out: &mut String,
) -> fmt::Result {
    let sig = ctx.func_sig(func);
    if ctx.is_declaration(func) {
        write!(out, "declare {} @{}(", sig.ret, ctx.func_name(func))?;
        write_param_types(out, &sig.params, sig.variadic)?;
        return writeln!(out, ")");
    }

    let names = FunctionNames::new(ctx, func);
    annotator.function_header(ctx, func, &names, out);

    write!(out, "define {} @{}(", sig.ret, ctx.func_name(func))?;
    for (idx, &param) in ctx.func_params(func).iter().enumerate() {
        if idx > 0 {
            out.write_str(", ")?;
        }
        write!(out, "{} {}", ctx.value_ty(param), names.operand(ctx, param))?;
    }
    if sig.variadic {
        if !sig.params.is_empty() {
            out.write_str(", ")?;
        }
        out.write_str("...")?;
    }
    writeln!(out, ") {{")?;

    for &b in ctx.func_blocks(func) {
        writeln!(out, "{}:", names.block(b))?;
        annotator.block_start(ctx, b, out);
        for &i in ctx.block_insts(b) {
            out.write_str("  ")?;
            write_inst(ctx, &names, i, out)?;
            if let Some(comment) = annotator.inst_comment(ctx, i) {
                write!(out, " ; {comment}")?;
            }
            out.write_char('\n')?;
        }
        annotator.block_end(ctx, b, out);
    }
    writeln!(out, "}}")
}

fn write_param_types(out: &mut String, params: &[Type], variadic: bool) -> fmt::Result {
    for (idx, ty) in params.iter().enumerate() {
        if idx > 0 {
            out.write_str(", ")?;
        }
        write!(out, "{ty}")?;
    }
    if variadic {
        if !params.is_empty() {
            out.write_str(", ")?;
        }
        out.write_str("...")?;
    }
    Ok(())
}

fn write_inst(
    ctx: &IrContext,
    names: &FunctionNames,
    inst: InstRef,
    out: &mut String,
) -> fmt::Result {
    let data = ctx.inst(inst);
    let ops = &data.operands;
    let op = |idx: usize| names.operand(ctx, ops[idx]);

    if let Some(result) = ctx.inst_result(inst) {
        write!(out, "{} = ", names.operand(ctx, result))?;
    }

    match &data.kind {
        InstKind::Binary(bop) => write!(out, "{} {} {}, {}", bop.keyword(), data.ty, op(0), op(1)),
        InstKind::Icmp(pred) => write!(
            out,
            "icmp {} {} {}, {}",
            pred.keyword(),
            ctx.value_ty(ops[0]),
            op(0),
            op(1)
        ),
        InstKind::Select => write!(out, "select {} {}, {}, {}", data.ty, op(0), op(1), op(2)),
        InstKind::Phi => {
            write!(out, "phi {} ", data.ty)?;
            for (idx, (&v, &b)) in ops.iter().zip(&data.blocks).enumerate() {
                if idx > 0 {
                    out.write_str(", ")?;
                }
                write!(out, "[ {}, %{} ]", names.operand(ctx, v), names.block(b))?;
            }
            Ok(())
        }
        InstKind::Call(sig) => {
            write!(out, "call {} ", sig.ret)?;
            if sig.variadic {
                out.write_char('(')?;
                write_param_types(out, &sig.params, true)?;
                out.write_str(") ")?;
            }
            write!(out, "{}(", op(0))?;
            for (idx, &arg) in ops.iter().skip(1).enumerate() {
                if idx > 0 {
                    out.write_str(", ")?;
                }
                write!(out, "{} {}", ctx.value_ty(arg), names.operand(ctx, arg))?;
            }
            out.write_char(')')
        }
        InstKind::Alloca(ty) => write!(out, "alloca {ty}"),
        InstKind::Load => write!(out, "load {}, ptr {}", data.ty, op(0)),
        InstKind::Store => write!(out, "store {} {}, ptr {}", ctx.value_ty(ops[0]), op(0), op(1)),
        InstKind::Assume => write!(out, "assume i1 {}", op(0)),
        InstKind::Br => write!(out, "br label %{}", names.block(data.blocks[0])),
        InstKind::CondBr => write!(
            out,
            "br i1 {}, label %{}, label %{}",
            op(0),
            names.block(data.blocks[0]),
            names.block(data.blocks[1])
        ),
        InstKind::Ret => match ops.first() {
            Some(&v) => write!(out, "ret {} {}", ctx.value_ty(v), names.operand(ctx, v)),
            None => out.write_str("ret void"),
        },
        InstKind::Unreachable => out.write_str("unreachable"),
    }
}
