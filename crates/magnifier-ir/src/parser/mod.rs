//! Text format parser.
//!
//! # Two-stage parsing
//!
//! 1. **Raw parse**: winnow combinators in [`raw`] turn text into `Raw*`
//!    structures with unresolved names.
//! 2. **IR build**: `ModuleBuilder` resolves names and creates functions,
//!    blocks and instructions in an [`IrContext`].

mod raw;

use std::collections::HashMap;

use derive_more::{Display, Error};
use winnow::prelude::*;

use crate::clone::OwnedModule;
use crate::context::{InstData, IrContext};
use crate::instructions::InstKind;
use crate::refs::*;
use crate::types::{Signature, Type};
use raw::{RawBlock, RawFunction, RawInst, RawOp, RawOperand};

/// Parse error for the IR text format.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

/// Parse `input` as a module named `name` in a fresh context.
pub fn parse_module(name: &str, input: &str) -> Result<OwnedModule, ParseError> {
    let mut ctx = IrContext::new();
    let module = parse_module_into(&mut ctx, name, input)?;
    Ok(OwnedModule::from_parts(ctx, module))
}

/// Parse `input` as a new module of an existing context.
pub fn parse_module_into(
    ctx: &mut IrContext,
    name: &str,
    input: &str,
) -> Result<ModuleRef, ParseError> {
    let mut remaining = input;
    let funcs = raw::raw_module
        .parse_next(&mut remaining)
        .map_err(|e| ParseError {
            message: format!("syntax error: {e}"),
            offset: input.len() - remaining.len(),
        })?;
    if !remaining.is_empty() {
        return Err(ParseError {
            message: "unexpected input after last function".to_owned(),
            offset: input.len() - remaining.len(),
        });
    }

    let module = ctx.create_module(name);
    let mut builder = ModuleBuilder {
        ctx,
        module,
        input_len: input.len(),
        funcs: HashMap::new(),
    };
    builder.build(&funcs)?;
    Ok(module)
}

// ============================================================================
// ModuleBuilder (Raw -> IR)
// ============================================================================

struct ModuleBuilder<'c, 'a> {
    ctx: &'c mut IrContext,
    module: ModuleRef,
    input_len: usize,
    funcs: HashMap<&'a str, FuncRef>,
}

/// Per-function name scopes.
#[derive(Default)]
struct Scope<'a> {
    values: HashMap<&'a str, ValueRef>,
    blocks: HashMap<&'a str, BlockRef>,
}

impl<'c, 'a> ModuleBuilder<'c, 'a> {
    fn error(&self, rest: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            offset: self.input_len - rest,
        }
    }

    fn build(&mut self, funcs: &[RawFunction<'a>]) -> Result<(), ParseError> {
        // Declare everything first so calls may reference later functions.
        let mut declared = Vec::with_capacity(funcs.len());
        for raw in funcs {
            if self.funcs.contains_key(raw.name) {
                return Err(self.error(raw.rest, format!("duplicate function '@{}'", raw.name)));
            }
            let sig = Signature {
                params: raw.params.iter().map(|&(ty, _)| ty).collect(),
                ret: raw.ret,
                variadic: raw.variadic,
            };
            if sig.params.iter().any(|ty| ty.is_void()) {
                return Err(self.error(raw.rest, "parameter of type void"));
            }
            let func = self.ctx.create_function(self.module, raw.name, sig);
            self.funcs.insert(raw.name, func);
            declared.push(func);
        }

        for (raw, &func) in funcs.iter().zip(&declared) {
            if let Some(body) = &raw.body {
                self.build_body(raw, func, body)?;
            }
        }
        Ok(())
    }

    fn build_body(
        &mut self,
        raw: &RawFunction<'a>,
        func: FuncRef,
        body: &[RawBlock<'a>],
    ) -> Result<(), ParseError> {
        let mut scope = Scope::default();
        for (idx, &(_, name)) in raw.params.iter().enumerate() {
            let Some(name) = name else {
                return Err(self.error(
                    raw.rest,
                    format!("parameter {idx} of '@{}' is unnamed", raw.name),
                ));
            };
            let param = self.ctx.func_param(func, idx);
            if scope.values.insert(name, param).is_some() {
                return Err(self.error(raw.rest, format!("duplicate value '%{name}'")));
            }
            self.ctx.set_value_name(param, Some(name.to_owned()));
        }
        if body.is_empty() {
            return Err(self.error(raw.rest, format!("'@{}' has an empty body", raw.name)));
        }

        let mut blocks = Vec::with_capacity(body.len());
        for rb in body {
            let b = self.ctx.create_block(rb.label.map(str::to_owned));
            if let Some(label) = rb.label {
                if scope.blocks.insert(label, b).is_some() {
                    return Err(self.error(rb.rest, format!("duplicate block label '{label}'")));
                }
            }
            self.ctx.append_block(func, b);
            blocks.push(b);
        }

        // Pass 1: create instructions and bind result names.
        let mut created: Vec<(InstRef, &RawInst<'a>)> = Vec::new();
        for (rb, &b) in body.iter().zip(&blocks) {
            for ri in &rb.insts {
                let (kind, ty) = self.kind_and_type(&ri.op);
                let successors = self.successor_labels(&ri.op);
                let mut data = InstData::new(kind, ty);
                for label in successors {
                    let Some(&target) = scope.blocks.get(label) else {
                        return Err(self.error(ri.rest, format!("unknown block '%{label}'")));
                    };
                    data = data.block(target);
                }
                let inst = self.ctx.create_inst(data);
                self.ctx.append_inst(b, inst);

                match (ri.result, self.ctx.inst_result(inst)) {
                    (Some(name), Some(v)) => {
                        if scope.values.insert(name, v).is_some() {
                            return Err(self.error(ri.rest, format!("duplicate value '%{name}'")));
                        }
                        self.ctx.set_value_name(v, Some(name.to_owned()));
                    }
                    (Some(name), None) => {
                        return Err(self.error(
                            ri.rest,
                            format!("'%{name}' names an instruction without a result"),
                        ));
                    }
                    (None, _) => {}
                }
                created.push((inst, ri));
            }
        }

        // Pass 2: resolve operands now that every name is bound.
        for (inst, ri) in created {
            let operands = self.operands(&scope, ri)?;
            self.ctx.set_operands(inst, operands);
        }
        Ok(())
    }

    fn kind_and_type(&self, op: &RawOp<'a>) -> (InstKind, Type) {
        match op {
            RawOp::Binary(bop, ty, ..) => (InstKind::Binary(*bop), *ty),
            RawOp::Icmp(pred, ..) => (InstKind::Icmp(*pred), Type::I1),
            RawOp::Select(ty, ..) => (InstKind::Select, *ty),
            RawOp::Phi(ty, _) => (InstKind::Phi, *ty),
            RawOp::Call(call) => {
                let sig = match (&call.fn_type, call.callee) {
                    (Some((params, variadic)), _) => Signature {
                        params: params.clone(),
                        ret: call.ret,
                        variadic: *variadic,
                    },
                    (None, RawOperand::Global(name)) if self.funcs.contains_key(name) => {
                        self.ctx.func_sig(self.funcs[name]).clone()
                    }
                    (None, _) => Signature::new(call.args.iter().map(|&(ty, _)| ty), call.ret),
                };
                let ret = sig.ret;
                (InstKind::Call(sig), ret)
            }
            RawOp::Alloca(ty) => (InstKind::Alloca(*ty), Type::Ptr),
            RawOp::Load(ty, _) => (InstKind::Load, *ty),
            RawOp::Store(..) => (InstKind::Store, Type::Void),
            RawOp::Assume(_) => (InstKind::Assume, Type::Void),
            RawOp::Br(_) => (InstKind::Br, Type::Void),
            RawOp::CondBr(..) => (InstKind::CondBr, Type::Void),
            RawOp::Ret(_) => (InstKind::Ret, Type::Void),
            RawOp::Unreachable => (InstKind::Unreachable, Type::Void),
        }
    }

    fn successor_labels(&self, op: &RawOp<'a>) -> Vec<&'a str> {
        match op {
            RawOp::Phi(_, incoming) => incoming.iter().map(|&(_, b)| b).collect(),
            RawOp::Br(dest) => vec![*dest],
            RawOp::CondBr(_, t, f) => vec![*t, *f],
            _ => Vec::new(),
        }
    }

    fn operands(
        &mut self,
        scope: &Scope<'a>,
        ri: &RawInst<'a>,
    ) -> Result<Vec<ValueRef>, ParseError> {
        let rest = ri.rest;
        let mut resolve =
            |operand: RawOperand<'a>, ty: Type| self.resolve(scope, rest, operand, ty);
        let operands = match &ri.op {
            RawOp::Binary(_, ty, a, b) | RawOp::Icmp(_, ty, a, b) => {
                vec![resolve(*a, *ty)?, resolve(*b, *ty)?]
            }
            RawOp::Select(ty, c, a, b) => {
                vec![resolve(*c, Type::I1)?, resolve(*a, *ty)?, resolve(*b, *ty)?]
            }
            RawOp::Phi(ty, incoming) => incoming
                .iter()
                .map(|&(v, _)| resolve(v, *ty))
                .collect::<Result<_, _>>()?,
            RawOp::Call(call) => {
                let mut operands = vec![resolve(call.callee, Type::Ptr)?];
                for &(ty, v) in &call.args {
                    operands.push(resolve(v, ty)?);
                }
                operands
            }
            RawOp::Alloca(_) | RawOp::Br(_) | RawOp::Unreachable | RawOp::Ret(None) => Vec::new(),
            RawOp::Load(_, p) => vec![resolve(*p, Type::Ptr)?],
            RawOp::Store(ty, v, p) => vec![resolve(*v, *ty)?, resolve(*p, Type::Ptr)?],
            RawOp::Assume(c) | RawOp::CondBr(c, ..) => vec![resolve(*c, Type::I1)?],
            RawOp::Ret(Some((ty, v))) => vec![resolve(*v, *ty)?],
        };
        Ok(operands)
    }

    fn resolve(
        &mut self,
        scope: &Scope<'a>,
        rest: usize,
        operand: RawOperand<'a>,
        ty: Type,
    ) -> Result<ValueRef, ParseError> {
        let v = match operand {
            RawOperand::Local(name) => *scope
                .values
                .get(name)
                .ok_or_else(|| self.error(rest, format!("unknown value '%{name}'")))?,
            RawOperand::Global(name) => {
                let func = *self
                    .funcs
                    .get(name)
                    .ok_or_else(|| self.error(rest, format!("unknown function '@{name}'")))?;
                self.ctx.func_addr(func)
            }
            RawOperand::Int(bits) => {
                if !ty.is_int() {
                    return Err(self.error(rest, format!("integer literal used as {ty}")));
                }
                self.ctx.iconst(ty, bits)
            }
            RawOperand::Undef => {
                if ty.is_void() {
                    return Err(self.error(rest, "undef of type void"));
                }
                self.ctx.undef(ty)
            }
        };
        let actual = self.ctx.value_ty(v);
        if actual != ty {
            return Err(self.error(rest, format!("expected a value of type {ty}, found {actual}")));
        }
        Ok(v)
    }
}
