//! Raw (unresolved) parse structures and winnow combinators for the text format.
//!
//! This module is the "stage 1" parser: text → `Raw*` structs. Names are
//! kept as borrowed slices; resolving them to IR entities happens in the
//! builder.
//!
//! Positions are recorded as the length of the remaining input at the start
//! of an item, which the builder turns into a byte offset.

use winnow::ascii;
use winnow::combinator::{alt, cut_err, delimited, opt, preceded, repeat, separated, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

use crate::instructions::{BinaryOp, IntPredicate};
use crate::types::Type;

// ============================================================================
// Raw (unresolved) structures
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct RawFunction<'a> {
    pub rest: usize,
    pub name: &'a str,
    pub ret: Type,
    pub params: Vec<(Type, Option<&'a str>)>,
    pub variadic: bool,
    /// `None` for declarations.
    pub body: Option<Vec<RawBlock<'a>>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawBlock<'a> {
    pub rest: usize,
    pub label: Option<&'a str>,
    pub insts: Vec<RawInst<'a>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawInst<'a> {
    pub rest: usize,
    pub result: Option<&'a str>,
    pub op: RawOp<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawOperand<'a> {
    Local(&'a str),
    Global(&'a str),
    /// Two's complement bits; masked to the operand type by the builder.
    Int(u64),
    Undef,
}

#[derive(Debug, Clone)]
pub(crate) struct RawCall<'a> {
    pub ret: Type,
    /// Explicit `(params, variadic)` function type, if written.
    pub fn_type: Option<(Vec<Type>, bool)>,
    pub callee: RawOperand<'a>,
    pub args: Vec<(Type, RawOperand<'a>)>,
}

#[derive(Debug, Clone)]
pub(crate) enum RawOp<'a> {
    Binary(BinaryOp, Type, RawOperand<'a>, RawOperand<'a>),
    Icmp(IntPredicate, Type, RawOperand<'a>, RawOperand<'a>),
    Select(Type, RawOperand<'a>, RawOperand<'a>, RawOperand<'a>),
    Phi(Type, Vec<(RawOperand<'a>, &'a str)>),
    Call(RawCall<'a>),
    Alloca(Type),
    Load(Type, RawOperand<'a>),
    Store(Type, RawOperand<'a>, RawOperand<'a>),
    Assume(RawOperand<'a>),
    Br(&'a str),
    CondBr(RawOperand<'a>, &'a str, &'a str),
    Ret(Option<(Type, RawOperand<'a>)>),
    Unreachable,
}

// ============================================================================
// Winnow parsers
// ============================================================================

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

/// Skip whitespace and `;` line comments.
pub(crate) fn ws(input: &mut &str) -> ModalResult<()> {
    loop {
        take_while(0.., |c: char| c.is_ascii_whitespace())
            .void()
            .parse_next(input)?;
        if !input.starts_with(';') {
            return Ok(());
        }
        take_till(0.., '\n').void().parse_next(input)?;
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// A bare word: keywords, type names and block labels.
pub(crate) fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., is_name_char).parse_next(input)
}

fn keyword<'a>(expected: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        word.verify(|w: &str| w == expected)
            .void()
            .parse_next(input)
    }
}

/// `,` surrounded by optional whitespace.
fn comma(input: &mut &str) -> ModalResult<()> {
    (ws, ',', ws).void().parse_next(input)
}

/// Parse a local name: `%name`.
pub(crate) fn local<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded('%', take_while(1.., is_name_char)).parse_next(input)
}

/// Parse a global name: `@name`.
pub(crate) fn global<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded('@', take_while(1.., is_name_char)).parse_next(input)
}

/// Parse an integer literal (unsigned or negative via two's complement).
pub(crate) fn integer_lit(input: &mut &str) -> ModalResult<u64> {
    let negative = opt('-').parse_next(input)?.is_some();
    let value: u64 = ascii::dec_uint(input)?;
    if !negative {
        return Ok(value);
    }
    let i64_min_magnitude = i64::MAX as u64 + 1;
    if value > i64_min_magnitude {
        return backtrack();
    }
    Ok(value.wrapping_neg())
}

pub(crate) fn ty(input: &mut &str) -> ModalResult<Type> {
    word.verify_map(Type::from_keyword).parse_next(input)
}

pub(crate) fn operand<'a>(input: &mut &'a str) -> ModalResult<RawOperand<'a>> {
    alt((
        local.map(RawOperand::Local),
        global.map(RawOperand::Global),
        integer_lit.map(RawOperand::Int),
        word.verify_map(|w: &str| match w {
            "true" => Some(RawOperand::Int(1)),
            "false" => Some(RawOperand::Int(0)),
            "undef" => Some(RawOperand::Undef),
            _ => None,
        }),
    ))
    .parse_next(input)
}

/// `<ty> <operand>`
fn typed_operand<'a>(input: &mut &'a str) -> ModalResult<(Type, RawOperand<'a>)> {
    (ty, ws, operand)
        .map(|(t, _, v)| (t, v))
        .parse_next(input)
}

/// `label %name`
fn label_ref<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded((keyword("label"), ws), local).parse_next(input)
}

/// Parameter-type list of a function type: `(i32, ptr, ...)`.
fn fn_type_params(input: &mut &str) -> ModalResult<(Vec<Type>, bool)> {
    '('.parse_next(input)?;
    ws.parse_next(input)?;
    let mut params = Vec::new();
    if opt(')').parse_next(input)?.is_some() {
        return Ok((params, false));
    }
    loop {
        if opt("...").parse_next(input)?.is_some() {
            (ws, ')').void().parse_next(input)?;
            return Ok((params, true));
        }
        params.push(ty.parse_next(input)?);
        ws.parse_next(input)?;
        if opt(')').parse_next(input)?.is_some() {
            return Ok((params, false));
        }
        comma.parse_next(input)?;
    }
}

fn phi_incoming<'a>(input: &mut &'a str) -> ModalResult<(RawOperand<'a>, &'a str)> {
    delimited(
        ('[', ws),
        (operand, comma, local).map(|(v, _, b)| (v, b)),
        (ws, ']'),
    )
    .parse_next(input)
}

fn raw_call<'a>(input: &mut &'a str) -> ModalResult<RawCall<'a>> {
    let ret = ty.parse_next(input)?;
    ws.parse_next(input)?;
    let fn_type = opt(terminated(fn_type_params, ws)).parse_next(input)?;
    let callee = operand.parse_next(input)?;
    let args: Vec<_> = delimited(
        (ws, '(', ws),
        separated(0.., typed_operand, comma),
        (ws, ')'),
    )
    .parse_next(input)?;
    Ok(RawCall {
        ret,
        fn_type,
        callee,
        args,
    })
}

fn binary_operands<'a>(input: &mut &'a str) -> ModalResult<(Type, RawOperand<'a>, RawOperand<'a>)> {
    (ty, ws, operand, comma, operand)
        .map(|(t, _, a, _, b)| (t, a, b))
        .parse_next(input)
}

/// Parse the part of an instruction after its opcode.
fn inst_body<'a>(opcode: &'a str, input: &mut &'a str) -> ModalResult<RawOp<'a>> {
    let op = match opcode {
        "icmp" => {
            let pred = word
                .verify_map(IntPredicate::from_keyword)
                .parse_next(input)?;
            ws.parse_next(input)?;
            let (t, a, b) = binary_operands.parse_next(input)?;
            RawOp::Icmp(pred, t, a, b)
        }
        "select" => {
            let (t, _, c, _, a, _, b) =
                (ty, ws, operand, comma, operand, comma, operand).parse_next(input)?;
            RawOp::Select(t, c, a, b)
        }
        "phi" => {
            let t = ty.parse_next(input)?;
            ws.parse_next(input)?;
            let incoming: Vec<_> = separated(1.., phi_incoming, comma).parse_next(input)?;
            RawOp::Phi(t, incoming)
        }
        "call" => RawOp::Call(raw_call.parse_next(input)?),
        "alloca" => RawOp::Alloca(ty.parse_next(input)?),
        "load" => {
            let (t, _, _, p) =
                (ty, comma, keyword("ptr"), preceded(ws, operand)).parse_next(input)?;
            RawOp::Load(t, p)
        }
        "store" => {
            let ((t, v), _, _, p) =
                (typed_operand, comma, keyword("ptr"), preceded(ws, operand)).parse_next(input)?;
            RawOp::Store(t, v, p)
        }
        "assume" => {
            let c = preceded((keyword("i1"), ws), operand).parse_next(input)?;
            RawOp::Assume(c)
        }
        "br" => {
            if let Some(dest) = opt(label_ref).parse_next(input)? {
                RawOp::Br(dest)
            } else {
                let (_, _, c, _, t, _, f) = (
                    keyword("i1"),
                    ws,
                    operand,
                    comma,
                    label_ref,
                    comma,
                    label_ref,
                )
                    .parse_next(input)?;
                RawOp::CondBr(c, t, f)
            }
        }
        "ret" => {
            if opt(keyword("void")).parse_next(input)?.is_some() {
                RawOp::Ret(None)
            } else {
                RawOp::Ret(Some(typed_operand.parse_next(input)?))
            }
        }
        "unreachable" => RawOp::Unreachable,
        other => match BinaryOp::from_keyword(other) {
            Some(op) => {
                let (t, a, b) = binary_operands.parse_next(input)?;
                RawOp::Binary(op, t, a, b)
            }
            None => return backtrack(),
        },
    };
    Ok(op)
}

/// Parse one instruction: `[%name =] opcode ...`.
pub(crate) fn raw_inst<'a>(input: &mut &'a str) -> ModalResult<RawInst<'a>> {
    let rest = input.len();
    let result = opt(terminated(local, (ws, '=', ws))).parse_next(input)?;
    let opcode = word.parse_next(input)?;
    ws.parse_next(input)?;
    let op = inst_body(opcode, input)?;
    Ok(RawInst { rest, result, op })
}

/// Parse a function body: `{ [label:] inst* ... }`.
pub(crate) fn raw_body<'a>(input: &mut &'a str) -> ModalResult<Vec<RawBlock<'a>>> {
    '{'.parse_next(input)?;
    let mut blocks: Vec<RawBlock<'a>> = Vec::new();
    loop {
        ws.parse_next(input)?;
        if opt('}').parse_next(input)?.is_some() {
            return Ok(blocks);
        }
        let rest = input.len();
        if let Some(label) = opt(terminated(word, (ws, ':'))).parse_next(input)? {
            blocks.push(RawBlock {
                rest,
                label: Some(label),
                insts: Vec::new(),
            });
            continue;
        }
        let inst = raw_inst.parse_next(input)?;
        match blocks.last_mut() {
            Some(block) => block.insts.push(inst),
            None => blocks.push(RawBlock {
                rest,
                label: None,
                insts: vec![inst],
            }),
        }
    }
}

/// Parse a `define` or `declare` item.
pub(crate) fn raw_function<'a>(input: &mut &'a str) -> ModalResult<RawFunction<'a>> {
    let rest = input.len();
    let is_define = alt((
        keyword("define").value(true),
        keyword("declare").value(false),
    ))
    .parse_next(input)?;
    cut_err(|i: &mut &'a str| function_tail(rest, is_define, i)).parse_next(input)
}

/// Everything after `define`/`declare`; errors here are not backtracked.
fn function_tail<'a>(
    rest: usize,
    is_define: bool,
    input: &mut &'a str,
) -> ModalResult<RawFunction<'a>> {
    ws.parse_next(input)?;
    let ret = ty.parse_next(input)?;
    ws.parse_next(input)?;
    let name = global.parse_next(input)?;
    ws.parse_next(input)?;

    '('.parse_next(input)?;
    let mut params = Vec::new();
    let mut variadic = false;
    ws.parse_next(input)?;
    if opt(')').parse_next(input)?.is_none() {
        loop {
            ws.parse_next(input)?;
            if opt("...").parse_next(input)?.is_some() {
                variadic = true;
                (ws, ')').void().parse_next(input)?;
                break;
            }
            let t = ty.parse_next(input)?;
            let param_name = opt(preceded(ws, local)).parse_next(input)?;
            params.push((t, param_name));
            ws.parse_next(input)?;
            if opt(')').parse_next(input)?.is_some() {
                break;
            }
            ','.parse_next(input)?;
        }
    }

    let body = if is_define {
        ws.parse_next(input)?;
        Some(raw_body.parse_next(input)?)
    } else {
        None
    };
    Ok(RawFunction {
        rest,
        name,
        ret,
        params,
        variadic,
        body,
    })
}

/// Parse a whole module: a sequence of functions.
pub(crate) fn raw_module<'a>(input: &mut &'a str) -> ModalResult<Vec<RawFunction<'a>>> {
    let funcs: Vec<_> = repeat(0.., preceded(ws, raw_function)).parse_next(input)?;
    ws.parse_next(input)?;
    Ok(funcs)
}
