//! Structural and use-chain verification.
//!
//! Two kinds of checks run per function:
//!
//! 1. **Structure**: every block ends in exactly one terminator, branch
//!    targets and phi blocks belong to the function, calls pass an argument
//!    count their signature accepts, and `ret` matches the return type.
//!
//! 2. **Values**: every operand is live and in scope (instruction results
//!    and arguments of this function only), and the use-chain stored in
//!    `IrContext` matches the operands exactly.

use std::collections::HashSet;
use std::fmt;

use crate::context::IrContext;
use crate::instructions::InstKind;
use crate::printer::print_inst;
use crate::refs::*;

/// One problem found by the verifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyError {
    /// Name of the function containing the problem.
    pub function_name: String,
    pub message: String,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}: {}", self.function_name, self.message)
    }
}

/// Result of verification.
#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    pub errors: Vec<VerifyError>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "verification passed");
        }
        writeln!(f, "{} error(s) found:", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

/// Verify every function of a module.
pub fn verify_module(ctx: &IrContext, module: ModuleRef) -> VerifyReport {
    let mut report = VerifyReport::default();
    for &f in ctx.module_funcs(module) {
        report.errors.extend(verify_function(ctx, f).errors);
    }
    report
}

/// Verify one function. Declarations trivially pass.
pub fn verify_function(ctx: &IrContext, func: FuncRef) -> VerifyReport {
    let mut checker = Checker {
        ctx,
        func,
        errors: Vec::new(),
    };
    if ctx.is_func_live(func) && !ctx.is_declaration(func) {
        checker.check_structure();
        checker.check_values();
    }
    VerifyReport {
        errors: checker.errors,
    }
}

struct Checker<'a> {
    ctx: &'a IrContext,
    func: FuncRef,
    errors: Vec<VerifyError>,
}

impl Checker<'_> {
    fn error(&mut self, message: String) {
        self.errors.push(VerifyError {
            function_name: self.ctx.func_name(self.func).to_owned(),
            message,
        });
    }

    fn describe(&self, inst: InstRef) -> String {
        format!("{inst} `{}`", print_inst(self.ctx, inst))
    }

    fn check_structure(&mut self) {
        let ctx = self.ctx;
        let blocks: HashSet<BlockRef> = ctx.func_blocks(self.func).iter().copied().collect();
        let ret_ty = ctx.func_sig(self.func).ret;

        for &b in ctx.func_blocks(self.func) {
            if ctx.block_func(b) != Some(self.func) {
                self.error(format!("{b} does not point back to its function"));
            }
            let insts = ctx.block_insts(b);
            if ctx.terminator(b).is_none() {
                self.error(format!("{b} has no terminator"));
            }
            for (pos, &i) in insts.iter().enumerate() {
                let data = ctx.inst(i);
                if !ctx.is_inst_live(i) || ctx.inst_block(i) != Some(b) {
                    self.error(format!("{i} is dead or not placed in {b}"));
                    continue;
                }
                if data.kind.is_terminator() && pos + 1 != insts.len() {
                    self.error(format!("terminator {} is not last in {b}", self.describe(i)));
                }
                for target in &data.blocks {
                    if !blocks.contains(target) {
                        self.error(format!("{} names foreign block {target}", self.describe(i)));
                    }
                }
                match &data.kind {
                    InstKind::Phi if data.blocks.len() != data.operands.len() => {
                        self.error(format!("{} has unpaired incoming values", self.describe(i)));
                    }
                    InstKind::Call(sig) if !sig.accepts_arg_count(ctx.call_args(i).len()) => {
                        let message =
                            format!("{} passes the wrong number of arguments", self.describe(i));
                        self.error(message);
                    }
                    InstKind::Ret => {
                        let found = data.operands.first().map(|&v| ctx.value_ty(v));
                        let expected = (!ret_ty.is_void()).then_some(ret_ty);
                        if found != expected {
                            self.error(format!("{} does not return {ret_ty}", self.describe(i)));
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_values(&mut self) {
        let ctx = self.ctx;
        let insts = ctx.func_insts(self.func);
        let mut defined: HashSet<ValueRef> = ctx.func_params(self.func).iter().copied().collect();
        defined.extend(insts.iter().filter_map(|&i| ctx.inst_result(i)));

        let mut actual: HashSet<(ValueRef, InstRef, u32)> = HashSet::new();
        for &i in &insts {
            for (idx, &v) in ctx.inst_operands(i).iter().enumerate() {
                actual.insert((v, i, idx as u32));
                if !ctx.is_value_live(v) {
                    self.error(format!("operand #{idx} of {} is dead ({v})", self.describe(i)));
                    continue;
                }
                let local = matches!(ctx.value_def(v), ValueDef::Inst(_) | ValueDef::Arg(..));
                if local && !defined.contains(&v) {
                    let message =
                        format!("operand #{idx} of {} is out of scope ({v})", self.describe(i));
                    self.error(message);
                }
                let found = ctx
                    .uses(v)
                    .iter()
                    .any(|u| u.user == i && u.operand_index == idx as u32);
                if !found {
                    self.error(format!(
                        "operand #{idx} of {i} uses {v} but no use-chain entry exists"
                    ));
                }
            }
        }

        for &v in &defined {
            for u in ctx.uses(v) {
                if !actual.contains(&(v, u.user, u.operand_index))
                    && ctx.inst_func(u.user) == Some(self.func)
                {
                    self.error(format!(
                        "use-chain of {v} lists operand #{} of {} which does not use it",
                        u.operand_index, u.user
                    ));
                }
                if ctx.inst_func(u.user) != Some(self.func) {
                    self.error(format!("{v} is used outside its function by {}", u.user));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InstData;
    use crate::parser::parse_module;
    use crate::types::Type;

    #[test]
    fn parsed_modules_verify() {
        let owned = parse_module(
            "m",
            "\
define i32 @f(i32 %a) {
entry:
  %c = icmp eq i32 %a, 0
  br i1 %c, label %z, label %nz
z:
  br label %nz
nz:
  %r = phi i32 [ 1, %z ], [ %a, %entry ]
  ret i32 %r
}
",
        )
        .unwrap();
        let report = verify_module(owned.context(), owned.module());
        assert!(report.is_ok(), "{report}");
    }

    #[test]
    fn reports_missing_terminator_and_foreign_values() {
        let mut owned = parse_module(
            "m",
            "\
define i32 @f(i32 %a) {
entry:
  ret i32 %a
}

define i32 @g(i32 %b) {
entry:
  ret i32 %b
}
",
        )
        .unwrap();
        let f = owned.func_by_name("f").unwrap();
        let g = owned.func_by_name("g").unwrap();
        let ctx = owned.context_mut();

        let ret = ctx.func_insts(g)[0];
        let foreign = ctx.func_param(f, 0);
        ctx.set_operand(ret, 0, foreign);
        let extra = ctx.create_block(Some("extra".into()));
        ctx.append_block(g, extra);
        let add = ctx.create_inst(
            InstData::new(InstKind::Binary(crate::BinaryOp::Add), Type::I32)
                .operands([foreign, foreign]),
        );
        ctx.append_inst(extra, add);

        let report = verify_function(ctx, g);
        assert!(!report.is_ok());
        let text = report.to_string();
        assert!(text.contains("has no terminator"), "{text}");
        assert!(text.contains("out of scope"), "{text}");
        assert!(verify_function(ctx, f).errors.iter().any(|e| e.message.contains("used outside")));
    }
}
