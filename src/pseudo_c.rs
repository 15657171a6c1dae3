//! A small C-like rendering of IR functions, one statement per instruction.
//!
//! The output is not meant to compile. It exists so that `dec` has
//! something to show and so that every statement, declaration and use can
//! be traced back to the instruction or argument it came from.

use magnifier_core::{Anchor, DecompiledFunction, Decompiler, Provenance, ProvenanceKind};
use magnifier_ir::{
    BinaryOp, FuncRef, FunctionNames, InstKind, InstRef, IntPredicate, IrContext, OwnedModule,
    Type, ValueDef, ValueRef,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct PseudoCDecompiler;

impl Decompiler for PseudoCDecompiler {
    fn decompile(
        &mut self,
        module: &OwnedModule,
        func: FuncRef,
    ) -> Result<DecompiledFunction, String> {
        let ctx = module.context();
        if !ctx.is_func_live(func) {
            return Err("function is not part of the module".to_owned());
        }
        let mut emitter = Emitter {
            ctx,
            names: FunctionNames::new(ctx, func),
            out: DecompiledFunction::default(),
        };
        emitter.function(func);
        Ok(emitter.out)
    }
}

fn c_type(ty: Type) -> String {
    match ty {
        Type::Void => "void".to_owned(),
        Type::Int(1) => "bool".to_owned(),
        Type::Int(width) => format!("int{width}_t"),
        Type::Ptr => "void *".to_owned(),
    }
}

/// IR names may contain dots or start with a digit; C identifiers may not.
fn identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, 'v');
    }
    ident
}

fn binary_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::UDiv | BinaryOp::SDiv => "/",
        BinaryOp::URem | BinaryOp::SRem => "%",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
        BinaryOp::Xor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::LShr | BinaryOp::AShr => ">>",
    }
}

fn is_unsigned(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::UDiv | BinaryOp::URem | BinaryOp::LShr)
}

fn comparison_operator(pred: IntPredicate) -> &'static str {
    match pred {
        IntPredicate::Eq => "==",
        IntPredicate::Ne => "!=",
        IntPredicate::Ult | IntPredicate::Slt => "<",
        IntPredicate::Ule | IntPredicate::Sle => "<=",
        IntPredicate::Ugt | IntPredicate::Sgt => ">",
        IntPredicate::Uge | IntPredicate::Sge => ">=",
    }
}

fn is_unsigned_comparison(pred: IntPredicate) -> bool {
    matches!(
        pred,
        IntPredicate::Ult | IntPredicate::Ule | IntPredicate::Ugt | IntPredicate::Uge
    )
}

struct Emitter<'a> {
    ctx: &'a IrContext,
    names: FunctionNames,
    out: DecompiledFunction,
}

impl Emitter<'_> {
    fn push(&mut self, text: &str) {
        self.out.code.push_str(text);
    }

    fn marked(&mut self, kind: ProvenanceKind, anchor: Anchor, text: &str) {
        let start = self.out.code.len();
        self.push(text);
        self.out.provenance.push(Provenance {
            range: start..self.out.code.len(),
            kind,
            anchor,
        });
    }

    fn local_name(&self, v: ValueRef) -> String {
        identifier(self.names.local(v).unwrap_or("?"))
    }

    fn function(&mut self, func: FuncRef) {
        let ctx = self.ctx;
        let sig = ctx.func_sig(func);
        self.push(&format!("{} {}(", c_type(sig.ret), identifier(ctx.func_name(func))));
        for (idx, &param) in ctx.func_params(func).iter().enumerate() {
            if idx > 0 {
                self.push(", ");
            }
            let anchor = Anchor::Argument(param);
            self.marked(ProvenanceKind::Type, anchor, &c_type(ctx.value_ty(param)));
            self.push(" ");
            let name = self.local_name(param);
            self.marked(ProvenanceKind::Value, anchor, &name);
        }
        if sig.variadic {
            self.push(if sig.params.is_empty() { "..." } else { ", ..." });
        }

        if ctx.is_declaration(func) {
            self.push(");\n");
            return;
        }
        self.push(") {\n");
        for &block in ctx.func_blocks(func) {
            let label = identifier(self.names.block(block));
            self.push(&format!("{label}:\n"));
            for &inst in ctx.block_insts(block) {
                self.push("  ");
                self.statement(inst);
                self.push("\n");
            }
        }
        self.push("}\n");
    }

    fn operand(&mut self, v: ValueRef) {
        match self.ctx.value_def(v) {
            ValueDef::Inst(def) => {
                let name = self.local_name(v);
                self.marked(ProvenanceKind::Use, Anchor::Instruction(def), &name);
            }
            ValueDef::Arg(..) => {
                let name = self.local_name(v);
                self.marked(ProvenanceKind::Use, Anchor::Argument(v), &name);
            }
            ValueDef::Const(Type::Int(1), bits) => {
                self.push(if bits != 0 { "true" } else { "false" });
            }
            ValueDef::Const(ty, bits) => self.push(&ty.sign_extend(bits).to_string()),
            ValueDef::Func(f) => {
                let name = identifier(self.ctx.func_name(f));
                self.push(&name);
            }
            ValueDef::Undef(_) => self.push("undef"),
        }
    }

    /// `T name = ` for instructions that produce a value.
    fn declaration(&mut self, inst: InstRef) {
        let Some(result) = self.ctx.inst_result(inst) else {
            return;
        };
        let anchor = Anchor::Instruction(inst);
        self.marked(ProvenanceKind::Type, anchor, &c_type(self.ctx.value_ty(result)));
        self.push(" ");
        let name = self.local_name(result);
        self.marked(ProvenanceKind::Value, anchor, &name);
        self.push(" = ");
    }

    fn statement(&mut self, inst: InstRef) {
        let ctx = self.ctx;
        let start = self.out.code.len();
        let ops = ctx.inst_operands(inst).to_vec();
        let blocks = ctx.inst(inst).blocks.clone();
        self.declaration(inst);

        match ctx.inst_kind(inst) {
            InstKind::Binary(op) => {
                if is_unsigned(*op) {
                    self.push(&format!("(u{})", c_type(ctx.inst_ty(inst))));
                }
                self.operand(ops[0]);
                self.push(&format!(" {} ", binary_operator(*op)));
                self.operand(ops[1]);
            }
            InstKind::Icmp(pred) => {
                if is_unsigned_comparison(*pred) {
                    self.push(&format!("(u{})", c_type(ctx.value_ty(ops[0]))));
                }
                self.operand(ops[0]);
                self.push(&format!(" {} ", comparison_operator(*pred)));
                self.operand(ops[1]);
            }
            InstKind::Select => {
                self.operand(ops[0]);
                self.push(" ? ");
                self.operand(ops[1]);
                self.push(" : ");
                self.operand(ops[2]);
            }
            InstKind::Phi => {
                self.push("phi(");
                for (idx, (&v, &b)) in ops.iter().zip(&blocks).enumerate() {
                    if idx > 0 {
                        self.push(", ");
                    }
                    let label = identifier(self.names.block(b));
                    self.push(&format!("{label}: "));
                    self.operand(v);
                }
                self.push(")");
            }
            InstKind::Call(_) => {
                match ctx.value_def(ops[0]) {
                    ValueDef::Func(_) => self.operand(ops[0]),
                    _ => {
                        self.push("(*");
                        self.operand(ops[0]);
                        self.push(")");
                    }
                }
                self.push("(");
                for (idx, &arg) in ops[1..].iter().enumerate() {
                    if idx > 0 {
                        self.push(", ");
                    }
                    self.operand(arg);
                }
                self.push(")");
            }
            InstKind::Alloca(ty) => self.push(&format!("alloca(sizeof({}))", c_type(*ty))),
            InstKind::Load => {
                self.push(&format!("*({} *)", c_type(ctx.inst_ty(inst))));
                self.operand(ops[0]);
            }
            InstKind::Store => {
                self.push(&format!("*({} *)", c_type(ctx.value_ty(ops[0]))));
                self.operand(ops[1]);
                self.push(" = ");
                self.operand(ops[0]);
            }
            InstKind::Assume => {
                self.push("__builtin_assume(");
                self.operand(ops[0]);
                self.push(")");
            }
            InstKind::Br => {
                let label = identifier(self.names.block(blocks[0]));
                self.push(&format!("goto {label}"));
            }
            InstKind::CondBr => {
                self.push("if (");
                self.operand(ops[0]);
                let (then, otherwise) = (
                    identifier(self.names.block(blocks[0])),
                    identifier(self.names.block(blocks[1])),
                );
                self.push(&format!(") goto {then}; else goto {otherwise}"));
            }
            InstKind::Ret => match ops.first() {
                Some(&v) => {
                    self.push("return ");
                    self.operand(v);
                }
                None => self.push("return"),
            },
            InstKind::Unreachable => self.push("__builtin_unreachable()"),
        }
        self.push(";");

        self.out.provenance.push(Provenance {
            range: start..self.out.code.len(),
            kind: ProvenanceKind::Statement,
            anchor: Anchor::Instruction(inst),
        });
    }
}
