//! Function cloning and module import.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::body::BodyTemplate;
use crate::context::IrContext;
use crate::refs::*;

/// Old-to-new correspondence produced by [`clone_function`].
#[derive(Debug, Clone)]
pub struct CloneMap {
    pub func: FuncRef,
    pub blocks: HashMap<BlockRef, BlockRef>,
    pub insts: HashMap<InstRef, InstRef>,
    /// `(old, new)` argument values in parameter order.
    pub args: Vec<(ValueRef, ValueRef)>,
}

/// Copy `func` into a new function of the same module.
///
/// The clone gets a fresh name (`name.N`). Calls inside the body keep their
/// targets, including recursive calls to `func` itself.
pub fn clone_function(ctx: &mut IrContext, func: FuncRef) -> CloneMap {
    let module = ctx.func_module(func);
    let name = ctx.unique_func_name(module, ctx.func_name(func));
    let sig = ctx.func_sig(func).clone();
    let new_func = ctx.create_function(module, name, sig);
    copy_param_names(ctx, func, new_func);

    let template = BodyTemplate::capture(ctx, func);
    let params = ctx.func_params(new_func).to_vec();
    let body = template.instantiate(ctx, &params, |f| f);
    for &b in &body.blocks {
        ctx.append_block(new_func, b);
    }

    debug!(
        from = ctx.func_name(func),
        to = ctx.func_name(new_func),
        insts = body.inst_map.len(),
        "cloned function"
    );
    CloneMap {
        func: new_func,
        blocks: body.block_map,
        insts: body.inst_map,
        args: ctx
            .func_params(func)
            .iter()
            .copied()
            .zip(params)
            .collect(),
    }
}

fn copy_param_names(ctx: &mut IrContext, from: FuncRef, to: FuncRef) {
    let names: Vec<Option<String>> = ctx
        .func_params(from)
        .iter()
        .map(|&v| ctx.value_name(v).map(str::to_owned))
        .collect();
    let params = ctx.func_params(to).to_vec();
    for (v, name) in params.into_iter().zip(names) {
        ctx.set_value_name(v, name);
    }
}

/// A module together with the context that owns it.
///
/// This is the unit of ownership transfer: parsing produces one, the
/// explorer consumes one, and a decompiler receives one.
pub struct OwnedModule {
    ctx: IrContext,
    module: ModuleRef,
}

impl OwnedModule {
    /// A fresh, empty module in its own context.
    pub fn new(name: impl Into<String>) -> Self {
        let mut ctx = IrContext::new();
        let module = ctx.create_module(name);
        Self { ctx, module }
    }

    pub fn from_parts(ctx: IrContext, module: ModuleRef) -> Self {
        Self { ctx, module }
    }

    pub fn context(&self) -> &IrContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut IrContext {
        &mut self.ctx
    }

    pub fn module(&self) -> ModuleRef {
        self.module
    }

    pub fn name(&self) -> &str {
        self.ctx.module_name(self.module)
    }

    pub fn func_by_name(&self, name: &str) -> Option<FuncRef> {
        self.ctx.func_by_name(self.module, name)
    }

    pub fn into_parts(self) -> (IrContext, ModuleRef) {
        (self.ctx, self.module)
    }
}

impl fmt::Debug for OwnedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let funcs: Vec<&str> = self
            .ctx
            .module_funcs(self.module)
            .iter()
            .map(|&func| self.ctx.func_name(func))
            .collect();
        f.debug_struct("OwnedModule")
            .field("name", &self.name())
            .field("funcs", &funcs)
            .finish()
    }
}

/// Source-to-destination correspondence produced by module import.
#[derive(Debug, Clone)]
pub struct ImportMap {
    pub module: ModuleRef,
    pub funcs: HashMap<FuncRef, FuncRef>,
    pub blocks: HashMap<BlockRef, BlockRef>,
    pub insts: HashMap<InstRef, InstRef>,
    /// Argument values, keyed by source value.
    pub args: HashMap<ValueRef, ValueRef>,
}

/// Copy `module` of `src` into a new module of `dst`.
///
/// Functions from other modules that the imported bodies reference are
/// declared in the new module under their own names.
pub fn import_module_into(dst: &mut IrContext, src: &IrContext, module: ModuleRef) -> ImportMap {
    let new_module = dst.create_module(src.module_name(module));
    let mut map = ImportMap {
        module: new_module,
        funcs: HashMap::new(),
        blocks: HashMap::new(),
        insts: HashMap::new(),
        args: HashMap::new(),
    };

    let declare = |dst: &mut IrContext, map: &mut ImportMap, f: FuncRef| {
        if map.funcs.contains_key(&f) {
            return;
        }
        let name = dst.unique_func_name(new_module, src.func_name(f));
        let g = dst.create_function(new_module, name, src.func_sig(f).clone());
        for (&old, &new) in src.func_params(f).iter().zip(dst.func_params(g).to_vec().iter()) {
            dst.set_value_name(new, src.value_name(old).map(str::to_owned));
            map.args.insert(old, new);
        }
        map.funcs.insert(f, g);
    };

    for &f in src.module_funcs(module) {
        declare(dst, &mut map, f);
    }
    for &f in src.module_funcs(module) {
        for i in src.func_insts(f) {
            for &v in src.inst_operands(i) {
                if let Some(g) = src.as_func(v) {
                    declare(dst, &mut map, g);
                }
            }
        }
    }

    for &f in src.module_funcs(module) {
        if src.is_declaration(f) {
            continue;
        }
        let g = map.funcs[&f];
        let template = BodyTemplate::capture(src, f);
        let params = dst.func_params(g).to_vec();
        let body = template.instantiate(dst, &params, |h| map.funcs[&h]);
        for &b in &body.blocks {
            dst.append_block(g, b);
        }
        map.blocks.extend(body.block_map);
        map.insts.extend(body.inst_map);
    }

    debug!(
        module = src.module_name(module),
        funcs = map.funcs.len(),
        "imported module"
    );
    map
}

/// Copy `module` of `src` into a fresh context.
pub fn import_module(src: &IrContext, module: ModuleRef) -> (OwnedModule, ImportMap) {
    let mut ctx = IrContext::new();
    let map = import_module_into(&mut ctx, src, module);
    let owned = OwnedModule::from_parts(ctx, map.module);
    (owned, map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use crate::printer::{NoAnnotations, print_function, print_module};

    const SRC: &str = "\
declare i32 @ext(i32)

define i32 @f(i32 %x) {
entry:
  %c = icmp slt i32 %x, 0
  br i1 %c, label %neg, label %done
neg:
  %y = call i32 @ext(i32 %x)
  br label %done
done:
  %r = phi i32 [ %x, %entry ], [ %y, %neg ]
  ret i32 %r
}
";

    #[test]
    fn clone_copies_body_and_renames() {
        let mut owned = parse_module("m", SRC).unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ctx = owned.context_mut();

        let map = clone_function(ctx, f);
        assert_eq!(ctx.func_name(map.func), "f.1");
        assert_eq!(map.insts.len(), ctx.func_inst_count(f));
        assert_eq!(map.blocks.len(), 3);
        assert_eq!(ctx.value_name(map.args[0].1), Some("x"));

        let original = print_function(ctx, f, &mut NoAnnotations);
        let cloned = print_function(ctx, map.func, &mut NoAnnotations);
        assert_eq!(original.replace("@f(", "@f.1("), cloned);
    }

    #[test]
    fn clone_keeps_call_targets() {
        let mut owned = parse_module("m", SRC).unwrap();
        let f = owned.func_by_name("f").unwrap();
        let ext = owned.func_by_name("ext").unwrap();
        let ctx = owned.context_mut();

        let map = clone_function(ctx, f);
        let calls: Vec<_> = ctx
            .func_insts(map.func)
            .into_iter()
            .filter_map(|i| ctx.call_callee(i))
            .collect();
        assert_eq!(calls, vec![ext]);
    }

    #[test]
    fn import_reproduces_module_text() {
        let owned = parse_module("m", SRC).unwrap();
        let (copy, map) = import_module(owned.context(), owned.module());

        assert_eq!(map.funcs.len(), 2);
        assert_eq!(
            print_module(owned.context(), owned.module()),
            print_module(copy.context(), copy.module())
        );
    }

    #[test]
    fn owned_modules_debug_as_their_function_names() {
        let owned = parse_module("m", SRC).unwrap();
        assert_eq!(
            format!("{owned:?}"),
            r#"OwnedModule { name: "m", funcs: ["ext", "f"] }"#
        );
    }
}
