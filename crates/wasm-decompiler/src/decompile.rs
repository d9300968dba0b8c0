//! Expression rendering and the top-level module walk.
//!
//! This is the final stage of the pipeline. Each function body's
//! reconstructed tree is rendered bottom-up into [`Value`] fragments by
//! [`Decompiler::decompile_expr`], then the module walker emits memories,
//! globals, tables, data segments, and functions in order, gluing the
//! fragments into one output string.

use std::collections::HashMap;

use anyhow::{bail, ensure, Result};
use walrus::ir;
use walrus::{ConstExpr, ExportItem, FunctionKind, GlobalKind, LocalId, Module, ValType};

use crate::ast::{self, ExprKind, LabelKind, Node, NodeKind};
use crate::layout::{Layout, Value};
use crate::loadstore::{LayoutQuery, LoadStoreTracking};
use crate::naming::{index_to_alpha_name, local_names, temp_var_name, Names};
use crate::opcodes;
use crate::DecompileOptions;

/// Kind tag used for the name-based export lookup.
#[derive(Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Func,
    Table,
    Memory,
    Global,
}

impl EntityKind {
    fn matches(self, item: &ExportItem) -> bool {
        matches!(
            (self, item),
            (EntityKind::Func, ExportItem::Function(_))
                | (EntityKind::Table, ExportItem::Table(_))
                | (EntityKind::Memory, ExportItem::Memory(_))
                | (EntityKind::Global, ExportItem::Global(_))
        )
    }
}

pub(crate) struct Decompiler<'m> {
    module: &'m Module,
    layout: Layout,
    names: Names,
    lst: LoadStoreTracking,
    /// Local names of the function currently being rendered.
    cur_locals: Option<HashMap<LocalId, String>>,
}

impl<'m> Decompiler<'m> {
    pub(crate) fn new(module: &'m Module, options: &DecompileOptions) -> Self {
        Decompiler {
            module,
            layout: Layout {
                indent_amount: options.indent_amount,
                target_exp_width: options.target_exp_width,
            },
            names: Names::assign(module),
            lst: LoadStoreTracking::default(),
            cur_locals: None,
        }
    }

    fn local_name(&self, local: LocalId) -> String {
        self.cur_locals
            .as_ref()
            .and_then(|names| names.get(&local))
            .cloned()
            .unwrap_or_else(|| "l_unknown".to_string())
    }

    /// `name:type`, with the primitive type replaced by an inferred inline
    /// struct type when the tracker has one for this local.
    fn local_decl(&self, name: &str, ty: ValType, local: Option<LocalId>) -> String {
        let struct_type = local.and_then(|l| self.lst.struct_type(l));
        match struct_type {
            Some(s) => format!("{name}:{s}"),
            None => format!("{name}:{}", opcodes::value_type_name(ty)),
        }
    }

    /// Rewrite an address fragment as a memory access: either a recovered
    /// `.field`, or `[offset]:type` with an `@align` suffix when the access
    /// is not naturally aligned.
    fn load_store(
        &self,
        val: Value,
        addr: &Node,
        offset: u32,
        align: u32,
        view: &'static str,
        natural_align: u32,
    ) -> Value {
        let mut val = self.layout.bracket_if_needed(val);
        match self.lst.field_access(offset, addr) {
            Some(field) => val.append_to_last(&format!(".{field}")),
            None => {
                val.append_to_last(&format!("[{offset}]:{view}"));
                if align != natural_align {
                    val.append_to_last(&format!("@{align}"));
                }
            }
        }
        val
    }

    fn set(&self, mut args: Vec<Value>, name: &str) -> Result<Value> {
        let Some(mut child) = args.pop() else {
            bail!("assignment without a value operand");
        };
        child.needs_bracketing = true;
        Ok(self.layout.wrap_child(child, &format!("{name} = "), ""))
    }

    fn render_block(&self, body: Value, label: &str, keyword: &str) -> Value {
        let mut body = body;
        self.layout.indent_value(&mut body, self.layout.indent_amount, "");
        let needs_bracketing = body.needs_bracketing;
        let mut lines = vec![format!("{keyword} {label} {{")];
        lines.extend(body.lines);
        lines.push("}".to_string());
        Value::multi(lines, needs_bracketing)
    }

    fn render_if(&self, args: Vec<Value>) -> Result<Value> {
        ensure!(
            args.len() == 2 || args.len() == 3,
            "if expression expects a condition and one or two branches"
        );
        let mut iter = args.into_iter();
        let mut cond = iter.next().unwrap_or_else(Value::empty);
        let mut then = iter.next().unwrap_or_else(Value::empty);
        let els = iter.next();

        let mut multiline = cond.lines.len() > 1 || then.lines.len() > 1;
        let mut width = cond.width() + then.width();
        if let Some(e) = &els {
            width += e.width();
            multiline = multiline || e.lines.len() > 1;
        }
        multiline = multiline || width > self.layout.target_exp_width;

        if !multiline {
            let cond_line = cond.lines.first().map(String::as_str).unwrap_or("");
            let then_line = then.lines.first().map(String::as_str).unwrap_or("");
            let mut s = format!("if ({cond_line}) {{ {then_line} }}");
            if let Some(e) = &els {
                let else_line = e.lines.first().map(String::as_str).unwrap_or("");
                s.push_str(&format!(" else {{ {else_line} }}"));
            }
            return Ok(Value::single(s));
        }

        if let Some(first) = cond.lines.first_mut() {
            first.insert_str(0, "if (");
        } else {
            cond.lines.push("if (".to_string());
        }
        cond.append_to_last(") {");
        self.layout.indent_value(&mut then, self.layout.indent_amount, "");
        cond.lines.extend(then.lines);
        if let Some(mut e) = els {
            cond.lines.push("} else {".to_string());
            self.layout.indent_value(&mut e, self.layout.indent_amount, "");
            cond.lines.extend(e.lines);
        }
        cond.lines.push("}".to_string());
        Ok(cond)
    }

    /// Render one node, children first.
    pub(crate) fn decompile_expr(&self, node: &Node) -> Result<Value> {
        let mut args = Vec::with_capacity(node.children.len());
        for child in &node.children {
            args.push(self.decompile_expr(child)?);
        }
        match &node.kind {
            NodeKind::FlushToVars { var_start, var_count } => {
                let mut decls = String::from("let ");
                for i in 0..*var_count {
                    if i > 0 {
                        decls.push_str(", ");
                    }
                    decls.push_str(&temp_var_name(var_start + i));
                }
                decls.push_str(" = ");
                Ok(self.layout.wrap_nary(args, &decls, ""))
            }
            NodeKind::FlushedVar { var_start } => Ok(Value::single(temp_var_name(*var_start))),
            NodeKind::Statements => {
                let mut lines = Vec::new();
                for (child, mut stat) in node.children.iter().zip(args) {
                    // A trailing sequence result is an expression, not a
                    // statement.
                    if !matches!(child.kind, NodeKind::SeqResult) {
                        if let Some(last) = stat.lines.last_mut() {
                            if !last.ends_with('}') {
                                last.push(';');
                            }
                        }
                    }
                    lines.extend(stat.lines);
                }
                Ok(Value::multi(lines, false))
            }
            NodeKind::EndReturn => Ok(self.layout.wrap_nary(args, "return ", "")),
            NodeKind::SeqResult => {
                let Some(value) = args.pop() else {
                    bail!("sequence result without a value");
                };
                Ok(value)
            }
            NodeKind::Decl { local } => {
                let ty = self.module.locals.get(*local).ty();
                let decl = self.local_decl(&self.local_name(*local), ty, Some(*local));
                Ok(Value::single(format!("var {decl}")))
            }
            NodeKind::DeclInit { local } => {
                let Some(init) = args.pop() else {
                    bail!("initialized declaration without an initializer");
                };
                let ty = self.module.locals.get(*local).ty();
                let decl = self.local_decl(&self.local_name(*local), ty, Some(*local));
                Ok(self.layout.wrap_child(init, &format!("var {decl} = "), ""))
            }
            NodeKind::Uninitialized => bail!("uninitialized node reached during rendering"),
            NodeKind::Expr(kind) => self.decompile_op(kind, node, args),
        }
    }

    fn decompile_op(&self, kind: &ExprKind, node: &Node, mut args: Vec<Value>) -> Result<Value> {
        match kind {
            ExprKind::Const(value) => Ok(Value::single(const_to_string(value))),
            ExprKind::LocalGet(local) => Ok(Value::single(self.local_name(*local))),
            ExprKind::GlobalGet(global) => {
                Ok(Value::single(self.names.global(*global).to_string()))
            }
            ExprKind::LocalSet(local) => self.set(args, &self.local_name(*local)),
            ExprKind::GlobalSet(global) => self.set(args, self.names.global(*global)),
            ExprKind::LocalTee(local) => {
                // With its child flushed away a tee reads like a plain get.
                if args.is_empty() {
                    Ok(Value::single(self.local_name(*local)))
                } else {
                    self.set(args, &self.local_name(*local))
                }
            }
            ExprKind::Binary(op) => {
                let infix = format!(" {} ", opcodes::binop_token(*op));
                let args: [Value; 2] = args
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("binary expression expects two operands"))?;
                Ok(self.layout.wrap_binary(args, &infix, false))
            }
            ExprKind::Unary(op) => {
                let Some(child) = args.pop() else {
                    bail!("unary expression without an operand");
                };
                let prefix = format!("{}(", opcodes::unop_token(*op));
                Ok(self.layout.wrap_child(child, &prefix, ")"))
            }
            ExprKind::Convert(op) => {
                let prefix = format!("{}(", opcodes::unop_token(*op));
                Ok(self.layout.wrap_nary(args, &prefix, ")"))
            }
            ExprKind::Load { kind, offset, align } => {
                let Some(addr) = args.pop() else {
                    bail!("load without an address operand");
                };
                Ok(self.load_store(
                    addr,
                    &node.children[0],
                    *offset,
                    *align,
                    opcodes::load_view(*kind),
                    opcodes::load_size(*kind),
                ))
            }
            ExprKind::Store { kind, offset, align } => {
                ensure!(args.len() == 2, "store expects an address and a value");
                let value = args.pop().unwrap_or_else(Value::empty);
                let addr = args.pop().unwrap_or_else(Value::empty);
                let lhs = self.load_store(
                    addr,
                    &node.children[0],
                    *offset,
                    *align,
                    opcodes::store_view(*kind),
                    opcodes::store_size(*kind),
                );
                Ok(self.layout.wrap_binary([lhs, value], " = ", true))
            }
            ExprKind::If => self.render_if(args),
            ExprKind::Block { label } => {
                let Some(body) = args.pop() else {
                    bail!("block without a body");
                };
                Ok(self.render_block(body, label, "block"))
            }
            ExprKind::Loop { label } => {
                let Some(body) = args.pop() else {
                    bail!("loop without a body");
                };
                Ok(self.render_block(body, label, "loop"))
            }
            ExprKind::Br { label, target } => {
                let jmp = if *target == LabelKind::Loop { "continue" } else { "break" };
                Ok(Value::single(format!("{jmp} {label}")))
            }
            ExprKind::BrIf { label, target } => {
                let Some(cond) = args.pop() else {
                    bail!("conditional branch without a condition");
                };
                let jmp = if *target == LabelKind::Loop { "continue" } else { "break" };
                Ok(self.layout.wrap_child(cond, "if (", &format!(") {jmp} {label}")))
            }
            ExprKind::Return => Ok(self.layout.wrap_nary(args, "return ", "")),
            // Silently dropped results read better than an explicit drop.
            ExprKind::Drop => Ok(args.pop().unwrap_or_else(Value::empty)),
            ExprKind::Call(func) => {
                let prefix = format!("{}(", self.names.func(*func));
                Ok(self.layout.wrap_nary(args, &prefix, ")"))
            }
            ExprKind::CallIndirect => Ok(self.layout.wrap_nary(args, "call_indirect(", ")")),
            ExprKind::Select => Ok(self.layout.wrap_nary(args, "select(", ")")),
            ExprKind::MemorySize => Ok(self.layout.wrap_nary(args, "memory_size(", ")")),
            ExprKind::MemoryGrow => Ok(self.layout.wrap_nary(args, "memory_grow(", ")")),
            ExprKind::Unreachable => Ok(self.layout.wrap_nary(args, "unreachable(", ")")),
            ExprKind::RefFunc(func) => {
                Ok(Value::single(format!("ref_func({})", self.names.func(*func))))
            }
            ExprKind::Other(name) => Ok(self.layout.wrap_nary(args, &format!("{name}("), ")")),
        }
    }

    /// Render a constant expression to the single line it must occupy.
    fn init_exp(&self, expr: &ConstExpr) -> Result<String> {
        let node = ast::const_expr_node(expr);
        let val = self.decompile_expr(&node)?;
        ensure!(
            val.lines.len() == 1,
            "initializer expression must render to a single line"
        );
        Ok(val.lines.into_iter().next().unwrap_or_default())
    }

    /// Prepend `export ` / `import ` prefixes for the entity. The export
    /// lookup is by name, so an entity renamed away from its export entry
    /// shows up as un-exported.
    fn check_import_export(
        &self,
        out: &mut String,
        kind: EntityKind,
        is_import: bool,
        name: &str,
    ) -> bool {
        let is_export = self
            .module
            .exports
            .iter()
            .any(|e| e.name == name && kind.matches(&e.item));
        if is_export {
            out.push_str("export ");
        }
        if is_import {
            out.push_str("import ");
        }
        is_import
    }

    /// Walk the module and emit every top-level declaration.
    pub(crate) fn run(&mut self) -> Result<String> {
        let mut out = String::new();

        for memory in self.module.memories.iter() {
            let name = self.names.memory(memory.id()).to_string();
            let is_import =
                self.check_import_export(&mut out, EntityKind::Memory, memory.import.is_some(), &name);
            out.push_str(&format!("memory {name}"));
            if !is_import {
                // An undeclared maximum renders as 0, the unbounded marker.
                out.push_str(&format!(
                    "(initial: {}, max: {})",
                    memory.initial,
                    memory.maximum.unwrap_or(0)
                ));
            }
            out.push_str(";\n");
        }
        if self.module.memories.iter().next().is_some() {
            out.push('\n');
        }

        for global in self.module.globals.iter() {
            let name = self.names.global(global.id()).to_string();
            let is_import = matches!(global.kind, GlobalKind::Import(_));
            self.check_import_export(&mut out, EntityKind::Global, is_import, &name);
            out.push_str(&format!(
                "global {name}:{}",
                opcodes::value_type_name(global.ty)
            ));
            if let GlobalKind::Local(init) = &global.kind {
                out.push_str(&format!(" = {}", self.init_exp(init)?));
            }
            out.push_str(";\n");
        }
        if self.module.globals.iter().next().is_some() {
            out.push('\n');
        }

        for table in self.module.tables.iter() {
            let name = self.names.table(table.id()).to_string();
            let is_import =
                self.check_import_export(&mut out, EntityKind::Table, table.import.is_some(), &name);
            out.push_str(&format!(
                "table {name}:{}",
                opcodes::value_type_name(walrus::ValType::Ref(table.element_ty))
            ));
            if !is_import {
                out.push_str(&format!(
                    "(min: {}, max: {})",
                    table.initial,
                    table.maximum.unwrap_or(0)
                ));
            }
            out.push_str(";\n");
        }
        if self.module.tables.iter().next().is_some() {
            out.push('\n');
        }

        for segment in self.module.data.iter() {
            let name = self.names.data(segment.id()).to_string();
            match &segment.kind {
                walrus::DataKind::Active { offset, .. } => {
                    out.push_str(&format!(
                        "data {name}(offset: {}) = {};\n",
                        self.init_exp(offset)?,
                        binary_to_string(&segment.value)
                    ));
                }
                walrus::DataKind::Passive => {
                    out.push_str(&format!(
                        "data {name} = {};\n",
                        binary_to_string(&segment.value)
                    ));
                }
            }
        }
        if self.module.data.iter().next().is_some() {
            out.push('\n');
        }

        for func in self.module.funcs.iter() {
            let name = self.names.func(func.id()).to_string();
            let (is_import, ty_id, local_func) = match &func.kind {
                FunctionKind::Import(imp) => (true, imp.ty, None),
                FunctionKind::Local(lf) => (false, lf.ty(), Some(lf)),
                FunctionKind::Uninitialized(ty) => (false, *ty, None),
            };
            self.check_import_export(&mut out, EntityKind::Func, is_import, &name);

            // Build the body and run layout inference before the signature
            // is printed: parameter declarations already use the inferred
            // struct types.
            let mut body = None;
            if let Some(lf) = local_func {
                let results = self.module.types.get(ty_id).results().len();
                let root = ast::build_body(self.module, lf, results);
                self.lst.track(&root);
                self.lst.check_layouts();
                self.cur_locals = Some(local_names(lf));
                body = Some(root);
            }

            let ty = self.module.types.get(ty_id);
            out.push_str(&format!("function {name}("));
            for (i, param_ty) in ty.params().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let param_name = index_to_alpha_name(i);
                let local = local_func.map(|lf| lf.args[i]);
                out.push_str(&self.local_decl(&param_name, *param_ty, local));
            }
            out.push(')');
            let results = ty.results();
            match results.len() {
                0 => {}
                1 => out.push_str(&format!(":{}", opcodes::value_type_name(results[0]))),
                _ => {
                    out.push_str(":(");
                    for (i, result_ty) in results.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        out.push_str(opcodes::value_type_name(*result_ty));
                    }
                    out.push(')');
                }
            }

            match &body {
                None => out.push(';'),
                Some(root) => {
                    out.push_str(" {\n");
                    let mut val = self.decompile_expr(root)?;
                    self.layout.indent_value(&mut val, self.layout.indent_amount, "");
                    for line in &val.lines {
                        out.push_str(line);
                        out.push('\n');
                    }
                    out.push('}');
                }
            }
            out.push_str("\n\n");
            self.cur_locals = None;
            self.lst.clear();
        }

        Ok(out)
    }
}

fn const_to_string(value: &ir::Value) -> String {
    match value {
        ir::Value::I32(v) => v.to_string(),
        ir::Value::I64(v) => format!("{v}L"),
        ir::Value::F32(v) => format!("{}f", float_to_string(f64::from(*v))),
        ir::Value::F64(v) => float_to_string(*v),
        ir::Value::V128(_) => "V128".to_string(),
    }
}

/// Fixed-notation float with redundant trailing zeros removed, keeping at
/// least one fractional digit.
fn float_to_string(value: f64) -> String {
    let mut s = format!("{value:.6}");
    while s.len() > 2 && s.ends_with('0') && s.as_bytes()[s.len() - 2] != b'.' {
        s.pop();
    }
    s
}

/// Double-quoted data bytes: printable ASCII stays literal, the rest is
/// `\xx` with lowercase hex digits.
fn binary_to_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() + 2);
    s.push('"');
    for byte in bytes {
        if (0x20..=0x7e).contains(byte) {
            s.push(*byte as char);
        } else {
            s.push_str(&format!("\\{byte:02x}"));
        }
    }
    s.push('"');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_literals_keep_one_fractional_digit() {
        assert_eq!(float_to_string(42.0), "42.0");
        assert_eq!(float_to_string(0.5), "0.5");
        assert_eq!(float_to_string(-1.25), "-1.25");
        assert_eq!(float_to_string(0.0), "0.0");
        assert_eq!(float_to_string(-0.0), "-0.0");
    }

    #[test]
    fn float_literals_do_not_end_in_a_redundant_zero() {
        for x in [42.0_f64, 0.5, 3.125, -7.75, 100.0, 0.000001] {
            let s = float_to_string(x);
            assert!(s.contains('.'), "{s} has no fractional part");
            let bytes = s.as_bytes();
            if s.ends_with('0') {
                assert_eq!(bytes[bytes.len() - 2], b'.', "{s} ends with a redundant zero");
            }
        }
    }

    #[test]
    fn const_literals_carry_their_type_markers() {
        assert_eq!(const_to_string(&ir::Value::I32(-7)), "-7");
        assert_eq!(const_to_string(&ir::Value::I64(1)), "1L");
        assert_eq!(const_to_string(&ir::Value::F32(1.5)), "1.5f");
        assert_eq!(const_to_string(&ir::Value::F64(2.0)), "2.0");
        assert_eq!(const_to_string(&ir::Value::V128(9)), "V128");
    }

    #[test]
    fn binary_to_string_escapes_unprintable_bytes() {
        assert_eq!(binary_to_string(b"Hi\x00"), "\"Hi\\00\"");
        assert_eq!(binary_to_string(b"\xff"), "\"\\ff\"");
        assert_eq!(binary_to_string(b"a b~"), "\"a b~\"");
    }
}
