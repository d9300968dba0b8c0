//! High-level AST reconstructed from a function's structured instruction
//! sequences.
//!
//! The builder simulates the operand stack over walrus instruction
//! sequences, folding pushes and pops back into expression trees. When a
//! statement executes while values are still pending on the stack, the
//! pending values are flushed into numbered temporaries so that evaluation
//! order survives in the output.

use std::collections::{HashMap, HashSet};

use walrus::ir::{BinaryOp, Instr, InstrSeqId, InstrSeqType, LoadKind, StoreKind, UnaryOp};
use walrus::{ConstExpr, FunctionId, FunctionKind, GlobalId, LocalFunction, LocalId, Module};

use crate::opcodes;

/// Construct kind of an enclosing label, selecting `break` vs `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LabelKind {
    Block,
    Loop,
}

/// One node of the reconstructed tree.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) children: Vec<Node>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Node { kind, children: Vec::new() }
    }

    pub(crate) fn expr(kind: ExprKind, children: Vec<Node>) -> Self {
        Node { kind: NodeKind::Expr(kind), children }
    }
}

#[derive(Debug)]
pub(crate) enum NodeKind {
    /// An ordered sequence of statements.
    Statements,
    /// `let t{k}, t{k+1}, … = children`: temporaries introduced to
    /// preserve evaluation order across an intervening statement.
    FlushToVars { var_start: u32, var_count: u32 },
    /// A use of temporary `t{var_start}`.
    FlushedVar { var_start: u32 },
    /// Declaration of a local with no initializer.
    Decl { local: LocalId },
    /// Declaration of a local initialized by the single child.
    DeclInit { local: LocalId },
    /// Implicit return of the function-tail values.
    EndReturn,
    /// A result value a sequence leaves behind, held as the single child.
    /// It is an expression, not a statement, so it gets no terminator.
    SeqResult,
    /// An ordinary expression.
    Expr(ExprKind),
    /// Sentinel; reaching this during rendering is a bug.
    Uninitialized,
}

/// Expression kinds, each owning exactly the payload the renderer needs.
#[derive(Debug)]
pub(crate) enum ExprKind {
    Const(walrus::ir::Value),
    LocalGet(LocalId),
    LocalSet(LocalId),
    LocalTee(LocalId),
    GlobalGet(GlobalId),
    GlobalSet(GlobalId),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Convert(UnaryOp),
    Load { kind: LoadKind, offset: u32, align: u32 },
    Store { kind: StoreKind, offset: u32, align: u32 },
    /// Children: condition, then-branch, optional else-branch.
    If,
    Block { label: String },
    Loop { label: String },
    Br { label: String, target: LabelKind },
    BrIf { label: String, target: LabelKind },
    Return,
    Drop,
    Call(FunctionId),
    CallIndirect,
    Select,
    MemorySize,
    MemoryGrow,
    Unreachable,
    RefFunc(FunctionId),
    /// Anything without a dedicated rendering; shown as a call.
    Other(String),
}

struct Label {
    name: String,
    kind: LabelKind,
}

struct AstBuilder<'m> {
    module: &'m Module,
    func: &'m LocalFunction,
    num_results: usize,
    labels: HashMap<InstrSeqId, Label>,
    next_block: u32,
    next_loop: u32,
    next_temp: u32,
}

/// Build the statement tree for a function body.
pub(crate) fn build_body(module: &Module, func: &LocalFunction, num_results: usize) -> Node {
    let mut builder = AstBuilder {
        module,
        func,
        num_results,
        labels: HashMap::new(),
        next_block: 0,
        next_loop: 0,
        next_temp: 0,
    };
    let (mut stmts, mut values) = builder.build_seq_parts(func.entry_block());
    if num_results > 0 && !values.is_empty() {
        stmts.push(Node { kind: NodeKind::EndReturn, children: values });
    } else {
        stmts.append(&mut values);
    }
    let mut root = Node { kind: NodeKind::Statements, children: stmts };
    let params: HashSet<LocalId> = func.args.iter().copied().collect();
    apply_local_decls(&mut root, &params);
    root
}

/// Wrap a constant expression (global initializer, data/table offset)
/// into a one-node tree.
pub(crate) fn const_expr_node(expr: &ConstExpr) -> Node {
    match expr {
        ConstExpr::Value(v) => Node::expr(ExprKind::Const(*v), Vec::new()),
        ConstExpr::Global(g) => Node::expr(ExprKind::GlobalGet(*g), Vec::new()),
        ConstExpr::RefNull(_) => Node::expr(ExprKind::Other("ref_null".to_string()), Vec::new()),
        ConstExpr::RefFunc(f) => Node::expr(ExprKind::RefFunc(*f), Vec::new()),
    }
}

impl<'m> AstBuilder<'m> {
    fn build_seq_parts(&mut self, seq_id: InstrSeqId) -> (Vec<Node>, Vec<Node>) {
        let mut stmts = Vec::new();
        let mut stack = Vec::new();
        let func = self.func;
        for (instr, _) in &func.block(seq_id).instrs {
            self.build_instr(instr, &mut stack, &mut stmts);
        }
        (stmts, stack)
    }

    /// Build a sequence as a `Statements` node. The sequence's result
    /// values become trailing children wrapped in `SeqResult` so the
    /// renderer knows not to terminate them like statements.
    fn build_statements(&mut self, seq_id: InstrSeqId) -> Node {
        let (mut stmts, values) = self.build_seq_parts(seq_id);
        for value in values {
            stmts.push(Node { kind: NodeKind::SeqResult, children: vec![value] });
        }
        Node { kind: NodeKind::Statements, children: stmts }
    }

    fn build_instr(&mut self, instr: &Instr, stack: &mut Vec<Node>, stmts: &mut Vec<Node>) {
        match instr {
            Instr::Const(e) => stack.push(Node::expr(ExprKind::Const(e.value), Vec::new())),
            Instr::LocalGet(e) => {
                stack.push(Node::expr(ExprKind::LocalGet(e.local), Vec::new()));
            }
            Instr::GlobalGet(e) => {
                stack.push(Node::expr(ExprKind::GlobalGet(e.global), Vec::new()));
            }
            Instr::LocalTee(e) => {
                let args = pop_args(stack, 1);
                stack.push(Node::expr(ExprKind::LocalTee(e.local), args));
            }
            Instr::LocalSet(e) => {
                let args = pop_args(stack, 1);
                self.push_stmt(Node::expr(ExprKind::LocalSet(e.local), args), stack, stmts);
            }
            Instr::GlobalSet(e) => {
                let args = pop_args(stack, 1);
                self.push_stmt(Node::expr(ExprKind::GlobalSet(e.global), args), stack, stmts);
            }
            Instr::Binop(e) => {
                let args = pop_args(stack, 2);
                stack.push(Node::expr(ExprKind::Binary(e.op), args));
            }
            Instr::Unop(e) => {
                let args = pop_args(stack, 1);
                let kind = if opcodes::is_convert(e.op) {
                    ExprKind::Convert(e.op)
                } else {
                    ExprKind::Unary(e.op)
                };
                stack.push(Node::expr(kind, args));
            }
            Instr::Select(_) => {
                let args = pop_args(stack, 3);
                stack.push(Node::expr(ExprKind::Select, args));
            }
            Instr::Drop(_) => {
                let args = pop_args(stack, 1);
                self.push_stmt(Node::expr(ExprKind::Drop, args), stack, stmts);
            }
            Instr::Call(e) => {
                let (nparams, nresults) = self.func_arity(e.func);
                let args = pop_args(stack, nparams);
                let node = Node::expr(ExprKind::Call(e.func), args);
                if nresults == 0 {
                    self.push_stmt(node, stack, stmts);
                } else {
                    stack.push(node);
                }
            }
            Instr::CallIndirect(e) => {
                let ty = self.module.types.get(e.ty);
                let nparams = ty.params().len();
                let nresults = ty.results().len();
                let args = pop_args(stack, nparams + 1);
                let node = Node::expr(ExprKind::CallIndirect, args);
                if nresults == 0 {
                    self.push_stmt(node, stack, stmts);
                } else {
                    stack.push(node);
                }
            }
            Instr::Block(e) => {
                self.register_label(e.seq, LabelKind::Block);
                let body = self.build_statements(e.seq);
                let label = self.label_name(e.seq);
                let node = Node::expr(ExprKind::Block { label }, vec![body]);
                if self.seq_result_count(e.seq) == 0 {
                    self.push_stmt(node, stack, stmts);
                } else {
                    stack.push(node);
                }
            }
            Instr::Loop(e) => {
                self.register_label(e.seq, LabelKind::Loop);
                let body = self.build_statements(e.seq);
                let label = self.label_name(e.seq);
                let node = Node::expr(ExprKind::Loop { label }, vec![body]);
                if self.seq_result_count(e.seq) == 0 {
                    self.push_stmt(node, stack, stmts);
                } else {
                    stack.push(node);
                }
            }
            Instr::IfElse(e) => {
                let mut children = pop_args(stack, 1);
                self.register_label(e.consequent, LabelKind::Block);
                self.register_label(e.alternative, LabelKind::Block);
                children.push(self.build_statements(e.consequent));
                let else_empty = self.func.block(e.alternative).instrs.is_empty();
                if !else_empty {
                    children.push(self.build_statements(e.alternative));
                }
                let node = Node { kind: NodeKind::Expr(ExprKind::If), children };
                if self.seq_result_count(e.consequent) == 0 {
                    self.push_stmt(node, stack, stmts);
                } else {
                    stack.push(node);
                }
            }
            Instr::Br(e) => {
                let (label, target) = self.branch_target(e.block);
                self.push_stmt(Node::expr(ExprKind::Br { label, target }, Vec::new()), stack, stmts);
            }
            Instr::BrIf(e) => {
                let args = pop_args(stack, 1);
                let (label, target) = self.branch_target(e.block);
                self.push_stmt(Node::expr(ExprKind::BrIf { label, target }, args), stack, stmts);
            }
            Instr::BrTable(_) => {
                let args = pop_args(stack, 1);
                self.push_stmt(Node::expr(ExprKind::Other("br_table".to_string()), args), stack, stmts);
            }
            Instr::Return(_) => {
                let take = self.num_results.min(stack.len());
                let args = stack.split_off(stack.len() - take);
                self.push_stmt(Node::expr(ExprKind::Return, args), stack, stmts);
            }
            Instr::Unreachable(_) => {
                self.push_stmt(Node::expr(ExprKind::Unreachable, Vec::new()), stack, stmts);
            }
            Instr::Load(e) => {
                let args = pop_args(stack, 1);
                let kind = ExprKind::Load { kind: e.kind, offset: e.arg.offset, align: e.arg.align };
                stack.push(Node::expr(kind, args));
            }
            Instr::Store(e) => {
                let args = pop_args(stack, 2);
                let kind = ExprKind::Store { kind: e.kind, offset: e.arg.offset, align: e.arg.align };
                self.push_stmt(Node::expr(kind, args), stack, stmts);
            }
            Instr::MemorySize(_) => {
                stack.push(Node::expr(ExprKind::MemorySize, Vec::new()));
            }
            Instr::MemoryGrow(_) => {
                let args = pop_args(stack, 1);
                stack.push(Node::expr(ExprKind::MemoryGrow, args));
            }
            Instr::MemoryCopy(_) => {
                let args = pop_args(stack, 3);
                self.push_stmt(Node::expr(ExprKind::Other("memory_copy".to_string()), args), stack, stmts);
            }
            Instr::MemoryFill(_) => {
                let args = pop_args(stack, 3);
                self.push_stmt(Node::expr(ExprKind::Other("memory_fill".to_string()), args), stack, stmts);
            }
            Instr::MemoryInit(_) => {
                let args = pop_args(stack, 3);
                self.push_stmt(Node::expr(ExprKind::Other("memory_init".to_string()), args), stack, stmts);
            }
            Instr::DataDrop(_) => {
                self.push_stmt(Node::expr(ExprKind::Other("data_drop".to_string()), Vec::new()), stack, stmts);
            }
            Instr::TableGet(_) => {
                let args = pop_args(stack, 1);
                stack.push(Node::expr(ExprKind::Other("table_get".to_string()), args));
            }
            Instr::TableSet(_) => {
                let args = pop_args(stack, 2);
                self.push_stmt(Node::expr(ExprKind::Other("table_set".to_string()), args), stack, stmts);
            }
            Instr::TableSize(_) => {
                stack.push(Node::expr(ExprKind::Other("table_size".to_string()), Vec::new()));
            }
            Instr::TableGrow(_) => {
                let args = pop_args(stack, 2);
                stack.push(Node::expr(ExprKind::Other("table_grow".to_string()), args));
            }
            Instr::TableFill(_) => {
                let args = pop_args(stack, 3);
                self.push_stmt(Node::expr(ExprKind::Other("table_fill".to_string()), args), stack, stmts);
            }
            Instr::RefNull(_) => {
                stack.push(Node::expr(ExprKind::Other("ref_null".to_string()), Vec::new()));
            }
            Instr::RefIsNull(_) => {
                let args = pop_args(stack, 1);
                stack.push(Node::expr(ExprKind::Other("ref_is_null".to_string()), args));
            }
            Instr::RefFunc(e) => {
                stack.push(Node::expr(ExprKind::RefFunc(e.func), Vec::new()));
            }
            other => {
                // Vector and atomic instructions degrade to a generic
                // call-style node named after the opcode.
                let name = instr_fallback_name(other);
                stack.push(Node::expr(ExprKind::Other(name), Vec::new()));
            }
        }
    }

    /// Append a statement, flushing any still-pending stack values into
    /// temporaries first so they are evaluated before the statement runs.
    fn push_stmt(&mut self, node: Node, stack: &mut Vec<Node>, stmts: &mut Vec<Node>) {
        self.flush_stack(stack, stmts);
        stmts.push(node);
    }

    fn flush_stack(&mut self, stack: &mut Vec<Node>, stmts: &mut Vec<Node>) {
        if stack.is_empty() {
            return;
        }
        let var_start = self.next_temp;
        let var_count = stack.len() as u32;
        self.next_temp += var_count;
        let flushed = std::mem::take(stack);
        stmts.push(Node {
            kind: NodeKind::FlushToVars { var_start, var_count },
            children: flushed,
        });
        for i in 0..var_count {
            stack.push(Node::new(NodeKind::FlushedVar { var_start: var_start + i }));
        }
    }

    fn func_arity(&self, func: FunctionId) -> (usize, usize) {
        let ty_id = match &self.module.funcs.get(func).kind {
            FunctionKind::Import(imp) => imp.ty,
            FunctionKind::Local(lf) => lf.ty(),
            FunctionKind::Uninitialized(ty) => *ty,
        };
        let ty = self.module.types.get(ty_id);
        (ty.params().len(), ty.results().len())
    }

    fn seq_result_count(&self, seq_id: InstrSeqId) -> usize {
        match self.func.block(seq_id).ty {
            InstrSeqType::Simple(None) => 0,
            InstrSeqType::Simple(Some(_)) => 1,
            InstrSeqType::MultiValue(ty) => self.module.types.get(ty).results().len(),
        }
    }

    fn register_label(&mut self, seq: InstrSeqId, kind: LabelKind) {
        if self.labels.contains_key(&seq) {
            return;
        }
        let name = match kind {
            LabelKind::Block => {
                let name = format!("B{}", self.next_block);
                self.next_block += 1;
                name
            }
            LabelKind::Loop => {
                let name = format!("L{}", self.next_loop);
                self.next_loop += 1;
                name
            }
        };
        self.labels.insert(seq, Label { name, kind });
    }

    fn label_name(&self, seq: InstrSeqId) -> String {
        self.labels.get(&seq).map(|l| l.name.clone()).unwrap_or_default()
    }

    fn branch_target(&mut self, seq: InstrSeqId) -> (String, LabelKind) {
        // Branches to the function body itself land here unregistered.
        self.register_label(seq, LabelKind::Block);
        let label = &self.labels[&seq];
        (label.name.clone(), label.kind)
    }
}

/// Pop `n` argument nodes, padding with the sentinel when the stack is
/// short (only possible on trees this builder does not model, such as
/// blocks with parameters).
fn pop_args(stack: &mut Vec<Node>, n: usize) -> Vec<Node> {
    let take = n.min(stack.len());
    let mut args = stack.split_off(stack.len() - take);
    while args.len() < n {
        args.insert(0, Node::new(NodeKind::Uninitialized));
    }
    args
}

fn instr_fallback_name(instr: &Instr) -> String {
    let dbg = format!("{instr:?}");
    let variant = dbg.split(&['(', ' ', '{'][..]).next().unwrap_or("expr");
    crate::opcodes::snake_mnemonic(variant)
}

/// Turn first-assignments of locals into declarations.
///
/// A `local.set` that is a top-level statement and the local's first
/// reference becomes `DeclInit`; every other referenced non-parameter
/// local gets a bare `Decl` prepended to the body.
fn apply_local_decls(root: &mut Node, params: &HashSet<LocalId>) {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut decl_inits = HashSet::new();

    for child in root.children.iter_mut() {
        let set_target = match &child.kind {
            NodeKind::Expr(ExprKind::LocalSet(l)) => Some(*l),
            _ => None,
        };
        if let Some(local) = set_target {
            // The initializer runs before the assignment, so its
            // references come first.
            for c in &child.children {
                collect_local_refs(c, &mut seen, &mut order);
            }
            if !params.contains(&local) && seen.insert(local) {
                order.push(local);
                child.kind = NodeKind::DeclInit { local };
                decl_inits.insert(local);
            }
        } else {
            collect_local_refs(child, &mut seen, &mut order);
        }
    }

    let pre_decls: Vec<Node> = order
        .iter()
        .filter(|l| !params.contains(l) && !decl_inits.contains(l))
        .map(|l| Node::new(NodeKind::Decl { local: *l }))
        .collect();
    if !pre_decls.is_empty() {
        let mut children = pre_decls;
        children.append(&mut root.children);
        root.children = children;
    }
}

fn collect_local_refs(node: &Node, seen: &mut HashSet<LocalId>, order: &mut Vec<LocalId>) {
    for child in &node.children {
        collect_local_refs(child, seen, order);
    }
    if let NodeKind::Expr(
        ExprKind::LocalGet(local) | ExprKind::LocalSet(local) | ExprKind::LocalTee(local),
    ) = &node.kind
    {
        if seen.insert(*local) {
            order.push(*local);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse WAT, then build the tree for the last local function.
    fn build_wat(wat: &str) -> Node {
        let wasm = wat::parse_str(wat).expect("valid wat");
        let module = Module::from_buffer(&wasm).expect("valid wasm");
        let func = module
            .funcs
            .iter()
            .filter_map(|f| match &f.kind {
                FunctionKind::Local(lf) => Some(lf),
                _ => None,
            })
            .last()
            .expect("a local function");
        let results = module.types.get(func.ty()).results().len();
        build_body(&module, func, results)
    }

    #[test]
    fn constant_body_becomes_end_return() {
        let root = build_wat("(module (func (result i32) i32.const 42))");
        assert!(matches!(root.kind, NodeKind::Statements));
        assert_eq!(root.children.len(), 1);
        assert!(matches!(root.children[0].kind, NodeKind::EndReturn));
    }

    #[test]
    fn statement_with_pending_values_flushes_temporaries() {
        let root = build_wat(
            "(module
               (func $side)
               (func (result i32)
                 i32.const 1
                 call $side
                 i32.const 2
                 i32.add))",
        );
        let kinds: Vec<&NodeKind> = root.children.iter().map(|c| &c.kind).collect();
        assert!(matches!(kinds[0], NodeKind::FlushToVars { var_start: 0, var_count: 1 }));
        assert!(matches!(kinds[1], NodeKind::Expr(ExprKind::Call(_))));
        assert!(matches!(kinds[2], NodeKind::EndReturn));
    }

    #[test]
    fn first_top_level_set_becomes_decl_init() {
        let root = build_wat(
            "(module
               (func
                 (local i32)
                 i32.const 7
                 local.set 0
                 local.get 0
                 drop))",
        );
        assert!(matches!(root.children[0].kind, NodeKind::DeclInit { .. }));
    }

    #[test]
    fn conditionally_assigned_local_gets_a_pre_decl() {
        let root = build_wat(
            "(module
               (func (param i32)
                 (local i32)
                 local.get 0
                 if
                   i32.const 1
                   local.set 1
                 end
                 local.get 1
                 drop))",
        );
        assert!(matches!(root.children[0].kind, NodeKind::Decl { .. }));
    }

    #[test]
    fn sequence_result_values_are_marked() {
        let root = build_wat(
            "(module
               (func (param i32) (result i32)
                 local.get 0
                 if (result i32)
                   i32.const 1
                 else
                   i32.const 2
                 end))",
        );
        assert!(matches!(root.children[0].kind, NodeKind::EndReturn));
        let if_node = &root.children[0].children[0];
        let then_branch = &if_node.children[1];
        assert!(matches!(then_branch.kind, NodeKind::Statements));
        assert!(matches!(then_branch.children[0].kind, NodeKind::SeqResult));
    }

    #[test]
    fn loop_branches_resolve_to_loop_labels() {
        let root = build_wat(
            "(module (func loop br 0 end))",
        );
        let NodeKind::Expr(ExprKind::Loop { label }) = &root.children[0].kind else {
            panic!("expected loop node");
        };
        assert_eq!(label, "L0");
        let body = &root.children[0].children[0];
        let NodeKind::Expr(ExprKind::Br { label, target }) = &body.children[0].kind else {
            panic!("expected br node");
        };
        assert_eq!(label, "L0");
        assert_eq!(*target, LabelKind::Loop);
    }
}
