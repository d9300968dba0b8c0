//! Struct layout recovery from load/store access patterns.
//!
//! Within one function, every load and store whose address is a plain
//! local is recorded against that local. When the set of offsets seen on a
//! base covers a contiguous span of uniformly-typed fields, the base is
//! promoted to a struct pointer: its declaration gets an inline struct
//! type and its accesses render as `.field` instead of `[offset]:type`.

use std::collections::{BTreeMap, HashMap};

use walrus::LocalId;

use crate::ast::{ExprKind, Node, NodeKind};
use crate::naming::index_to_alpha_name;
use crate::opcodes;

/// Read-only layout queries answered during rendering, after
/// [`LoadStoreTracking::check_layouts`] has run.
pub(crate) trait LayoutQuery {
    /// Inline struct type for a local, if one was inferred (`GenStruct`).
    fn struct_type(&self, local: LocalId) -> Option<String>;

    /// Field name for an access at `offset` through `base` (`GenAccess`).
    fn field_access(&self, offset: u32, base: &Node) -> Option<String>;
}

#[derive(Debug, Default)]
pub(crate) struct LoadStoreTracking {
    vars: HashMap<LocalId, VarAccesses>,
}

#[derive(Debug, Default)]
struct VarAccesses {
    accesses: BTreeMap<u32, Access>,
    struct_layout: bool,
}

#[derive(Debug)]
struct Access {
    view: &'static str,
    byte_size: u32,
    align: u32,
    idx: u32,
    uniform: bool,
}

impl LoadStoreTracking {
    /// Record every load and store in the tree. Run once per function,
    /// before rendering.
    pub(crate) fn track(&mut self, node: &Node) {
        for child in &node.children {
            self.track(child);
        }
        match &node.kind {
            NodeKind::Expr(ExprKind::Load { kind, offset, align }) => {
                self.record(node, *offset, *align, opcodes::load_view(*kind), opcodes::load_size(*kind));
            }
            NodeKind::Expr(ExprKind::Store { kind, offset, align }) => {
                self.record(node, *offset, *align, opcodes::store_view(*kind), opcodes::store_size(*kind));
            }
            _ => {}
        }
    }

    fn record(&mut self, node: &Node, offset: u32, align: u32, view: &'static str, size: u32) {
        let Some(base) = node.children.first().and_then(base_local) else {
            return;
        };
        let var = self.vars.entry(base).or_default();
        let access = var.accesses.entry(offset).or_insert(Access {
            view,
            byte_size: size,
            align,
            idx: 0,
            uniform: true,
        });
        if access.view != view || access.byte_size != size {
            access.uniform = false;
        }
        access.view = view;
        access.byte_size = size;
        access.align = align;
    }

    /// Decide which bases get a struct layout: more than one offset,
    /// contiguous from zero, every slot uniformly typed.
    pub(crate) fn check_layouts(&mut self) {
        for var in self.vars.values_mut() {
            var.struct_layout = var.accesses.len() > 1;
            let mut expected_offset = 0;
            for (i, (offset, access)) in var.accesses.iter_mut().enumerate() {
                access.idx = i as u32;
                if !access.uniform || *offset != expected_offset {
                    var.struct_layout = false;
                    break;
                }
                expected_offset += access.byte_size;
            }
        }
    }

    /// Reset between functions.
    pub(crate) fn clear(&mut self) {
        self.vars.clear();
    }
}

impl LayoutQuery for LoadStoreTracking {
    fn struct_type(&self, local: LocalId) -> Option<String> {
        let var = self.vars.get(&local)?;
        if !var.struct_layout {
            return None;
        }
        let mut s = String::from("{ ");
        for (i, access) in var.accesses.values().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&index_to_alpha_name(access.idx as usize));
            s.push(':');
            s.push_str(access.view);
            if access.align != access.byte_size {
                s.push_str(&format!("@{}", access.align));
            }
        }
        s.push_str(" }");
        Some(s)
    }

    fn field_access(&self, offset: u32, base: &Node) -> Option<String> {
        let local = base_local(base)?;
        let var = self.vars.get(&local)?;
        if !var.struct_layout {
            return None;
        }
        var.accesses.get(&offset).map(|a| index_to_alpha_name(a.idx as usize))
    }
}

/// The base local of an address expression, when it is one we track.
// TODO: follow offset arithmetic (base + const) to widen coverage.
fn base_local(addr: &Node) -> Option<LocalId> {
    match &addr.kind {
        NodeKind::Expr(ExprKind::LocalGet(local) | ExprKind::LocalTee(local)) => Some(*local),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walrus::ir::{ExtendedLoad, LoadKind, StoreKind};
    use walrus::{Module, ValType};

    fn load_node(local: LocalId, kind: LoadKind, offset: u32, align: u32) -> Node {
        Node {
            kind: NodeKind::Expr(ExprKind::Load { kind, offset, align }),
            children: vec![Node::expr(ExprKind::LocalGet(local), Vec::new())],
        }
    }

    fn store_node(local: LocalId, kind: StoreKind, offset: u32, align: u32) -> Node {
        Node {
            kind: NodeKind::Expr(ExprKind::Store { kind, offset, align }),
            children: vec![
                Node::expr(ExprKind::LocalGet(local), Vec::new()),
                Node::expr(ExprKind::Const(walrus::ir::Value::I32(0)), Vec::new()),
            ],
        }
    }

    fn fresh_local() -> (Module, LocalId) {
        let mut module = Module::default();
        let local = module.locals.add(ValType::I32);
        (module, local)
    }

    #[test]
    fn contiguous_uniform_accesses_become_a_struct() {
        let (_m, p) = fresh_local();
        let mut lst = LoadStoreTracking::default();
        lst.track(&store_node(p, StoreKind::I32 { atomic: false }, 0, 4));
        lst.track(&load_node(p, LoadKind::I32_8 { kind: ExtendedLoad::ZeroExtend }, 4, 1));
        lst.check_layouts();

        assert_eq!(lst.struct_type(p).as_deref(), Some("{ a:i32, b:u8 }"));
        let base = Node::expr(ExprKind::LocalGet(p), Vec::new());
        assert_eq!(lst.field_access(0, &base).as_deref(), Some("a"));
        assert_eq!(lst.field_access(4, &base).as_deref(), Some("b"));
    }

    #[test]
    fn a_single_offset_is_not_a_struct() {
        let (_m, p) = fresh_local();
        let mut lst = LoadStoreTracking::default();
        lst.track(&load_node(p, LoadKind::I32 { atomic: false }, 0, 4));
        lst.check_layouts();
        assert!(lst.struct_type(p).is_none());
    }

    #[test]
    fn gaps_between_offsets_reject_the_layout() {
        let (_m, p) = fresh_local();
        let mut lst = LoadStoreTracking::default();
        lst.track(&load_node(p, LoadKind::I32 { atomic: false }, 0, 4));
        lst.track(&load_node(p, LoadKind::I32 { atomic: false }, 8, 4));
        lst.check_layouts();
        assert!(lst.struct_type(p).is_none());
        let base = Node::expr(ExprKind::LocalGet(p), Vec::new());
        assert!(lst.field_access(0, &base).is_none());
    }

    #[test]
    fn conflicting_view_types_reject_the_layout() {
        let (_m, p) = fresh_local();
        let mut lst = LoadStoreTracking::default();
        lst.track(&load_node(p, LoadKind::I32 { atomic: false }, 0, 4));
        lst.track(&load_node(p, LoadKind::F32, 0, 4));
        lst.track(&load_node(p, LoadKind::I32 { atomic: false }, 4, 4));
        lst.check_layouts();
        assert!(lst.struct_type(p).is_none());
    }

    #[test]
    fn non_natural_alignment_is_annotated_in_the_struct_type() {
        let (_m, p) = fresh_local();
        let mut lst = LoadStoreTracking::default();
        lst.track(&store_node(p, StoreKind::I32 { atomic: false }, 0, 1));
        lst.track(&store_node(p, StoreKind::I32 { atomic: false }, 4, 4));
        lst.check_layouts();
        assert_eq!(lst.struct_type(p).as_deref(), Some("{ a:i32@1, b:i32 }"));
    }

    #[test]
    fn clear_resets_per_function_state() {
        let (_m, p) = fresh_local();
        let mut lst = LoadStoreTracking::default();
        lst.track(&store_node(p, StoreKind::I32 { atomic: false }, 0, 4));
        lst.track(&store_node(p, StoreKind::I32 { atomic: false }, 4, 4));
        lst.check_layouts();
        assert!(lst.struct_type(p).is_some());
        lst.clear();
        assert!(lst.struct_type(p).is_none());
    }
}
