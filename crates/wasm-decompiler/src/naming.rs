//! Identifier assignment for module entities and function locals.
//!
//! Runs once before decompilation. Entities keep their name-section,
//! export, or import names when available (sanitized to identifier
//! characters); everything else gets a short generated name. Locals are
//! named alphabetically in declaration-then-first-use order, the way a
//! hand-written source file would name throwaway variables.

use std::collections::{HashMap, HashSet};

use walrus::ir::{self, dfs_in_order, Visitor};
use walrus::{
    DataId, ExportItem, FunctionId, FunctionKind, GlobalId, GlobalKind, LocalFunction, LocalId,
    MemoryId, Module, TableId,
};

/// Names for every module-level entity, assigned up front.
pub(crate) struct Names {
    funcs: HashMap<FunctionId, String>,
    globals: HashMap<GlobalId, String>,
    memories: HashMap<MemoryId, String>,
    tables: HashMap<TableId, String>,
    data: HashMap<DataId, String>,
}

impl Names {
    pub(crate) fn assign(module: &Module) -> Self {
        let mut export_names: HashMap<ExportKey, &str> = HashMap::new();
        for export in module.exports.iter() {
            export_names.entry(ExportKey::of(&export.item)).or_insert(&export.name);
        }

        let mut funcs = HashMap::new();
        for (i, func) in module.funcs.iter().enumerate() {
            let named = func
                .name
                .as_deref()
                .or_else(|| export_names.get(&ExportKey::Func(func.id())).copied())
                .or_else(|| match &func.kind {
                    FunctionKind::Import(imp) => Some(module.imports.get(imp.import).name.as_str()),
                    _ => None,
                });
            let name = match named {
                Some(n) => sanitize(n),
                None => format!("f{i}"),
            };
            funcs.insert(func.id(), name);
        }

        let mut globals = HashMap::new();
        for (i, global) in module.globals.iter().enumerate() {
            let named = export_names
                .get(&ExportKey::Global(global.id()))
                .copied()
                .or_else(|| match &global.kind {
                    GlobalKind::Import(id) => Some(module.imports.get(*id).name.as_str()),
                    GlobalKind::Local(_) => None,
                });
            let name = match named {
                Some(n) => sanitize(n),
                None => format!("g{i}"),
            };
            globals.insert(global.id(), name);
        }

        let mut memories = HashMap::new();
        for (i, memory) in module.memories.iter().enumerate() {
            let named = export_names
                .get(&ExportKey::Memory(memory.id()))
                .copied()
                .or_else(|| {
                    memory.import.map(|id| module.imports.get(id).name.as_str())
                });
            let name = match named {
                Some(n) => sanitize(n),
                None => format!("m{i}"),
            };
            memories.insert(memory.id(), name);
        }

        let mut tables = HashMap::new();
        for (i, table) in module.tables.iter().enumerate() {
            let named = export_names
                .get(&ExportKey::Table(table.id()))
                .copied()
                .or_else(|| table.import.map(|id| module.imports.get(id).name.as_str()));
            let name = match named {
                Some(n) => sanitize(n),
                None => format!("T{i}"),
            };
            tables.insert(table.id(), name);
        }

        let mut data = HashMap::new();
        let mut used_data_names = HashSet::new();
        for (i, segment) in module.data.iter().enumerate() {
            let mut name = match content_name(&segment.value) {
                Some(stem) => format!("d_{stem}"),
                None => format!("d_{i}"),
            };
            if !used_data_names.insert(name.clone()) {
                name = format!("{name}_{i}");
                used_data_names.insert(name.clone());
            }
            data.insert(segment.id(), name);
        }

        Names { funcs, globals, memories, tables, data }
    }

    pub(crate) fn func(&self, id: FunctionId) -> &str {
        self.funcs.get(&id).map(String::as_str).unwrap_or("f_unknown")
    }

    pub(crate) fn global(&self, id: GlobalId) -> &str {
        self.globals.get(&id).map(String::as_str).unwrap_or("g_unknown")
    }

    pub(crate) fn memory(&self, id: MemoryId) -> &str {
        self.memories.get(&id).map(String::as_str).unwrap_or("m_unknown")
    }

    pub(crate) fn table(&self, id: TableId) -> &str {
        self.tables.get(&id).map(String::as_str).unwrap_or("T_unknown")
    }

    pub(crate) fn data(&self, id: DataId) -> &str {
        self.data.get(&id).map(String::as_str).unwrap_or("d_unknown")
    }
}

#[derive(Hash, PartialEq, Eq)]
enum ExportKey {
    Func(FunctionId),
    Table(TableId),
    Memory(MemoryId),
    Global(GlobalId),
}

impl ExportKey {
    fn of(item: &ExportItem) -> Self {
        match item {
            ExportItem::Function(id) => ExportKey::Func(*id),
            ExportItem::Table(id) => ExportKey::Table(*id),
            ExportItem::Memory(id) => ExportKey::Memory(*id),
            ExportItem::Global(id) => ExportKey::Global(*id),
        }
    }
}

/// Alphabetic variable names: 0 → `a`, 25 → `z`, 26 → `aa`, …
pub(crate) fn index_to_alpha_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'a' + (index % 26) as u8);
        index /= 26;
        if index == 0 {
            break;
        }
        index -= 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_else(|_| "a".to_string())
}

/// Name of temporary `n` introduced when stack values are flushed.
pub(crate) fn temp_var_name(n: u32) -> String {
    format!("t{n}")
}

/// Per-function local names: parameters first, then body locals in
/// first-use order, all sharing one alphabetic sequence.
pub(crate) fn local_names(func: &LocalFunction) -> HashMap<LocalId, String> {
    struct Collector {
        seen: HashSet<LocalId>,
        order: Vec<LocalId>,
    }

    impl Collector {
        fn add(&mut self, local: LocalId) {
            if self.seen.insert(local) {
                self.order.push(local);
            }
        }
    }

    impl<'instr> Visitor<'instr> for Collector {
        fn visit_local_get(&mut self, instr: &ir::LocalGet) {
            self.add(instr.local);
        }

        fn visit_local_set(&mut self, instr: &ir::LocalSet) {
            self.add(instr.local);
        }

        fn visit_local_tee(&mut self, instr: &ir::LocalTee) {
            self.add(instr.local);
        }
    }

    let mut collector = Collector { seen: HashSet::new(), order: Vec::new() };
    for arg in &func.args {
        collector.add(*arg);
    }
    dfs_in_order(&mut collector, func, func.entry_block());

    collector
        .order
        .into_iter()
        .enumerate()
        .map(|(i, local)| (local, index_to_alpha_name(i)))
        .collect()
}

/// Replace anything that is not an identifier character; names must not
/// start with a digit.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Derive a data segment name stem from its leading printable bytes.
fn content_name(bytes: &[u8]) -> Option<String> {
    let stem: String = bytes
        .iter()
        .take(16)
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .map(|b| *b as char)
        .collect();
    if stem.len() >= 3 {
        Some(stem)
    } else {
        None
    }
}
