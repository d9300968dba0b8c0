//! WebAssembly pseudo-source decompiler.
//!
//! Turns a WebAssembly module into readable, high-level pseudo-source
//! text: stack operations fold back into nested expressions, control
//! constructs become block-structured statements, and memory accesses
//! render as field accesses where a struct layout can be recovered. The
//! output is meant for human eyes, not for re-parsing.
//!
//! # Architecture
//!
//! The pipeline has four stages, applied per module:
//!
//! 1. **Naming** (`naming`) — assigns readable identifiers to
//!    functions, globals, memories, tables, data segments, and locals.
//! 2. **AST reconstruction** (`ast`) — folds each function's linear
//!    instruction sequences back into an expression/statement tree,
//!    introducing temporaries where evaluation order demands them.
//! 3. **Layout inference** (`loadstore`) — observes every load/store
//!    per base pointer and recovers struct layouts where the access
//!    pattern is unambiguous.
//! 4. **Rendering** (`decompile`) — walks the module and renders each
//!    tree with the width-aware layout engine (`layout`), switching
//!    between inline and stacked forms around a soft target line width.

mod ast;
mod decompile;
mod layout;
mod loadstore;
mod naming;
mod opcodes;

use anyhow::{Context, Result};
use walrus::Module;

/// Options controlling the decompiler's output layout.
#[derive(Debug, Clone)]
pub struct DecompileOptions {
    /// Spaces per nesting level.
    pub indent_amount: usize,
    /// Soft line-width target used to pick inline vs stacked layouts.
    /// Long atoms can still exceed it.
    pub target_exp_width: usize,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        DecompileOptions { indent_amount: 2, target_exp_width: 70 }
    }
}

/// Decompile a parsed module into pseudo-source text.
///
/// The module is only read; one call processes it end to end.
pub fn decompile(module: &Module, options: &DecompileOptions) -> Result<String> {
    let mut decompiler = decompile::Decompiler::new(module, options);
    decompiler.run()
}

/// Parse a WASM binary and decompile it.
pub fn decompile_wasm(wasm: &[u8], options: &DecompileOptions) -> Result<String> {
    let module = Module::from_buffer(wasm).context("failed to parse WASM with walrus")?;
    decompile(&module, options)
}
