use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use walrus::{ExportItem, FunctionKind, GlobalKind, Module};

use wasm_decompiler::{decompile, DecompileOptions};

#[derive(Parser)]
#[command(name = "wasm-decompile")]
#[command(about = "Decompile WebAssembly modules into readable pseudo-source text")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompile a WASM file to pseudo-source text
    Decompile {
        /// Path to the input .wasm file
        #[arg(short, long)]
        input: PathBuf,

        /// Path to write the output (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Spaces per indentation level
        #[arg(long)]
        indent: Option<usize>,

        /// Soft target line width for expression layout
        #[arg(long)]
        width: Option<usize>,
    },
    /// Inspect module structure (functions, memories, globals) as JSON
    Inspect {
        /// Path to the input .wasm file
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decompile { input, output, indent, width } => {
            let module = read_module(&input)?;
            let mut options = DecompileOptions::default();
            if let Some(indent) = indent {
                options.indent_amount = indent;
            }
            if let Some(width) = width {
                options.target_exp_width = width;
            }
            let text = decompile(&module, &options)?;

            match output {
                Some(path) => {
                    fs::write(&path, &text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Decompiled output written to {}", path.display());
                }
                None => {
                    print!("{text}");
                }
            }
        }
        Commands::Inspect { input } => {
            let module = read_module(&input)?;
            let json = module_to_json(&module)?;
            println!("{json}");
        }
    }

    Ok(())
}

fn read_module(path: &PathBuf) -> Result<Module> {
    let wasm = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Module::from_buffer(&wasm).context("failed to parse WASM with walrus")
}

fn type_name(ty: walrus::ValType) -> &'static str {
    match ty {
        walrus::ValType::I32 => "i32",
        walrus::ValType::I64 => "i64",
        walrus::ValType::F32 => "f32",
        walrus::ValType::F64 => "f64",
        walrus::ValType::V128 => "v128",
        walrus::ValType::Ref(walrus::RefType::Funcref) => "funcref",
        walrus::ValType::Ref(walrus::RefType::Externref) => "externref",
        walrus::ValType::Ref(_) => unreachable!("unknown reference type"),
    }
}

// -- JSON serialization (CLI-only concern) --

fn module_to_json(module: &Module) -> Result<String> {
    let export_name = |item_matches: &dyn Fn(&ExportItem) -> bool| -> Option<String> {
        module
            .exports
            .iter()
            .find(|e| item_matches(&e.item))
            .map(|e| e.name.clone())
    };

    let functions: Vec<FunctionJson> = module
        .funcs
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let (imported, ty_id) = match &f.kind {
                FunctionKind::Import(imp) => (true, imp.ty),
                FunctionKind::Local(lf) => (false, lf.ty()),
                FunctionKind::Uninitialized(ty) => (false, *ty),
            };
            let ty = module.types.get(ty_id);
            let id = f.id();
            FunctionJson {
                name: f.name.clone().unwrap_or_else(|| format!("f{i}")),
                params: ty.params().iter().map(|t| type_name(*t).to_string()).collect(),
                results: ty.results().iter().map(|t| type_name(*t).to_string()).collect(),
                imported,
                export: export_name(&|item| matches!(item, ExportItem::Function(fid) if *fid == id)),
            }
        })
        .collect();

    let memories: Vec<MemoryJson> = module
        .memories
        .iter()
        .map(|m| MemoryJson {
            initial: m.initial,
            max: m.maximum,
            imported: m.import.is_some(),
        })
        .collect();

    let globals: Vec<GlobalJson> = module
        .globals
        .iter()
        .map(|g| GlobalJson {
            r#type: type_name(g.ty).to_string(),
            mutable: g.mutable,
            imported: matches!(g.kind, GlobalKind::Import(_)),
        })
        .collect();

    let tables: Vec<TableJson> = module
        .tables
        .iter()
        .map(|t| TableJson {
            element_type: type_name(walrus::ValType::Ref(t.element_ty)).to_string(),
            min: t.initial,
            max: t.maximum,
            imported: t.import.is_some(),
        })
        .collect();

    let data: Vec<DataJson> = module
        .data
        .iter()
        .map(|d| DataJson { size: d.value.len() })
        .collect();

    let output = ModuleJson { functions, memories, globals, tables, data };
    serde_json::to_string_pretty(&output).context("failed to serialize")
}

// -- JSON types --

#[derive(Serialize)]
struct ModuleJson {
    functions: Vec<FunctionJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    memories: Vec<MemoryJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    globals: Vec<GlobalJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tables: Vec<TableJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    data: Vec<DataJson>,
}

#[derive(Serialize)]
struct FunctionJson {
    name: String,
    params: Vec<String>,
    results: Vec<String>,
    imported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    export: Option<String>,
}

#[derive(Serialize)]
struct MemoryJson {
    initial: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u64>,
    imported: bool,
}

#[derive(Serialize)]
struct GlobalJson {
    r#type: String,
    mutable: bool,
    imported: bool,
}

#[derive(Serialize)]
struct TableJson {
    element_type: String,
    min: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u64>,
    imported: bool,
}

#[derive(Serialize)]
struct DataJson {
    size: usize,
}
