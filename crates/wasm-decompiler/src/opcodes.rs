//! Opcode metadata: decomp tokens, memory-view type names, and access sizes.
//!
//! Decomp tokens are the wasm mnemonic with `.` replaced by `_`
//! (`i32.add` becomes `i32_add`). Scalar conversion opcodes are mapped
//! explicitly because walrus spells them operand-first; everything else
//! derives its token from the walrus op name.

use walrus::ir::{BinaryOp, ExtendedLoad, LoadKind, StoreKind, UnaryOp};
use walrus::{RefType, ValType};

/// Name of a value type as it appears in signatures and declarations.
pub(crate) fn value_type_name(ty: ValType) -> &'static str {
    match ty {
        ValType::I32 => "i32",
        ValType::I64 => "i64",
        ValType::F32 => "f32",
        ValType::F64 => "f64",
        ValType::V128 => "v128",
        ValType::Ref(RefType::Funcref) => "funcref",
        ValType::Ref(RefType::Externref) => "externref",
        ValType::Ref(_) => unreachable!("unknown reference type"),
    }
}

/// Lower a camel-case walrus op name to a wasm-style mnemonic token:
/// `I32Add` → `i32_add`, `I8x16AddSatS` → `i8x16_add_sat_s`.
pub(crate) fn snake_mnemonic(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(ch);
            prev_lower_or_digit = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

pub(crate) fn binop_token(op: BinaryOp) -> String {
    snake_mnemonic(&format!("{op:?}"))
}

pub(crate) fn unop_token(op: UnaryOp) -> String {
    // The scalar conversions need their operand and sign suffix reordered
    // to match the wasm mnemonic.
    let token = match op {
        UnaryOp::I64ExtendSI32 => "i64_extend_i32_s",
        UnaryOp::I64ExtendUI32 => "i64_extend_i32_u",
        UnaryOp::I32TruncSF32 => "i32_trunc_f32_s",
        UnaryOp::I32TruncUF32 => "i32_trunc_f32_u",
        UnaryOp::I32TruncSF64 => "i32_trunc_f64_s",
        UnaryOp::I32TruncUF64 => "i32_trunc_f64_u",
        UnaryOp::I64TruncSF32 => "i64_trunc_f32_s",
        UnaryOp::I64TruncUF32 => "i64_trunc_f32_u",
        UnaryOp::I64TruncSF64 => "i64_trunc_f64_s",
        UnaryOp::I64TruncUF64 => "i64_trunc_f64_u",
        UnaryOp::I32TruncSSatF32 => "i32_trunc_sat_f32_s",
        UnaryOp::I32TruncUSatF32 => "i32_trunc_sat_f32_u",
        UnaryOp::I32TruncSSatF64 => "i32_trunc_sat_f64_s",
        UnaryOp::I32TruncUSatF64 => "i32_trunc_sat_f64_u",
        UnaryOp::I64TruncSSatF32 => "i64_trunc_sat_f32_s",
        UnaryOp::I64TruncUSatF32 => "i64_trunc_sat_f32_u",
        UnaryOp::I64TruncSSatF64 => "i64_trunc_sat_f64_s",
        UnaryOp::I64TruncUSatF64 => "i64_trunc_sat_f64_u",
        UnaryOp::F32ConvertSI32 => "f32_convert_i32_s",
        UnaryOp::F32ConvertUI32 => "f32_convert_i32_u",
        UnaryOp::F32ConvertSI64 => "f32_convert_i64_s",
        UnaryOp::F32ConvertUI64 => "f32_convert_i64_u",
        UnaryOp::F64ConvertSI32 => "f64_convert_i32_s",
        UnaryOp::F64ConvertUI32 => "f64_convert_i32_u",
        UnaryOp::F64ConvertSI64 => "f64_convert_i64_s",
        UnaryOp::F64ConvertUI64 => "f64_convert_i64_u",
        _ => return snake_mnemonic(&format!("{op:?}")),
    };
    token.to_string()
}

/// Whether a unary opcode is a conversion between value types rather than
/// an operation within one (`i32.wrap_i64` vs `f32.sqrt`).
pub(crate) fn is_convert(op: UnaryOp) -> bool {
    matches!(
        op,
        UnaryOp::I32WrapI64
            | UnaryOp::I64ExtendSI32
            | UnaryOp::I64ExtendUI32
            | UnaryOp::I32TruncSF32
            | UnaryOp::I32TruncUF32
            | UnaryOp::I32TruncSF64
            | UnaryOp::I32TruncUF64
            | UnaryOp::I64TruncSF32
            | UnaryOp::I64TruncUF32
            | UnaryOp::I64TruncSF64
            | UnaryOp::I64TruncUF64
            | UnaryOp::I32TruncSSatF32
            | UnaryOp::I32TruncUSatF32
            | UnaryOp::I32TruncSSatF64
            | UnaryOp::I32TruncUSatF64
            | UnaryOp::I64TruncSSatF32
            | UnaryOp::I64TruncUSatF32
            | UnaryOp::I64TruncSSatF64
            | UnaryOp::I64TruncUSatF64
            | UnaryOp::F32ConvertSI32
            | UnaryOp::F32ConvertUI32
            | UnaryOp::F32ConvertSI64
            | UnaryOp::F32ConvertUI64
            | UnaryOp::F64ConvertSI32
            | UnaryOp::F64ConvertUI32
            | UnaryOp::F64ConvertSI64
            | UnaryOp::F64ConvertUI64
            | UnaryOp::F32DemoteF64
            | UnaryOp::F64PromoteF32
            | UnaryOp::I32ReinterpretF32
            | UnaryOp::I64ReinterpretF64
            | UnaryOp::F32ReinterpretI32
            | UnaryOp::F64ReinterpretI64
    )
}

fn extended_view(ext: ExtendedLoad, signed: &'static str, unsigned: &'static str) -> &'static str {
    match ext {
        ExtendedLoad::SignExtend => signed,
        ExtendedLoad::ZeroExtend | ExtendedLoad::ZeroExtendAtomic => unsigned,
    }
}

/// The scalar type a load views memory as (`i32.load8_u` views a `u8`).
pub(crate) fn load_view(kind: LoadKind) -> &'static str {
    match kind {
        LoadKind::I32 { .. } => "i32",
        LoadKind::I64 { .. } => "i64",
        LoadKind::F32 => "f32",
        LoadKind::F64 => "f64",
        LoadKind::V128 => "v128",
        LoadKind::I32_8 { kind } => extended_view(kind, "i8", "u8"),
        LoadKind::I32_16 { kind } => extended_view(kind, "i16", "u16"),
        LoadKind::I64_8 { kind } => extended_view(kind, "i8", "u8"),
        LoadKind::I64_16 { kind } => extended_view(kind, "i16", "u16"),
        LoadKind::I64_32 { kind } => extended_view(kind, "i32", "u32"),
    }
}

/// Bytes of memory a load touches. Doubles as the natural alignment.
pub(crate) fn load_size(kind: LoadKind) -> u32 {
    match kind {
        LoadKind::I32 { .. } | LoadKind::F32 | LoadKind::I64_32 { .. } => 4,
        LoadKind::I64 { .. } | LoadKind::F64 => 8,
        LoadKind::V128 => 16,
        LoadKind::I32_8 { .. } | LoadKind::I64_8 { .. } => 1,
        LoadKind::I32_16 { .. } | LoadKind::I64_16 { .. } => 2,
    }
}

/// The scalar type a store views memory as.
pub(crate) fn store_view(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::I32 { .. } => "i32",
        StoreKind::I64 { .. } => "i64",
        StoreKind::F32 => "f32",
        StoreKind::F64 => "f64",
        StoreKind::V128 => "v128",
        StoreKind::I32_8 { .. } | StoreKind::I64_8 { .. } => "i8",
        StoreKind::I32_16 { .. } | StoreKind::I64_16 { .. } => "i16",
        StoreKind::I64_32 { .. } => "i32",
    }
}

/// Bytes of memory a store touches. Doubles as the natural alignment.
pub(crate) fn store_size(kind: StoreKind) -> u32 {
    match kind {
        StoreKind::I32 { .. } | StoreKind::F32 | StoreKind::I64_32 { .. } => 4,
        StoreKind::I64 { .. } | StoreKind::F64 => 8,
        StoreKind::V128 => 16,
        StoreKind::I32_8 { .. } | StoreKind::I64_8 { .. } => 1,
        StoreKind::I32_16 { .. } | StoreKind::I64_16 { .. } => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binop_tokens_match_wasm_mnemonics() {
        assert_eq!(binop_token(BinaryOp::I32Add), "i32_add");
        assert_eq!(binop_token(BinaryOp::I32LtS), "i32_lt_s");
        assert_eq!(binop_token(BinaryOp::I64ShrU), "i64_shr_u");
        assert_eq!(binop_token(BinaryOp::F64Copysign), "f64_copysign");
    }

    #[test]
    fn conversion_tokens_put_the_sign_suffix_last() {
        assert_eq!(unop_token(UnaryOp::I32TruncSF64), "i32_trunc_f64_s");
        assert_eq!(unop_token(UnaryOp::F64ConvertUI32), "f64_convert_i32_u");
        assert_eq!(unop_token(UnaryOp::I32WrapI64), "i32_wrap_i64");
        assert_eq!(unop_token(UnaryOp::I32Eqz), "i32_eqz");
    }

    #[test]
    fn sign_extension_ops_are_not_conversions() {
        assert!(is_convert(UnaryOp::I32WrapI64));
        assert!(!is_convert(UnaryOp::I32Extend8S));
        assert!(!is_convert(UnaryOp::F32Sqrt));
    }

    #[test]
    fn load_views_track_signedness() {
        let zx = LoadKind::I32_8 { kind: ExtendedLoad::ZeroExtend };
        let sx = LoadKind::I64_16 { kind: ExtendedLoad::SignExtend };
        assert_eq!(load_view(zx), "u8");
        assert_eq!(load_view(sx), "i16");
        assert_eq!(load_size(zx), 1);
        assert_eq!(store_size(StoreKind::F64), 8);
    }
}
