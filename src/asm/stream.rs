// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Token stream model and the comma-separated text front end.
//!
//! The text form is the original toolchain format: mnemonics and decimal
//! integers separated by commas, whitespace ignored. Extensions:
//! `name:` defines a label, a lowercase-leading identifier references a
//! label (absolute), `^name` references it relatively, and
//! `float_to_uint32(X.Y)` emits the IEEE-754 bits of the float literal.
//!
//! Classification rule (shared with the threading converters): a token is
//! an opcode iff its text names a catalogued mnemonic.

use std::fmt;

use crate::asm::fixup::{patched_value, resolve_fixup, AddressingMode, Fixup, LabelTable};
use crate::error::{Diagnostic, ForgeError, ForgeErrorKind};
use crate::isa::Opcode;

/// One element of a program token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Op(Opcode),
    Lit(u32),
    /// Binds a label name to the position of the next emitted token.
    LabelDef(String),
    /// References a label; `mode: None` defers to the assembler config.
    LabelRef {
        name: String,
        mode: Option<AddressingMode>,
    },
}

impl Token {
    pub fn absolute_ref(name: &str) -> Token {
        Token::LabelRef {
            name: name.to_string(),
            mode: Some(AddressingMode::Absolute),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Op(op) => write!(f, "{}", op.mnemonic()),
            Token::Lit(value) => write!(f, "{}", value),
            Token::LabelDef(name) => write!(f, "{}:", name),
            Token::LabelRef { name, mode } => match mode {
                Some(AddressingMode::Relative) => write!(f, "^{}", name),
                _ => write!(f, "{}", name),
            },
        }
    }
}

fn is_ident(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_float_literal(item: &str) -> Result<u32, ForgeError> {
    let open = item.find('(');
    let close = item.rfind(')');
    if let (Some(open), Some(close)) = (open, close) {
        if open < close {
            if let Ok(value) = item[open + 1..close].trim().parse::<f32>() {
                return Ok(value.to_bits());
            }
        }
    }
    Err(ForgeError::new(
        ForgeErrorKind::InvalidOperand,
        format!("malformed float literal '{}'", item),
    ))
}

fn parse_item(item: &str) -> Result<Token, ForgeError> {
    if item.contains("float_to_uint32") {
        return parse_float_literal(item).map(Token::Lit);
    }
    if let Some(name) = item.strip_suffix(':') {
        if is_ident(name) {
            return Ok(Token::LabelDef(name.to_string()));
        }
        return Err(ForgeError::new(
            ForgeErrorKind::InvalidOperand,
            format!("malformed label definition '{}'", item),
        ));
    }
    if let Some(name) = item.strip_prefix('^') {
        if is_ident(name) {
            return Ok(Token::LabelRef {
                name: name.to_string(),
                mode: Some(AddressingMode::Relative),
            });
        }
        return Err(ForgeError::new(
            ForgeErrorKind::InvalidOperand,
            format!("malformed label reference '{}'", item),
        ));
    }
    if let Some(op) = Opcode::from_mnemonic(item) {
        return Ok(Token::Op(op));
    }
    if let Ok(value) = item.parse::<i64>() {
        if value >= i64::from(i32::MIN) && value <= i64::from(u32::MAX) {
            return Ok(Token::Lit(value as u32));
        }
        return Err(ForgeError::new(
            ForgeErrorKind::InvalidOperand,
            format!("integer literal '{}' does not fit in 32 bits", item),
        ));
    }
    if is_ident(item) {
        // Uppercase-leading identifiers are reserved for mnemonics, as in
        // the original stream classification.
        if item.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Err(ForgeError::new(
                ForgeErrorKind::UnknownInstruction,
                format!("unknown mnemonic '{}'", item),
            ));
        }
        return Ok(Token::LabelRef {
            name: item.to_string(),
            mode: None,
        });
    }
    Err(ForgeError::new(
        ForgeErrorKind::InvalidOperand,
        format!("unrecognized token '{}'", item),
    ))
}

/// Parse a comma-separated token stream.
pub fn parse_stream(text: &str) -> Result<Vec<Token>, ForgeError> {
    let mut tokens = Vec::new();
    for item in text.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        tokens.push(parse_item(item)?);
    }
    Ok(tokens)
}

/// Render a token stream back to the comma-separated text form.
pub fn render_stream(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| token.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Resolve label definitions and references at token granularity.
///
/// Label offsets are token indices into the output stream (the unit the
/// VM instruction pointer counts in), relative displacements use an
/// operand width of one token. Definitions are removed from the output;
/// references become `Lit` values. `default_mode` applies to references
/// that carry no per-site mode.
pub fn resolve_token_stream(
    tokens: &[Token],
    default_mode: AddressingMode,
) -> Result<(Vec<Token>, Vec<Diagnostic>), ForgeError> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut labels = LabelTable::new();
    let mut fixups: Vec<Fixup> = Vec::new();

    for token in tokens {
        match token {
            Token::LabelDef(name) => {
                let offset = index_as_offset(out.len())?;
                labels.define(name, offset);
            }
            Token::LabelRef { name, mode } => {
                let mode = mode.unwrap_or(default_mode);
                let patch = index_as_offset(out.len())?;
                match labels.lookup(name) {
                    Some(target) => {
                        out.push(Token::Lit(patched_value(target, patch, 1, mode)?));
                    }
                    None => {
                        fixups.push(Fixup {
                            patch_offset: patch,
                            label: name.clone(),
                            mode,
                        });
                        out.push(Token::Lit(0));
                    }
                }
            }
            other => out.push(other.clone()),
        }
    }

    for fixup in &fixups {
        let value = resolve_fixup(fixup, &labels, 1)?;
        out[fixup.patch_offset as usize] = Token::Lit(value);
    }

    Ok((out, labels.take_diagnostics()))
}

fn index_as_offset(index: usize) -> Result<u32, ForgeError> {
    u32::try_from(index).map_err(|_| {
        ForgeError::new(
            ForgeErrorKind::LabelAddressOutOfRange,
            "token stream exceeds the 32-bit address space",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_original_toolchain_stream() {
        let tokens = parse_stream("DT_IMMI, 0, DT_STO_IMMI,0,1,DT_END").expect("parse");
        assert_eq!(
            tokens,
            vec![
                Token::Op(Opcode::DT_IMMI),
                Token::Lit(0),
                Token::Op(Opcode::DT_STO_IMMI),
                Token::Lit(0),
                Token::Lit(1),
                Token::Op(Opcode::DT_END),
            ]
        );
    }

    #[test]
    fn parses_float_literal_as_ieee_bits() {
        let tokens = parse_stream("DT_IMMI,float_to_uint32(1.5)").expect("parse");
        assert_eq!(tokens[1], Token::Lit(1.5f32.to_bits()));
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let err = parse_stream("DT_ADDD").expect_err("must fail");
        assert_eq!(err.kind(), ForgeErrorKind::UnknownInstruction);
    }

    #[test]
    fn label_definitions_and_references_round_trip_through_text() {
        let text = "loop:,DT_Tik,DT_JMP,loop";
        let tokens = parse_stream(text).expect("parse");
        assert_eq!(tokens[0], Token::LabelDef("loop".to_string()));
        assert_eq!(
            tokens[3],
            Token::LabelRef {
                name: "loop".to_string(),
                mode: None,
            }
        );
        assert_eq!(render_stream(&tokens), text);
    }

    #[test]
    fn token_resolution_uses_token_indices() {
        // loop: DT_Tik ; DT_JMP loop  -> jump target is token index 0.
        let tokens = parse_stream("loop:,DT_Tik,DT_JMP,loop").expect("parse");
        let (resolved, diags) =
            resolve_token_stream(&tokens, AddressingMode::Absolute).expect("resolve");
        assert!(diags.is_empty());
        assert_eq!(
            resolved,
            vec![
                Token::Op(Opcode::DT_Tik),
                Token::Op(Opcode::DT_JMP),
                Token::Lit(0),
            ]
        );
    }

    #[test]
    fn token_resolution_supports_forward_relative_references() {
        // DT_JMP ^end ; DT_Tik ; end:  -> operand at index 1, width 1,
        // target index 3 -> displacement 1.
        let tokens = parse_stream("DT_JMP,^end,DT_Tik,end:,DT_END").expect("parse");
        let (resolved, _) =
            resolve_token_stream(&tokens, AddressingMode::Absolute).expect("resolve");
        assert_eq!(
            resolved,
            vec![
                Token::Op(Opcode::DT_JMP),
                Token::Lit(1),
                Token::Op(Opcode::DT_Tik),
                Token::Op(Opcode::DT_END),
            ]
        );
    }

    #[test]
    fn unresolved_reference_reports_undefined_label() {
        let tokens = parse_stream("DT_JMP,nowhere").expect("parse");
        let err = resolve_token_stream(&tokens, AddressingMode::Absolute).expect_err("must fail");
        assert_eq!(err.kind(), ForgeErrorKind::UndefinedLabel);
    }
}
