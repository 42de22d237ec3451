// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Single-pass binary assembler for the threaded-code VM.
//!
//! One left-to-right pass emits opcodes and their fixed-arity operands;
//! label-valued branch operands resolve immediately when the label is
//! already bound, otherwise a placeholder is emitted and patched in a
//! final sweep. Each run owns a fresh [`Assembler`] context.

pub mod fixup;
pub mod stream;

use crate::error::{Diagnostic, ForgeError, ForgeErrorKind};
use crate::isa::{Opcode, OperandKind};
use fixup::{patched_value, resolve_fixup, AddressingMode, Fixup, LabelTable};
use stream::Token;

/// Width of every operand field, in bytes.
pub const OPERAND_WIDTH: u32 = 4;
const ALIGNMENT: usize = 4;

/// Opcode encoding scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// 4-byte little-endian opcode cells, the original VM binary format.
    #[default]
    Word,
    /// 1-byte opcodes; the buffer may need alignment padding.
    Packed,
}

impl Encoding {
    fn opcode_width(self) -> usize {
        match self {
            Encoding::Word => 4,
            Encoding::Packed => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AsmConfig {
    pub encoding: Encoding,
    /// Default mode for label references that carry no per-site mode.
    pub branch_mode: AddressingMode,
    /// Pad the final buffer with `DT_NOP` bytes to a 4-byte boundary.
    pub align: bool,
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Word,
            branch_mode: AddressingMode::Absolute,
            align: true,
        }
    }
}

/// Result of a successful assembly run.
#[derive(Debug)]
pub struct Assembly {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Assembly context: output buffer, label table, and pending fixups.
///
/// Must not be reused across runs; `assemble` consumes the context.
pub struct Assembler {
    config: AsmConfig,
    buf: Vec<u8>,
    labels: LabelTable,
    fixups: Vec<Fixup>,
}

impl Assembler {
    pub fn new(config: AsmConfig) -> Self {
        Self {
            config,
            buf: Vec::new(),
            labels: LabelTable::new(),
            fixups: Vec::new(),
        }
    }

    /// Assemble a token stream into a byte buffer.
    pub fn assemble(mut self, tokens: &[Token]) -> Result<Assembly, ForgeError> {
        let mut iter = tokens.iter();
        while let Some(token) = iter.next() {
            match token {
                Token::LabelDef(name) => {
                    let offset = self.offset()?;
                    self.labels.define(name, offset);
                }
                Token::Op(op) => {
                    self.emit_opcode(*op);
                    for (slot, kind) in op.operands().iter().enumerate() {
                        let operand = iter.next().ok_or_else(|| {
                            ForgeError::new(
                                ForgeErrorKind::InvalidOperand,
                                format!(
                                    "{} expects {} operand(s), stream ended after {}",
                                    op.mnemonic(),
                                    op.operands().len(),
                                    slot
                                ),
                            )
                        })?;
                        self.emit_operand(*op, *kind, operand)?;
                    }
                }
                Token::Lit(value) => {
                    return Err(ForgeError::new(
                        ForgeErrorKind::InvalidOperand,
                        format!("literal {} is not attached to any instruction", value),
                    ));
                }
                Token::LabelRef { name, .. } => {
                    return Err(ForgeError::new(
                        ForgeErrorKind::InvalidOperand,
                        format!("label reference '{}' is not attached to any instruction", name),
                    ));
                }
            }
        }

        let fixups = std::mem::take(&mut self.fixups);
        for fixup in &fixups {
            let value = resolve_fixup(fixup, &self.labels, OPERAND_WIDTH)?;
            self.patch_u32(fixup.patch_offset as usize, value);
        }

        if self.config.align {
            while self.buf.len() % ALIGNMENT != 0 {
                self.buf.push(Opcode::DT_NOP.code() as u8);
            }
        }

        Ok(Assembly {
            bytes: self.buf,
            diagnostics: self.labels.take_diagnostics(),
        })
    }

    fn emit_operand(
        &mut self,
        op: Opcode,
        kind: OperandKind,
        operand: &Token,
    ) -> Result<(), ForgeError> {
        match operand {
            Token::Lit(value) => {
                self.emit_u32(*value);
                Ok(())
            }
            Token::LabelRef { name, mode } if kind == OperandKind::Target => {
                let mode = mode.unwrap_or(self.config.branch_mode);
                let patch = self.offset()?;
                match self.labels.lookup(name) {
                    Some(target) => {
                        let value = patched_value(target, patch, OPERAND_WIDTH, mode)?;
                        self.emit_u32(value);
                    }
                    None => {
                        self.fixups.push(Fixup {
                            patch_offset: patch,
                            label: name.clone(),
                            mode,
                        });
                        self.emit_u32(0);
                    }
                }
                Ok(())
            }
            Token::LabelRef { name, .. } => Err(ForgeError::new(
                ForgeErrorKind::InvalidOperand,
                format!(
                    "label '{}' used where {} expects a non-target operand",
                    name,
                    op.mnemonic()
                ),
            )),
            other => Err(ForgeError::new(
                ForgeErrorKind::InvalidOperand,
                format!("{} is not a valid operand for {}", other, op.mnemonic()),
            )),
        }
    }

    fn emit_opcode(&mut self, op: Opcode) {
        match self.config.encoding {
            Encoding::Word => self.emit_u32(op.code()),
            Encoding::Packed => self.buf.push(op.code() as u8),
        }
    }

    fn emit_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn offset(&self) -> Result<u32, ForgeError> {
        u32::try_from(self.buf.len()).map_err(|_| {
            ForgeError::new(
                ForgeErrorKind::LabelAddressOutOfRange,
                "output buffer exceeds the 32-bit address space",
            )
        })
    }
}

/// Assemble with a fresh context.
pub fn assemble(tokens: &[Token], config: AsmConfig) -> Result<Assembly, ForgeError> {
    Assembler::new(config).assemble(tokens)
}

/// Decode a binary back into a numeric token stream.
pub fn disassemble(bytes: &[u8], encoding: Encoding) -> Result<Vec<Token>, ForgeError> {
    let mut tokens = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let code = match encoding {
            Encoding::Word => {
                let cell = read_u32(bytes, pos)?;
                pos += 4;
                cell
            }
            Encoding::Packed => {
                let cell = u32::from(bytes[pos]);
                pos += 1;
                cell
            }
        };
        let op = Opcode::from_code(code).ok_or_else(|| {
            ForgeError::new(
                ForgeErrorKind::UnknownInstruction,
                format!("byte offset {}: no opcode with code {}", pos, code),
            )
        })?;
        tokens.push(Token::Op(op));
        for _ in op.operands() {
            let value = read_u32(bytes, pos)?;
            pos += 4;
            tokens.push(Token::Lit(value));
        }
    }
    Ok(tokens)
}

fn read_u32(bytes: &[u8], pos: usize) -> Result<u32, ForgeError> {
    let slice = bytes.get(pos..pos + 4).ok_or_else(|| {
        ForgeError::new(
            ForgeErrorKind::InvalidOperand,
            format!("truncated field at byte offset {}", pos),
        )
    })?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
