// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction set catalogue for the threaded-code VM.
//!
//! The table below is the single source of truth for encoding, decoding,
//! and operand classification. Adding an opcode means adding one table
//! entry, never ad-hoc special-casing elsewhere.

/// Kind of a single operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Immediate value.
    Imm,
    /// Memory cell address.
    Mem,
    /// Branch or call target.
    Target,
}

/// VM opcodes. Numeric codes are fixed by the VM's binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
#[repr(u32)]
pub enum Opcode {
    // arithmetic
    DT_ADD = 0,
    DT_SUB = 1,
    DT_MUL = 2,
    DT_DIV = 3,
    DT_MOD = 4,
    DT_SHL = 5,
    DT_SHR = 6,
    DT_FP_ADD = 7,
    DT_FP_SUB = 8,
    DT_FP_MUL = 9,
    DT_FP_DIV = 10,
    // stack and memory
    DT_DUP = 11,
    DT_END = 12,
    DT_LOD = 13,
    DT_STO = 14,
    DT_IMMI = 15,
    DT_INC = 16,
    DT_DEC = 17,
    DT_STO_IMMI = 18,
    DT_MEMCPY = 19,
    DT_MEMSET = 20,
    // flow control
    DT_JMP = 21,
    DT_JZ = 22,
    DT_IF_ELSE = 23,
    DT_JUMP_IF = 24,
    DT_GT = 25,
    DT_LT = 26,
    DT_EQ = 27,
    DT_GT_EQ = 28,
    DT_LT_EQ = 29,
    DT_CALL = 30,
    DT_RET = 31,
    // debug
    DT_SEEK = 32,
    DT_PRINT = 33,
    DT_READ_INT = 34,
    DT_FP_PRINT = 35,
    DT_FP_READ = 36,
    // original toolchain spelling
    DT_Tik = 37,
    // system
    DT_SYSCALL = 38,
    DT_RND = 39,
    // catalogue extensions
    DT_STO_IDX = 40,
    DT_NOP = 41,
}

pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub opcode: Opcode,
    pub operands: &'static [OperandKind],
}

use OperandKind::{Imm, Mem, Target};

pub static OPCODE_TABLE: &[OpcodeEntry] = &[
    OpcodeEntry {
        mnemonic: "DT_ADD",
        opcode: Opcode::DT_ADD,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_SUB",
        opcode: Opcode::DT_SUB,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_MUL",
        opcode: Opcode::DT_MUL,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_DIV",
        opcode: Opcode::DT_DIV,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_MOD",
        opcode: Opcode::DT_MOD,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_SHL",
        opcode: Opcode::DT_SHL,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_SHR",
        opcode: Opcode::DT_SHR,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_FP_ADD",
        opcode: Opcode::DT_FP_ADD,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_FP_SUB",
        opcode: Opcode::DT_FP_SUB,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_FP_MUL",
        opcode: Opcode::DT_FP_MUL,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_FP_DIV",
        opcode: Opcode::DT_FP_DIV,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_DUP",
        opcode: Opcode::DT_DUP,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_END",
        opcode: Opcode::DT_END,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_LOD",
        opcode: Opcode::DT_LOD,
        operands: &[Mem],
    },
    OpcodeEntry {
        mnemonic: "DT_STO",
        opcode: Opcode::DT_STO,
        operands: &[Mem],
    },
    OpcodeEntry {
        mnemonic: "DT_IMMI",
        opcode: Opcode::DT_IMMI,
        operands: &[Imm],
    },
    OpcodeEntry {
        mnemonic: "DT_INC",
        opcode: Opcode::DT_INC,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_DEC",
        opcode: Opcode::DT_DEC,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_STO_IMMI",
        opcode: Opcode::DT_STO_IMMI,
        operands: &[Mem, Imm],
    },
    OpcodeEntry {
        mnemonic: "DT_MEMCPY",
        opcode: Opcode::DT_MEMCPY,
        operands: &[Mem, Mem, Imm],
    },
    OpcodeEntry {
        mnemonic: "DT_MEMSET",
        opcode: Opcode::DT_MEMSET,
        operands: &[Mem, Imm, Imm],
    },
    OpcodeEntry {
        mnemonic: "DT_JMP",
        opcode: Opcode::DT_JMP,
        operands: &[Target],
    },
    OpcodeEntry {
        mnemonic: "DT_JZ",
        opcode: Opcode::DT_JZ,
        operands: &[Target],
    },
    OpcodeEntry {
        mnemonic: "DT_IF_ELSE",
        opcode: Opcode::DT_IF_ELSE,
        operands: &[Target, Target],
    },
    OpcodeEntry {
        mnemonic: "DT_JUMP_IF",
        opcode: Opcode::DT_JUMP_IF,
        operands: &[Target],
    },
    OpcodeEntry {
        mnemonic: "DT_GT",
        opcode: Opcode::DT_GT,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_LT",
        opcode: Opcode::DT_LT,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_EQ",
        opcode: Opcode::DT_EQ,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_GT_EQ",
        opcode: Opcode::DT_GT_EQ,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_LT_EQ",
        opcode: Opcode::DT_LT_EQ,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_CALL",
        opcode: Opcode::DT_CALL,
        operands: &[Target, Imm],
    },
    OpcodeEntry {
        mnemonic: "DT_RET",
        opcode: Opcode::DT_RET,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_SEEK",
        opcode: Opcode::DT_SEEK,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_PRINT",
        opcode: Opcode::DT_PRINT,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_READ_INT",
        opcode: Opcode::DT_READ_INT,
        operands: &[Mem],
    },
    OpcodeEntry {
        mnemonic: "DT_FP_PRINT",
        opcode: Opcode::DT_FP_PRINT,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_FP_READ",
        opcode: Opcode::DT_FP_READ,
        operands: &[Mem],
    },
    OpcodeEntry {
        mnemonic: "DT_Tik",
        opcode: Opcode::DT_Tik,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_SYSCALL",
        opcode: Opcode::DT_SYSCALL,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_RND",
        opcode: Opcode::DT_RND,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_STO_IDX",
        opcode: Opcode::DT_STO_IDX,
        operands: &[],
    },
    OpcodeEntry {
        mnemonic: "DT_NOP",
        opcode: Opcode::DT_NOP,
        operands: &[],
    },
];

impl Opcode {
    pub fn from_mnemonic(text: &str) -> Option<Opcode> {
        OPCODE_TABLE
            .iter()
            .find(|entry| entry.mnemonic == text)
            .map(|entry| entry.opcode)
    }

    pub fn from_code(code: u32) -> Option<Opcode> {
        OPCODE_TABLE
            .iter()
            .find(|entry| entry.opcode as u32 == code)
            .map(|entry| entry.opcode)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn mnemonic(self) -> &'static str {
        self.entry().mnemonic
    }

    pub fn operands(self) -> &'static [OperandKind] {
        self.entry().operands
    }

    /// Number of branch/call target slots among the operands.
    pub fn target_count(self) -> usize {
        self.operands()
            .iter()
            .filter(|kind| **kind == OperandKind::Target)
            .count()
    }

    fn entry(self) -> &'static OpcodeEntry {
        // The table is closed and covers every variant; checked by test.
        &OPCODE_TABLE[self as usize]
    }
}
