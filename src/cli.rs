// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::fmt;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::asm::fixup::AddressingMode;
use crate::asm::Encoding;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Bytecode toolchain for a threaded-code stack VM.

Assembles comma-separated token streams into VM binaries, compiles
context-free grammars into self-contained derivation programs, and
re-expresses assembled streams as indirect- or subroutine-threaded
programs for dispatch benchmarking.";

#[derive(Parser, Debug)]
#[command(
    name = "dtForge",
    version = VERSION,
    about = "Threaded-code VM toolchain: assembler, grammar codegen, threading converters",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select CLI output format. text is default; json enables machine-readable output."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress warning diagnostics for successful runs. Errors are still reported."
    )]
    pub quiet: bool,
    #[arg(
        short = 'E',
        long = "error",
        value_name = "FILE",
        long_help = "Write diagnostics to FILE instead of stderr."
    )]
    pub error_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EncodingArg {
    #[default]
    Word,
    Packed,
}

impl fmt::Display for EncodingArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Word => "word",
            Self::Packed => "packed",
        })
    }
}

impl From<EncodingArg> for Encoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Word => Encoding::Word,
            EncodingArg::Packed => Encoding::Packed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BranchModeArg {
    #[default]
    Absolute,
    Relative,
}

impl fmt::Display for BranchModeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absolute => "absolute",
            Self::Relative => "relative",
        })
    }
}

impl From<BranchModeArg> for AddressingMode {
    fn from(value: BranchModeArg) -> Self {
        match value {
            BranchModeArg::Absolute => AddressingMode::Absolute,
            BranchModeArg::Relative => AddressingMode::Relative,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assemble a token stream file into a VM binary.
    Asm {
        input: PathBuf,
        #[arg(short = 'o', long = "outfile", value_name = "FILE")]
        outfile: Option<PathBuf>,
        #[arg(long = "encoding", value_enum, default_value_t)]
        encoding: EncodingArg,
        #[arg(long = "branch-mode", value_enum, default_value_t)]
        branch_mode: BranchModeArg,
        #[arg(long = "no-align", action = ArgAction::SetTrue)]
        no_align: bool,
    },
    /// Decode a VM binary back into the token stream text form.
    Disasm {
        input: PathBuf,
        #[arg(short = 'o', long = "outfile", value_name = "FILE")]
        outfile: Option<PathBuf>,
        #[arg(long = "encoding", value_enum, default_value_t)]
        encoding: EncodingArg,
    },
    /// Compile a grammar (JSON) into a derivation program.
    Grammar {
        input: PathBuf,
        #[arg(short = 'o', long = "outfile", value_name = "FILE")]
        outfile: Option<PathBuf>,
        /// Emit the token stream text form instead of a binary.
        #[arg(long = "tokens", action = ArgAction::SetTrue)]
        tokens: bool,
        #[arg(long = "seed", value_name = "N")]
        seed: Option<u32>,
        #[arg(long = "max-depth", value_name = "N")]
        max_depth: Option<u32>,
        /// Append a trailer that prints the final output length.
        #[arg(long = "emit-length", action = ArgAction::SetTrue)]
        emit_length: bool,
        #[arg(long = "encoding", value_enum, default_value_t)]
        encoding: EncodingArg,
        #[arg(long = "branch-mode", value_enum, default_value_t)]
        branch_mode: BranchModeArg,
    },
    /// Convert a token stream to the indirect-threaded form.
    Indirect {
        input: PathBuf,
        #[arg(short = 'o', long = "outfile", value_name = "FILE")]
        outfile: Option<PathBuf>,
    },
    /// Convert a token stream to the subroutine-threaded form.
    Subroutine {
        input: PathBuf,
        #[arg(short = 'o', long = "outfile", value_name = "FILE")]
        outfile: Option<PathBuf>,
    },
}
