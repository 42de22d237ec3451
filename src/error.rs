// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types and diagnostics for the toolchain.

use std::fmt;
use std::io;

/// Categories of toolchain errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeErrorKind {
    /// A token names no catalogued mnemonic.
    UnknownInstruction,
    /// Wrong operand count or type for an opcode.
    InvalidOperand,
    /// A label was referenced but never defined.
    UndefinedLabel,
    /// A production symbol is neither a known nonterminal nor a single
    /// code point.
    InvalidSymbol,
    /// A nonterminal has zero productions.
    EmptyProductionSet,
    /// A branch/call operand does not name any recorded opcode position.
    UnresolvedTarget,
    /// A resolved label value exceeds the operand's representable width.
    LabelAddressOutOfRange,
    /// Malformed grammar input.
    Grammar,
    Io,
    Cli,
}

impl ForgeErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownInstruction => "unknown-instruction",
            Self::InvalidOperand => "invalid-operand",
            Self::UndefinedLabel => "undefined-label",
            Self::InvalidSymbol => "invalid-symbol",
            Self::EmptyProductionSet => "empty-production-set",
            Self::UnresolvedTarget => "unresolved-target",
            Self::LabelAddressOutOfRange => "label-address-out-of-range",
            Self::Grammar => "grammar",
            Self::Io => "io",
            Self::Cli => "cli",
        }
    }
}

/// A toolchain error with a kind and message.
///
/// Every kind is unrecoverable for the current run: the run aborts and no
/// partial output is considered valid.
#[derive(Debug, Clone)]
pub struct ForgeError {
    kind: ForgeErrorKind,
    message: String,
}

impl ForgeError {
    pub fn new(kind: ForgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ForgeErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ForgeError {}

impl From<io::Error> for ForgeError {
    fn from(err: io::Error) -> Self {
        Self::new(ForgeErrorKind::Io, err.to_string())
    }
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A locally recovered condition, reported but not fatal.
///
/// The only warning-class condition in this toolchain is a duplicate label
/// definition (first definition wins).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}
