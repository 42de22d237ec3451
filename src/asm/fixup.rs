// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Label table and fixup (backpatch) engine.
//!
//! Backward references resolve immediately at emission time; forward
//! references record a [`Fixup`] and are patched in one sweep after the
//! whole pass completes. The same math serves byte-addressed binaries and
//! token-indexed streams; only the operand width differs.

use std::collections::HashMap;

use crate::error::{Diagnostic, ForgeError, ForgeErrorKind};

/// Addressing mode for a branch/call operand, selectable per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressingMode {
    /// Patched value = label's resolved offset.
    #[default]
    Absolute,
    /// Patched value = label offset minus the address immediately
    /// following the operand field (signed).
    Relative,
}

/// A pending patch site, consumed exactly once during resolution.
#[derive(Debug, Clone)]
pub struct Fixup {
    /// Offset of the placeholder operand, in the stream's units.
    pub patch_offset: u32,
    pub label: String,
    pub mode: AddressingMode,
}

/// Label name → resolved offset, set exactly once per name.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: HashMap<String, u32>,
    diagnostics: Vec<Diagnostic>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `offset`. A duplicate definition keeps the first
    /// binding and records a warning (warn-and-continue policy).
    pub fn define(&mut self, name: &str, offset: u32) {
        if let Some(existing) = self.labels.get(name) {
            self.diagnostics.push(Diagnostic::warning(format!(
                "duplicate definition of label '{}' at offset {} ignored (first definition at {} kept)",
                name, offset, existing
            )));
            return;
        }
        self.labels.insert(name.to_string(), offset);
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Compute the value to patch at `patch_offset` for a branch to `target`.
///
/// `operand_width` is 4 for byte-addressed binaries and 1 for
/// token-indexed streams. Relative values are encoded as the two's
/// complement bits of the signed displacement.
pub fn patched_value(
    target: u32,
    patch_offset: u32,
    operand_width: u32,
    mode: AddressingMode,
) -> Result<u32, ForgeError> {
    match mode {
        AddressingMode::Absolute => Ok(target),
        AddressingMode::Relative => {
            let next = i64::from(patch_offset) + i64::from(operand_width);
            let disp = i64::from(target) - next;
            if disp > i64::from(i32::MAX) || disp < i64::from(i32::MIN) {
                return Err(ForgeError::new(
                    ForgeErrorKind::LabelAddressOutOfRange,
                    format!(
                        "relative displacement {} from offset {} does not fit in 32 bits",
                        disp, patch_offset
                    ),
                ));
            }
            Ok(disp as i32 as u32)
        }
    }
}

/// Resolve one deferred fixup against a completed label table.
pub fn resolve_fixup(
    fixup: &Fixup,
    labels: &LabelTable,
    operand_width: u32,
) -> Result<u32, ForgeError> {
    let target = labels.lookup(&fixup.label).ok_or_else(|| {
        ForgeError::new(
            ForgeErrorKind::UndefinedLabel,
            format!("label '{}' was referenced but never defined", fixup.label),
        )
    })?;
    patched_value(target, fixup.patch_offset, operand_width, fixup.mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    #[test]
    fn absolute_patch_is_the_label_offset() {
        assert_eq!(
            patched_value(120, 16, 4, AddressingMode::Absolute).expect("patch"),
            120
        );
    }

    #[test]
    fn relative_patch_is_offset_minus_next_address() {
        // Forward branch: operand at 16, width 4, target 40 -> 40 - 20.
        assert_eq!(
            patched_value(40, 16, 4, AddressingMode::Relative).expect("patch"),
            20
        );
        // Backward branch encodes a negative displacement.
        assert_eq!(
            patched_value(0, 16, 4, AddressingMode::Relative).expect("patch"),
            (-20i32) as u32
        );
        // Token-indexed streams use width 1.
        assert_eq!(
            patched_value(9, 5, 1, AddressingMode::Relative).expect("patch"),
            3
        );
    }

    #[test]
    fn oversized_relative_displacement_is_out_of_range() {
        let err = patched_value(u32::MAX, 0, 4, AddressingMode::Relative).expect_err("must fail");
        assert_eq!(err.kind(), ForgeErrorKind::LabelAddressOutOfRange);
    }

    #[test]
    fn duplicate_label_keeps_first_and_warns() {
        let mut labels = LabelTable::new();
        labels.define("loop", 8);
        labels.define("loop", 24);
        assert_eq!(labels.lookup("loop"), Some(8));
        let diags = labels.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("loop"));
    }

    #[test]
    fn undefined_label_fails_at_resolution() {
        let labels = LabelTable::new();
        let fixup = Fixup {
            patch_offset: 4,
            label: "missing".to_string(),
            mode: AddressingMode::Absolute,
        };
        let err = resolve_fixup(&fixup, &labels, 4).expect_err("must fail");
        assert_eq!(err.kind(), crate::error::ForgeErrorKind::UndefinedLabel);
    }
}
