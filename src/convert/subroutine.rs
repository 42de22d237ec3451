// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Subroutine-threading converter.
//!
//! Groups each opcode with its fixed-arity trailing operands into one
//! call record. Branch/call targets are remapped through the same
//! opcode-position index map used by the indirect converter, so an index
//! still names the correct record after grouping.

use std::fmt;

use serde_json::{json, Value};

use crate::asm::stream::Token;
use crate::convert::{literal_at, walk, AddressMap};
use crate::error::ForgeError;
use crate::isa::{Opcode, OperandKind};

/// One grouped instruction of the subroutine-threaded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub op: Opcode,
    pub operands: Vec<u32>,
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.op.mnemonic())?;
        for operand in &self.operands {
            write!(f, ", {}", operand)?;
        }
        write!(f, "}}")
    }
}

pub fn to_subroutine(tokens: &[Token]) -> Result<Vec<CallRecord>, ForgeError> {
    let map = AddressMap::build(tokens)?;
    let mut records = Vec::new();
    for decoded in walk(tokens)? {
        let mut operands = Vec::with_capacity(decoded.op.operands().len());
        for (slot, kind) in decoded.op.operands().iter().enumerate() {
            let position = decoded.operand_positions.start + slot;
            let value = literal_at(tokens, position);
            operands.push(match kind {
                OperandKind::Target => map.remap(value)?,
                _ => value,
            });
        }
        records.push(CallRecord {
            op: decoded.op,
            operands,
        });
    }
    Ok(records)
}

/// Text form matching the original conversion tool's output.
pub fn render_text(records: &[CallRecord]) -> String {
    records
        .iter()
        .map(|record| record.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn to_json(records: &[CallRecord]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|record| {
                json!({
                    "op": record.op.mnemonic(),
                    "operands": record.operands,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::stream::parse_stream;

    const SUM_LOOP: &str = "DT_IMMI,0,DT_STO_IMMI,0,1,DT_LOD,0,DT_ADD,DT_LOD,0,DT_INC,DT_STO,0,\
                            DT_LOD,0,DT_IMMI,100,DT_GT,DT_JZ,5,DT_SEEK,DT_END";

    #[test]
    fn groups_opcodes_with_their_operands_and_remaps_targets() {
        let tokens = parse_stream(SUM_LOOP).expect("parse");
        let records = to_subroutine(&tokens).expect("convert");
        assert_eq!(
            render_text(&records),
            "{DT_IMMI, 0},{DT_STO_IMMI, 0, 1},{DT_LOD, 0},{DT_ADD},{DT_LOD, 0},{DT_INC},\
             {DT_STO, 0},{DT_LOD, 0},{DT_IMMI, 100},{DT_GT},{DT_JZ, 2},{DT_SEEK},{DT_END}"
        );
    }

    #[test]
    fn record_index_names_the_originally_targeted_opcode() {
        let tokens = parse_stream(SUM_LOOP).expect("parse");
        let records = to_subroutine(&tokens).expect("convert");
        let jz = records
            .iter()
            .find(|record| record.op == Opcode::DT_JZ)
            .expect("jz record");
        let target_record = &records[jz.operands[0] as usize];
        // Token position 5 held DT_LOD.
        assert_eq!(target_record.op, Opcode::DT_LOD);
        assert_eq!(tokens[5], Token::Op(Opcode::DT_LOD));
    }

    #[test]
    fn indirect_and_subroutine_agree_on_indices() {
        let tokens = parse_stream(SUM_LOOP).expect("parse");
        let records = to_subroutine(&tokens).expect("convert");
        let program = crate::convert::indirect::to_indirect(&tokens).expect("convert");
        let jz = records
            .iter()
            .find(|record| record.op == Opcode::DT_JZ)
            .expect("jz record");
        assert_eq!(program.stream[19], Token::Lit(jz.operands[0]));
    }

    #[test]
    fn call_remaps_its_target_but_not_its_argument_count() {
        // Opcode positions: 0 (IMMI), 2 (CALL), 5 (RET). The call
        // targets position 5, dense index 2; the argument count stays 1.
        let tokens = parse_stream("DT_IMMI,7,DT_CALL,5,1,DT_RET").expect("parse");
        let records = to_subroutine(&tokens).expect("convert");
        let call = &records[1];
        assert_eq!(call.op, Opcode::DT_CALL);
        assert_eq!(call.operands, vec![2, 1]);
    }

    #[test]
    fn unresolved_target_is_reported() {
        let tokens = parse_stream("DT_JZ,1,DT_END").expect("parse");
        let err = to_subroutine(&tokens).expect_err("must fail");
        assert_eq!(err.kind(), crate::error::ForgeErrorKind::UnresolvedTarget);
    }
}
