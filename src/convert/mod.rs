// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Threading-model converters.
//!
//! Both converters share one classification rule (a token is an opcode
//! iff it names a catalogued mnemonic) and one opcode-position index
//! map; anything else would make the two representations disagree about
//! addresses.

pub mod indirect;
pub mod subroutine;

use std::collections::HashMap;

use crate::asm::stream::Token;
use crate::error::{ForgeError, ForgeErrorKind};
use crate::isa::Opcode;

/// Map from a token position that holds an opcode to its dense index
/// among opcodes only.
#[derive(Debug)]
pub struct AddressMap {
    positions: Vec<usize>,
    dense: HashMap<usize, usize>,
}

impl AddressMap {
    /// Build the map over a fully numeric token stream.
    pub fn build(tokens: &[Token]) -> Result<AddressMap, ForgeError> {
        let mut positions = Vec::new();
        let mut dense = HashMap::new();
        for (position, token) in tokens.iter().enumerate() {
            match token {
                Token::Op(_) => {
                    dense.insert(position, positions.len());
                    positions.push(position);
                }
                Token::Lit(_) => {}
                other => {
                    return Err(ForgeError::new(
                        ForgeErrorKind::InvalidOperand,
                        format!("converter input must be fully resolved, found {}", other),
                    ));
                }
            }
        }
        Ok(AddressMap { positions, dense })
    }

    /// Dense ordered list of opcode positions ("the thread").
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Rewrite a branch/call target from a token position to the
    /// destination's dense index.
    pub fn remap(&self, target: u32) -> Result<u32, ForgeError> {
        self.dense
            .get(&(target as usize))
            .map(|index| *index as u32)
            .ok_or_else(|| {
                ForgeError::new(
                    ForgeErrorKind::UnresolvedTarget,
                    format!("branch/call target {} is not an opcode position", target),
                )
            })
    }
}

/// One decoded instruction: opcode position, opcode, and the positions
/// of its fixed-arity trailing operands.
#[derive(Debug)]
pub(crate) struct DecodedOp {
    pub position: usize,
    pub op: Opcode,
    pub operand_positions: std::ops::Range<usize>,
}

/// Walk a numeric stream instruction by instruction, pairing each opcode
/// with the operands its signature dictates.
pub(crate) fn walk(tokens: &[Token]) -> Result<Vec<DecodedOp>, ForgeError> {
    let mut decoded = Vec::new();
    let mut position = 0usize;
    while position < tokens.len() {
        let op = match &tokens[position] {
            Token::Op(op) => *op,
            Token::Lit(value) => {
                return Err(ForgeError::new(
                    ForgeErrorKind::InvalidOperand,
                    format!(
                        "token position {}: literal {} is not attached to any instruction",
                        position, value
                    ),
                ));
            }
            other => {
                return Err(ForgeError::new(
                    ForgeErrorKind::InvalidOperand,
                    format!("converter input must be fully resolved, found {}", other),
                ));
            }
        };
        let arity = op.operands().len();
        let operands = position + 1..position + 1 + arity;
        if operands.end > tokens.len() {
            return Err(ForgeError::new(
                ForgeErrorKind::InvalidOperand,
                format!(
                    "{} at token position {} is missing operands",
                    op.mnemonic(),
                    position
                ),
            ));
        }
        for operand_position in operands.clone() {
            if !matches!(tokens[operand_position], Token::Lit(_)) {
                return Err(ForgeError::new(
                    ForgeErrorKind::InvalidOperand,
                    format!(
                        "{} at token position {} has a non-literal operand",
                        op.mnemonic(),
                        position
                    ),
                ));
            }
        }
        decoded.push(DecodedOp {
            position,
            op,
            operand_positions: operands.clone(),
        });
        position = operands.end;
    }
    Ok(decoded)
}

pub(crate) fn literal_at(tokens: &[Token], position: usize) -> u32 {
    match tokens[position] {
        Token::Lit(value) => value,
        // walk() has already rejected anything else.
        _ => unreachable!("operand positions hold literals"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::stream::parse_stream;

    #[test]
    fn address_map_indexes_opcodes_densely() {
        let tokens = parse_stream("DT_IMMI,0,DT_STO_IMMI,0,1,DT_LOD,0,DT_END").expect("parse");
        let map = AddressMap::build(&tokens).expect("map");
        assert_eq!(map.positions(), &[0, 2, 5, 7]);
        assert_eq!(map.remap(5).expect("remap"), 2);
        assert_eq!(map.remap(7).expect("remap"), 3);
    }

    #[test]
    fn operand_position_is_not_a_valid_target() {
        let tokens = parse_stream("DT_JMP,1,DT_END").expect("parse");
        let map = AddressMap::build(&tokens).expect("map");
        let err = map.remap(1).expect_err("must fail");
        assert_eq!(err.kind(), ForgeErrorKind::UnresolvedTarget);
    }

    #[test]
    fn label_tokens_are_rejected() {
        let tokens = parse_stream("x:,DT_JMP,x").expect("parse");
        let err = AddressMap::build(&tokens).expect_err("must fail");
        assert_eq!(err.kind(), ForgeErrorKind::InvalidOperand);
    }

    #[test]
    fn walk_respects_operand_signatures() {
        let tokens = parse_stream("DT_IF_ELSE,3,5,DT_CALL,0,1").expect("parse");
        let decoded = walk(&tokens).expect("walk");
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].operand_positions, 1..3);
        assert_eq!(decoded[1].position, 3);
        assert_eq!(decoded[1].operand_positions, 4..6);
    }

    #[test]
    fn truncated_instruction_is_invalid() {
        let tokens = parse_stream("DT_STO_IMMI,0").expect("parse");
        let err = walk(&tokens).expect_err("must fail");
        assert_eq!(err.kind(), ForgeErrorKind::InvalidOperand);
    }
}
