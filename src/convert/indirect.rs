// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Indirect-threading converter.
//!
//! Builds the dense opcode-position list ("the thread") and rewrites
//! every branch/call target operand to the destination's dense index;
//! all other operands pass through unchanged.

use serde_json::{json, Value};

use crate::asm::stream::{render_stream, Token};
use crate::convert::{literal_at, walk, AddressMap};
use crate::error::ForgeError;
use crate::isa::OperandKind;

/// Indirect-threaded form: the thread plus the rewritten operand stream.
#[derive(Debug, PartialEq, Eq)]
pub struct IndirectProgram {
    pub thread: Vec<usize>,
    pub stream: Vec<Token>,
}

pub fn to_indirect(tokens: &[Token]) -> Result<IndirectProgram, ForgeError> {
    let map = AddressMap::build(tokens)?;
    let mut stream = tokens.to_vec();
    for decoded in walk(tokens)? {
        for (slot, kind) in decoded.op.operands().iter().enumerate() {
            if *kind != OperandKind::Target {
                continue;
            }
            let position = decoded.operand_positions.start + slot;
            let target = literal_at(tokens, position);
            stream[position] = Token::Lit(map.remap(target)?);
        }
    }
    Ok(IndirectProgram {
        thread: map.positions().to_vec(),
        stream,
    })
}

impl IndirectProgram {
    /// Text form matching the original conversion tool's output.
    pub fn render_text(&self) -> String {
        let thread = self
            .thread
            .iter()
            .map(|position| position.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let stream = self
            .stream
            .iter()
            .map(|token| token.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("Thread: {{ {} }}\nInstruments: {{ {} }}", thread, stream)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "thread": self.thread,
            "stream": render_stream(&self.stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::stream::parse_stream;
    use crate::isa::Opcode;

    const SUM_LOOP: &str = "DT_IMMI,0,DT_STO_IMMI,0,1,DT_LOD,0,DT_ADD,DT_LOD,0,DT_INC,DT_STO,0,\
                            DT_LOD,0,DT_IMMI,100,DT_GT,DT_JZ,5,DT_SEEK,DT_END";

    #[test]
    fn jz_target_becomes_the_dense_index_of_position_five() {
        let tokens = parse_stream(SUM_LOOP).expect("parse");
        let program = to_indirect(&tokens).expect("convert");
        assert_eq!(
            program.thread,
            vec![0, 2, 5, 7, 8, 10, 11, 13, 15, 17, 18, 20, 21]
        );
        // Token position 5 holds DT_LOD, the third opcode: dense index 2.
        assert_eq!(program.stream[19], Token::Lit(2));
        // Non-target operands are untouched.
        assert_eq!(program.stream[16], Token::Lit(100));
    }

    #[test]
    fn remapped_index_resolves_to_the_originally_targeted_opcode() {
        let tokens = parse_stream(SUM_LOOP).expect("parse");
        let program = to_indirect(&tokens).expect("convert");
        let original_target = 5usize;
        let Token::Lit(index) = program.stream[19] else {
            panic!("target operand must be a literal");
        };
        let through_thread = program.thread[index as usize];
        assert_eq!(through_thread, original_target);
        assert_eq!(tokens[through_thread], Token::Op(Opcode::DT_LOD));
    }

    #[test]
    fn both_if_else_targets_are_rewritten() {
        // Opcode positions: 0, 2, 5, 6, 8. The DT_IF_ELSE targets point
        // at DT_Tik (position 5) and DT_END (position 8).
        let tokens = parse_stream("DT_IMMI,1,DT_IF_ELSE,5,8,DT_Tik,DT_JMP,0,DT_END")
            .expect("parse");
        let program = to_indirect(&tokens).expect("convert");
        assert_eq!(program.stream[3], Token::Lit(2));
        assert_eq!(program.stream[4], Token::Lit(4));
        // The DT_JMP target is rewritten through the same map.
        assert_eq!(program.stream[7], Token::Lit(0));
    }

    #[test]
    fn unresolved_target_is_reported() {
        let tokens = parse_stream("DT_JMP,1,DT_END").expect("parse");
        let err = to_indirect(&tokens).expect_err("must fail");
        assert_eq!(err.kind(), crate::error::ForgeErrorKind::UnresolvedTarget);
    }

    #[test]
    fn text_rendering_matches_the_original_tool_shape() {
        let tokens = parse_stream("DT_Tik,DT_JMP,0").expect("parse");
        let program = to_indirect(&tokens).expect("convert");
        assert_eq!(
            program.render_text(),
            "Thread: { 0, 1 }\nInstruments: { DT_Tik, DT_JMP, 0 }"
        );
    }
}
