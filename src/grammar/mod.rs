// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Context-free grammar model for the derivation code generator.
//!
//! Terminal granularity is fixed at one code point: a production symbol
//! either names a rule (nonterminal) or is a single character. The
//! derivation runtime stores one byte per terminal, so terminals (and
//! fallback characters) must fit in `U+0000..=U+00FF`; anything wider
//! is rejected up front instead of being truncated at run time.

pub mod codegen;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ForgeError, ForgeErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Terminal(char),
    Nonterminal(String),
}

pub type Production = Vec<Symbol>;

/// A validated grammar: rules, start symbol, per-rule fallback strings,
/// and the maximum derivation depth.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: BTreeMap<String, Vec<Production>>,
    start: String,
    fallbacks: BTreeMap<String, String>,
    max_depth: u32,
}

impl Grammar {
    /// Build and validate a grammar from raw string symbols. Each symbol
    /// resolves to a nonterminal when it names a rule, otherwise it must
    /// be a single code point terminal.
    pub fn from_raw(
        raw_rules: BTreeMap<String, Vec<Vec<String>>>,
        start: &str,
        fallbacks: BTreeMap<String, String>,
        max_depth: u32,
    ) -> Result<Grammar, ForgeError> {
        if max_depth == 0 {
            return Err(ForgeError::new(
                ForgeErrorKind::Grammar,
                "max_depth must be a positive integer",
            ));
        }
        if !raw_rules.contains_key(start) {
            return Err(ForgeError::new(
                ForgeErrorKind::Grammar,
                format!("start symbol '{}' has no rule", start),
            ));
        }
        for (name, productions) in &raw_rules {
            if !is_rule_name(name) {
                return Err(ForgeError::new(
                    ForgeErrorKind::InvalidSymbol,
                    format!("nonterminal name '{}' is not a valid identifier", name),
                ));
            }
            if productions.is_empty() {
                return Err(ForgeError::new(
                    ForgeErrorKind::EmptyProductionSet,
                    format!("nonterminal '{}' has zero productions", name),
                ));
            }
        }

        let mut rules: BTreeMap<String, Vec<Production>> = BTreeMap::new();
        for (name, productions) in &raw_rules {
            let mut resolved_productions = Vec::with_capacity(productions.len());
            for production in productions {
                let mut resolved = Vec::with_capacity(production.len());
                for symbol in production {
                    resolved.push(resolve_symbol(symbol, &raw_rules)?);
                }
                resolved_productions.push(resolved);
            }
            rules.insert(name.clone(), resolved_productions);
        }

        for (name, fallback) in &fallbacks {
            if !rules.contains_key(name) {
                return Err(ForgeError::new(
                    ForgeErrorKind::Grammar,
                    format!("fallback given for unknown nonterminal '{}'", name),
                ));
            }
            if let Some(c) = fallback.chars().find(|c| !fits_output_byte(*c)) {
                return Err(ForgeError::new(
                    ForgeErrorKind::InvalidSymbol,
                    format!(
                        "fallback for '{}' contains '{}' (U+{:04X}), which does not fit in one output byte",
                        name, c, c as u32
                    ),
                ));
            }
        }

        Ok(Grammar {
            rules,
            start: start.to_string(),
            fallbacks,
            max_depth,
        })
    }

    /// Nonterminals in deterministic (sorted) order.
    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Productions of a nonterminal.
    ///
    /// # Panics
    ///
    /// Panics when `name` names no rule. Valid names come from
    /// [`Grammar::nonterminals`]; validation guarantees every
    /// `Symbol::Nonterminal` in the rules is one of them.
    pub fn productions(&self, name: &str) -> &[Production] {
        &self.rules[name]
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Terminal string substituted once the depth bound is exceeded.
    /// Rules without an explicit fallback fall back to emitting nothing.
    pub fn fallback(&self, name: &str) -> &str {
        self.fallbacks.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

fn is_rule_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn resolve_symbol(
    symbol: &str,
    rules: &BTreeMap<String, Vec<Vec<String>>>,
) -> Result<Symbol, ForgeError> {
    // Legacy angle-bracket call syntax always names a nonterminal.
    if let Some(name) = symbol.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        if rules.contains_key(name) {
            return Ok(Symbol::Nonterminal(name.to_string()));
        }
        return Err(ForgeError::new(
            ForgeErrorKind::InvalidSymbol,
            format!("'<{}>' references an undefined nonterminal", name),
        ));
    }
    if rules.contains_key(symbol) {
        return Ok(Symbol::Nonterminal(symbol.to_string()));
    }
    let mut chars = symbol.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if fits_output_byte(c) => Ok(Symbol::Terminal(c)),
        (Some(c), None) => Err(ForgeError::new(
            ForgeErrorKind::InvalidSymbol,
            format!(
                "terminal '{}' (U+{:04X}) does not fit in one output byte",
                c, c as u32
            ),
        )),
        _ => Err(ForgeError::new(
            ForgeErrorKind::InvalidSymbol,
            format!(
                "'{}' is neither a known nonterminal nor a single-character terminal",
                symbol
            ),
        )),
    }
}

fn fits_output_byte(c: char) -> bool {
    (c as u32) <= 0xFF
}

/// Default maximum depth when the input does not specify one, from the
/// original generator.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Parse a grammar from JSON.
///
/// Canonical form: `{"rules": {...}, "start": "S", "fallbacks": {...},
/// "max_depth": N}`. Also accepts the original generator's shorthand
/// where top-level keys are `"<name>"` rule definitions; the first key
/// is the start symbol and `max_depth` defaults to 5.
pub fn from_json_str(text: &str) -> Result<Grammar, ForgeError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| ForgeError::new(ForgeErrorKind::Grammar, err.to_string()))?;
    let root = value.as_object().ok_or_else(|| {
        ForgeError::new(ForgeErrorKind::Grammar, "grammar input must be a JSON object")
    })?;

    if root.contains_key("rules") {
        let rules = parse_rules(root.get("rules"), "rules")?;
        let start = root
            .get("start")
            .and_then(Value::as_str)
            .ok_or_else(|| ForgeError::new(ForgeErrorKind::Grammar, "missing 'start' string"))?;
        let mut fallbacks = BTreeMap::new();
        if let Some(value) = root.get("fallbacks") {
            let object = value.as_object().ok_or_else(|| {
                ForgeError::new(ForgeErrorKind::Grammar, "'fallbacks' must be an object")
            })?;
            for (name, fallback) in object {
                let fallback = fallback.as_str().ok_or_else(|| {
                    ForgeError::new(
                        ForgeErrorKind::Grammar,
                        format!("fallback for '{}' must be a string", name),
                    )
                })?;
                fallbacks.insert(name.clone(), fallback.to_string());
            }
        }
        let max_depth = match root.get("max_depth") {
            Some(value) => value.as_u64().and_then(|v| u32::try_from(v).ok()).ok_or_else(|| {
                ForgeError::new(ForgeErrorKind::Grammar, "'max_depth' must be a positive integer")
            })?,
            None => DEFAULT_MAX_DEPTH,
        };
        return Grammar::from_raw(rules, start, fallbacks, max_depth);
    }

    // Original shorthand: {"<a>": [["a"],["d"],["g"]]}.
    let mut rules: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
    let mut start: Option<String> = None;
    for (key, value) in root {
        let name = key
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(key);
        if start.is_none() {
            start = Some(name.to_string());
        }
        rules.insert(name.to_string(), parse_production_lists(value, name)?);
    }
    let start =
        start.ok_or_else(|| ForgeError::new(ForgeErrorKind::Grammar, "grammar has no rules"))?;
    Grammar::from_raw(rules, &start, BTreeMap::new(), DEFAULT_MAX_DEPTH)
}

fn parse_rules(
    value: Option<&Value>,
    field: &str,
) -> Result<BTreeMap<String, Vec<Vec<String>>>, ForgeError> {
    let object = value.and_then(Value::as_object).ok_or_else(|| {
        ForgeError::new(ForgeErrorKind::Grammar, format!("'{}' must be an object", field))
    })?;
    let mut rules = BTreeMap::new();
    for (name, productions) in object {
        rules.insert(name.clone(), parse_production_lists(productions, name)?);
    }
    Ok(rules)
}

fn parse_production_lists(value: &Value, rule: &str) -> Result<Vec<Vec<String>>, ForgeError> {
    let lists = value.as_array().ok_or_else(|| {
        ForgeError::new(
            ForgeErrorKind::Grammar,
            format!("productions of '{}' must be an array", rule),
        )
    })?;
    let mut productions = Vec::with_capacity(lists.len());
    for list in lists {
        let symbols = list.as_array().ok_or_else(|| {
            ForgeError::new(
                ForgeErrorKind::Grammar,
                format!("each production of '{}' must be an array of symbols", rule),
            )
        })?;
        let mut production = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let symbol = symbol.as_str().ok_or_else(|| {
                ForgeError::new(
                    ForgeErrorKind::Grammar,
                    format!("symbols of '{}' must be strings", rule),
                )
            })?;
            production.push(symbol.to_string());
        }
        productions.push(production);
    }
    Ok(productions)
}
