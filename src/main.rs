// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for dtForge.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde_json::json;

use dtforge::asm::{self, stream, AsmConfig};
use dtforge::cli::{Cli, Command, OutputFormat};
use dtforge::convert::{indirect, subroutine};
use dtforge::error::{Diagnostic, ForgeError, Severity};
use dtforge::grammar::{self, codegen, codegen::CodegenConfig};

struct DiagnosticsSink {
    writer: Box<dyn Write>,
    quiet: bool,
}

impl DiagnosticsSink {
    fn new(error_file: Option<&Path>, quiet: bool) -> io::Result<Self> {
        let writer: Box<dyn Write> = match error_file {
            Some(path) => Box::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?,
            ),
            None => Box::new(io::stderr()),
        };
        Ok(Self { writer, quiet })
    }

    fn emit_diagnostics(&mut self, diagnostics: &[Diagnostic]) {
        for diag in diagnostics {
            if self.quiet && diag.severity == Severity::Warning {
                continue;
            }
            let _ = writeln!(self.writer, "{diag}");
        }
    }

    fn emit_error(&mut self, err: &ForgeError) {
        let _ = writeln!(self.writer, "error: {err}");
    }
}

/// Either bytes destined for a file, or text that defaults to stdout.
enum Output {
    Binary(Vec<u8>),
    Text(String),
}

fn main() {
    let cli = Cli::parse();
    let mut sink = match DiagnosticsSink::new(cli.error_file.as_deref(), cli.quiet) {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("error: cannot open diagnostics sink: {err}");
            process::exit(1);
        }
    };

    match run(&cli) {
        Ok((output, diagnostics, outfile)) => {
            sink.emit_diagnostics(&diagnostics);
            if let Err(err) = write_output(output, outfile.as_deref()) {
                sink.emit_error(&err);
                process::exit(1);
            }
        }
        Err(err) => {
            // No output file is written on failure.
            match cli.format {
                OutputFormat::Text => sink.emit_error(&err),
                OutputFormat::Json => {
                    let value = json!({
                        "error": { "kind": err.kind().as_str(), "message": err.message() }
                    });
                    let _ = writeln!(sink.writer, "{value}");
                }
            }
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<(Output, Vec<Diagnostic>, Option<PathBuf>), ForgeError> {
    match &cli.command {
        Command::Asm {
            input,
            outfile,
            encoding,
            branch_mode,
            no_align,
        } => {
            let text = fs::read_to_string(input)?;
            let tokens = stream::parse_stream(&text)?;
            let config = AsmConfig {
                encoding: (*encoding).into(),
                branch_mode: (*branch_mode).into(),
                align: !no_align,
            };
            let assembly = asm::assemble(&tokens, config)?;
            let outfile = outfile
                .clone()
                .unwrap_or_else(|| input.with_extension("bin"));
            Ok((
                Output::Binary(assembly.bytes),
                assembly.diagnostics,
                Some(outfile),
            ))
        }
        Command::Disasm {
            input,
            outfile,
            encoding,
        } => {
            let bytes = fs::read(input)?;
            let tokens = asm::disassemble(&bytes, (*encoding).into())?;
            let text = render_stream_output(cli.format, &tokens);
            Ok((Output::Text(text), Vec::new(), outfile.clone()))
        }
        Command::Grammar {
            input,
            outfile,
            tokens: emit_tokens,
            seed,
            max_depth,
            emit_length,
            encoding,
            branch_mode,
        } => {
            let text = fs::read_to_string(input)?;
            let grammar = grammar::from_json_str(&text)?;
            let config = CodegenConfig {
                seed: seed.unwrap_or(codegen::DEFAULT_SEED),
                branch_mode: (*branch_mode).into(),
                emit_length: *emit_length,
                max_depth: *max_depth,
            };
            let generated = codegen::generate(&grammar, &config)?;
            // Labels resolve to token indices, the unit the VM
            // instruction pointer counts in.
            let (resolved, diagnostics) =
                stream::resolve_token_stream(&generated, config.branch_mode)?;
            if *emit_tokens {
                let text = render_stream_output(cli.format, &resolved);
                return Ok((Output::Text(text), diagnostics, outfile.clone()));
            }
            let asm_config = AsmConfig {
                encoding: (*encoding).into(),
                ..AsmConfig::default()
            };
            let assembly = asm::assemble(&resolved, asm_config)?;
            let outfile = outfile
                .clone()
                .unwrap_or_else(|| input.with_extension("bin"));
            let mut diagnostics = diagnostics;
            diagnostics.extend(assembly.diagnostics);
            Ok((Output::Binary(assembly.bytes), diagnostics, Some(outfile)))
        }
        Command::Indirect { input, outfile } => {
            let (tokens, diagnostics) = load_numeric_stream(input)?;
            let program = indirect::to_indirect(&tokens)?;
            let text = match cli.format {
                OutputFormat::Text => program.render_text(),
                OutputFormat::Json => program.to_json().to_string(),
            };
            Ok((Output::Text(text), diagnostics, outfile.clone()))
        }
        Command::Subroutine { input, outfile } => {
            let (tokens, diagnostics) = load_numeric_stream(input)?;
            let records = subroutine::to_subroutine(&tokens)?;
            let text = match cli.format {
                OutputFormat::Text => subroutine::render_text(&records),
                OutputFormat::Json => subroutine::to_json(&records).to_string(),
            };
            Ok((Output::Text(text), diagnostics, outfile.clone()))
        }
    }
}

fn render_stream_output(format: OutputFormat, tokens: &[stream::Token]) -> String {
    match format {
        OutputFormat::Text => stream::render_stream(tokens),
        OutputFormat::Json => json!({ "stream": stream::render_stream(tokens) }).to_string(),
    }
}

/// Parse a token stream file and resolve any labels to token indices so
/// the converters see a fully numeric stream.
fn load_numeric_stream(input: &Path) -> Result<(Vec<stream::Token>, Vec<Diagnostic>), ForgeError> {
    let text = fs::read_to_string(input)?;
    let tokens = stream::parse_stream(&text)?;
    stream::resolve_token_stream(&tokens, Default::default())
}

fn write_output(output: Output, outfile: Option<&Path>) -> Result<(), ForgeError> {
    match (output, outfile) {
        (Output::Binary(bytes), Some(path)) => {
            fs::write(path, bytes)?;
            Ok(())
        }
        (Output::Binary(_), None) => unreachable!("binary outputs always carry a path"),
        (Output::Text(text), Some(path)) => {
            fs::write(path, text + "\n")?;
            Ok(())
        }
        (Output::Text(text), None) => {
            println!("{text}");
            Ok(())
        }
    }
}
