//! Instruction text parser and program assembler.
//!
//! Converts the textual instruction form into [`Instruction`]s. Uses
//! [`for_each_instruction!`](crate::for_each_instruction) to generate
//! `parse_instruction` for tokenized input.
//!
//! # Syntax
//!
//! ```text
//! opcode [operand[, ]operand]   # optional comment
//! ```
//!
//! - Opcodes are case-insensitive (`cas`, `CAS`)
//! - Registers are decimal indices, optionally `r`-prefixed (`3`, `r3`)
//! - Immediates and addresses are decimal integers (`42`, `-1`, `+1`)
//! - Jump targets are absolute indices (`7`), relative offsets (`:+3`, `:-1`)
//!   or label names (`loop`)
//! - `name:` at the start of a line is shorthand for `lab name`
//! - `prs` text may be double-quoted to include spaces
//! - Comments start with `#`; commas between operands are optional
//!
//! # Program files
//!
//! [`assemble_source`] reads several threads from one file. `[ thread <id> ]`
//! starts a thread's code, `[ memory ]` starts `address value` seed lines,
//! and code before any marker belongs to thread `0`.

use crate::error;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, Target};
use crate::virtual_machine::program::{Program, ThreadId};
use crate::for_each_instruction;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const SECTION_THREAD: &str = "thread";
const SECTION_MEMORY: &str = "memory";

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.to_string())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
pub fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Log a helpful diagnostic for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    if let Some((line, offset, message)) = assembly_error_location(err) {
        error!(
            "{}",
            render_assembly_diagnostic(file, source, line, offset, &message)
        );
    } else {
        error!("{file}: {err}");
    }
}

/// Threads and memory seeds read from a program file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Workload {
    /// Programs keyed by thread id, in scheduling order.
    pub threads: BTreeMap<ThreadId, Program>,
    /// `(address, value)` pairs written before the first sweep.
    pub memory: Vec<(usize, i64)>,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
/// - double quotes group a token that may contain spaces
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(4);

    let mut start: Option<usize> = None;
    let mut start_col: usize = 0;
    let mut in_str = false;

    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == COMMENT_CHAR as u8 && !in_str {
            break;
        }

        match b {
            b'"' => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                in_str = !in_str;
                i += 1;
            }

            b',' | b' ' | b'\t' | b'\r' if !in_str => {
                if let Some(s) = start {
                    let text = line[s..i].trim();
                    if !text.is_empty() {
                        out.push(Token {
                            text,
                            offset: start_col,
                        });
                    }
                    start = None;
                }
                i += 1;
            }

            _ => {
                if start.is_none() {
                    start = Some(i);
                    start_col = i + 1;
                }
                i += 1;
            }
        }
    }

    if in_str {
        return Err(VMError::ParseError {
            line: line_no,
            offset: start_col,
            message: "unterminated string literal (missing closing quote)",
        });
    }

    if let Some(s) = start {
        let text = line[s..i].trim();
        if !text.is_empty() {
            out.push(Token {
                text,
                offset: start_col,
            });
        }
    }

    Ok(out)
}

fn invalid_operand(instruction: &str, tok: &str, expected: &'static str) -> VMError {
    VMError::InvalidOperand {
        instruction: instruction.to_string(),
        operand: tok.to_string(),
        expected,
    }
}

/// Parse a register token like `3` or `r3`.
pub(crate) fn parse_reg(instruction: &str, tok: &str) -> Result<u8, VMError> {
    tok.strip_prefix('r')
        .unwrap_or(tok)
        .parse::<u8>()
        .map_err(|_| invalid_operand(instruction, tok, "register index"))
}

/// Parse a signed immediate; a leading `+` is accepted.
pub(crate) fn parse_imm(instruction: &str, tok: &str) -> Result<i64, VMError> {
    tok.parse::<i64>()
        .map_err(|_| invalid_operand(instruction, tok, "integer immediate"))
}

/// Parse a memory address.
pub(crate) fn parse_addr(instruction: &str, tok: &str) -> Result<usize, VMError> {
    tok.parse::<usize>()
        .map_err(|_| invalid_operand(instruction, tok, "memory address"))
}

/// Checks that `tok` can be used as a label or fault name.
fn is_identifier(tok: &str) -> bool {
    let mut chars = tok.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Parse a jump target: `:+N`/`:-N` relative, bare integer absolute, or label.
pub(crate) fn parse_target(instruction: &str, tok: &str) -> Result<Target, VMError> {
    if let Some(offset) = tok.strip_prefix(LABEL_SUFFIX) {
        return offset
            .parse::<i64>()
            .map(Target::Relative)
            .map_err(|_| invalid_operand(instruction, tok, "relative offset"));
    }
    if let Ok(index) = tok.parse::<usize>() {
        return Ok(Target::Absolute(index));
    }
    if is_identifier(tok) {
        Ok(Target::Label(tok.to_string()))
    } else {
        Err(invalid_operand(instruction, tok, "jump target"))
    }
}

/// Parse a label or fault name.
pub(crate) fn parse_name(instruction: &str, tok: &str) -> Result<String, VMError> {
    if is_identifier(tok) {
        Ok(tok.to_string())
    } else {
        Err(invalid_operand(instruction, tok, "identifier"))
    }
}

/// Parse `prs` text, dropping surrounding quotes.
pub(crate) fn parse_text(_instruction: &str, tok: &str) -> Result<String, VMError> {
    let text = tok
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tok);
    Ok(text.to_string())
}

fn operand_text<'a>(tok: Option<&Token<'a>>) -> &'a str {
    tok.map(|t| t.text).unwrap_or("")
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Parse one instruction from tokens.
        ///
        /// Unknown opcodes become [`Instruction::Undefined`] so the fault
        /// surfaces when a thread reaches them instead of at load time.
        fn parse_instruction(tokens: &[Token]) -> Result<Instruction, VMError> {
            let Some(first) = tokens.first() else {
                return Err(VMError::ArityMismatch {
                    instruction: "<missing opcode>".to_string(),
                    expected: 1,
                    actual: 0,
                });
            };

            let mnemonic = first.text.to_ascii_lowercase();
            match mnemonic.as_str() {
                $(
                    $mnemonic => {
                        const EXPECTED: usize = define_parse_instruction!(@count $( $field ),*);
                        if tokens.len() - 1 != EXPECTED {
                            return Err(VMError::ArityMismatch {
                                instruction: mnemonic.clone(),
                                expected: EXPECTED,
                                actual: tokens.len() - 1,
                            });
                        }

                        define_parse_instruction!(
                            @construct mnemonic tokens; $name $( $field : $kind ),*
                        )
                    }
                )*
                _ => Ok(Instruction::Undefined {
                    text: tokens.iter().map(|t| t.text).collect::<Vec<_>>().join(" "),
                }),
            }
        }
    };

    // ---------- counting ----------
    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( define_parse_instruction!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };

    // ---------- parsing ----------
    (@construct $mnemonic:ident $tokens:ident; $name:ident) => {
        Ok(Instruction::$name {})
    };

    (@construct $mnemonic:ident $tokens:ident; $name:ident $( $field:ident : $kind:ident ),+ ) => {{
        let mut it = $tokens.iter().skip(1);
        Ok(Instruction::$name {
            $(
                $field: define_parse_instruction!(
                    @parse_operand $kind, &$mnemonic, operand_text(it.next())
                )?,
            )*
        })
    }};

    (@parse_operand Reg, $instr:expr, $tok:expr) => { parse_reg($instr, $tok) };
    (@parse_operand Imm, $instr:expr, $tok:expr) => { parse_imm($instr, $tok) };
    (@parse_operand Addr, $instr:expr, $tok:expr) => { parse_addr($instr, $tok) };
    (@parse_operand Target, $instr:expr, $tok:expr) => { parse_target($instr, $tok) };
    (@parse_operand Name, $instr:expr, $tok:expr) => { parse_name($instr, $tok) };
    (@parse_operand Text, $instr:expr, $tok:expr) => { parse_text($instr, $tok) };
}

for_each_instruction!(define_parse_instruction);

/// Checks if a token is a label definition (ends with `:`).
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// An instruction with the line and column it was read from.
struct Located {
    instr: Instruction,
    line: usize,
    offset: usize,
}

/// Parses one source line into zero, one or two instructions
/// (`name: op ...` yields a `lab` followed by `op`).
fn parse_line(line_no: usize, line: &str, out: &mut Vec<Located>) -> Result<(), VMError> {
    let tokens = tokenize(line_no, line)?;
    if tokens.is_empty() {
        return Ok(());
    }

    let mut rest = &tokens[..];
    if is_label_def(tokens[0].text) {
        let name = &tokens[0].text[..tokens[0].text.len() - 1];
        let name = parse_name("lab", name).map_err(|e| VMError::AssemblyError {
            line: line_no,
            offset: tokens[0].offset,
            message: e.to_string(),
        })?;
        out.push(Located {
            instr: Instruction::Lab { name },
            line: line_no,
            offset: tokens[0].offset,
        });
        rest = &tokens[1..];
        if rest.is_empty() {
            return Ok(());
        }
    }

    let instr = parse_instruction(rest).map_err(|e| VMError::AssemblyError {
        line: line_no,
        offset: rest[0].offset,
        message: e.to_string(),
    })?;
    out.push(Located {
        instr,
        line: line_no,
        offset: rest[0].offset,
    });
    Ok(())
}

/// Builds a [`Program`], pinning label errors to the line that caused them.
fn build_program(located: Vec<Located>) -> Result<Program, VMError> {
    let instructions: Vec<Instruction> = located.iter().map(|l| l.instr.clone()).collect();
    Program::new(instructions).map_err(|err| {
        let site = match &err {
            VMError::DuplicateLabel { label } => located
                .iter()
                .filter(|l| matches!(&l.instr, Instruction::Lab { name } if name == label))
                .nth(1),
            VMError::UndefinedLabel { label } => located.iter().find(|l| match &l.instr {
                Instruction::Br { target }
                | Instruction::Btr { target, .. }
                | Instruction::Bfs { target, .. } => target.label() == Some(label.as_str()),
                _ => false,
            }),
            _ => None,
        };
        match site {
            Some(l) => VMError::AssemblyError {
                line: l.line,
                offset: l.offset,
                message: err.to_string(),
            },
            None => err,
        }
    })
}

fn parse_lines(source: &str) -> Result<Vec<Located>, VMError> {
    let mut located = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        parse_line(line_no + 1, line, &mut located)?;
    }
    Ok(located)
}

/// Assemble the source of a single thread into a [`Program`].
pub fn assemble_thread(source: &str) -> Result<Program, VMError> {
    build_program(parse_lines(source)?)
}

/// Parse a code fragment without resolving labels.
///
/// Jumps may name labels defined outside the fragment; they are checked when
/// the surrounding program is built.
pub fn parse_fragment(source: &str) -> Result<Vec<Instruction>, VMError> {
    Ok(parse_lines(source)?
        .into_iter()
        .map(|located| located.instr)
        .collect())
}

/// Which kind of section the parser is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Before any marker; code goes to thread `0`.
    None,
    Thread(ThreadId),
    Memory,
}

/// Checks if a line is a section marker and returns the section if so.
fn parse_section_marker(line_no: usize, line: &str) -> Result<Option<Section>, VMError> {
    let trimmed = line.split(COMMENT_CHAR).next().unwrap_or("").trim();
    let Some(inner) = trimmed
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
    else {
        return Ok(None);
    };

    let words: Vec<&str> = inner.split_whitespace().collect();
    match words.as_slice() {
        [kind] if kind.eq_ignore_ascii_case(SECTION_MEMORY) => Ok(Some(Section::Memory)),
        [kind, id] if kind.eq_ignore_ascii_case(SECTION_THREAD) => id
            .parse::<i64>()
            .map(|id| Some(Section::Thread(ThreadId(id))))
            .map_err(|_| VMError::AssemblyError {
                line: line_no,
                offset: 1,
                message: format!("invalid thread id `{id}`"),
            }),
        _ => Err(VMError::UnknownSection {
            name: inner.trim().to_string(),
        }),
    }
}

/// Parses one `address value` memory seed line.
fn parse_memory_line(line_no: usize, line: &str) -> Result<Option<(usize, i64)>, VMError> {
    let tokens = tokenize(line_no, line)?;
    match tokens.as_slice() {
        [] => Ok(None),
        [addr, value] => {
            let located = |e: VMError, tok: &Token| VMError::AssemblyError {
                line: line_no,
                offset: tok.offset,
                message: e.to_string(),
            };
            let a = parse_addr("memory", addr.text).map_err(|e| located(e, addr))?;
            let v = parse_imm("memory", value.text).map_err(|e| located(e, value))?;
            Ok(Some((a, v)))
        }
        _ => Err(VMError::AssemblyError {
            line: line_no,
            offset: tokens[0].offset,
            message: "memory lines take `address value`".to_string(),
        }),
    }
}

fn assemble_workload(source: &str) -> Result<Workload, VMError> {
    let mut threads: BTreeMap<ThreadId, Vec<Located>> = BTreeMap::new();
    let mut memory = Vec::new();
    let mut section = Section::None;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(next) = parse_section_marker(line_no, line)? {
            if let Section::Thread(id) = next {
                if threads.contains_key(&id) {
                    return Err(VMError::AssemblyError {
                        line: line_no,
                        offset: 1,
                        message: VMError::DuplicateThread { thread: id }.to_string(),
                    });
                }
                threads.insert(id, Vec::new());
            }
            section = next;
            continue;
        }

        match section {
            Section::Memory => {
                if let Some(seed) = parse_memory_line(line_no, line)? {
                    memory.push(seed);
                }
            }
            Section::Thread(id) => {
                parse_line(line_no, line, threads.entry(id).or_default())?;
            }
            Section::None => {
                let mut located = Vec::new();
                parse_line(line_no, line, &mut located)?;
                if !located.is_empty() {
                    threads.entry(ThreadId(0)).or_default().extend(located);
                }
            }
        }
    }

    let threads = threads
        .into_iter()
        .map(|(id, located)| build_program(located).map(|program| (id, program)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(Workload { threads, memory })
}

/// Assemble a multi-thread program source.
pub fn assemble_source(source: &str) -> Result<Workload, VMError> {
    assemble_source_with_name(source, "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Workload, VMError> {
    let result = assemble_workload(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Workload, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        message: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}
