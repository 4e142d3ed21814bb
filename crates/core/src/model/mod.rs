//! Core data model shared by every stage of the pipeline.
//!
//! - `FunctionRecord`: one entry of the static-analysis snapshot (`functions.json`).
//! - `FunctionDescriptor`: a translatable function with its source span.
//! - `Translation`: the three text blocks a model returns for one function.
//! - `ValidationResult`: outcome of patching, building, and testing one attempt.
//! - `Message` / `Conversation`: the turns exchanged with the translation model.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One function as reported by the external static analyzer.
///
/// `called_functions` is absent for functions that were seen in the AST but
/// never made it into compiled output; those never enter the call graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRecord {
    pub name: String,
    pub filename: String,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_functions: Option<Vec<String>>,
}

/// A source span, 1-indexed.
///
/// `start_col` is the first byte of the function on `start_line`; `end_col` is
/// the last byte on `end_line` (inclusive), which makes `end_col` an exclusive
/// 0-indexed offset. This matches what clang reports for declaration ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}:{}", self.start_line, self.start_col, self.end_line, self.end_col)
    }
}

/// A function selected for translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    /// Path of the containing file, relative to the source tree.
    pub file: PathBuf,
    pub span: SourceSpan,
    /// Source text, filled in once the body has been extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl From<&FunctionRecord> for FunctionDescriptor {
    fn from(record: &FunctionRecord) -> Self {
        Self {
            name: record.name.clone(),
            file: PathBuf::from(&record.filename),
            span: SourceSpan {
                start_line: record.start_line,
                start_col: record.start_col,
                end_line: record.end_line,
                end_col: record.end_col,
            },
            body: None,
        }
    }
}

/// Model output for one function. The pipeline never parses these blocks; it
/// only inserts them verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    /// The idiomatic Rust function (`<name>_rust`).
    pub func: String,
    /// `#[no_mangle] extern "C"` adapter keeping the original signature.
    pub wrapper: String,
    /// `use` lines; may be empty.
    #[serde(default)]
    pub imports: String,
}

/// Outcome of validating one translation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", content = "message")]
pub enum ValidationResult {
    Success,
    CompileError(String),
    TestFailure(String),
}

impl ValidationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success)
    }

    /// Failure detail handed back to the model; empty on success.
    pub fn message(&self) -> &str {
        match self {
            ValidationResult::Success => "",
            ValidationResult::CompileError(msg) | ValidationResult::TestFailure(msg) => msg,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            ValidationResult::Success => Outcome::Success,
            ValidationResult::CompileError(_) => Outcome::CompileError,
            ValidationResult::TestFailure(_) => Outcome::TestFailure,
        }
    }
}

/// Per-function outcome recorded in the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    CompileError,
    TestFailure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "Success",
            Outcome::CompileError => "CompileError",
            Outcome::TestFailure => "TestFailure",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Append-only list of turns for one function.
///
/// Owned by the caller and moved through each oracle call, so the repair loop
/// carries its history explicitly instead of through shared state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
