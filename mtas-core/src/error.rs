//! Error types for MTAS operations

use crate::TokenId;
use thiserror::Error;

/// Errors raised while building the mapping model from configuration.
///
/// These are always fatal: a model that fails to build never reaches a lexer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown parser format: {value}")]
    UnknownFormat { value: String },

    #[error("Unknown mapping type: {value}")]
    UnknownMappingType { value: String },

    #[error("Unknown source policy: {value}")]
    UnknownSource { value: String },

    #[error("Unknown item type {value} in {context}")]
    UnknownItemType { context: String, value: String },

    #[error("Unknown filter: {value}")]
    UnknownFilter { value: String },

    #[error("Split filter {filter} is only allowed on textSplit items, found on {item}")]
    SplitFilterOnNonSplit { item: String, filter: String },

    #[error("Missing required attribute {attribute} on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Mapping {mapping} defines a token without pre values")]
    EmptyToken { mapping: String },

    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration XML error at byte {position}: {reason}")]
    Xml { position: usize, reason: String },

    #[error("Configuration has no <{element}> element")]
    MissingElement { element: String },
}

/// Structural-syntax errors. Fatal for the document being parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("XML error at byte {position}: {reason}")]
    Xml { position: usize, reason: String },

    #[error("Unsupported encoding {encoding}, only UTF-8 is accepted")]
    UnsupportedEncoding { encoding: String },

    #[error("Missing root tag: expected <{expected}>, found <{found}>")]
    MissingRootTag { expected: String, found: String },

    #[error("Bracket mismatch at byte {position}: {reason}")]
    BracketMismatch { position: usize, reason: String },

    #[error("Unparsable line {line}: {content}")]
    UnparsableLine { line: usize, content: String },

    #[error("Unexpected closing tag </{name}> on line {line}")]
    UnexpectedClose { name: String, line: usize },

    #[error("Element <{name}> is never closed")]
    UnclosedElement { name: String },

    #[error("Input error: {reason}")]
    Io { reason: String },
}

/// Problems found by the consistency pass when repairing is disabled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Token {id} has no positions")]
    NoPositions { id: TokenId },

    #[error("Token {id} has an unresolved variable value")]
    UnresolvedValue { id: TokenId },

    #[error("Token {id} refers to missing parent {parent}")]
    DanglingParent { id: TokenId, parent: TokenId },

    #[error("Parent chain starting at token {id} contains a cycle")]
    ParentCycle { id: TokenId },
}

/// Master error type for all MTAS errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MtasError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),
}

/// Result type alias for MTAS operations.
pub type MtasResult<T> = Result<T, MtasError>;

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for MtasError {
    fn from(err: std::io::Error) -> Self {
        MtasError::Parse(err.into())
    }
}

// =============================================================================
// TESTS
// =============================================================================
