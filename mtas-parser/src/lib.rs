//! MTAS Parser - Documents to Search Tokens
//!
//! Structural lexers for XML (generic, TEI, FoLiA, CHAT, ELAN), CRM, Sketch
//! and Penn Treebank input drive one [`ParseSession`] per document. The
//! session keeps the stacks of open parser objects, and every closed object
//! goes through the mapping compiler.
//!
//! ```text
//! document text
//!     ↓  DocumentLexer (format specific)
//! open / text / close events
//!     ↓  ParseSession (stacks, positions, offsets, unknown ancestors)
//! closed ParserObject
//!     ↓  compiler (conditions, pre × post values, policies, parents)
//! tokens + deferrals
//!     ↓  Ledger::resolve (ids, variables) → TokenCollection::check
//! TokenCollection
//! ```
//!
//! ```no_run
//! use mtas_parser::{lexer_for, MappingConfig};
//!
//! # fn main() -> Result<(), mtas_parser::MtasError> {
//! let config = MappingConfig::from_xml_str(r#"<parser name="xml"><mappings/></parser>"#)?;
//! let tokens = lexer_for(&config).parse_str("<doc/>")?;
//! assert!(tokens.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod evaluator;
pub mod ledger;
pub mod lexer;
pub mod object;
pub mod session;

pub use ledger::{Ledger, LedgerReport, VariableTables};
pub use lexer::{lexer_for, CrmLexer, DocumentLexer, PennLexer, SketchLexer, XmlLexer};
pub use object::{ObjectStacks, ObjectView, ParserObject, VariableElement};
pub use session::ParseSession;

pub use mtas_core;
pub use mtas_core::{
    Category, DocumentFormat, MappingConfig, MtasError, MtasResult, Token, TokenCollection,
    TOKEN_DELIMITER,
};
