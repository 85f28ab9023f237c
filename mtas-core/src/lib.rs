//! MTAS Core - Mapping Model and Tokens
//!
//! Types shared by every lexer: the immutable mapping model built from
//! configuration, the output tokens and the token collection with its
//! consistency pass.
//!
//! ```text
//! ConfigNode (attributed tree, or mapping XML)
//!     ↓
//! MappingConfig::from_tree (validate + build)
//!     ↓
//! MappingConfig (immutable, shared by parses)
//!     ↓  mtas-parser
//! TokenCollection → check(autorepair, makeunique)
//! ```

pub mod collection;
pub mod config;
pub mod enums;
pub mod error;
pub mod filter;
pub mod mapping;
pub mod token;

pub use collection::{CheckReport, TokenCollection};
pub use config::{ConfigNode, ConfigResult, MappingBuilder};
pub use enums::{Category, DocumentFormat, SourcePolicy, XmlFlavor};
pub use error::{ConfigError, ConsistencyError, MtasError, MtasResult, ParseError};
pub use filter::{apply_filters, ascii_fold, Filter, IndexSelection};
pub use mapping::*;
pub use token::{
    merge_offset, OffsetRange, Payload, Position, Token, TokenId, TokenValue,
    UnresolvedVariable, ValuePart, TOKEN_DELIMITER,
};
