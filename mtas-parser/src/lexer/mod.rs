//! Structural lexers, one per source format

pub mod crm;
pub mod penn;
pub mod sketch;
pub mod xml;

pub use crm::CrmLexer;
pub use penn::PennLexer;
pub use sketch::SketchLexer;
pub use xml::XmlLexer;

use mtas_core::{DocumentFormat, MappingConfig, MtasResult, TokenCollection};
use std::io::Read;

/// A lexer turns one document into a checked token collection.
pub trait DocumentLexer {
    fn config(&self) -> &MappingConfig;

    fn parse_str(&self, input: &str) -> MtasResult<TokenCollection>;

    /// Read the whole input, then parse it.
    fn parse(&self, reader: &mut dyn Read) -> MtasResult<TokenCollection> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        self.parse_str(&input)
    }
}

/// The lexer for the configured format.
pub fn lexer_for(config: &MappingConfig) -> Box<dyn DocumentLexer + '_> {
    match config.format {
        DocumentFormat::Xml(_) => Box::new(XmlLexer::new(config)),
        DocumentFormat::Crm => Box::new(CrmLexer::new(config)),
        DocumentFormat::Sketch => Box::new(SketchLexer::new(config)),
        DocumentFormat::Penn => Box::new(PennLexer::new(config)),
    }
}

/// Tracks logical (character) offsets for byte positions that only grow.
pub(crate) struct CharCounter<'a> {
    input: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCounter<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            byte: 0,
            chars: 0,
        }
    }

    /// Character offset of a byte offset.
    pub(crate) fn at(&mut self, byte: usize) -> usize {
        let byte = byte.min(self.input.len());
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.input.as_bytes()[self.byte..byte]
            .iter()
            .filter(|b| (**b & 0xC0) != 0x80)
            .count();
        self.byte = byte;
        self.chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtas_core::XmlFlavor;

    #[test]
    fn test_char_counter() {
        let mut counter = CharCounter::new("aé<b>");
        assert_eq!(counter.at(1), 1);
        assert_eq!(counter.at(3), 2);
        assert_eq!(counter.at(6), 5);
        assert_eq!(counter.at(0), 0);
    }

    #[test]
    fn test_lexer_for_matches_format() {
        for format in [
            DocumentFormat::Xml(XmlFlavor::Tei),
            DocumentFormat::Crm,
            DocumentFormat::Sketch,
            DocumentFormat::Penn,
        ] {
            let config = MappingConfig::new(format);
            let lexer = lexer_for(&config);
            assert_eq!(lexer.config().format, format);
        }
    }
}
