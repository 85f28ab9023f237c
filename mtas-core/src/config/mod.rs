//! Configuration tree and mapping model builder

mod builder;
mod tree;

pub use builder::*;
pub use tree::*;
