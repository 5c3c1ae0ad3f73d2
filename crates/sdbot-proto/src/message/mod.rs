//! IRC message types and parsing.

mod nom_parser;
mod parse;
mod types;

pub use self::types::Message;
