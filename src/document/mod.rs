pub mod parser;
pub mod chunker;

pub use parser::{DocumentParser, ParsedDocument};
pub use chunker::{TextChunker, Chunk};
