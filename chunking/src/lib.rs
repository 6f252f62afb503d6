use thiserror::Error;

mod chunking;
pub mod constants;
mod polynomial;
mod stream;

pub use chunking::{Chunk, Chunker, ChunkerParams};
pub use polynomial::Pol;
pub use stream::ChunkStream;

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("Invalid polynomial: {0}")]
    InvalidPolynomial(String),

    #[error("Invalid chunker parameters: {0}")]
    InvalidParameters(String),
}
