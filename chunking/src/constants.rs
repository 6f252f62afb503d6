use crate::Pol;

/// Size in bytes of the sliding window the rolling hash is computed over.
pub const WINDOW_SIZE: usize = 64;

/// No chunk boundary is placed before this many bytes (except at the end of the stream).
pub const MINIMUM_CHUNK_SIZE: usize = 512 * 1024;

/// Average chunk size; the split mask is `TARGET_CHUNK_SIZE - 1`.
pub const TARGET_CHUNK_SIZE: usize = 1024 * 1024;

/// A chunk is always cut once it reaches this size.
pub const MAXIMUM_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Default split polynomial (irreducible, degree 53). Deployments should configure their own.
pub const DEFAULT_POLYNOMIAL: Pol = Pol::new(0x3DA3358B4DC173);

/// How much data [`crate::ChunkStream`] asks its reader for at once.
pub const READ_BLOCK_SIZE: usize = 512 * 1024;

/// Number of random candidates tried by [`Pol::random`] before giving up.
pub(crate) const RANDOM_POLYNOMIAL_MAX_TRIES: usize = 1_000_000;
