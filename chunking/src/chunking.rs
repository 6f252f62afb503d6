use std::cmp::min;

use bytes::Bytes;

use crate::constants::{DEFAULT_POLYNOMIAL, MAXIMUM_CHUNK_SIZE, MINIMUM_CHUNK_SIZE, TARGET_CHUNK_SIZE, WINDOW_SIZE};
use crate::{ChunkingError, Pol};

/// A content-defined run of bytes cut from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Parameters that, together with the input bytes, fully determine the chunk boundaries.
///
/// Changing any of them changes every key produced, so they have to stay fixed for a deployment
/// for deduplication across uploads to work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerParams {
    pub polynomial: Pol,
    pub minimum_chunk: usize,
    pub target_chunk: usize,
    pub maximum_chunk: usize,
}

impl Default for ChunkerParams {
    fn default() -> Self {
        Self {
            polynomial: DEFAULT_POLYNOMIAL,
            minimum_chunk: MINIMUM_CHUNK_SIZE,
            target_chunk: TARGET_CHUNK_SIZE,
            maximum_chunk: MAXIMUM_CHUNK_SIZE,
        }
    }
}

impl ChunkerParams {
    pub fn with_polynomial(polynomial: Pol) -> Self {
        Self {
            polynomial,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ChunkingError> {
        let deg = self.polynomial.deg();
        // The digest is shifted left by a byte on every step and has to stay within 64 bits.
        if !(9..=56).contains(&deg) {
            return Err(ChunkingError::InvalidPolynomial(format!(
                "{} has degree {deg}, expected between 9 and 56",
                self.polynomial
            )));
        }
        if !self.polynomial.is_irreducible() {
            return Err(ChunkingError::InvalidPolynomial(format!("{} is not irreducible", self.polynomial)));
        }
        if self.target_chunk.count_ones() != 1 || self.target_chunk < 2 {
            return Err(ChunkingError::InvalidParameters(format!(
                "target chunk size {} is not a power of two",
                self.target_chunk
            )));
        }
        if self.minimum_chunk <= WINDOW_SIZE {
            return Err(ChunkingError::InvalidParameters(format!(
                "minimum chunk size {} must exceed the window size {WINDOW_SIZE}",
                self.minimum_chunk
            )));
        }
        if self.maximum_chunk <= self.minimum_chunk {
            return Err(ChunkingError::InvalidParameters(format!(
                "maximum chunk size {} must exceed minimum chunk size {}",
                self.maximum_chunk, self.minimum_chunk
            )));
        }
        Ok(())
    }
}

/// Lookup tables derived from the polynomial.
struct Tables {
    /// `out[b]` is the hash of `b` followed by `WINDOW_SIZE - 1` zero bytes; xor-ing it
    /// removes `b` from the window.
    out: [u64; 256],
    /// `reduce[b]` reduces the 8 bits that overflow the polynomial degree in a single xor.
    reduce: [u64; 256],
}

impl Tables {
    fn new(pol: Pol) -> Self {
        let mut out = [0u64; 256];
        let mut reduce = [0u64; 256];

        for b in 0..256usize {
            let mut h = append_byte(Pol::new(0), b as u8, pol);
            for _ in 0..(WINDOW_SIZE - 1) {
                h = append_byte(h, 0, pol);
            }
            out[b] = h.value();
        }

        let k = pol.deg() as u32;
        for b in 0..256u64 {
            reduce[b as usize] = Pol::new(b << k).modulo(pol).value() | (b << k);
        }

        Self { out, reduce }
    }
}

fn append_byte(hash: Pol, b: u8, pol: Pol) -> Pol {
    Pol::new((hash.value() << 8) | b as u64).modulo(pol)
}

/// Rabin fingerprint chunker.
///
/// Feed it data with [`Chunker::next`] or [`Chunker::next_block`]; boundaries depend only on the
/// bytes and the [`ChunkerParams`], never on how the input was split into calls.
pub struct Chunker {
    // configs
    tables: Box<Tables>,
    pol_shift: u32,
    minimum_chunk: usize,
    maximum_chunk: usize,
    split_mask: u64,

    // rolling hash state
    window: [u8; WINDOW_SIZE],
    wpos: usize,
    digest: u64,

    // generator state
    chunkbuf: Vec<u8>,
    cur_chunk_len: usize,
}

impl Chunker {
    pub fn new(params: &ChunkerParams) -> Result<Self, ChunkingError> {
        params.validate()?;

        let mut chunker = Chunker {
            tables: Box::new(Tables::new(params.polynomial)),
            pol_shift: (params.polynomial.deg() - 8) as u32,
            minimum_chunk: params.minimum_chunk,
            maximum_chunk: params.maximum_chunk,
            split_mask: (params.target_chunk - 1) as u64,
            window: [0; WINDOW_SIZE],
            wpos: 0,
            digest: 0,
            chunkbuf: Vec::with_capacity(params.minimum_chunk),
            cur_chunk_len: 0,
        };
        chunker.reset();
        Ok(chunker)
    }

    fn reset(&mut self) {
        self.window = [0; WINDOW_SIZE];
        self.wpos = 0;
        self.digest = 0;
        self.cur_chunk_len = 0;
        self.slide(1);
    }

    #[inline]
    fn slide(&mut self, b: u8) {
        let out = self.window[self.wpos];
        self.window[self.wpos] = b;
        self.digest ^= self.tables.out[out as usize];
        self.wpos = (self.wpos + 1) % WINDOW_SIZE;

        let index = (self.digest >> self.pol_shift) as usize;
        debug_assert!(index < 256);
        self.digest = ((self.digest << 8) | b as u64) ^ self.tables.reduce[index];
    }

    /// Process more data; this is a continuation of any data from before when calls were
    ///
    /// Returns the next chunk, if available, and the amount of data that was digested.
    ///
    /// If is_final is true, then it is assumed that no more data after this block will come,
    /// and any data currently present and at the end will be put into a final chunk.
    pub fn next(&mut self, data: &[u8], is_final: bool) -> (Option<Chunk>, usize) {
        let n_bytes = data.len();

        let mut create_chunk = false;
        let mut consume_len = 0;

        if n_bytes != 0 {
            // Nothing before minimum_chunk - WINDOW_SIZE can influence a boundary, so skip hashing it.
            let skip_until = self.minimum_chunk - WINDOW_SIZE;
            if self.cur_chunk_len < skip_until {
                let max_advance = min(skip_until - self.cur_chunk_len, n_bytes);
                consume_len += max_advance;
                self.cur_chunk_len += max_advance;
            }

            while consume_len < n_bytes {
                self.slide(data[consume_len]);
                consume_len += 1;
                self.cur_chunk_len += 1;

                if self.cur_chunk_len < self.minimum_chunk {
                    continue;
                }

                if self.digest & self.split_mask == 0 || self.cur_chunk_len >= self.maximum_chunk {
                    create_chunk = true;
                    break;
                }
            }

            self.chunkbuf.extend_from_slice(&data[..consume_len]);
        }

        let ret;
        if create_chunk || (is_final && !self.chunkbuf.is_empty()) {
            let data = std::mem::replace(&mut self.chunkbuf, Vec::with_capacity(self.minimum_chunk));
            let chunk = Chunk { data: data.into() };

            self.reset();

            ret = (Some(chunk), consume_len)
        } else {
            ret = (None, consume_len)
        }

        #[cfg(debug_assertions)]
        {
            debug_assert!(ret.1 <= data.len());

            // If no chunk is returned, then make sure all the data is consumed.
            if ret.0.is_none() {
                debug_assert_eq!(ret.1, data.len());
            }
        }

        ret
    }

    /// Processes several blocks at once, returning every chunk completed within `data`.
    pub fn next_block(&mut self, data: &[u8], is_final: bool) -> Vec<Chunk> {
        let mut ret = Vec::new();

        let mut pos = 0;
        loop {
            debug_assert!(pos <= data.len());
            if pos == data.len() {
                if is_final {
                    ret.extend(self.finish());
                }
                return ret;
            }

            let (maybe_chunk, bytes_consumed) = self.next(&data[pos..], is_final);

            if let Some(chunk) = maybe_chunk {
                ret.push(chunk);
            }

            pos += bytes_consumed;
        }
    }

    /// Flushes any buffered data as a final chunk.
    pub fn finish(&mut self) -> Option<Chunk> {
        self.next(&[], true).0
    }
}
