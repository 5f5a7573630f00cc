
use std::sync::OnceLock;

use crate::error::{FxxhError, Result};

/// Observable backend the hasher is currently running under. Opaque to
/// callers beyond this enum — which variant is active never changes the
/// output, only how it got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryStatus {
    NotInitialized,
    Native,
    Portable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Native,
    Portable,
}

static BACKEND: OnceLock<Backend> = OnceLock::new();

fn backend() -> Backend {
    *BACKEND.get_or_init(probe_backend)
}

/// Probe the runtime-SIMD-dispatching implementation against the pure-scalar
/// one on a fixed input. They must always agree; if they ever don't (e.g. a
/// miscompiled SIMD path on an exotic target) fall back to the scalar one
/// rather than risk silently-wrong digests.
fn probe_backend() -> Backend {
    const PROBE: &[u8] = b"fxxh-backend-probe";
    let native = xxhash_rust::xxh3::xxh3_128(PROBE);
    let portable = xxhash_rust::const_xxh3::xxh3_128(PROBE);
    if native == portable {
        Backend::Native
    } else {
        Backend::Portable
    }
}

/// Current backend, or `NotInitialized` if no hasher operation has run yet
/// in this process.
pub fn library_status() -> LibraryStatus {
    match BACKEND.get() {
        None => LibraryStatus::NotInitialized,
        Some(Backend::Native) => LibraryStatus::Native,
        Some(Backend::Portable) => LibraryStatus::Portable,
    }
}

/// Reassemble the wire-format `(seedLow, seedHigh)` pair into the 64-bit
/// seed the algorithm consumes.
#[inline]
pub fn combine_seed(seed_low: u32, seed_high: u32) -> u64 {
    ((seed_high as u64) << 32) | seed_low as u64
}

enum State {
    Native(xxhash_rust::xxh3::Xxh3),
    // const_xxh3 only exposes one-shot entry points, so the portable backend
    // buffers input and hashes at digest time.
    Portable(Vec<u8>),
}

/// A streaming XXH3-128 context with a fixed seed, constant for the life of
/// the hasher.
pub struct Hasher {
    seed: u64,
    state: State,
}

impl Hasher {
    pub fn new(seed_low: u32, seed_high: u32) -> Self {
        let seed = combine_seed(seed_low, seed_high);
        Hasher {
            seed,
            state: fresh_state(seed),
        }
    }

    /// Reset to a fresh state, preserving the seed fixed at construction.
    pub fn reset(&mut self) {
        self.state = fresh_state(self.seed);
    }

    /// Advance the state by `bytes[offset..offset+len]`. `len == 0` is a
    /// no-op that still validates the range.
    pub fn update(&mut self, bytes: &[u8], offset: usize, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or(FxxhError::Range("update: offset + len overflows"))?;
        if end > bytes.len() {
            return Err(FxxhError::Range("update: offset + len exceeds buffer length"));
        }
        if len == 0 {
            return Ok(());
        }
        let slice = &bytes[offset..end];
        match &mut self.state {
            State::Native(h) => h.update(slice),
            State::Portable(buf) => buf.extend_from_slice(slice),
        }
        Ok(())
    }

    /// Canonical big-endian 16-byte digest. Idempotent — does not mutate
    /// state, so it may be called repeatedly between `update`s.
    pub fn digest(&self) -> [u8; 16] {
        match &self.state {
            State::Native(h) => h.digest128().to_be_bytes(),
            State::Portable(buf) => {
                xxhash_rust::const_xxh3::xxh3_128_with_seed(buf, self.seed).to_be_bytes()
            }
        }
    }

    /// Write the 16-byte digest into `out[offset..offset+16]`.
    pub fn digest_to(&self, out: &mut [u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(16)
            .ok_or(FxxhError::Range("digest_to: offset + 16 overflows"))?;
        if end > out.len() {
            return Err(FxxhError::Range("digest_to: offset + 16 exceeds output length"));
        }
        out[offset..end].copy_from_slice(&self.digest());
        Ok(())
    }
}

fn fresh_state(seed: u64) -> State {
    match backend() {
        Backend::Native => State::Native(xxhash_rust::xxh3::Xxh3::with_seed(seed)),
        Backend::Portable => State::Portable(Vec::new()),
    }
}

/// One-shot hash of an entire byte span at the given seed.
pub fn hash(bytes: &[u8], seed_low: u32, seed_high: u32) -> [u8; 16] {
    let seed = combine_seed(seed_low, seed_high);
    let digest = match backend() {
        Backend::Native => xxhash_rust::xxh3::xxh3_128_with_seed(bytes, seed),
        Backend::Portable => xxhash_rust::const_xxh3::xxh3_128_with_seed(bytes, seed),
    };
    digest.to_be_bytes()
}
