
use crate::engine;
use crate::error::{FxxhError, Result};
use crate::hasher;
use crate::path_codec;

/// Selects the shape of a bulk-hash result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Just the 16-byte aggregate digest.
    Digest,
    /// `16 * N` bytes of per-file digests, no aggregate.
    Files,
    /// Aggregate followed by per-file digests; degenerates to `Digest` when
    /// there are no files.
    All,
}

/// The file list a bulk-hash request operates over: either a caller-built
/// path list or an already NUL-separated wire buffer.
pub enum Files<'a> {
    Paths(&'a [&'a str]),
    Encoded(&'a [u8]),
}

impl Files<'_> {
    fn resolve(&self) -> Vec<String> {
        match self {
            Files::Paths(paths) => paths.iter().map(|p| p.to_string()).collect(),
            Files::Encoded(bytes) => path_codec::decode(bytes),
        }
    }
}

pub struct BulkRequest<'a> {
    pub files: Files<'a>,
    pub output_mode: OutputMode,
    pub concurrency: usize,
    pub seed_low: u32,
    pub seed_high: u32,
}

impl<'a> BulkRequest<'a> {
    pub fn new(files: Files<'a>) -> Self {
        BulkRequest {
            files,
            output_mode: OutputMode::Digest,
            concurrency: 0,
            seed_low: 0,
            seed_high: 0,
        }
    }
}

/// Run a bulk-hash request, allocating the result. Per-file digests are
/// always seed-0; the aggregate uses the request's seed.
pub fn bulk_hash(req: &BulkRequest) -> Result<Vec<u8>> {
    let paths = req.files.resolve();
    let per_file = engine::hash_contiguous(&paths, req.concurrency)?;
    let digest = hasher::hash(&per_file, req.seed_low, req.seed_high);

    Ok(match req.output_mode {
        OutputMode::Digest => digest.to_vec(),
        OutputMode::Files => per_file,
        OutputMode::All => {
            if per_file.is_empty() {
                digest.to_vec()
            } else {
                let mut out = Vec::with_capacity(16 + per_file.len());
                out.extend_from_slice(&digest);
                out.extend_from_slice(&per_file);
                out
            }
        }
    })
}

/// Run a bulk-hash request, writing the result into `out[out_offset..]`
/// instead of allocating. Fails with `Range` if the span is too small.
pub fn bulk_hash_into(req: &BulkRequest, out: &mut [u8], out_offset: usize) -> Result<()> {
    let result = bulk_hash(req)?;
    let end = out_offset
        .checked_add(result.len())
        .ok_or(FxxhError::Range("bulk_hash_into: offset + length overflows"))?;
    if end > out.len() {
        return Err(FxxhError::Range("bulk_hash_into: output buffer too small"));
    }
    out[out_offset..end].copy_from_slice(&result);
    Ok(())
}

/// Result of the streaming companion operation `update_files_bulk`.
pub enum FilesDigestOutput {
    /// Caller did not request the per-file block back.
    None,
    /// The per-file digest block (`16 * N` bytes), newly allocated.
    Owned(Vec<u8>),
}

/// Hash `paths` in parallel as in `bulk_hash`, then feed the resulting
/// `16*N`-byte block into `hasher`'s streaming state via `update`. Lets a
/// caller mix file content with other data into a single aggregate digest.
pub fn update_files_bulk(
    hasher: &mut hasher::Hasher,
    paths: &[&str],
    concurrency: usize,
    want_output: bool,
) -> Result<FilesDigestOutput> {
    let per_file = engine::hash_contiguous(paths, concurrency)?;
    hasher.update(&per_file, 0, per_file.len())?;
    Ok(if want_output {
        FilesDigestOutput::Owned(per_file)
    } else {
        FilesDigestOutput::None
    })
}

/// As `update_files_bulk`, but writes the per-file block into a caller span
/// instead of returning an owned buffer.
pub fn update_files_bulk_into(
    hasher: &mut hasher::Hasher,
    paths: &[&str],
    concurrency: usize,
    out: &mut [u8],
    out_offset: usize,
) -> Result<()> {
    let per_file = engine::hash_contiguous(paths, concurrency)?;
    hasher.update(&per_file, 0, per_file.len())?;
    let end = out_offset
        .checked_add(per_file.len())
        .ok_or(FxxhError::Range("update_files_bulk_into: offset + length overflows"))?;
    if end > out.len() {
        return Err(FxxhError::Range("update_files_bulk_into: output buffer too small"));
    }
    out[out_offset..end].copy_from_slice(&per_file);
    Ok(())
}
