#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine;
use crate::error::{FxxhError, Result};
use crate::hasher;
use crate::path_codec;

const MAGIC: u32 = 0x0648_5346;
const HEADER_LEN: usize = 64;
const ENTRY_LEN: usize = 40;

/// Hash arbitrary bytes into a 16-byte fingerprint (seed 0). For callers
/// that already have a 16-byte fingerprint, use it directly — fingerprints
/// are only ever compared, never mixed into a content digest.
pub fn fingerprint_of(data: &[u8]) -> [u8; 16] {
    hasher::hash(data, 0, 0)
}

/// Immutable cache configuration shared by every `Cache` it opens.
pub struct Manager {
    version: u32,
    seed_low: u32,
    seed_high: u32,
}

impl Manager {
    /// `version` is truncated to its low 24 bits at construction.
    pub fn new(version: u32, seed_low: u32, seed_high: u32) -> Self {
        Manager {
            version: version & 0x00FF_FFFF,
            seed_low,
            seed_high,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn seed(&self) -> (u32, u32) {
        (self.seed_low, self.seed_high)
    }

    /// Construct a `Cache` bound to this manager and a sidecar path. The
    /// cache starts in the `Created` state — call `open` before anything
    /// else.
    pub fn cache(&self, path: impl AsRef<Path>, fingerprint: [u8; 16]) -> Cache<'_> {
        Cache {
            manager: self,
            path: path.as_ref().to_path_buf(),
            fingerprint,
            header_valid: false,
            old_header: None,
            old_entries: Vec::new(),
            old_paths: Vec::new(),
            validated: None,
            state: CacheState::Created,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Created,
    Opened,
    Validated,
    Closed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheEntry {
    pub ino: f64,
    pub mtime_ms: f64,
    pub size: f64,
    pub hash: [u8; 16],
}

#[derive(Debug, Clone)]
struct Header {
    version: u32,
    entry_count: u32,
    aggregate_digest: [u8; 16],
    fingerprint: [u8; 16],
    paths_len: u32,
    raw_data_len: u32,
    gzip_data_len: u32,
    gzip_uncompressed_len: u32,
    raw_item_count: u16,
    gzip_item_count: u16,
}

/// Public view of the header of the cache as it was when last opened.
#[derive(Debug, Clone, Copy)]
pub struct HeaderInfo {
    pub version: u32,
    pub entry_count: u32,
    pub aggregate_digest: [u8; 16],
    pub fingerprint: [u8; 16],
}

/// One item in the raw-data or gzip-data section. `Null` and `Absent` are
/// distinct on the wire even though both carry no payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
    Null,
    Absent,
}

fn encode_item(item: &Item, out: &mut Vec<u8>) -> Result<()> {
    let (tag, payload): (u8, Vec<u8>) = match item {
        Item::Bytes(b) => (0, b.clone()),
        Item::Text(s) => (1, s.as_bytes().to_vec()),
        Item::Json(v) => (
            2,
            serde_json::to_vec(v).map_err(|e| FxxhError::NotSerializable(e.to_string()))?,
        ),
        Item::Null => (3, Vec::new()),
        Item::Absent => (4, Vec::new()),
    };
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

fn encode_items(items: &[Item]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for item in items {
        encode_item(item, &mut out)?;
    }
    Ok(out)
}

fn decode_items(mut bytes: &[u8]) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 5 {
            return Err(FxxhError::CorruptCache("truncated item header"));
        }
        let tag = bytes[0];
        let len = u32::from_le_bytes(bytes[1..5].try_into().unwrap()) as usize;
        if bytes.len() < 5 + len {
            return Err(FxxhError::CorruptCache("truncated item payload"));
        }
        let payload = &bytes[5..5 + len];
        let item = match tag {
            0 => Item::Bytes(payload.to_vec()),
            1 => Item::Text(
                String::from_utf8(payload.to_vec())
                    .map_err(|_| FxxhError::CorruptCache("invalid utf8 in text item"))?,
            ),
            2 => Item::Json(
                serde_json::from_slice(payload)
                    .map_err(|_| FxxhError::CorruptCache("invalid json in structured item"))?,
            ),
            3 => Item::Null,
            4 => Item::Absent,
            _ => return Err(FxxhError::CorruptCache("unknown item type tag")),
        };
        items.push(item);
        bytes = &bytes[5 + len..];
    }
    Ok(items)
}

fn parse_header(bytes: &[u8]) -> Option<Header> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    if u32::from_le_bytes(bytes[0..4].try_into().ok()?) != MAGIC {
        return None;
    }
    let mut version_bytes = [0u8; 4];
    version_bytes[0..3].copy_from_slice(&bytes[4..7]);
    let mut aggregate_digest = [0u8; 16];
    aggregate_digest.copy_from_slice(&bytes[12..28]);
    let mut fingerprint = [0u8; 16];
    fingerprint.copy_from_slice(&bytes[28..44]);
    Some(Header {
        version: u32::from_le_bytes(version_bytes),
        entry_count: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
        aggregate_digest,
        fingerprint,
        paths_len: u32::from_le_bytes(bytes[44..48].try_into().ok()?),
        raw_data_len: u32::from_le_bytes(bytes[48..52].try_into().ok()?),
        gzip_data_len: u32::from_le_bytes(bytes[52..56].try_into().ok()?),
        gzip_uncompressed_len: u32::from_le_bytes(bytes[56..60].try_into().ok()?),
        raw_item_count: u16::from_le_bytes(bytes[60..62].try_into().ok()?),
        gzip_item_count: u16::from_le_bytes(bytes[62..64].try_into().ok()?),
    })
}

struct ValidatedState {
    paths: Vec<String>,
    entries: Vec<CacheEntry>,
    digest: [u8; 16],
}

#[derive(Debug, Clone, Copy)]
pub struct ValidateResult {
    pub changed: bool,
    pub digest: [u8; 16],
    pub rehashed: usize,
}

#[derive(Default)]
pub struct WriteOptions {
    pub raw: Vec<Item>,
    pub gzip: Vec<Item>,
    pub gzip_level: u32,
}

impl WriteOptions {
    pub fn new() -> Self {
        WriteOptions {
            raw: Vec::new(),
            gzip: Vec::new(),
            gzip_level: 1,
        }
    }
}

pub struct Cache<'m> {
    manager: &'m Manager,
    path: PathBuf,
    fingerprint: [u8; 16],
    header_valid: bool,
    old_header: Option<Header>,
    old_entries: Vec<CacheEntry>,
    old_paths: Vec<String>,
    validated: Option<ValidatedState>,
    state: CacheState,
}

impl Cache<'_> {
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Parse whatever sidecar currently exists at `path`. A missing file, a
    /// bad magic, a version/fingerprint mismatch, or any I/O error all
    /// degrade to "no previous cache" rather than failing — only a
    /// genuinely valid, matching header leaves `header_valid` set.
    pub fn open(&mut self) -> Result<()> {
        self.close();
        self.header_valid = false;
        self.old_header = None;
        self.old_entries = Vec::new();
        self.old_paths = Vec::new();

        if let Ok(mut file) = File::open(&self.path) {
            if self.try_load_header(&mut file).is_none() {
                self.header_valid = false;
            }
        }

        self.state = CacheState::Opened;
        Ok(())
    }

    fn try_load_header(&mut self, file: &mut File) -> Option<()> {
        let mut header_bytes = [0u8; HEADER_LEN];
        file.read_exact(&mut header_bytes).ok()?;
        let header = parse_header(&header_bytes)?;
        if header.version != self.manager.version || header.fingerprint != self.fingerprint {
            return None;
        }

        let mut entries_bytes = vec![0u8; header.entry_count as usize * ENTRY_LEN];
        file.read_exact(&mut entries_bytes).ok()?;
        let mut paths_bytes = vec![0u8; header.paths_len as usize];
        file.read_exact(&mut paths_bytes).ok()?;
        let paths = path_codec::decode(&paths_bytes);
        if paths.len() != header.entry_count as usize {
            return None;
        }

        let entries = entries_bytes
            .chunks_exact(ENTRY_LEN)
            .map(|chunk| CacheEntry {
                ino: f64::from_le_bytes(chunk[0..8].try_into().unwrap()),
                mtime_ms: f64::from_le_bytes(chunk[8..16].try_into().unwrap()),
                size: f64::from_le_bytes(chunk[16..24].try_into().unwrap()),
                hash: chunk[24..40].try_into().unwrap(),
            })
            .collect();

        self.old_header = Some(header);
        self.old_entries = entries;
        self.old_paths = paths;
        self.header_valid = true;
        Some(())
    }

    pub fn header(&self) -> Option<HeaderInfo> {
        self.old_header.as_ref().map(|h| HeaderInfo {
            version: h.version,
            entry_count: h.entry_count,
            aggregate_digest: h.aggregate_digest,
            fingerprint: h.fingerprint,
        })
    }

    /// Resolve the file list, stat every path, reuse hashes for entries
    /// whose `(ino, mtimeMs, size)` are unchanged, and re-hash the rest in
    /// parallel. See the module-level docs for the exact partitioning rule.
    pub fn validate(&mut self, files: Option<&[&str]>) -> Result<ValidateResult> {
        let paths: Vec<String> = match files {
            Some(f) => f.iter().map(|p| p.to_string()).collect(),
            None => self.read_files(),
        };
        let n = paths.len();

        if n == 0 {
            let digest = hasher::hash(&[], self.manager.seed_low, self.manager.seed_high);
            let changed = !(self.header_valid
                && self.old_header.as_ref().is_some_and(|h| h.aggregate_digest == digest));
            self.validated = Some(ValidatedState {
                paths: Vec::new(),
                entries: Vec::new(),
                digest,
            });
            self.state = CacheState::Validated;
            return Ok(ValidateResult {
                changed,
                digest,
                rehashed: 0,
            });
        }

        let stats = stat_paths_concurrent(&paths);

        let old_map: HashMap<&str, &CacheEntry> = if self.header_valid {
            self.old_paths
                .iter()
                .zip(self.old_entries.iter())
                .map(|(p, e)| (p.as_str(), e))
                .collect()
        } else {
            HashMap::new()
        };

        let mut entries = vec![CacheEntry::default(); n];
        let mut enqueue: Vec<(usize, &str)> = Vec::new();
        for (i, path) in paths.iter().enumerate() {
            let stat = stats[i];
            let reused = stat.and_then(|(ino, mtime, size)| {
                old_map.get(path.as_str()).filter(|old| {
                    old.ino == ino && old.mtime_ms == mtime && old.size == size
                })
            });
            match reused {
                Some(old) => entries[i] = **old,
                None => {
                    if let Some((ino, mtime, size)) = stat {
                        entries[i].ino = ino;
                        entries[i].mtime_ms = mtime;
                        entries[i].size = size;
                    }
                    enqueue.push((i, path.as_str()));
                }
            }
        }

        let mut hash_block = vec![0u8; n * 16];
        for (i, e) in entries.iter().enumerate() {
            hash_block[i * 16..i * 16 + 16].copy_from_slice(&e.hash);
        }
        if !enqueue.is_empty() {
            engine::hash_indexed(&enqueue, 0, &mut hash_block)?;
            for &(i, _) in &enqueue {
                entries[i].hash.copy_from_slice(&hash_block[i * 16..i * 16 + 16]);
            }
        }

        let digest = hasher::hash(&hash_block, self.manager.seed_low, self.manager.seed_high);
        let changed = !(self.header_valid
            && self.old_header.as_ref().is_some_and(|h| h.aggregate_digest == digest));
        let rehashed = enqueue.len();

        self.validated = Some(ValidatedState {
            paths,
            entries,
            digest,
        });
        self.state = CacheState::Validated;
        Ok(ValidateResult {
            changed,
            digest,
            rehashed,
        })
    }

    /// The validated path list, or the loaded-but-not-yet-validated one, or
    /// empty if neither is available.
    pub fn read_files(&self) -> Vec<String> {
        if let Some(v) = &self.validated {
            v.paths.clone()
        } else if self.header_valid {
            self.old_paths.clone()
        } else {
            Vec::new()
        }
    }

    pub fn read_raw_data(&self) -> Vec<Item> {
        self.read_section(false).unwrap_or_default()
    }

    pub fn read_gzip_data(&self) -> Vec<Item> {
        self.read_section(true).unwrap_or_default()
    }

    fn section_offsets(&self, header: &Header) -> (u64, u64, u64) {
        let entries_len = header.entry_count as u64 * ENTRY_LEN as u64;
        let paths_offset = HEADER_LEN as u64 + entries_len;
        let raw_offset = paths_offset + header.paths_len as u64;
        let gzip_offset = raw_offset + header.raw_data_len as u64;
        (paths_offset, raw_offset, gzip_offset)
    }

    fn read_section(&self, gzip: bool) -> Option<Vec<Item>> {
        let header = self.old_header.as_ref()?;
        let (_, raw_offset, gzip_offset) = self.section_offsets(header);
        let mut file = File::open(&self.path).ok()?;

        if gzip {
            if header.gzip_data_len == 0 {
                return Some(Vec::new());
            }
            file.seek(SeekFrom::Start(gzip_offset)).ok()?;
            let mut compressed = vec![0u8; header.gzip_data_len as usize];
            file.read_exact(&mut compressed).ok()?;
            let bound = header.gzip_uncompressed_len as u64;
            let mut decoder = flate2::read::MultiGzDecoder::new(&compressed[..]).take(bound + 1);
            let mut plain = Vec::with_capacity(bound as usize);
            decoder.read_to_end(&mut plain).ok()?;
            if plain.len() as u64 != bound {
                return None;
            }
            decode_items(&plain).ok()
        } else {
            if header.raw_data_len == 0 {
                return Some(Vec::new());
            }
            file.seek(SeekFrom::Start(raw_offset)).ok()?;
            let mut raw = vec![0u8; header.raw_data_len as usize];
            file.read_exact(&mut raw).ok()?;
            decode_items(&raw).ok()
        }
    }

    /// Serialize the validated state plus `opts`'s side-channel items and
    /// atomically replace the sidecar file.
    pub fn write(&mut self, opts: &WriteOptions) -> Result<()> {
        let validated = self
            .validated
            .as_ref()
            .ok_or(FxxhError::PrecondViolation("validate must be called before write"))?;
        if !(1..=9).contains(&opts.gzip_level) {
            return Err(FxxhError::Range("gzipLevel must be in 1..=9"));
        }

        let raw_bytes = encode_items(&opts.raw)?;
        let gzip_plain = encode_items(&opts.gzip)?;

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(opts.gzip_level));
        encoder.write_all(&gzip_plain)?;
        let gzip_bytes = encoder.finish()?;

        let paths_bytes = path_codec::encode(&validated.paths);
        let entry_count = validated.entries.len() as u32;

        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..7].copy_from_slice(&self.manager.version.to_le_bytes()[0..3]);
        header[7] = 0;
        header[8..12].copy_from_slice(&entry_count.to_le_bytes());
        header[12..28].copy_from_slice(&validated.digest);
        header[28..44].copy_from_slice(&self.fingerprint);
        header[44..48].copy_from_slice(&(paths_bytes.len() as u32).to_le_bytes());
        header[48..52].copy_from_slice(&(raw_bytes.len() as u32).to_le_bytes());
        header[52..56].copy_from_slice(&(gzip_bytes.len() as u32).to_le_bytes());
        header[56..60].copy_from_slice(&(gzip_plain.len() as u32).to_le_bytes());
        header[60..62].copy_from_slice(&(opts.raw.len() as u16).to_le_bytes());
        header[62..64].copy_from_slice(&(opts.gzip.len() as u16).to_le_bytes());

        let mut body = Vec::with_capacity(
            HEADER_LEN
                + validated.entries.len() * ENTRY_LEN
                + paths_bytes.len()
                + raw_bytes.len()
                + gzip_bytes.len(),
        );
        body.extend_from_slice(&header);
        for e in &validated.entries {
            body.extend_from_slice(&e.ino.to_le_bytes());
            body.extend_from_slice(&e.mtime_ms.to_le_bytes());
            body.extend_from_slice(&e.size.to_le_bytes());
            body.extend_from_slice(&e.hash);
        }
        body.extend_from_slice(&paths_bytes);
        body.extend_from_slice(&raw_bytes);
        body.extend_from_slice(&gzip_bytes);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(format!(".tmp-{}", std::process::id()));
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, &body)?;
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Idempotent; safe to call multiple times or on a cache that never
    /// opened a real handle.
    pub fn close(&mut self) {
        self.state = CacheState::Closed;
    }
}

const STAT_MAX_LANES: usize = 64;

/// `stat` every path with bounded concurrency: `min(64, n)` lanes pull
/// indices off a shared atomic counter, one path per claim, mirroring the
/// engine's work-stealing scheduler (`engine::run_batches`) but with a batch
/// size of 1 — a `stat` call has no streaming phase worth batching.
fn stat_paths_concurrent(paths: &[String]) -> Vec<Option<(f64, f64, f64)>> {
    let n = paths.len();
    let lanes = STAT_MAX_LANES.min(n);

    let mut stats: Vec<Option<(f64, f64, f64)>> = vec![None; n];
    let out = StatOutPtr(stats.as_mut_ptr());
    let next_index = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..lanes {
            let next_index_ref = &next_index;
            scope.spawn(move || {
                loop {
                    let i = next_index_ref.fetch_add(1, Ordering::Relaxed);
                    if i >= n {
                        break;
                    }
                    let value = stat_path(&paths[i]);
                    // SAFETY: `i` is claimed by exactly one lane via fetch_add.
                    unsafe { out.0.add(i).write(value) };
                }
            });
        }
    });

    stats
}

#[derive(Clone, Copy)]
struct StatOutPtr(*mut Option<(f64, f64, f64)>);
// SAFETY: every write through this pointer targets a disjoint index claimed
// by exactly one lane.
unsafe impl Send for StatOutPtr {}
unsafe impl Sync for StatOutPtr {}

#[cfg(unix)]
fn stat_path(path: &str) -> Option<(f64, f64, f64)> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).ok()?;
    let ino = meta.ino() as f64;
    let mtime_ms = meta.mtime() as f64 * 1000.0 + meta.mtime_nsec() as f64 / 1_000_000.0;
    let size = meta.size() as f64;
    Some((ino, mtime_ms, size))
}

#[cfg(not(unix))]
fn stat_path(path: &str) -> Option<(f64, f64, f64)> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0);
    Some((0.0, mtime_ms, meta.len() as f64))
}
