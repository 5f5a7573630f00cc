#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
#[cfg(target_os = "linux")]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{FxxhError, Result};
use crate::hasher;

/// Compile-time cap on spawned threads per invocation, regardless of
/// hardware parallelism or caller concurrency hint.
const MAX_THREADS: usize = 16;

/// Per-thread read buffer. Large enough that most files are hashed in a
/// single read; small enough that a full slab of `MAX_THREADS` of these is
/// a modest, bounded allocation.
const PER_THREAD_BUF: usize = 256 * 1024;

/// Process-wide count of threads currently inside a parallel hash phase.
/// Relaxed, best-effort — it only prevents a storm of concurrent
/// invocations from oversubscribing the CPU, never blocks anyone.
static ACTIVE_HASH_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Hash every path in `paths`, writing the per-file digests contiguously
/// (input order) into a freshly allocated `16 * paths.len()` byte buffer.
pub fn hash_contiguous<T: AsRef<str>>(paths: &[T], concurrency: usize) -> Result<Vec<u8>> {
    let items: Vec<(usize, &str)> = paths.iter().enumerate().map(|(i, p)| (i, p.as_ref())).collect();
    let mut out = vec![0u8; paths.len() * 16];
    hash_indexed(&items, concurrency, &mut out)?;
    Ok(out)
}

/// Hash the given `(global_index, path)` pairs in parallel, scattering each
/// resulting 16-byte digest into `out[global_index*16..+16]`. Lets callers
/// (the cache's incremental re-hash) hash only a subset of a larger path
/// list while still writing into the right slot.
pub fn hash_indexed(items: &[(usize, &str)], concurrency: usize, out: &mut [u8]) -> Result<()> {
    let n = items.len();
    if n == 0 {
        return Ok(());
    }

    if let Some(max_idx) = items.iter().map(|(i, _)| *i).max() {
        if (max_idx + 1) * 16 > out.len() {
            return Err(FxxhError::Range("hash_indexed: output buffer too small for max index"));
        }
    }

    let t = compute_thread_count(n, concurrency);
    let batch = (n / (t * 4)).clamp(1, 32);
    let t = t.min(n.div_ceil(batch)).max(1);

    ACTIVE_HASH_THREADS.fetch_add(t, Ordering::Relaxed);
    let result = run_batches(items, out, t, batch);
    ACTIVE_HASH_THREADS.fetch_sub(t, Ordering::Relaxed);
    result
}

/// Resolve the thread count: caller hint (or hardware parallelism if 0),
/// capped at `MAX_THREADS`, further capped by the global budget so every
/// invocation still gets at least one thread.
fn compute_thread_count(n: usize, concurrency: usize) -> usize {
    let hw = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
        .max(2);
    let mut t = if concurrency > 0 { concurrency } else { hw };
    t = t.min(MAX_THREADS);
    let active = ACTIVE_HASH_THREADS.load(Ordering::Relaxed);
    t = t.min(hw.saturating_sub(active).max(1));
    t.min(n).max(1)
}

/// A single contiguous, 64-byte-aligned allocation striped into `threads`
/// equal `PER_THREAD_BUF`-sized slices — one allocation total instead of one
/// per thread, and large buffers kept off thread stacks.
struct Slab {
    ptr: *mut u8,
    layout: std::alloc::Layout,
    per_thread: usize,
}

// SAFETY: each thread only ever touches the disjoint slice handed to it by
// `slice_mut`; the slab itself is never mutated through shared state.
unsafe impl Sync for Slab {}

impl Slab {
    fn new(threads: usize, per_thread: usize) -> Result<Self> {
        let total = threads
            .checked_mul(per_thread)
            .ok_or(FxxhError::OutOfMemory("slab size overflow"))?;
        let layout = std::alloc::Layout::from_size_align(total, 64)
            .map_err(|_| FxxhError::OutOfMemory("invalid slab layout"))?;
        let ptr = unsafe { std::alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(FxxhError::OutOfMemory("slab allocation failed"));
        }
        Ok(Slab { ptr, layout, per_thread })
    }

    /// # Safety
    /// Caller must ensure `tid < threads` passed to `new` and that no two
    /// live calls share a `tid`.
    unsafe fn slice_mut(&self, tid: usize) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.add(tid * self.per_thread), self.per_thread)
        }
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr, self.layout) };
    }
}

#[derive(Clone, Copy)]
struct OutPtr(*mut u8);
// SAFETY: every write through this pointer targets a disjoint 16-byte slot.
unsafe impl Send for OutPtr {}
unsafe impl Sync for OutPtr {}

fn run_batches(items: &[(usize, &str)], out: &mut [u8], threads: usize, batch: usize) -> Result<()> {
    let n = items.len();
    let slab = Slab::new(threads, PER_THREAD_BUF)?;
    let next_index = AtomicUsize::new(0);
    let out_ptr = OutPtr(out.as_mut_ptr());

    std::thread::scope(|scope| {
        for tid in 0..threads {
            let slab_ref = &slab;
            let next_index_ref = &next_index;
            scope.spawn(move || {
                // SAFETY: `tid` is unique per spawned thread in 0..threads.
                let buf = unsafe { slab_ref.slice_mut(tid) };
                loop {
                    let base = next_index_ref.fetch_add(batch, Ordering::Relaxed);
                    if base >= n {
                        break;
                    }
                    let end = (base + batch).min(n);
                    for &(global_idx, path) in &items[base..end] {
                        let digest = hash_one_file(path, buf);
                        // SAFETY: global_idx was range-checked against out.len() above.
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                digest.as_ptr(),
                                out_ptr.0.add(global_idx * 16),
                                16,
                            );
                        }
                    }
                }
            });
        }
    });
    Ok(())
}

/// Hash a single file path into a 16-byte digest, using `buf` as scratch.
/// Never fails: missing paths, permission errors, and mid-stream I/O errors
/// all degenerate to a zero hash rather than aborting the batch.
fn hash_one_file(path: &str, buf: &mut [u8]) -> [u8; 16] {
    if path.is_empty() {
        return [0u8; 16];
    }
    let mut file = match open_noatime(Path::new(path)) {
        Ok(f) => f,
        Err(_) => return [0u8; 16],
    };
    advise_sequential(&file);
    match read_full(&mut file, buf) {
        Ok(n) if n < buf.len() => hasher::hash(&buf[..n], 0, 0),
        Ok(_) => hash_large_file(file, buf),
        Err(_) => [0u8; 16],
    }
}

/// The large-file streaming path. Deliberately kept out of `hash_one_file`
/// so the common (single-read) case stays hot-path-small.
#[inline(never)]
fn hash_large_file(mut file: File, buf: &mut [u8]) -> [u8; 16] {
    let mut h = hasher::Hasher::new(0, 0);
    if h.update(buf, 0, buf.len()).is_err() {
        return [0u8; 16];
    }
    loop {
        match read_full(&mut file, buf) {
            Ok(0) => break,
            Ok(n) => {
                if h.update(buf, 0, n).is_err() {
                    return [0u8; 16];
                }
                if n < buf.len() {
                    break;
                }
            }
            Err(_) => return [0u8; 16],
        }
    }
    h.digest()
}

/// Read as many bytes as possible into `buf`, retrying on partial reads and
/// `Interrupted`, so a short result reliably means EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Track whether O_NOATIME is supported to avoid repeated failed open()
/// attempts: after the first EPERM, never try the flag again this process.
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

#[cfg(target_os = "linux")]
fn advise_sequential(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_sequential(_file: &File) {}

/// Best-effort warm-up of the page cache for a batch of paths about to be
/// hashed. Non-blocking; a no-op off Linux.
#[cfg(target_os = "linux")]
pub fn readahead_files(paths: &[&str]) {
    use std::os::unix::io::AsRawFd;
    for path in paths {
        if path.is_empty() {
            continue;
        }
        if let Ok(file) = open_noatime(Path::new(path)) {
            if let Ok(meta) = file.metadata() {
                if meta.file_type().is_file() && meta.len() > 0 {
                    unsafe {
                        libc::posix_fadvise(
                            file.as_raw_fd(),
                            0,
                            meta.len() as i64,
                            libc::POSIX_FADV_WILLNEED,
                        );
                    }
                }
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn readahead_files(_paths: &[&str]) {}
