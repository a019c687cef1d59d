//! The large, process-lifetime buffers shared between the receive worker and
//! the persist worker. All of it is allocated once at startup — nothing here
//! allocates on the hot path.
//!
//! In the original driver these lived in `multiprocessing.RawArray`s guarded
//! by cross-process `Lock`s, because producer and consumer were separate OS
//! processes. Here both run as threads of the same process, so an
//! `Arc<Mutex<Box<[u8]>>>` per buffer is the direct equivalent hand-off: the
//! mutex is still the hand-off token, just without the shared-memory segment.

use std::sync::{Arc, Mutex};

/// A ring of `N` fixed-size buffers for one data stream. The Reassembler
/// writes into the buffer at `cursor`; once full, it is handed to the
/// persister by buffer index and the Reassembler moves to the next one.
#[derive(Clone)]
pub struct PingPongRing {
    buffers: Arc<Vec<Mutex<Box<[u8]>>>>,
    buf_len: usize,
}

impl PingPongRing {
    pub fn new(count: usize, buf_len: usize) -> Self {
        let buffers = (0..count).map(|_| Mutex::new(vec![0u8; buf_len].into_boxed_slice())).collect();
        Self {
            buffers: Arc::new(buffers),
            buf_len,
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn buf_len(&self) -> usize {
        self.buf_len
    }

    /// Locks buffer `index` for the duration of `f`. Used by both the
    /// Reassembler (short write bursts) and the Persister (one bulk copy per
    /// filled buffer) — never held across an await point or a blocking wait.
    pub fn with_buffer<R>(&self, index: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.buffers[index].lock().expect("pingpong buffer mutex poisoned");
        f(&mut guard)
    }
}

/// Per-stream accumulation buffer owned exclusively by the persist worker;
/// unlike the ping-pong ring it is never touched by the receive worker, so it
/// needs no lock.
pub struct SaveCache {
    buffer: Box<[u8]>,
    offset: usize,
}

impl SaveCache {
    pub fn new(size: usize) -> Self {
        Self {
            buffer: vec![0u8; size].into_boxed_slice(),
            offset: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Appends `block` at the current offset and reports whether the cache is
    /// now full. Panics if `block` would overrun the cache — the caller is
    /// responsible for `save_cache_bytes` being a multiple of `block_bytes`.
    pub fn append(&mut self, block: &[u8]) -> bool {
        let end = self.offset + block.len();
        assert!(end <= self.buffer.len(), "save cache block overruns cache capacity");
        self.buffer[self.offset..end].copy_from_slice(block);
        self.offset = end;
        self.offset == self.buffer.len()
    }

    /// Returns the filled cache and resets the offset for the next window.
    pub fn take_and_reset(&mut self) -> &[u8] {
        self.offset = 0;
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// Single-slot buffer for live visualization / auxiliary playback. Writers
/// (the receive worker) never block: a contended lock just means this frame's
/// snapshot is skipped. Readers (the plotter, the audio sampler) block.
#[derive(Clone)]
pub struct SnapshotSlot {
    buffer: Arc<Mutex<Box<[u8]>>>,
}

impl SnapshotSlot {
    pub fn new(len: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(vec![0u8; len].into_boxed_slice())),
        }
    }

    /// Attempts to overwrite the slot; returns `false` without writing if the
    /// slot is currently held by a reader.
    pub fn try_write(&self, data: &[u8]) -> bool {
        match self.buffer.try_lock() {
            Ok(mut guard) => {
                guard.copy_from_slice(data);
                true
            }
            Err(_) => false,
        }
    }

    /// Blocks until the slot is available and returns a copy of its contents.
    pub fn read(&self) -> Box<[u8]> {
        let guard = self.buffer.lock().expect("snapshot mutex poisoned");
        guard.clone()
    }
}
