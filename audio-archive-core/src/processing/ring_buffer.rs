use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free SPSC ring buffer of f32 samples, one per audio channel.
///
/// The real-time audio callback is the only writer and the drain loop the
/// only reader; under that discipline no locks are needed. Positions are
/// monotonically increasing sample counts, reduced modulo capacity only
/// when indexing the backing slice.
///
/// Writes are all-or-nothing: a write that does not fit rejects the whole
/// slice and leaves the buffer untouched, so the caller can flag an
/// overflow instead of desynchronizing channels with a partial write.
pub struct FrameRing {
    #[allow(dead_code)] // keeps the allocation alive; data_ptr points into it
    data: Box<[f32]>,
    data_ptr: *mut f32,
    capacity: usize,
    /// Total samples written by the producer.
    write_pos: AtomicUsize,
    /// Total samples consumed by the reader.
    read_pos: AtomicUsize,
}

// SAFETY: exactly one producer thread calls `write` and exactly one consumer
// thread calls `read`; the write/read positions are published with
// release/acquire ordering, so each side only touches slice regions the
// other has already given up.
unsafe impl Send for FrameRing {}
unsafe impl Sync for FrameRing {}

impl FrameRing {
    /// Create a ring holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let mut data = vec![0.0f32; capacity].into_boxed_slice();
        let data_ptr = data.as_mut_ptr();
        Self {
            data,
            data_ptr,
            capacity,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples the consumer can currently read.
    pub fn available_to_read(&self) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let rp = self.read_pos.load(Ordering::Acquire);
        wp - rp
    }

    /// Samples the producer can currently write.
    pub fn available_to_write(&self) -> usize {
        self.capacity - self.available_to_read()
    }

    /// Producer-only. Write all of `samples`, or nothing.
    ///
    /// Returns the number of samples written: `samples.len()` on success,
    /// 0 if the buffer lacked space. Never blocks or allocates.
    pub fn write(&self, samples: &[f32]) -> usize {
        let wp = self.write_pos.load(Ordering::Relaxed);
        let rp = self.read_pos.load(Ordering::Acquire);
        if self.capacity - (wp - rp) < samples.len() {
            return 0;
        }

        for (i, &sample) in samples.iter().enumerate() {
            let idx = (wp + i) % self.capacity;
            // SAFETY: idx < capacity, and the region past wp is not read by
            // the consumer until write_pos is published below.
            unsafe { *self.data_ptr.add(idx) = sample };
        }

        self.write_pos.store(wp + samples.len(), Ordering::Release);
        samples.len()
    }

    /// Consumer-only. Read up to `out.len()` samples into `out`.
    ///
    /// Returns the number of samples read. Never blocks.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let rp = self.read_pos.load(Ordering::Relaxed);
        let to_read = out.len().min(wp - rp);
        if to_read == 0 {
            return 0;
        }

        for (i, slot) in out[..to_read].iter_mut().enumerate() {
            let idx = (rp + i) % self.capacity;
            // SAFETY: idx < capacity, and the region before wp was published
            // by the producer's release store.
            *slot = unsafe { *self.data_ptr.add(idx) };
        }

        self.read_pos.store(rp + to_read, Ordering::Release);
        to_read
    }
}

impl std::fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRing")
            .field("capacity", &self.capacity)
            .field("available_to_read", &self.available_to_read())
            .finish()
    }
}
