//! Chunk-boundary stitching.
//!
//! [`CrossfadeBuffer`] blends the head of each processed chunk with the tail
//! of the previous one so block-boundary discontinuities stay inaudible. A
//! backing [`CircularBuffer`] keeps a longer horizon of processed audio with
//! an overwrite-oldest overflow policy.

/// Fixed-capacity sample ring. Writes past capacity wrap and overwrite the
/// oldest data.
pub struct CircularBuffer {
    buf: Vec<f32>,
    write_pos: usize,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn write(&mut self, data: &[f32]) {
        let cap = self.buf.len();
        if cap == 0 {
            return;
        }
        // Oversized writes keep only the newest capacity-sized window.
        let data = if data.len() > cap {
            &data[data.len() - cap..]
        } else {
            data
        };

        let n = data.len();
        let space = cap - self.write_pos;
        if n <= space {
            self.buf[self.write_pos..self.write_pos + n].copy_from_slice(data);
        } else {
            self.buf[self.write_pos..].copy_from_slice(&data[..space]);
            self.buf[..n - space].copy_from_slice(&data[space..]);
        }
        self.write_pos = (self.write_pos + n) % cap;
    }

    pub fn clear(&mut self) {
        self.buf.fill(0.0);
        self.write_pos = 0;
    }
}

/// Crossfade state: linear fade ramps plus the retained tail of the previous
/// chunk. An all-zero tail means no chunk has been emitted yet and no fade is
/// applied.
pub struct CrossfadeBuffer {
    fade_len: usize,
    fade_in: Vec<f32>,
    fade_out: Vec<f32>,
    tail: Vec<f32>,
    ring: CircularBuffer,
}

impl CrossfadeBuffer {
    pub fn new(fade_len: usize, ring_capacity: usize) -> Self {
        let denom = (fade_len.max(2) - 1) as f32;
        let fade_in: Vec<f32> = (0..fade_len).map(|i| i as f32 / denom).collect();
        let fade_out: Vec<f32> = fade_in.iter().map(|&g| 1.0 - g).collect();
        Self {
            fade_len,
            fade_in,
            fade_out,
            tail: vec![0.0; fade_len],
            ring: CircularBuffer::new(ring_capacity),
        }
    }

    /// Blend the chunk head against the previous tail and retain the new
    /// tail. Chunks shorter than two fade windows pass through untouched
    /// (too short to fade safely).
    pub fn apply(&mut self, mut chunk: Vec<f32>) -> Vec<f32> {
        if chunk.len() < self.fade_len * 2 {
            return chunk;
        }

        if self.tail.iter().any(|&s| s != 0.0) {
            for i in 0..self.fade_len {
                chunk[i] = self.tail[i] * self.fade_out[i] + chunk[i] * self.fade_in[i];
            }
        }

        let start = chunk.len() - self.fade_len;
        self.tail.copy_from_slice(&chunk[start..]);
        self.ring.write(&chunk);
        chunk
    }

    /// Reset the tail sentinel and the backing ring.
    pub fn clear(&mut self) {
        self.tail.fill(0.0);
        self.ring.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_wraps_overwriting_oldest() {
        let mut ring = CircularBuffer::new(8);
        ring.write(&[1.0; 4]);
        ring.write(&[2.0; 4]);
        assert_eq!(&ring.buf[..4], &[1.0; 4]);
        assert_eq!(&ring.buf[4..], &[2.0; 4]);

        // Third write wraps to the front, leaving [4,8) intact.
        ring.write(&[3.0; 4]);
        assert_eq!(&ring.buf[..4], &[3.0; 4]);
        assert_eq!(&ring.buf[4..], &[2.0; 4]);
        assert_eq!(ring.write_pos, 4);
    }

    #[test]
    fn test_ring_oversized_write_keeps_newest() {
        let mut ring = CircularBuffer::new(4);
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        ring.write(&data);
        let mut seen = ring.buf.clone();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_first_chunk_passes_unfaded() {
        let mut xf = CrossfadeBuffer::new(4, 32);
        let chunk = vec![0.5; 16];
        assert_eq!(xf.apply(chunk.clone()), chunk);
    }

    #[test]
    fn test_second_chunk_head_is_blended() {
        let mut xf = CrossfadeBuffer::new(4, 32);
        xf.apply(vec![1.0; 16]);
        let out = xf.apply(vec![0.0; 16]);

        // Head ramps from the previous tail (1.0) down toward the new chunk.
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!(out[1] < 1.0 && out[1] > 0.0);
        assert!((out[3] - 0.0).abs() < 1e-6);
        // Past the fade window the chunk is untouched.
        assert_eq!(&out[4..], &[0.0; 12]);
    }

    #[test]
    fn test_short_chunk_returned_unchanged() {
        let mut xf = CrossfadeBuffer::new(8, 32);
        xf.apply(vec![1.0; 32]);
        let short = vec![0.25; 12];
        assert_eq!(xf.apply(short.clone()), short);
    }

    #[test]
    fn test_clear_resets_tail_sentinel() {
        let mut xf = CrossfadeBuffer::new(4, 32);
        xf.apply(vec![1.0; 16]);
        xf.clear();
        let chunk = vec![0.0; 16];
        // Zero tail sentinel: no blending happens.
        assert_eq!(xf.apply(chunk.clone()), chunk);
        assert!(xf.ring.buf.iter().all(|&s| s == 0.0));
    }
}
