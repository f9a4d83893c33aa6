//! Short-time framing shared by the frame-level descriptors.
//!
//! Frames are centered: frame `t` covers samples
//! `[t*hop - frame/2, t*hop + frame/2)`, zero-padded outside the buffer.
//! A buffer of `n` samples yields `1 + n / hop` frames (none when empty).

/// Analysis frame length in samples
pub const FRAME_LENGTH: usize = 2048;

/// Hop between frame starts in samples
pub const HOP_LENGTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub frame_length: usize,
    pub hop_length: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            frame_length: FRAME_LENGTH,
            hop_length: HOP_LENGTH,
        }
    }
}

impl FrameLayout {
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else {
            1 + len / self.hop_length
        }
    }

    /// Copy centered frame `index` into `out` (length `frame_length`)
    pub fn fill_frame(&self, samples: &[f32], index: usize, out: &mut [f32]) {
        let half = self.frame_length / 2;
        let center = index * self.hop_length;
        for (j, slot) in out.iter_mut().enumerate().take(self.frame_length) {
            let pos = center + j;
            *slot = if pos >= half && pos - half < samples.len() {
                samples[pos - half]
            } else {
                0.0
            };
        }
    }

    /// Iterate over centered frames, reusing one buffer
    pub fn for_each_frame(&self, samples: &[f32], mut f: impl FnMut(&[f32])) {
        let mut frame = vec![0.0f32; self.frame_length];
        for t in 0..self.frame_count(samples.len()) {
            self.fill_frame(samples, t, &mut frame);
            f(&frame);
        }
    }

    /// Root-mean-square energy per frame
    pub fn frame_rms(&self, samples: &[f32]) -> Vec<f32> {
        let mut rms = Vec::with_capacity(self.frame_count(samples.len()));
        let n = self.frame_length as f32;
        self.for_each_frame(samples, |frame| {
            let power: f32 = frame.iter().map(|s| s * s).sum::<f32>() / n;
            rms.push(power.sqrt());
        });
        rms
    }

    /// Fraction of adjacent sample pairs per frame whose sign differs
    pub fn frame_zcr(&self, samples: &[f32]) -> Vec<f32> {
        let mut zcr = Vec::with_capacity(self.frame_count(samples.len()));
        let n = self.frame_length as f32;
        self.for_each_frame(samples, |frame| {
            let crossings = frame
                .windows(2)
                .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
                .count();
            zcr.push(crossings as f32 / n);
        });
        zcr
    }
}
