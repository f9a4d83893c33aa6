use rubato::{FftFixedIn, Resampler};
use std::sync::atomic::AtomicBool;
use tracing::debug;

use super::{stop_requested, AudioValidationError};

/// Input chunk size fed to the FFT resampler
const CHUNK_FRAMES: usize = 1024;

/// Mono FFT resampler between two fixed rates
pub struct AudioResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    input_frames: usize,
}

impl AudioResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, AudioValidationError> {
        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio: {:.4})",
            from_rate,
            to_rate,
            to_rate as f64 / from_rate as f64
        );

        let resampler = FftFixedIn::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_FRAMES,
            2, // sub_chunks for quality
            1,
        )
        .map_err(|e| AudioValidationError::CorruptAudio(format!("resampler init: {}", e)))?;

        let input_frames = resampler.input_frames_next();
        let input_buffer = vec![vec![0.0f32; input_frames]; 1];
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            input_frames,
        })
    }

    /// Number of input frames each `process` call consumes
    pub fn input_frames_next(&self) -> usize {
        self.input_frames
    }

    /// Frames of leading delay the resampler introduces
    pub fn output_delay(&self) -> usize {
        self.resampler.output_delay()
    }

    /// Resample exactly `input_frames_next()` samples
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioValidationError> {
        if input.len() != self.input_frames {
            return Err(AudioValidationError::CorruptAudio(format!(
                "resampler input length {} doesn't match expected {}",
                input.len(),
                self.input_frames
            )));
        }

        self.input_buffer[0].copy_from_slice(input);

        let (_, output_frames) = self
            .resampler
            .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
            .map_err(|e| AudioValidationError::CorruptAudio(format!("resample: {}", e)))?;

        Ok(self.output_buffer[0][..output_frames].to_vec())
    }
}

/// Resample a whole mono buffer, compensating for the resampler's delay so the
/// output is time-aligned with the input and `len * to / from` samples long.
pub fn resample(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, AudioValidationError> {
    resample_until(samples, from_rate, to_rate, None)
}

/// [`resample`] that checks `stop_flag` before every chunk and returns
/// [`AudioValidationError::Cancelled`] once it is raised.
pub fn resample_until(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
    stop_flag: Option<&AtomicBool>,
) -> Result<Vec<f32>, AudioValidationError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = AudioResampler::new(from_rate, to_rate)?;
    let chunk = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;

    let mut output = Vec::with_capacity(expected_len + delay + chunk);
    let mut padded = vec![0.0f32; chunk];

    for block in samples.chunks(chunk) {
        if stop_requested(stop_flag) {
            return Err(AudioValidationError::Cancelled);
        }
        let input = if block.len() == chunk {
            block
        } else {
            padded.fill(0.0);
            padded[..block.len()].copy_from_slice(block);
            &padded[..]
        };
        output.extend(resampler.process(input)?);
    }

    // Flush the tail still held inside the resampler
    let silence = vec![0.0f32; chunk];
    while output.len() < expected_len + delay {
        output.extend(resampler.process(&silence)?);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    Ok(output)
}
