//! Fallback resampler used when no resampler factory is configured.

use crate::traits::Resampler;

/// Block-wise linear interpolation.
///
/// Each `up` call stretches its input to `len * native / engine` frames and
/// each `down` call maps back onto the requested output length, so block
/// boundaries line up exactly with the engine buffers.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    ratio: f64,
}

impl Default for LinearResampler {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl LinearResampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl Resampler for LinearResampler {
    fn setup(&mut self, engine_rate: u32, native_rate: u32) {
        self.ratio = if engine_rate == 0 {
            1.0
        } else {
            native_rate as f64 / engine_rate as f64
        };
    }

    fn output_capacity(&self, frames: usize) -> usize {
        (frames as f64 * self.ratio).ceil() as usize + 1
    }

    fn up(&mut self, input: &[f32], output: &mut [f32]) -> usize {
        let len = ((input.len() as f64 * self.ratio).round() as usize).min(output.len());
        stretch(input, &mut output[..len]);
        len
    }

    fn down(&mut self, input: &[f32], output: &mut [f32]) {
        stretch(input, output);
    }
}

fn stretch(input: &[f32], output: &mut [f32]) {
    match (input.len(), output.len()) {
        (_, 0) => {}
        (0, _) => output.fill(0.0),
        (a, b) if a == b => output.copy_from_slice(input),
        (a, b) => {
            let step = a as f64 / b as f64;
            let last = a - 1;
            for (j, out) in output.iter_mut().enumerate() {
                let pos = j as f64 * step;
                let i = (pos as usize).min(last);
                let frac = (pos - i as f64) as f32;
                let next = input[(i + 1).min(last)];
                *out = input[i] + (next - input[i]) * frac;
            }
        }
    }
}
