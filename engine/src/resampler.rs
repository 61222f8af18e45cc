use crate::error::ImportError;
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

const CHUNK_FRAMES: usize = 1024;

/// Offline sample rate conversion of a whole interleaved buffer.
///
/// Feed the input on construction, call [`Resampler::process`] until
/// [`Resampler::is_done`], then take the result with
/// [`Resampler::into_interleaved`]. The output is trimmed to the sinc delay so
/// it lines up with the input.
pub struct Resampler {
    sinc: Option<SincFixedIn<f32>>,
    input: Vec<Vec<f32>>,
    consumed: usize,
    output: Vec<Vec<f32>>,
    delay: usize,
    out_frames: usize,
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut channel_buffers: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            channel_buffers[ch].push(*sample);
        }
    }
    channel_buffers
}

impl Resampler {
    pub fn new(
        samples: &[f32],
        channels: usize,
        from_rate: u32,
        to_rate: u32,
    ) -> Result<Self, ImportError> {
        let channels = channels.max(1);
        let input = deinterleave(samples, channels);
        let frames = input[0].len();
        if from_rate == to_rate || frames == 0 {
            return Ok(Self {
                sinc: None,
                consumed: frames,
                output: input,
                input: vec![Vec::new(); channels],
                delay: 0,
                out_frames: frames,
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = to_rate as f64 / from_rate as f64;
        let sinc = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels)?;
        let delay = sinc.output_delay();
        Ok(Self {
            sinc: Some(sinc),
            input,
            consumed: 0,
            output: vec![Vec::new(); channels],
            delay,
            out_frames: (frames as f64 * ratio).ceil() as usize,
        })
    }

    fn input_frames(&self) -> usize {
        self.input[0].len()
    }

    fn output_frames(&self) -> usize {
        self.output[0].len()
    }

    pub fn is_done(&self) -> bool {
        self.consumed >= self.input_frames() && self.output_frames() >= self.delay + self.out_frames
    }

    /// Runs one chunk through the resampler. Once the input is used up this
    /// flushes the filter tail.
    pub fn process(&mut self) -> Result<(), ImportError> {
        if self.is_done() {
            return Ok(());
        }
        let Some(sinc) = self.sinc.as_mut() else {
            return Ok(());
        };
        let total = self.input[0].len();
        let chunk = if self.consumed < total {
            let needed = sinc.input_frames_next();
            let end = (self.consumed + needed).min(total);
            let slices: Vec<&[f32]> = self
                .input
                .iter()
                .map(|ch| &ch[self.consumed..end])
                .collect();
            let out = if end - self.consumed == needed {
                sinc.process(&slices, None)?
            } else {
                sinc.process_partial(Some(slices.as_slice()), None)?
            };
            self.consumed = end;
            out
        } else {
            sinc.process_partial(None::<&[Vec<f32>]>, None)?
        };
        for (dst, src) in self.output.iter_mut().zip(chunk) {
            dst.extend_from_slice(&src);
        }
        Ok(())
    }

    pub fn num_out_frames(&self) -> usize {
        self.out_frames
    }

    pub fn into_interleaved(self) -> Vec<f32> {
        let channels = self.output.len();
        let start = self.delay.min(self.output_frames());
        let end = (start + self.out_frames).min(self.output_frames());
        let mut interleaved = Vec::with_capacity((end - start) * channels);
        for frame in start..end {
            for channel in &self.output {
                interleaved.push(channel[frame]);
            }
        }
        interleaved
    }
}
