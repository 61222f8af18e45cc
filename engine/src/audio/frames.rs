use arc_swap::{ArcSwap, Guard};
use std::sync::Arc;

/// Recording buffers are primed with this instead of zero so untouched frames
/// never push downstream DSP into denormal arithmetic.
pub const DENORMAL_PREVENTION_VAL: f32 = 1e-20;

/// Interleaved samples of one clip plus a deinterleaved copy per channel.
///
/// The buffer is either unloaded (no samples, metadata only) or holds exactly
/// `frames * channels` samples, possibly zero frames for a recording that has
/// not started. The channel caches always mirror the interleaved data.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    channels: usize,
    loaded: bool,
    samples: Vec<f32>,
    per_channel: Vec<Vec<f32>>,
}

impl FrameBuffer {
    pub fn new(mut samples: Vec<f32>, channels: usize) -> Self {
        let channels = channels.max(1);
        samples.truncate(samples.len() - samples.len() % channels);
        let mut buffer = Self {
            channels,
            loaded: true,
            samples,
            per_channel: vec![Vec::new(); channels],
        };
        buffer.update_channel_caches(0);
        buffer
    }

    pub fn unloaded(channels: usize) -> Self {
        Self {
            loaded: false,
            ..Self::new(Vec::new(), channels)
        }
    }

    pub fn filled(value: f32, frames: usize, channels: usize) -> Self {
        Self::new(vec![value; frames * channels.max(1)], channels)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channel(&self, idx: usize) -> Option<&[f32]> {
        self.per_channel.get(idx).map(Vec::as_slice)
    }

    /// Interleaved samples from frame `start` to the end.
    pub fn frames_from(&self, start: usize) -> &[f32] {
        let start = start.min(self.num_frames()) * self.channels;
        &self.samples[start..]
    }

    /// Appends whole frames; a trailing partial frame is dropped.
    pub fn extend_interleaved(&mut self, samples: &[f32]) {
        let whole = samples.len() - samples.len() % self.channels;
        let start = self.num_frames();
        self.samples.extend_from_slice(&samples[..whole]);
        self.loaded = true;
        self.update_channel_caches(start);
    }

    /// Rebuilds the channel caches from frame `start_from` on, keeping the
    /// frames before it.
    pub fn update_channel_caches(&mut self, start_from: usize) {
        let frames = self.num_frames();
        let channels = self.channels;
        let samples = &self.samples;
        for (ch, cache) in self.per_channel.iter_mut().enumerate() {
            cache.truncate(start_from.min(frames));
            cache.reserve(frames - cache.len());
            for frame in cache.len()..frames {
                cache.push(samples[frame * channels + ch]);
            }
        }
    }
}

/// The render thread's view of a clip's frames.
///
/// Loads are lock-free and always yield a complete buffer: either the one
/// published before a swap or the one after it.
#[derive(Debug, Clone)]
pub struct FramesHandle(Arc<ArcSwap<FrameBuffer>>);

impl FramesHandle {
    pub fn new(frames: Arc<FrameBuffer>) -> Self {
        Self(Arc::new(ArcSwap::new(frames)))
    }

    pub fn load(&self) -> Guard<Arc<FrameBuffer>> {
        self.0.load()
    }

    pub fn load_full(&self) -> Arc<FrameBuffer> {
        self.0.load_full()
    }

    pub(crate) fn swap(&self, frames: Arc<FrameBuffer>) -> Arc<FrameBuffer> {
        self.0.swap(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_into_channel_caches() {
        let buffer = FrameBuffer::new(vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2);
        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.channel(0), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(buffer.channel(1), Some(&[-0.1, -0.2, -0.3][..]));
        assert_eq!(buffer.channel(2), None);
    }

    #[test]
    fn partial_frames_are_never_kept() {
        let mut buffer = FrameBuffer::new(vec![0.0; 5], 2);
        assert_eq!(buffer.samples().len(), 4);
        buffer.extend_interleaved(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.samples().len(), 6);
        assert_eq!(buffer.channel(0), Some(&[0.0, 0.0, 1.0][..]));
        assert_eq!(buffer.channel(1), Some(&[0.0, 0.0, 2.0][..]));
    }

    #[test]
    fn frames_from_returns_suffix() {
        let buffer = FrameBuffer::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(buffer.frames_from(1), &[3.0, 4.0, 5.0, 6.0]);
        assert!(buffer.frames_from(9).is_empty());
    }

    #[test]
    fn unloaded_buffer_keeps_channel_count() {
        let buffer = FrameBuffer::unloaded(2);
        assert!(!buffer.is_loaded());
        assert_eq!(buffer.num_frames(), 0);
        assert_eq!(buffer.channels(), 2);
    }

    #[test]
    fn empty_buffer_is_still_loaded() {
        let buffer = FrameBuffer::filled(0.0, 0, 2);
        assert!(buffer.is_loaded());
        assert_eq!(buffer.num_frames(), 0);
        assert_ne!(buffer, FrameBuffer::unloaded(2));
    }

    #[test]
    fn handle_readers_keep_old_buffer_across_swap() {
        let handle = FramesHandle::new(Arc::new(FrameBuffer::filled(0.5, 4, 1)));
        let reader = handle.load_full();
        let previous = handle.swap(Arc::new(FrameBuffer::unloaded(1)));
        assert!(Arc::ptr_eq(&reader, &previous));
        assert_eq!(reader.samples(), &[0.5; 4]);
        assert!(!handle.load().is_loaded());
    }
}
