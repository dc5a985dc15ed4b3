mod audio;

use std::slice::{ChunksExact, ChunksExactMut};

use crate::sample::Sample;

pub use self::audio::AudioBuffer;

/// Read-only view of an interleaved buffer owned by someone else (usually the backend).
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a, S> {
    samples: &'a [S],
    frame_count: usize,
    frame_width: usize,
}

impl<'a, S: Sample> BufferView<'a, S> {
    /// Creates a view over the first `frame_count * frame_width` samples.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is shorter than that.
    pub fn new(samples: &'a [S], frame_count: usize, frame_width: usize) -> BufferView<'a, S> {
        let len = frame_count * frame_width;
        BufferView {
            samples: &samples[..len],
            frame_count,
            frame_width,
        }
    }

    pub fn empty() -> BufferView<'a, S> {
        BufferView {
            samples: &[],
            frame_count: 0,
            frame_width: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of channels in one frame.
    pub fn frame_width(&self) -> usize {
        self.frame_width
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &'a [S] {
        self.samples
    }

    pub fn get(&self, frame: usize, channel: usize) -> Option<S> {
        if channel >= self.frame_width {
            return None;
        }

        self.samples.get(frame * self.frame_width + channel).copied()
    }

    pub fn frame(&self, frame: usize) -> Option<&'a [S]> {
        let start = frame.checked_mul(self.frame_width)?;
        self.samples.get(start..start + self.frame_width)
    }

    /// Iterates over frames. A view with zero width yields nothing.
    pub fn frames(&self) -> ChunksExact<'a, S> {
        self.samples.chunks_exact(self.frame_width.max(1))
    }
}

/// Writable view of an interleaved buffer owned by someone else.
#[derive(Debug)]
pub struct BufferViewMut<'a, S> {
    samples: &'a mut [S],
    frame_count: usize,
    frame_width: usize,
}

impl<'a, S: Sample> BufferViewMut<'a, S> {
    /// Creates a view over the first `frame_count * frame_width` samples.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is shorter than that.
    pub fn new(
        samples: &'a mut [S],
        frame_count: usize,
        frame_width: usize,
    ) -> BufferViewMut<'a, S> {
        let len = frame_count * frame_width;
        BufferViewMut {
            samples: &mut samples[..len],
            frame_count,
            frame_width,
        }
    }

    pub fn empty() -> BufferViewMut<'a, S> {
        BufferViewMut {
            samples: &mut [],
            frame_count: 0,
            frame_width: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn frame_width(&self) -> usize {
        self.frame_width
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[S] {
        &*self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [S] {
        &mut *self.samples
    }

    pub fn get(&self, frame: usize, channel: usize) -> Option<S> {
        if channel >= self.frame_width {
            return None;
        }

        self.samples.get(frame * self.frame_width + channel).copied()
    }

    pub fn frame_mut(&mut self, frame: usize) -> Option<&mut [S]> {
        let start = frame.checked_mul(self.frame_width)?;
        self.samples.get_mut(start..start + self.frame_width)
    }

    pub fn frames(&self) -> ChunksExact<'_, S> {
        self.samples.chunks_exact(self.frame_width.max(1))
    }

    pub fn frames_mut(&mut self) -> ChunksExactMut<'_, S> {
        self.samples.chunks_exact_mut(self.frame_width.max(1))
    }

    pub fn fill(&mut self, value: S) {
        self.samples.fill(value);
    }

    pub fn reborrow(&mut self) -> BufferViewMut<'_, S> {
        BufferViewMut {
            samples: &mut *self.samples,
            frame_count: self.frame_count,
            frame_width: self.frame_width,
        }
    }
}

/// Input and output buffers of one callback period.
///
/// Only valid for the duration of a single callback invocation.
#[derive(Debug)]
pub struct BufferGroup<'a, S> {
    pub input: BufferView<'a, S>,
    pub output: BufferViewMut<'a, S>,
}

impl<'a, S: Sample> BufferGroup<'a, S> {
    pub fn new(input: BufferView<'a, S>, output: BufferViewMut<'a, S>) -> BufferGroup<'a, S> {
        BufferGroup { input, output }
    }

    pub fn frame_count(&self) -> usize {
        self.input.frame_count().max(self.output.frame_count())
    }
}
