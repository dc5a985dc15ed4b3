use std::fmt;
use std::ops::{Deref, DerefMut};

use super::{BufferView, BufferViewMut};
use crate::sample::Sample;

/// Heap-allocated interleaved buffer.
#[derive(Clone)]
pub struct AudioBuffer<S> {
    frame_width: usize,
    data: Box<[S]>,
}

impl<S: Sample> AudioBuffer<S> {
    /// Creates a silent buffer of `frame_count` frames.
    pub fn new(frame_count: usize, frame_width: usize) -> AudioBuffer<S> {
        AudioBuffer {
            frame_width,
            data: vec![S::EQUILIBRIUM; frame_count * frame_width].into(),
        }
    }

    pub fn frame_width(&self) -> usize {
        self.frame_width
    }

    pub fn frame_count(&self) -> usize {
        if self.frame_width == 0 {
            0
        } else {
            self.data.len() / self.frame_width
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(S::EQUILIBRIUM);
    }

    /// Copies from `samples`, zero-padding (with silence) when it's shorter.
    pub fn copy_from(&mut self, samples: &[S]) {
        let len = samples.len().min(self.data.len());
        self.data[..len].copy_from_slice(&samples[..len]);
        self.data[len..].fill(S::EQUILIBRIUM);
    }

    pub fn is_silent(&self) -> bool {
        self.data.iter().all(|&s| s == S::EQUILIBRIUM)
    }

    pub fn view(&self) -> BufferView<'_, S> {
        BufferView::new(&self.data, self.frame_count(), self.frame_width)
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_, S> {
        let frame_count = self.frame_count();
        BufferViewMut::new(&mut self.data, frame_count, self.frame_width)
    }
}

impl<S> fmt::Debug for AudioBuffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("frame_width", &self.frame_width)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl<S> Deref for AudioBuffer<S> {
    type Target = [S];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<S> DerefMut for AudioBuffer<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_silent() {
        let buffer = AudioBuffer::<u8>::new(4, 2);
        assert_eq!(buffer.len(), 8);
        assert!(buffer.iter().all(|&s| s == 128));
        assert!(buffer.is_silent());
    }

    #[test]
    fn copy_pads_with_silence() {
        let mut buffer = AudioBuffer::<f32>::new(2, 2);
        buffer.copy_from(&[1.0, 2.0, 3.0]);
        assert_eq!(&buffer[..], &[1.0, 2.0, 3.0, 0.0]);

        buffer.clear();
        assert!(buffer.is_silent());
    }
}
