//! Overlapping frame generator

/// Lazy iterator over fixed-size frames of a signal
///
/// Frame `i` covers samples `[i * hop, i * hop + frame_size)`. Frames are
/// produced while their start lies inside the signal; the trailing frame is
/// zero-padded. Cloning restarts nothing: create a new iterator per scan.
#[derive(Debug, Clone)]
pub struct FrameIter<'a> {
    signal: &'a [f64],
    frame_size: usize,
    hop_size: usize,
    index: usize,
}

impl<'a> FrameIter<'a> {
    pub fn new(signal: &'a [f64], frame_size: usize, hop_size: usize) -> Self {
        Self {
            signal,
            frame_size,
            hop_size,
            index: 0,
        }
    }

    /// Total number of frames this iterator yields from the start
    pub fn frame_count(signal_len: usize, frame_size: usize, hop_size: usize) -> usize {
        if signal_len == 0 || frame_size == 0 || hop_size == 0 {
            return 0;
        }
        signal_len.div_ceil(hop_size)
    }
}

impl Iterator for FrameIter<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frame_size == 0 || self.hop_size == 0 {
            return None;
        }

        let start = self.index * self.hop_size;
        if start >= self.signal.len() {
            return None;
        }
        self.index += 1;

        let end = (start + self.frame_size).min(self.signal.len());
        let mut frame = Vec::with_capacity(self.frame_size);
        frame.extend_from_slice(&self.signal[start..end]);
        frame.resize(self.frame_size, 0.0);
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let total = Self::frame_count(self.signal.len(), self.frame_size, self.hop_size);
        let remaining = total.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_positions_and_padding() {
        let signal: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let frames: Vec<Vec<f64>> = FrameIter::new(&signal, 4, 2).collect();

        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frames[1], vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(frames[4], vec![8.0, 9.0, 0.0, 0.0]);
    }

    #[test]
    fn test_frame_count_matches_iteration() {
        let signal = vec![0.0; 10_000];
        let iter = FrameIter::new(&signal, 4096, 2048);
        assert_eq!(iter.len(), FrameIter::frame_count(10_000, 4096, 2048));
        assert_eq!(iter.count(), 5);
    }

    #[test]
    fn test_degenerate_inputs_yield_nothing() {
        assert_eq!(FrameIter::new(&[], 4, 2).count(), 0);
        assert_eq!(FrameIter::new(&[1.0, 2.0], 4, 0).count(), 0);
    }
}
