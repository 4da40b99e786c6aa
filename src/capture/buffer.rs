//! Ordered fragment storage for one recording

use super::Fragment;

/// Buffer for collecting encoded fragments while recording.
///
/// Append-only; fragments keep their arrival order and zero-length ones are dropped.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    fragments: Vec<Fragment>,
    total_bytes: usize,
}

impl RecordingBuffer {
    /// Create a new empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns false if it was empty and discarded.
    pub fn push(&mut self, fragment: Fragment) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.total_bytes += fragment.len();
        self.fragments.push(fragment);
        true
    }

    /// Number of fragments held
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Sum of fragment sizes in bytes
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Concatenate every fragment in arrival order and empty the buffer
    pub fn assemble(&mut self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.total_bytes);
        for fragment in self.fragments.drain(..) {
            data.extend_from_slice(&fragment.data);
        }
        self.total_bytes = 0;
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_fragments_are_discarded() {
        let mut buffer = RecordingBuffer::new();
        assert!(buffer.push(Fragment::new(0, vec![1, 2])));
        assert!(!buffer.push(Fragment::new(1, Vec::new())));
        assert!(buffer.push(Fragment::new(2, vec![3])));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.total_bytes(), 3);
    }

    #[test]
    fn test_assemble_concatenates_in_arrival_order() {
        let mut buffer = RecordingBuffer::new();
        buffer.push(Fragment::new(7, b"ab".to_vec()));
        buffer.push(Fragment::new(3, b"cd".to_vec()));
        buffer.push(Fragment::new(9, b"e".to_vec()));

        assert_eq!(buffer.assemble(), b"abcde".to_vec());
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }
}
