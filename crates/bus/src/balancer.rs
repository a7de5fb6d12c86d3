/// Picks the partition that has received the fewest bytes so far.
///
/// Ties go to the lowest partition index. With a single partition every
/// record lands on partition 0.
#[derive(Debug, Default)]
pub struct LeastBytes {
    written: Vec<u64>,
}

impl LeastBytes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose a partition out of `partitions` for a record of `size` bytes
    /// and charge it.
    pub fn pick(&mut self, partitions: usize, size: usize) -> usize {
        let partitions = partitions.max(1);
        if self.written.len() != partitions {
            self.written.resize(partitions, 0);
        }
        let (idx, _) = self
            .written
            .iter()
            .enumerate()
            .min_by_key(|(i, bytes)| (**bytes, *i))
            .unwrap_or((0, &0));
        self.written[idx] += size as u64;
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_partition_always_zero() {
        let mut b = LeastBytes::new();
        for size in [10, 500, 1] {
            assert_eq!(b.pick(1, size), 0);
        }
    }

    #[test]
    fn spreads_by_bytes() {
        let mut b = LeastBytes::new();
        assert_eq!(b.pick(3, 100), 0);
        assert_eq!(b.pick(3, 10), 1);
        assert_eq!(b.pick(3, 10), 2);
        // partition 1 and 2 hold 10 bytes each; 1 wins the tie.
        assert_eq!(b.pick(3, 50), 1);
        assert_eq!(b.pick(3, 5), 2);
    }

    #[test]
    fn adapts_to_partition_growth() {
        let mut b = LeastBytes::new();
        b.pick(1, 100);
        assert_eq!(b.pick(2, 1), 1);
    }
}
