//! Sum tree for prioritized sampling.
//!
//! Code is adapted from https://github.com/jaromiru/AI-blog/blob/master/SumTree.py and
//! https://github.com/openai/baselines/blob/master/baselines/deepq/replay_buffer.py
use log::warn;
use segment_tree::{ops::MaxIgnoreNaN, SegmentPoint};

/// Binary tree of priorities, supporting proportional sampling in `O(log n)`.
#[derive(Debug)]
pub struct SumTree {
    eps: f32,
    alpha: f32,
    capacity: usize,
    n_samples: usize,
    tree: Vec<f32>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl SumTree {
    /// Creates a sum tree with `capacity` leaves.
    pub fn new(capacity: usize, alpha: f32) -> Self {
        debug_assert!(capacity > 0);
        Self {
            eps: 1e-8,
            alpha,
            capacity,
            n_samples: 0,
            tree: vec![0f32; 2 * capacity - 1],
            max_tree: SegmentPoint::build(vec![1f32; capacity], MaxIgnoreNaN),
        }
    }

    fn propagate(&mut self, ix: usize, change: f32) {
        let parent = (ix - 1) / 2;
        self.tree[parent] += change;
        if parent != 0 {
            self.propagate(parent, change);
        }
    }

    fn retrieve(&self, ix: usize, s: f32) -> usize {
        let left = 2 * ix + 1;
        let right = left + 1;

        if left >= self.tree.len() {
            return ix;
        }

        if s <= self.tree[left] || self.tree[right] == 0f32 {
            self.retrieve(left, s)
        } else {
            self.retrieve(right, s - self.tree[left])
        }
    }

    /// Sum of all (exponentiated) priorities.
    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    /// Number of leaves holding a transition.
    pub fn len(&self) -> usize {
        self.n_samples
    }

    /// Returns `true` if no leaf has been added yet.
    pub fn is_empty(&self) -> bool {
        self.n_samples == 0
    }

    /// The largest raw priority given so far, used for new transitions.
    pub fn max(&self) -> f32 {
        self.max_tree.query(0, self.max_tree.len())
    }

    /// Adds a priority value at `ix`-th leaf, counting it as a new sample.
    pub fn add(&mut self, ix: usize, p: f32) {
        debug_assert!(ix <= self.n_samples || self.n_samples == self.capacity);

        self.update(ix, p);

        if self.n_samples < self.capacity {
            self.n_samples += 1;
        }
    }

    /// Updates the priority value at `ix`-th leaf.
    ///
    /// The alpha-th power of the priority value is stored.
    pub fn update(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);

        let p = if p.is_nan() {
            warn!("NaN priority at {}, replaced with eps", ix);
            self.eps
        } else {
            p.abs()
        };
        self.max_tree.modify(ix, p);

        let p = (p + self.eps).powf(self.alpha);
        let ix = ix + self.capacity - 1;
        let change = p - self.tree[ix];
        self.tree[ix] = p;
        self.propagate(ix, change);
    }

    /// Gets the leaf where the cumulative sum of priorities reaches `s`.
    pub fn get(&self, s: f32) -> usize {
        let ix = self.retrieve(0, s);
        debug_assert!(ix >= (self.capacity - 1));
        (ix + 1 - self.capacity).min(self.n_samples.saturating_sub(1))
    }

    /// Samples leaf indices and returns them with normalized importance weights.
    ///
    /// The weight is $w_i=\left(N P(i)\right)^{-\beta}$, normalized by $\max_i w_i$
    /// within the batch.
    pub fn sample(&self, batch_size: usize, beta: f32) -> (Vec<usize>, Vec<f32>) {
        let p_sum = self.total();
        let indices = (0..batch_size)
            .map(|_| self.get(p_sum * fastrand::f32()))
            .collect::<Vec<_>>();

        let n = self.n_samples as f32 / p_sum;
        let ws = indices
            .iter()
            .map(|ix| self.tree[ix + self.capacity - 1])
            .map(|p| (n * p).powf(-beta))
            .collect::<Vec<_>>();
        let w_max = ws.iter().cloned().fold(f32::MIN, f32::max);
        let ws = ws.iter().map(|w| w / w_max).collect();

        (indices, ws)
    }
}

#[cfg(test)]
mod tests {
    use super::SumTree;

    #[test]
    fn test_sum_tree_odd() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut sum_tree = SumTree::new(8, 1.0);
        for (ix, &p) in data.iter().enumerate() {
            sum_tree.add(ix, p);
        }

        assert_eq!(sum_tree.get(0.0), 0);
        assert_eq!(sum_tree.get(0.4), 0);
        assert_eq!(sum_tree.get(0.5), 0);
        assert_eq!(sum_tree.get(0.6), 1);
        assert_eq!(sum_tree.get(1.2), 2);
        assert_eq!(sum_tree.get(1.6), 3);
        assert_eq!(sum_tree.get(2.0), 4);
        assert_eq!(sum_tree.get(2.8), 4);
        assert!((sum_tree.max() - 3.9).abs() < 1e-6);

        let (ixs, ws) = sum_tree.sample(1000, 1.0);
        assert!(ixs.iter().all(|&ix| ix < data.len()));
        assert!(ws.iter().all(|&w| w > 0.0 && w <= 1.0));
    }

    #[test]
    fn update_changes_sampling_mass() {
        let mut sum_tree = SumTree::new(4, 1.0);
        (0..4).for_each(|ix| sum_tree.add(ix, 1.0));
        sum_tree.update(2, 0.0);

        let (ixs, _) = sum_tree.sample(2000, 0.5);
        assert!(ixs.iter().all(|&ix| ix != 2));
    }
}
