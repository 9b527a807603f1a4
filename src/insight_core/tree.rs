//! Randomized isolation tree
//!
//! A tree recursively partitions a sub-sample of rows on a random feature at a
//! random threshold until every row is alone, the rows are indistinguishable,
//! or the depth limit is reached. Rows that are easy to isolate end up on
//! short paths.

use ndarray::{Array2, ArrayView1};
use rand::Rng;

/// Euler-Mascheroni constant used by the harmonic-number estimate
const EULER_GAMMA: f64 = 0.5772156649;

/// Expected path length of an unsuccessful search in a binary tree of `n` rows.
///
/// `c(n) = 2 * (ln(n - 1) + γ) - 2 * (n - 1) / n` for `n > 1`, else `0`.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Depth limit for a tree grown from `sample_size` rows: `ceil(log2(sample_size))`
pub fn max_depth_for(sample_size: usize) -> usize {
    if sample_size <= 1 {
        return 0;
    }
    (sample_size as f64).log2().ceil() as usize
}

/// Tree node; children are exclusively owned
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Rows with `value < threshold` go left, the rest go right
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// Terminal node holding the number of sample rows that reached it
    Leaf { count: usize, depth: usize },
}

/// One randomized partitioning tree
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationTree {
    root: Node,
    max_depth: usize,
}

impl IsolationTree {
    /// Grow a tree over the rows of `data` listed in `sample`
    ///
    /// # Arguments
    /// * `data` - Feature matrix (rows=samples, cols=features)
    /// * `sample` - Row positions of the sub-sample
    /// * `max_depth` - Depth at which growth stops
    /// * `rng` - Source of feature and threshold draws
    pub fn build<R: Rng + ?Sized>(
        data: &Array2<f64>,
        sample: &[usize],
        max_depth: usize,
        rng: &mut R,
    ) -> Self {
        let root = grow(data, sample.to_vec(), 0, max_depth, rng);
        Self { root, max_depth }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Depth of the deepest leaf
    pub fn depth(&self) -> usize {
        fn deepest(node: &Node) -> usize {
            match node {
                Node::Split { left, right, .. } => deepest(left).max(deepest(right)),
                Node::Leaf { depth, .. } => *depth,
            }
        }
        deepest(&self.root)
    }

    /// Path length of `row`: leaf depth plus `c(count)` for unresolved rows.
    ///
    /// `row` must have at least as many values as the data the tree was
    /// built from; the forest checks this before calling.
    pub fn path_length(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { left } else { right };
                }
                Node::Leaf { count, depth } => {
                    return *depth as f64 + average_path_length(*count);
                }
            }
        }
    }
}

/// Point at fraction `u` of `[min, max)`, valid even when `max - min` overflows
fn split_point(min: f64, max: f64, u: f64) -> f64 {
    let span = max - min;
    let threshold = if span.is_finite() {
        min + u * span
    } else {
        min * (1.0 - u) + max * u
    };
    if threshold < max {
        threshold.max(min)
    } else {
        min
    }
}

fn grow<R: Rng + ?Sized>(
    data: &Array2<f64>,
    rows: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut R,
) -> Node {
    let leaf = |count: usize| Node::Leaf { count, depth };

    if rows.len() <= 1 || depth >= max_depth {
        return leaf(rows.len());
    }

    // Only features that still separate the rows are candidates
    let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
        .filter_map(|feature| {
            let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = data[[r, feature]];
                (lo.min(v), hi.max(v))
            });
            (min < max).then_some((feature, min, max))
        })
        .collect();

    if candidates.is_empty() {
        return leaf(rows.len());
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = split_point(min, max, rng.gen::<f64>());

    let count = rows.len();
    let (left, right): (Vec<usize>, Vec<usize>) = rows
        .into_iter()
        .partition(|&r| data[[r, feature]] < threshold);

    if left.is_empty() || right.is_empty() {
        return leaf(count);
    }

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left, depth + 1, max_depth, rng)),
        right: Box::new(grow(data, right, depth + 1, max_depth, rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, aview1};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(7)
    }

    fn leaves(node: &Node, out: &mut Vec<(usize, usize)>) {
        match node {
            Node::Split { left, right, .. } => {
                leaves(left, out);
                leaves(right, out);
            }
            Node::Leaf { count, depth } => out.push((*count, *depth)),
        }
    }

    fn splits(node: &Node, out: &mut Vec<(usize, f64)>) {
        if let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = node
        {
            out.push((*feature, *threshold));
            splits(left, out);
            splits(right, out);
        }
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert!((average_path_length(2) - 0.1544313298).abs() < 1e-9);
        assert!((average_path_length(256) - 10.2447).abs() < 1e-3);
    }

    #[test]
    fn test_max_depth_for() {
        assert_eq!(max_depth_for(1), 0);
        assert_eq!(max_depth_for(2), 1);
        assert_eq!(max_depth_for(5), 3);
        assert_eq!(max_depth_for(256), 8);
    }

    #[test]
    fn test_single_row_is_leaf() {
        let data = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let tree = IsolationTree::build(&data, &[1], 4, &mut rng());
        assert_eq!(tree.root(), &Node::Leaf { count: 1, depth: 0 });
    }

    #[test]
    fn test_identical_rows_terminate_early() {
        let data = Array2::<f64>::ones((10, 2));
        let sample: Vec<usize> = (0..10).collect();
        let tree = IsolationTree::build(&data, &sample, max_depth_for(10), &mut rng());

        assert_eq!(tree.root(), &Node::Leaf { count: 10, depth: 0 });
        assert_eq!(
            tree.path_length(aview1(&[1.0, 1.0])),
            average_path_length(10)
        );
    }

    #[test]
    fn test_two_rows_depth_at_most_one() {
        let data = arr2(&[[0.0, 5.0], [1.0, 5.0]]);
        for seed in 0..20 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let tree = IsolationTree::build(&data, &[0, 1], max_depth_for(2), &mut rng);
            assert!(tree.depth() <= 1);
        }
    }

    #[test]
    fn test_leaves_cover_sample_within_depth_limit() {
        let data = arr2(&[
            [0.0, 0.0],
            [0.0, 1.0],
            [0.0, 2.0],
            [0.0, 3.0],
            [100.0, 100.0],
            [5.0, 7.0],
            [2.0, 9.0],
        ]);
        let sample: Vec<usize> = (0..7).collect();
        let max_depth = max_depth_for(sample.len());
        let tree = IsolationTree::build(&data, &sample, max_depth, &mut rng());

        let mut found = Vec::new();
        leaves(tree.root(), &mut found);
        assert_eq!(found.iter().map(|(count, _)| count).sum::<usize>(), 7);
        assert!(found.iter().all(|(_, depth)| *depth <= max_depth));
        assert!(found.iter().all(|(count, _)| *count > 0));
    }

    #[test]
    fn test_thresholds_drawn_from_sample_range() {
        let data = arr2(&[[0.0], [1.0], [2.0], [3.0], [1000.0], [-1000.0]]);
        let sample = [0, 1, 2, 3];
        for seed in 0..10 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let tree = IsolationTree::build(&data, &sample, 8, &mut rng);
            let mut found = Vec::new();
            splits(tree.root(), &mut found);
            assert!(!found.is_empty());
            assert!(found.iter().all(|(_, t)| (0.0..3.0).contains(t)));
        }
    }

    #[test]
    fn test_degenerate_feature_never_split() {
        let data = arr2(&[[4.0, 0.0], [4.0, 1.0], [4.0, 2.0], [4.0, 3.0]]);
        let tree = IsolationTree::build(&data, &[0, 1, 2, 3], 2, &mut rng());
        let mut found = Vec::new();
        splits(tree.root(), &mut found);
        assert!(found.iter().all(|(feature, _)| *feature == 1));
    }

    #[test]
    fn test_split_point_within_range() {
        assert_eq!(split_point(0.0, 4.0, 0.0), 0.0);
        assert_eq!(split_point(0.0, 4.0, 0.5), 2.0);
        assert!(split_point(-f64::MAX, f64::MAX, 0.75).is_finite());
        for u in [0.0, 0.25, 0.5, 0.999_999_999] {
            let t = split_point(-1e308, 1e308, u);
            assert!((-1e308..1e308).contains(&t));
        }
        let below_one = 1.0 - f64::EPSILON / 2.0;
        assert!(split_point(1.0, 1.0 + f64::EPSILON, below_one) < 1.0 + f64::EPSILON);
    }

    #[test]
    fn test_extreme_magnitudes_build() {
        let data = arr2(&[[-1e308], [0.0], [1e308], [1.0]]);
        for seed in 0..20 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let tree = IsolationTree::build(&data, &[0, 1, 2, 3], 2, &mut rng);
            let mut found = Vec::new();
            splits(tree.root(), &mut found);
            assert!(found.iter().all(|(_, t)| t.is_finite()));
            assert!(tree.path_length(aview1(&[1e308])).is_finite());
        }
    }

    #[test]
    fn test_same_seed_same_tree() {
        let data = arr2(&[[0.0, 3.0], [1.0, 1.0], [2.0, 8.0], [9.0, 2.0]]);
        let a = IsolationTree::build(&data, &[0, 1, 2, 3], 2, &mut rng());
        let b = IsolationTree::build(&data, &[0, 1, 2, 3], 2, &mut rng());
        assert_eq!(a, b);
    }
}
