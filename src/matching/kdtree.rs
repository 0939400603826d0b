//! Static 2D k-d tree for nearest-neighbor queries.
//!
//! Build-once index over a point slice: median split on alternating
//! axes, arena storage with index links, no insertions or deletions
//! after construction. Scan matching rebuilds the tree per call, so
//! construction cost matters as much as query cost.

use crate::core::types::Point2D;

#[derive(Debug, Clone)]
struct Node {
    point: Point2D,
    /// Index of the point in the input slice.
    index: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Static 2D k-d tree over a slice of points.
#[derive(Debug, Clone, Default)]
pub struct KdTree2D {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl KdTree2D {
    /// Build a tree over `points`. Duplicate points are handled by a
    /// deterministic tie-break on the input index.
    pub fn build(points: &[Point2D]) -> Self {
        let mut items: Vec<(Point2D, usize)> =
            points.iter().copied().zip(0..points.len()).collect();
        let mut tree = Self {
            nodes: Vec::with_capacity(points.len()),
            root: None,
        };
        tree.root = tree.build_recursive(&mut items, 0);
        tree
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the tree indexes no points.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn build_recursive(&mut self, items: &mut [(Point2D, usize)], depth: usize) -> Option<usize> {
        if items.is_empty() {
            return None;
        }

        let axis = depth % 2;
        items.sort_unstable_by(|a, b| {
            let (ka, kb) = if axis == 0 { (a.0.x, b.0.x) } else { (a.0.y, b.0.y) };
            ka.partial_cmp(&kb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        let mid = items.len() / 2;
        let (point, index) = items[mid];
        let slot = self.nodes.len();
        self.nodes.push(Node {
            point,
            index,
            left: None,
            right: None,
        });

        let (left_items, rest) = items.split_at_mut(mid);
        let right_items = &mut rest[1..];
        let left = self.build_recursive(left_items, depth + 1);
        let right = self.build_recursive(right_items, depth + 1);
        self.nodes[slot].left = left;
        self.nodes[slot].right = right;

        Some(slot)
    }

    /// Index (into the input slice) of the point nearest to `query`,
    /// or `None` for an empty tree. Equidistant candidates resolve to
    /// the smallest input index.
    pub fn nearest(&self, query: &Point2D) -> Option<usize> {
        let root = self.root?;
        let mut best = (f64::INFINITY, usize::MAX);
        self.search(root, query, 0, &mut best);
        Some(best.1)
    }

    fn search(&self, slot: usize, query: &Point2D, depth: usize, best: &mut (f64, usize)) {
        let node = &self.nodes[slot];

        let d = node.point.distance_squared(query);
        if d < best.0 || (d == best.0 && node.index < best.1) {
            *best = (d, node.index);
        }

        let axis = depth % 2;
        let diff = if axis == 0 {
            query.x - node.point.x
        } else {
            query.y - node.point.y
        };

        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = near {
            self.search(child, query, depth + 1, best);
        }
        // The far half can still hold a closer point (or an equidistant
        // one with a smaller index) when the splitting plane is within
        // the best radius.
        if diff * diff <= best.0 {
            if let Some(child) = far {
                self.search(child, query, depth + 1, best);
            }
        }
    }
}
