//! Octree over the finished star array.
//!
//! The tree is built once from an immutable, sorted star slice and stores
//! `u32` handles into it rather than copies of stars. Nodes live in one
//! vector; the eight children of a branch occupy consecutive slots.
//!
//! Every node records the brightest absolute magnitude found beneath it, so
//! the visibility walk can skip whole subtrees that would be too faint even
//! at their nearest point to the observer. See [`query`] for the walks.

pub mod frustum;
pub mod query;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::star::Star;

pub use frustum::Frustum;
pub use query::ViewParams;

/// Octree build settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// A node holding more stars than this is split into octants.
    pub max_stars_per_node: usize,
    /// Nodes at this depth are never split, however crowded.
    pub max_depth: u32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_stars_per_node: 64,
            max_depth: 12,
        }
    }
}

/// Traversal counters, filled in by the visibility walk on request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OctreeStats {
    pub nodes_visited: usize,
    pub stars_tested: usize,
    /// Deepest level reached, the root being level 0.
    pub max_depth: u32,
}

/// Receives stars found by a query, in traversal order.
pub trait StarHandler {
    /// `distance` is in light years from the query point, `app_mag` is the
    /// star's apparent magnitude from there.
    fn process(&mut self, star: &Star, distance: f32, app_mag: f32);
}

impl<F> StarHandler for F
where
    F: FnMut(&Star, f32, f32),
{
    fn process(&mut self, star: &Star, distance: f32, app_mag: f32) {
        self(star, distance, app_mag)
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    /// Stars are `handles[start..end]`.
    Leaf { start: u32, end: u32 },
    /// Children are `nodes[first_child..first_child + 8]`.
    Branch { first_child: u32 },
}

#[derive(Debug, Clone, Copy)]
struct OctreeNode {
    center: Vector3<f32>,
    half_size: f32,
    brightest_abs_mag: f32,
    kind: NodeKind,
}

impl OctreeNode {
    fn placeholder() -> Self {
        Self {
            center: Vector3::zeros(),
            half_size: 0.0,
            brightest_abs_mag: f32::INFINITY,
            kind: NodeKind::Leaf { start: 0, end: 0 },
        }
    }

    /// Distance from `point` to the nearest point of this node's cube; zero
    /// when the point is inside.
    fn min_distance_squared(&self, point: &Vector3<f32>) -> f32 {
        let d = (point - self.center).abs().map(|c| (c - self.half_size).max(0.0));
        d.norm_squared()
    }
}

/// Spatial index over a star slice.
#[derive(Debug, Clone)]
pub struct StarOctree {
    nodes: Vec<OctreeNode>,
    handles: Vec<u32>,
    depth: u32,
}

impl StarOctree {
    /// Builds the tree. `stars` must not change afterwards; the tree refers
    /// to it by index.
    pub fn build(stars: &[Star], config: &OctreeConfig) -> Self {
        let (center, half_size) = bounding_cube(stars);
        let mut tree = Self {
            nodes: vec![OctreeNode::placeholder()],
            handles: Vec::with_capacity(stars.len()),
            depth: 0,
        };
        let all: Vec<u32> = (0..stars.len() as u32).collect();
        let max_stars = config.max_stars_per_node.max(1);
        let root = tree.build_node(stars, all, center, half_size, 0, max_stars, config.max_depth);
        tree.nodes[0] = root;

        log::debug!(
            "Built star octree: {} nodes, {} stars, depth {}",
            tree.nodes.len(),
            tree.handles.len(),
            tree.depth
        );
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn build_node(
        &mut self,
        stars: &[Star],
        members: Vec<u32>,
        center: Vector3<f32>,
        half_size: f32,
        depth: u32,
        max_stars: usize,
        max_depth: u32,
    ) -> OctreeNode {
        self.depth = self.depth.max(depth);

        if members.len() <= max_stars || depth >= max_depth {
            let start = self.handles.len() as u32;
            let brightest = members
                .iter()
                .map(|&h| stars[h as usize].absolute_magnitude())
                .fold(f32::INFINITY, f32::min);
            self.handles.extend_from_slice(&members);
            return OctreeNode {
                center,
                half_size,
                brightest_abs_mag: brightest,
                kind: NodeKind::Leaf {
                    start,
                    end: self.handles.len() as u32,
                },
            };
        }

        let mut octants: [Vec<u32>; 8] = Default::default();
        for h in members {
            octants[octant_of(&stars[h as usize].position(), &center)].push(h);
        }

        let first_child = self.nodes.len();
        self.nodes
            .extend(std::iter::repeat(OctreeNode::placeholder()).take(8));

        let child_half = half_size * 0.5;
        let mut brightest = f32::INFINITY;
        for (i, octant) in octants.into_iter().enumerate() {
            let child_center = center + octant_offset(i) * child_half;
            let child = self.build_node(
                stars,
                octant,
                child_center,
                child_half,
                depth + 1,
                max_stars,
                max_depth,
            );
            brightest = brightest.min(child.brightest_abs_mag);
            self.nodes[first_child + i] = child;
        }

        OctreeNode {
            center,
            half_size,
            brightest_abs_mag: brightest,
            kind: NodeKind::Branch {
                first_child: first_child as u32,
            },
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level of the tree, the root being level 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of star handles stored in leaves.
    pub fn star_count(&self) -> usize {
        self.handles.len()
    }

    fn root(&self) -> &OctreeNode {
        &self.nodes[0]
    }

    fn children(&self, first_child: u32) -> &[OctreeNode] {
        let first = first_child as usize;
        &self.nodes[first..first + 8]
    }

    fn leaf_handles(&self, start: u32, end: u32) -> &[u32] {
        &self.handles[start as usize..end as usize]
    }
}

/// Octant index of `p` relative to `center`: bit 0 is +x, bit 1 +y, bit 2 +z.
fn octant_of(p: &Vector3<f32>, center: &Vector3<f32>) -> usize {
    (p.x >= center.x) as usize
        | ((p.y >= center.y) as usize) << 1
        | ((p.z >= center.z) as usize) << 2
}

fn octant_offset(octant: usize) -> Vector3<f32> {
    let sign = |bit: usize| if octant & bit != 0 { 1.0 } else { -1.0 };
    Vector3::new(sign(1), sign(2), sign(4))
}

/// Smallest padded cube around all finite star positions.
fn bounding_cube(stars: &[Star]) -> (Vector3<f32>, f32) {
    const MIN_HALF_SIZE: f32 = 1.0;

    let mut lo = Vector3::repeat(f32::INFINITY);
    let mut hi = Vector3::repeat(f32::NEG_INFINITY);
    for p in stars.iter().map(Star::position).filter(|p| p.iter().all(|c| c.is_finite())) {
        lo = lo.inf(&p);
        hi = hi.sup(&p);
    }
    if lo.x > hi.x {
        return (Vector3::zeros(), MIN_HALF_SIZE);
    }

    let center = (lo + hi) * 0.5;
    let half = (hi - lo).max() * 0.5;
    (center, (half * 1.001).max(MIN_HALF_SIZE))
}
