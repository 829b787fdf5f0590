//! Visibility and proximity walks over a [`StarOctree`].
//!
//! Both walks are depth-first and deliver stars to a [`StarHandler`] in
//! traversal order. Neither sorts nor caches anything; callers wanting
//! nearest-first or brightest-first order sort what they collect.

use nalgebra::{UnitQuaternion, Vector3};

use super::frustum::Frustum;
use super::{NodeKind, OctreeNode, OctreeStats, StarHandler, StarOctree};
use crate::star::{abs_to_app_mag, Star};

/// Observer and field of view for [`StarOctree::process_visible_stars`].
#[derive(Debug, Clone, Copy)]
pub struct ViewParams {
    /// Observer position in catalog space, light years.
    pub position: Vector3<f32>,
    /// Rotation from catalog space into camera space. The camera looks
    /// down −Z with +Y up.
    pub orientation: UnitQuaternion<f32>,
    /// Full vertical field of view, in radians. Must be below π.
    pub fov_y: f32,
    /// Width over height of the view.
    pub aspect_ratio: f32,
    /// Faintest apparent magnitude to report.
    pub limiting_mag: f32,
}

impl ViewParams {
    /// A view from `position` toward `target`, with `up` roughly up.
    ///
    /// Returns `None` if `target` coincides with `position` or the view
    /// direction is parallel to `up`.
    pub fn looking_at(
        position: Vector3<f32>,
        target: Vector3<f32>,
        up: Vector3<f32>,
        fov_y: f32,
        aspect_ratio: f32,
        limiting_mag: f32,
    ) -> Option<Self> {
        let dir = target - position;
        if dir.norm_squared() == 0.0 || dir.cross(&up).norm_squared() == 0.0 {
            return None;
        }
        Some(Self {
            position,
            orientation: UnitQuaternion::look_at_rh(&dir, &up),
            fov_y,
            aspect_ratio,
            limiting_mag,
        })
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::new(self.position, &self.orientation, self.fov_y, self.aspect_ratio)
    }
}

impl StarOctree {
    /// Delivers every star inside the view whose apparent magnitude from the
    /// observer is at or below `view.limiting_mag`. Barycenters are skipped.
    ///
    /// A subtree is skipped when its cube is outside the view, or when its
    /// brightest star would be too faint even at the cube's nearest point.
    pub fn process_visible_stars<H>(
        &self,
        stars: &[Star],
        view: &ViewParams,
        handler: &mut H,
        stats: Option<&mut OctreeStats>,
    ) where
        H: StarHandler + ?Sized,
    {
        let mut walk = VisibleWalk {
            tree: self,
            stars,
            frustum: view.frustum(),
            limiting_mag: view.limiting_mag,
            handler,
            stats: OctreeStats::default(),
        };
        walk.visit(self.root(), 0);

        log::trace!(
            "Visibility walk: {} nodes, {} stars tested",
            walk.stats.nodes_visited,
            walk.stats.stars_tested
        );
        if let Some(out) = stats {
            *out = walk.stats;
        }
    }

    /// Delivers every star whose distance from `position` is at most
    /// `radius`. The boundary is inclusive.
    pub fn process_close_stars<H>(
        &self,
        stars: &[Star],
        position: &Vector3<f32>,
        radius: f32,
        handler: &mut H,
    ) where
        H: StarHandler + ?Sized,
    {
        if radius.is_nan() || radius < 0.0 {
            return;
        }
        let radius_squared = radius * radius;
        let mut stack = vec![self.root()];

        while let Some(node) = stack.pop() {
            if node.min_distance_squared(position) > radius_squared {
                continue;
            }
            match node.kind {
                NodeKind::Branch { first_child } => stack.extend(self.children(first_child)),
                NodeKind::Leaf { start, end } => {
                    for &h in self.leaf_handles(start, end) {
                        let star = &stars[h as usize];
                        let distance_squared = (star.position() - position).norm_squared();
                        if distance_squared <= radius_squared {
                            let distance = distance_squared.sqrt();
                            let app_mag = abs_to_app_mag(star.absolute_magnitude(), distance);
                            handler.process(star, distance, app_mag);
                        }
                    }
                }
            }
        }
    }
}

struct VisibleWalk<'a, H: StarHandler + ?Sized> {
    tree: &'a StarOctree,
    stars: &'a [Star],
    frustum: Frustum,
    limiting_mag: f32,
    handler: &'a mut H,
    stats: OctreeStats,
}

impl<H: StarHandler + ?Sized> VisibleWalk<'_, H> {
    fn visit(&mut self, node: &OctreeNode, depth: u32) {
        self.stats.nodes_visited += 1;
        self.stats.max_depth = self.stats.max_depth.max(depth);

        if !self.frustum.intersects_cube(&node.center, node.half_size) {
            return;
        }
        if self.too_faint(node) {
            return;
        }

        match node.kind {
            NodeKind::Branch { first_child } => {
                let tree = self.tree;
                for child in tree.children(first_child) {
                    self.visit(child, depth + 1);
                }
            }
            NodeKind::Leaf { start, end } => {
                let tree = self.tree;
                let origin = self.frustum.origin();
                for &h in tree.leaf_handles(start, end) {
                    let star = &self.stars[h as usize];
                    self.stats.stars_tested += 1;
                    if star.is_barycenter() || !self.frustum.contains_point(&star.position()) {
                        continue;
                    }
                    let distance = (star.position() - origin).norm();
                    let app_mag = abs_to_app_mag(star.absolute_magnitude(), distance);
                    if app_mag <= self.limiting_mag {
                        self.handler.process(star, distance, app_mag);
                    }
                }
            }
        }
    }

    /// True when no star in `node` can reach the limiting magnitude.
    fn too_faint(&self, node: &OctreeNode) -> bool {
        if node.brightest_abs_mag.is_infinite() && node.brightest_abs_mag > 0.0 {
            return true;
        }
        let min_distance = node.min_distance_squared(&self.frustum.origin()).sqrt();
        if min_distance <= 0.0 {
            return false;
        }
        abs_to_app_mag(node.brightest_abs_mag, min_distance) > self.limiting_mag
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{scattered_stars, star_at};
    use super::super::OctreeConfig;
    use super::*;
    use crate::star::{StarDetails, LY_PER_PARSEC};
    use std::f32::consts::FRAC_PI_4;
    use std::sync::Arc;

    fn forward_view(limiting_mag: f32) -> ViewParams {
        ViewParams {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            fov_y: FRAC_PI_4,
            aspect_ratio: 1.0,
            limiting_mag,
        }
    }

    fn visible_numbers(tree: &StarOctree, stars: &[Star], view: &ViewParams) -> Vec<u32> {
        let mut found = Vec::new();
        tree.process_visible_stars(
            stars,
            view,
            &mut |s: &Star, _d: f32, _m: f32| found.push(s.catalog_number()),
            None,
        );
        found.sort_unstable();
        found
    }

    #[test]
    fn test_star_ahead_returned_once() {
        let stars = vec![star_at(1, 0.0, 0.0, -10.0, 1.0), star_at(2, 50.0, 50.0, 50.0, 1.0)];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        assert_eq!(visible_numbers(&tree, &stars, &forward_view(6.0)), vec![1]);
    }

    #[test]
    fn test_star_behind_never_returned() {
        let stars = vec![star_at(1, 0.0, 0.0, 10.0, -5.0)];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        for fov_deg in [1.0_f32, 45.0, 90.0, 135.0, 179.9] {
            let view = ViewParams {
                fov_y: fov_deg.to_radians(),
                ..forward_view(30.0)
            };
            assert!(visible_numbers(&tree, &stars, &view).is_empty(), "fov {}", fov_deg);
        }
    }

    #[test]
    fn test_magnitude_limit_is_exact_at_leaves() {
        // At 10 pc apparent equals absolute magnitude.
        let d = 10.0 * LY_PER_PARSEC;
        let stars = vec![star_at(1, 0.0, 0.0, -d, 5.9), star_at(2, 0.0, 0.1, -d, 6.1)];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        assert_eq!(visible_numbers(&tree, &stars, &forward_view(6.0)), vec![1]);
    }

    #[test]
    fn test_handler_gets_distance_and_magnitude() {
        let d = 10.0 * LY_PER_PARSEC;
        let stars = vec![star_at(7, 0.0, 0.0, -d, 3.0)];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        let mut seen = Vec::new();
        tree.process_visible_stars(
            &stars,
            &forward_view(6.0),
            &mut |s: &Star, dist: f32, mag: f32| seen.push((s.catalog_number(), dist, mag)),
            None,
        );
        assert_eq!(seen.len(), 1);
        assert!((seen[0].1 - d).abs() < 1e-3);
        assert!((seen[0].2 - 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_barycenters_are_not_visible() {
        let stars = vec![Star::new(
            1,
            Vector3::new(0.0, 0.0, -5.0),
            f32::INFINITY,
            Arc::new(StarDetails::barycenter()),
        )];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        assert!(visible_numbers(&tree, &stars, &forward_view(100.0)).is_empty());
    }

    #[test]
    fn test_visible_matches_brute_force() {
        let stars = scattered_stars(3000);
        let config = OctreeConfig {
            max_stars_per_node: 8,
            max_depth: 12,
        };
        let tree = StarOctree::build(&stars, &config);
        let view = ViewParams::looking_at(
            Vector3::new(-20.0, 5.0, 30.0),
            Vector3::new(60.0, -10.0, -40.0),
            Vector3::y(),
            1.0,
            1.5,
            8.0,
        )
        .unwrap();

        let frustum = view.frustum();
        let mut expected: Vec<u32> = stars
            .iter()
            .filter(|s| frustum.contains_point(&s.position()))
            .filter(|s| s.apparent_magnitude_from(&view.position) <= view.limiting_mag)
            .map(Star::catalog_number)
            .collect();
        expected.sort_unstable();

        assert!(!expected.is_empty(), "test view should see something");
        assert_eq!(visible_numbers(&tree, &stars, &view), expected);
    }

    #[test]
    fn test_magnitude_pruning_skips_nodes() {
        let stars = scattered_stars(3000);
        let config = OctreeConfig {
            max_stars_per_node: 8,
            max_depth: 12,
        };
        let tree = StarOctree::build(&stars, &config);

        let mut bright = OctreeStats::default();
        let mut faint = OctreeStats::default();
        let mut sink = |_: &Star, _: f32, _: f32| {};
        tree.process_visible_stars(&stars, &forward_view(30.0), &mut sink, Some(&mut bright));
        tree.process_visible_stars(&stars, &forward_view(-10.0), &mut sink, Some(&mut faint));

        assert!(faint.nodes_visited < bright.nodes_visited);
        assert!(faint.stars_tested < bright.stars_tested);
        assert!(bright.max_depth > 0);
    }

    #[test]
    fn test_close_stars_boundary_is_inclusive() {
        let stars = vec![
            star_at(1, 3.0, 4.0, 0.0, 1.0),
            star_at(2, 10.0, 0.0, 0.0, 1.0),
            star_at(3, 10.001, 0.0, 0.0, 1.0),
            star_at(4, 0.0, -10.0, 0.0, 1.0),
        ];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        let origin = Vector3::zeros();
        let mut found = Vec::new();
        tree.process_close_stars(&stars, &origin, 10.0, &mut |s: &Star, _: f32, _: f32| {
            found.push(s.catalog_number())
        });
        found.sort_unstable();
        assert_eq!(found, vec![1, 2, 4]);

        let mut at_five = Vec::new();
        tree.process_close_stars(&stars, &origin, 5.0, &mut |s: &Star, d: f32, _: f32| {
            at_five.push((s.catalog_number(), d))
        });
        assert_eq!(at_five, vec![(1, 5.0)]);
    }

    #[test]
    fn test_close_stars_matches_brute_force() {
        let stars = scattered_stars(2000);
        let tree = StarOctree::build(
            &stars,
            &OctreeConfig {
                max_stars_per_node: 4,
                max_depth: 12,
            },
        );
        let center = Vector3::new(12.0, -30.0, 7.5);
        let radius = 45.0;

        let mut expected: Vec<u32> = stars
            .iter()
            .filter(|s| (s.position() - center).norm_squared() <= radius * radius)
            .map(Star::catalog_number)
            .collect();
        expected.sort_unstable();

        let mut found = Vec::new();
        tree.process_close_stars(&stars, &center, radius, &mut |s: &Star, _: f32, _: f32| {
            found.push(s.catalog_number())
        });
        found.sort_unstable();
        assert!(!expected.is_empty());
        assert_eq!(found, expected);
    }

    #[test]
    fn test_close_stars_negative_radius() {
        let stars = vec![star_at(1, 0.0, 0.0, 0.0, 1.0)];
        let tree = StarOctree::build(&stars, &OctreeConfig::default());
        let mut count = 0;
        tree.process_close_stars(&stars, &Vector3::zeros(), -1.0, &mut |_: &Star, _: f32, _: f32| {
            count += 1
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_looking_at_rejects_degenerate_views() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert!(ViewParams::looking_at(p, p, Vector3::y(), 1.0, 1.0, 6.0).is_none());
        assert!(ViewParams::looking_at(p, p + Vector3::y(), Vector3::y(), 1.0, 1.0, 6.0).is_none());
        let view =
            ViewParams::looking_at(p, p - Vector3::z(), Vector3::y(), 1.0, 1.0, 6.0).unwrap();
        assert!(view.frustum().contains_point(&(p - Vector3::z() * 5.0)));
    }
}
