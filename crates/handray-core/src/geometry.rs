//! Ray construction and ray–sphere hit-testing.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::types::{BoundingSphere, HitResult, SelectableTarget};

/// Half-line in world space. `direction` is always unit length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Camera interface provided by the rendering layer.
pub trait Camera {
    /// Current world-space position.
    fn position(&self) -> Vec3;

    /// World-space ray through a point in normalized device coordinates
    /// (`[-1, 1]²`, y up).
    fn unproject(&self, ndc: Vec2) -> Ray;
}

/// Right-handed perspective camera with `[0, 1]` clip depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.2, 2.5),
            look_at: Vec3::new(0.0, 1.2, 0.0),
            up: Vec3::Y,
            fov_y_degrees: 65.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl PerspectiveCamera {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.look_at, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        )
    }
}

impl Camera for PerspectiveCamera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn unproject(&self, ndc: Vec2) -> Ray {
        let inv_view_proj = (self.projection_matrix() * self.view_matrix()).inverse();
        let near = inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
        let far = inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        Ray::new(self.position, far - near)
    }
}

/// Map tracker coordinates (`[0, 1]²`, y down) to NDC (`[-1, 1]²`, y up).
pub fn to_ndc(x: f32, y: f32) -> Vec2 {
    Vec2::new(2.0 * x - 1.0, 1.0 - 2.0 * y)
}

/// Undo the horizontal mirroring of a selfie-style camera feed.
pub fn mirror_x(x: f32) -> f32 {
    1.0 - x
}

/// Distance along `ray` to the first point inside `sphere`.
///
/// Tangent rays count as hits. When the origin is inside the sphere the
/// exit point is returned. Degenerate spheres never intersect.
pub fn ray_sphere(ray: &Ray, sphere: &BoundingSphere) -> Option<f32> {
    if !sphere.is_selectable() {
        return None;
    }

    let oc = ray.origin - sphere.center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - sphere.radius * sphere.radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }

    let root = discriminant.sqrt();
    let near = -b - root;
    let far = -b + root;
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        Some(far)
    } else {
        None
    }
}

/// Nearest target hit by `ray`. Ties keep the earlier target in `targets`.
pub fn hit_test_ray(ray: &Ray, targets: &[SelectableTarget]) -> Option<HitResult> {
    let mut best: Option<(&SelectableTarget, f32)> = None;
    for target in targets {
        let Some(distance) = ray_sphere(ray, &target.volume) else {
            continue;
        };
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((target, distance));
        }
    }

    best.map(|(target, distance)| HitResult {
        target_id: target.id.clone(),
        point: ray.at(distance),
        distance,
    })
}

/// Cast a ray from `camera` through `ndc` and return the nearest target hit.
///
/// Callers must apply [`mirror_x`] first when the tracking feed is mirrored
/// relative to the rendered scene.
pub fn hit_test<C: Camera + ?Sized>(
    camera: &C,
    ndc: Vec2,
    targets: &[SelectableTarget],
) -> Option<HitResult> {
    hit_test_ray(&camera.unproject(ndc), targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn down_z() -> Ray {
        Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z)
    }

    #[test]
    fn sphere_straight_ahead_is_hit() {
        let sphere = BoundingSphere::new(Vec3::ZERO, 1.0);
        let t = ray_sphere(&down_z(), &sphere).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
    }

    #[test]
    fn sphere_behind_origin_is_missed() {
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0);
        assert_eq!(ray_sphere(&down_z(), &sphere), None);
    }

    #[test]
    fn tangent_ray_counts_as_hit() {
        let ray = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::NEG_Z);
        let sphere = BoundingSphere::new(Vec3::ZERO, 1.0);
        let t = ray_sphere(&ray, &sphere).expect("closed volume");
        assert!((t - 5.0).abs() < 1e-5);
    }

    #[test]
    fn origin_inside_sphere_hits_exit_point() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let sphere = BoundingSphere::new(Vec3::ZERO, 2.0);
        let t = ray_sphere(&ray, &sphere).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn zero_and_negative_radius_excluded() {
        let targets = vec![
            SelectableTarget::new("zero", Vec3::ZERO, 0.0),
            SelectableTarget::new("negative", Vec3::ZERO, -1.0),
        ];
        assert_eq!(hit_test_ray(&down_z(), &targets), None);
    }

    #[test]
    fn nearest_target_wins() {
        let targets = vec![
            SelectableTarget::new("far", Vec3::new(0.0, 0.0, -5.0), 1.0),
            SelectableTarget::new("near", Vec3::new(0.0, 0.0, 1.0), 1.0),
        ];
        let hit = hit_test_ray(&down_z(), &targets).unwrap();
        assert_eq!(hit.target_id.as_str(), "near");
        assert!((hit.distance - 3.0).abs() < 1e-5);
        assert!((hit.point - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn ties_keep_registration_order() {
        let targets = vec![
            SelectableTarget::new("first", Vec3::ZERO, 1.0),
            SelectableTarget::new("second", Vec3::ZERO, 1.0),
        ];
        let hit = hit_test_ray(&down_z(), &targets).unwrap();
        assert_eq!(hit.target_id.as_str(), "first");
    }

    #[test]
    fn ndc_maps_corners() {
        assert_eq!(to_ndc(0.0, 0.0), Vec2::new(-1.0, 1.0));
        assert_eq!(to_ndc(1.0, 1.0), Vec2::new(1.0, -1.0));
        assert_eq!(to_ndc(0.5, 0.5), Vec2::ZERO);
    }

    #[test]
    fn mirror_flips_point_two_to_point_eight() {
        assert!((mirror_x(0.2) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn center_ray_follows_view_direction() {
        let camera = PerspectiveCamera::default();
        let ray = camera.unproject(Vec2::ZERO);
        assert_eq!(ray.origin, camera.position);
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn right_half_of_screen_points_right() {
        let camera = PerspectiveCamera::default();
        let ray = camera.unproject(Vec2::new(0.5, 0.0));
        assert!(ray.direction.x > 0.0);
        assert!(ray.direction.z < 0.0);
    }

    #[test]
    fn camera_ray_hits_scene_bulb() {
        let camera = PerspectiveCamera::default();
        let targets = vec![SelectableTarget::new(
            "center",
            Vec3::new(0.0, 1.2, 0.0),
            0.35,
        )];
        let hit = hit_test(&camera, to_ndc(0.5, 0.5), &targets).unwrap();
        assert_eq!(hit.target_id.as_str(), "center");
        assert!((hit.distance - 2.15).abs() < 1e-3);
    }

    fn arb_target() -> impl Strategy<Value = (f32, f32, f32, f32)> {
        (-3.0f32..3.0, -3.0f32..3.0, -10.0f32..10.0, -0.5f32..2.0)
    }

    proptest! {
        #[test]
        fn returns_smallest_nonnegative_distance(
            specs in prop::collection::vec(arb_target(), 0..8),
        ) {
            let targets: Vec<SelectableTarget> = specs
                .iter()
                .enumerate()
                .map(|(i, &(x, y, z, r))| SelectableTarget::new(
                    format!("t{i}").as_str(),
                    Vec3::new(x, y, z),
                    r,
                ))
                .collect();
            let ray = down_z();

            let expected = targets
                .iter()
                .filter_map(|t| ray_sphere(&ray, &t.volume))
                .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.min(d))));

            match (hit_test_ray(&ray, &targets), expected) {
                (None, None) => {}
                (Some(hit), Some(min)) => {
                    prop_assert!(hit.distance >= 0.0);
                    prop_assert_eq!(hit.distance, min);
                }
                (got, want) => prop_assert!(false, "got {:?}, want {:?}", got, want),
            }
        }

        #[test]
        fn hit_point_lies_on_sphere_surface(
            (x, y, z, r) in arb_target(),
        ) {
            let target = SelectableTarget::new("t", Vec3::new(x, y, z), r);
            if let Some(hit) = hit_test_ray(&down_z(), std::slice::from_ref(&target)) {
                let dist = (hit.point - target.volume.center).length();
                prop_assert!((dist - r).abs() < 1e-2);
            }
        }

        #[test]
        fn mirror_is_an_involution(x in 0.0f32..=1.0) {
            prop_assert!((mirror_x(mirror_x(x)) - x).abs() < 1e-6);
            prop_assert!((mirror_x(x) + x - 1.0).abs() < 1e-6);
        }
    }
}
