//! Rigid bodies, collision shapes, and narrow-phase overlap tests.

use playground_geom::{Pose, Vec2};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::GeometryError;

fn wrap_signed_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    while angle > PI {
        angle -= 2.0 * PI;
    }
    angle
}

/// Geometry of a collider. The same representation serves both the solid
/// visible shape and the inflated trigger shapes derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PhysicalShape {
    Circle { radius: f32 },
    Rectangle { width: f32, length: f32 },
    Polygon { vertices: Vec<Vec2> },
}

impl PhysicalShape {
    /// Reject degenerate shape parameters.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Self::Circle { radius } => {
                if *radius <= 0.0 {
                    return Err(GeometryError::DegenerateShape(
                        "circle radius must be positive",
                    ));
                }
            }
            Self::Rectangle { width, length } => {
                if *width <= 0.0 || *length <= 0.0 {
                    return Err(GeometryError::DegenerateShape(
                        "rectangle extents must be positive",
                    ));
                }
            }
            Self::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(GeometryError::DegenerateShape(
                        "polygon needs at least three vertices",
                    ));
                }
                if vertices.iter().all(|v| v.length_sq() <= f32::EPSILON) {
                    return Err(GeometryError::DegenerateShape(
                        "polygon vertices must span a non-zero area",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Radius of the smallest circle (centered on the body) containing the shape.
    #[must_use]
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Self::Circle { radius } => *radius,
            Self::Rectangle { width, length } => (width * width + length * length).sqrt() / 2.0,
            Self::Polygon { vertices } => vertices
                .iter()
                .map(|v| v.length())
                .fold(0.0_f32, f32::max),
        }
    }

    /// Grow the shape by a margin, producing the trigger variant used for
    /// interaction and grasp detection. Polygons inflate to their bounding
    /// circle.
    #[must_use]
    pub fn inflated(&self, margin: f32) -> Self {
        match self {
            Self::Circle { radius } => Self::Circle {
                radius: radius + margin,
            },
            Self::Rectangle { width, length } => Self::Rectangle {
                width: width + margin,
                length: length + margin,
            },
            Self::Polygon { .. } => Self::Circle {
                radius: self.bounding_radius() + margin,
            },
        }
    }

    /// Scale every extent by a ratio, preserving the shape family.
    #[must_use]
    pub fn scaled(&self, ratio: f32) -> Self {
        match self {
            Self::Circle { radius } => Self::Circle {
                radius: radius * ratio,
            },
            Self::Rectangle { width, length } => Self::Rectangle {
                width: width * ratio,
                length: length * ratio,
            },
            Self::Polygon { vertices } => Self::Polygon {
                vertices: vertices.iter().map(|v| *v * ratio).collect(),
            },
        }
    }

    /// Moment of inertia of the shape at the given mass.
    ///
    /// Polygons use a bounding-circle approximation.
    #[must_use]
    pub fn moment(&self, mass: f32) -> f32 {
        match self {
            Self::Circle { radius } => mass * radius * radius / 2.0,
            Self::Rectangle { width, length } => mass * (width * width + length * length) / 12.0,
            Self::Polygon { .. } => {
                let radius = self.bounding_radius();
                mass * radius * radius / 2.0
            }
        }
    }
}

/// Rigid body owned exclusively by its entity or agent.
///
/// Static bodies ignore integration entirely; dynamic bodies are advanced by
/// the damped integrator every sub-step and mutated by interaction effects
/// (shrinking recomputes mass and moment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub angle: f32,
    pub velocity: Vec2,
    pub angular_velocity: f32,
    pub mass: f32,
    pub moment: f32,
    dynamic: bool,
}

impl Body {
    /// An immovable body pinned at the given pose.
    #[must_use]
    pub fn fixed(pose: Pose) -> Self {
        Self {
            position: pose.position,
            angle: pose.angle,
            velocity: Vec2::zero(),
            angular_velocity: 0.0,
            mass: 0.0,
            moment: 0.0,
            dynamic: false,
        }
    }

    /// A movable body with mass and a shape-derived moment of inertia.
    pub fn movable(pose: Pose, mass: f32, shape: &PhysicalShape) -> Result<Self, GeometryError> {
        if mass <= 0.0 {
            return Err(GeometryError::ZeroMassMovable);
        }
        Ok(Self {
            position: pose.position,
            angle: pose.angle,
            velocity: Vec2::zero(),
            angular_velocity: 0.0,
            mass,
            moment: shape.moment(mass),
            dynamic: true,
        })
    }

    /// Whether the integrator moves this body.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Current pose.
    #[must_use]
    pub const fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            angle: self.angle,
        }
    }

    /// Teleport the body, preserving velocities.
    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.angle = pose.angle;
    }

    /// Zero out all motion.
    pub fn halt(&mut self) {
        self.velocity = Vec2::zero();
        self.angular_velocity = 0.0;
    }

    /// Recompute the moment of inertia after a mass or shape change.
    pub fn refresh_moment(&mut self, shape: &PhysicalShape) {
        if self.dynamic {
            self.moment = shape.moment(self.mass);
        }
    }

    /// Advance the body by `dt`, then damp velocities.
    pub fn integrate(&mut self, dt: f32, damping: f32) {
        if !self.dynamic {
            return;
        }
        self.position = self.position + self.velocity * dt;
        self.angle = wrap_signed_angle(self.angle + self.angular_velocity * dt);
        self.velocity = self.velocity * damping;
        self.angular_velocity *= damping;
    }
}

/// Information about a single solid contact. The normal points from shape B
/// toward shape A, i.e. the direction that separates A from B.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub normal: Vec2,
    pub depth: f32,
}

fn circle_vs_circle(pa: Vec2, ra: f32, pb: Vec2, rb: f32) -> Option<Contact> {
    let delta = pa - pb;
    let dist_sq = delta.length_sq();
    let reach = ra + rb;
    if dist_sq >= reach * reach {
        return None;
    }
    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 {
        delta * (1.0 / dist)
    } else {
        Vec2::new(1.0, 0.0)
    };
    Some(Contact {
        normal,
        depth: reach - dist,
    })
}

/// Contact between a circle and an oriented rectangle; the normal points
/// from the rectangle toward the circle.
fn circle_vs_rect(
    center: Vec2,
    radius: f32,
    rect_pose: Pose,
    width: f32,
    length: f32,
) -> Option<Contact> {
    let local = (center - rect_pose.position).rotated(-rect_pose.angle);
    let half_w = width / 2.0;
    let half_l = length / 2.0;
    let clamped = Vec2::new(local.x.clamp(-half_w, half_w), local.y.clamp(-half_l, half_l));
    let delta = local - clamped;
    let dist_sq = delta.length_sq();
    if dist_sq > radius * radius {
        return None;
    }
    let (normal_local, depth) = if dist_sq > 1e-12 {
        let dist = dist_sq.sqrt();
        (delta * (1.0 / dist), radius - dist)
    } else {
        // Center inside the rectangle: separate along the shallowest face.
        let pen_x = half_w - local.x.abs();
        let pen_y = half_l - local.y.abs();
        let sign = |v: f32| if v >= 0.0 { 1.0 } else { -1.0 };
        if pen_x < pen_y {
            (Vec2::new(sign(local.x), 0.0), radius + pen_x)
        } else {
            (Vec2::new(0.0, sign(local.y)), radius + pen_y)
        }
    };
    Some(Contact {
        normal: normal_local.rotated(rect_pose.angle),
        depth,
    })
}

/// Narrow-phase overlap test between two posed shapes.
///
/// Circle/circle and circle/rectangle pairs are exact; remaining pairs fall
/// back to bounding circles.
#[must_use]
pub fn overlap(
    shape_a: &PhysicalShape,
    pose_a: Pose,
    shape_b: &PhysicalShape,
    pose_b: Pose,
) -> Option<Contact> {
    use PhysicalShape::{Circle, Rectangle};
    match (shape_a, shape_b) {
        (Circle { radius: ra }, Circle { radius: rb }) => {
            circle_vs_circle(pose_a.position, *ra, pose_b.position, *rb)
        }
        (Circle { radius }, Rectangle { width, length }) => {
            circle_vs_rect(pose_a.position, *radius, pose_b, *width, *length)
        }
        (Rectangle { width, length }, Circle { radius }) => {
            circle_vs_rect(pose_b.position, *radius, pose_a, *width, *length).map(|contact| {
                Contact {
                    normal: contact.normal * -1.0,
                    depth: contact.depth,
                }
            })
        }
        _ => circle_vs_circle(
            pose_a.position,
            shape_a.bounding_radius(),
            pose_b.position,
            shape_b.bounding_radius(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_validation_rejects_degenerates() {
        assert!(PhysicalShape::Circle { radius: 0.0 }.validate().is_err());
        assert!(
            PhysicalShape::Rectangle {
                width: -1.0,
                length: 2.0
            }
            .validate()
            .is_err()
        );
        assert!(
            PhysicalShape::Polygon {
                vertices: vec![Vec2::zero(), Vec2::new(1.0, 0.0)]
            }
            .validate()
            .is_err()
        );
        assert!(PhysicalShape::Circle { radius: 3.0 }.validate().is_ok());
    }

    #[test]
    fn movable_body_requires_mass() {
        let shape = PhysicalShape::Circle { radius: 5.0 };
        assert_eq!(
            Body::movable(Pose::default(), 0.0, &shape),
            Err(GeometryError::ZeroMassMovable)
        );
        let body = Body::movable(Pose::default(), 2.0, &shape).expect("body");
        assert!(body.is_dynamic());
        assert!((body.moment - 25.0).abs() < 1e-6);
    }

    #[test]
    fn integrator_moves_and_damps() {
        let shape = PhysicalShape::Circle { radius: 1.0 };
        let mut body = Body::movable(Pose::default(), 1.0, &shape).expect("body");
        body.velocity = Vec2::new(4.0, 0.0);
        body.integrate(0.25, 0.9);
        assert!((body.position.x - 1.0).abs() < 1e-6);
        assert!((body.velocity.x - 3.6).abs() < 1e-6);

        let mut pinned = Body::fixed(Pose::default());
        pinned.velocity = Vec2::new(4.0, 0.0);
        pinned.integrate(0.25, 0.9);
        assert_eq!(pinned.position, Vec2::zero());
    }

    #[test]
    fn circle_overlap_reports_separation_normal() {
        let a = PhysicalShape::Circle { radius: 5.0 };
        let b = PhysicalShape::Circle { radius: 5.0 };
        let contact = overlap(
            &a,
            Pose::new(8.0, 0.0, 0.0),
            &b,
            Pose::new(0.0, 0.0, 0.0),
        )
        .expect("contact");
        assert!((contact.depth - 2.0).abs() < 1e-6);
        assert!((contact.normal.x - 1.0).abs() < 1e-6);

        assert!(
            overlap(
                &a,
                Pose::new(11.0, 0.0, 0.0),
                &b,
                Pose::new(0.0, 0.0, 0.0)
            )
            .is_none()
        );
    }

    #[test]
    fn circle_rect_overlap_accounts_for_rotation() {
        let circle = PhysicalShape::Circle { radius: 2.0 };
        let rect = PhysicalShape::Rectangle {
            width: 10.0,
            length: 4.0,
        };
        // Circle sits just past the rectangle's long edge.
        let hit = overlap(
            &circle,
            Pose::new(0.0, 3.5, 0.0),
            &rect,
            Pose::new(0.0, 0.0, 0.0),
        );
        assert!(hit.is_some());

        // Rotating the rectangle a quarter turn swaps its extents.
        let miss = overlap(
            &circle,
            Pose::new(0.0, 7.5, 0.0),
            &rect,
            Pose::new(0.0, 0.0, std::f32::consts::FRAC_PI_2),
        );
        assert!(miss.is_none());
    }

    #[test]
    fn inflation_and_scaling_preserve_shape_families() {
        let rect = PhysicalShape::Rectangle {
            width: 4.0,
            length: 6.0,
        };
        assert_eq!(
            rect.inflated(2.0),
            PhysicalShape::Rectangle {
                width: 6.0,
                length: 8.0
            }
        );
        assert_eq!(
            rect.scaled(0.5),
            PhysicalShape::Rectangle {
                width: 2.0,
                length: 3.0
            }
        );
        let poly = PhysicalShape::Polygon {
            vertices: vec![
                Vec2::new(3.0, 0.0),
                Vec2::new(0.0, 3.0),
                Vec2::new(-3.0, 0.0),
            ],
        };
        assert_eq!(poly.inflated(1.0), PhysicalShape::Circle { radius: 4.0 });
    }
}
