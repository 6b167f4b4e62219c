//! Closed-path trajectory generation for moving entities.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use thiserror::Error;

use crate::{Pose, Vec2};

/// Errors raised while building a trajectory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrajectoryError {
    /// A waypoint path needs at least two distinct corners.
    #[error("trajectory requires at least two waypoints")]
    TooFewWaypoints,
    /// The duration is too short to place a single interpolated point.
    #[error("trajectory duration of {0} steps produces no points")]
    ZeroDuration(usize),
    /// All waypoints coincide, leaving nothing to interpolate along.
    #[error("trajectory path has zero total length")]
    ZeroLength,
}

/// Regular polygon shapes a trajectory can be inscribed on.
///
/// `Circle` is approximated by a 60-sided polygon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrajectoryShape {
    Line,
    Triangle,
    Square,
    Pentagon,
    Hexagon,
    Circle,
}

impl TrajectoryShape {
    /// Number of polygon sides used to derive waypoints.
    #[must_use]
    pub const fn sides(self) -> usize {
        match self {
            Self::Line => 2,
            Self::Triangle => 3,
            Self::Square => 4,
            Self::Pentagon => 5,
            Self::Hexagon => 6,
            Self::Circle => 60,
        }
    }
}

/// An infinite, restartable generator of poses along a closed path.
///
/// The full point sequence is precomputed at construction: waypoints are
/// interpolated linearly in proportion to segment length, and each point is
/// assigned an orientation advancing uniformly by `n_rotations` full turns
/// over the whole loop. [`Trajectory::advance`] returns the current point and
/// then steps the index by one in the configured direction, wrapping modulo
/// the path length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    points: Vec<Pose>,
    raw_start: isize,
    centering_offset: isize,
    current: isize,
    counter_clockwise: bool,
}

impl Trajectory {
    /// Build a trajectory visiting explicit waypoints in order, closing the
    /// loop from the last waypoint back to the first.
    pub fn from_waypoints(
        duration: usize,
        n_rotations: u32,
        waypoints: &[Vec2],
    ) -> Result<Self, TrajectoryError> {
        Self::build(duration, n_rotations, waypoints, 0)
    }

    /// Build a trajectory around a regular polygon inscribed in a circle.
    ///
    /// The starting index is shifted back by half a side so the path begins
    /// centered on the first edge rather than at a corner.
    pub fn around_shape(
        duration: usize,
        n_rotations: u32,
        shape: TrajectoryShape,
        center: Pose,
        radius: f32,
    ) -> Result<Self, TrajectoryError> {
        let sides = shape.sides();
        let offset_angle = std::f32::consts::PI / sides as f32 + center.angle;
        let mut waypoints = Vec::with_capacity(sides);
        for n in 0..sides {
            let angle = n as f32 * TAU / sides as f32 + offset_angle;
            waypoints.push(Vec2::new(
                center.position.x + radius * angle.cos(),
                center.position.y + radius * angle.sin(),
            ));
        }
        waypoints.reverse();
        let mut trajectory = Self::build(duration, n_rotations, &waypoints, 0)?;
        trajectory.centering_offset = (trajectory.points.len() / sides / 2) as isize;
        trajectory.current = trajectory.effective_start();
        Ok(trajectory)
    }

    fn build(
        duration: usize,
        n_rotations: u32,
        waypoints: &[Vec2],
        raw_start: isize,
    ) -> Result<Self, TrajectoryError> {
        if waypoints.len() < 2 {
            return Err(TrajectoryError::TooFewWaypoints);
        }
        let mut segments = Vec::with_capacity(waypoints.len());
        for (i, &from) in waypoints.iter().enumerate() {
            let to = waypoints[(i + 1) % waypoints.len()];
            segments.push((from, to, from.distance(to)));
        }
        let total_length: f32 = segments.iter().map(|(_, _, len)| len).sum();
        if total_length <= f32::EPSILON {
            return Err(TrajectoryError::ZeroLength);
        }

        let mut points = Vec::with_capacity(duration);
        for (from, to, length) in segments {
            let n_points = (duration as f32 * length / total_length) as usize;
            for k in 0..n_points {
                let t = k as f32 / n_points as f32;
                points.push(Pose {
                    position: from + (to - from) * t,
                    angle: 0.0,
                });
            }
        }
        if points.is_empty() {
            return Err(TrajectoryError::ZeroDuration(duration));
        }

        let count = points.len();
        for (i, point) in points.iter_mut().enumerate() {
            point.angle = (i as f32 * n_rotations as f32 * TAU / count as f32) % TAU;
        }

        Ok(Self {
            points,
            raw_start,
            centering_offset: 0,
            current: raw_start,
            counter_clockwise: false,
        })
    }

    /// Reverse or restore the walking direction.
    pub fn set_counter_clockwise(&mut self, counter_clockwise: bool) {
        self.counter_clockwise = counter_clockwise;
    }

    /// Builder form of [`Trajectory::set_counter_clockwise`].
    #[must_use]
    pub fn counter_clockwise(mut self, counter_clockwise: bool) -> Self {
        self.counter_clockwise = counter_clockwise;
        self
    }

    /// Builder setting the starting index.
    #[must_use]
    pub fn starting_at(mut self, index: isize) -> Self {
        self.raw_start = index;
        self.current = self.effective_start();
        self
    }

    fn effective_start(&self) -> isize {
        self.raw_start - self.centering_offset
    }

    /// Number of interpolated points on the closed path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// A trajectory always holds at least one point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Current signed index into the path, in `[-len, len)`.
    #[must_use]
    pub const fn current_index(&self) -> isize {
        self.current
    }

    fn point_at(&self, index: isize) -> Pose {
        let len = self.points.len() as isize;
        self.points[index.rem_euclid(len) as usize]
    }

    /// The pose the next [`Trajectory::advance`] call will return.
    #[must_use]
    pub fn current(&self) -> Pose {
        self.point_at(self.current)
    }

    /// Return the current pose, then step the index one point along the path.
    pub fn advance(&mut self) -> Pose {
        let pose = self.point_at(self.current);
        let len = self.points.len() as isize;
        if self.counter_clockwise {
            self.current -= 1;
            if self.current == -len {
                self.current = 0;
            }
        } else {
            self.current += 1;
            if self.current == len {
                self.current = 0;
            }
        }
        pose
    }

    /// Reseed the index, optionally at a new starting offset.
    pub fn reset(&mut self, index_start: Option<isize>) {
        if let Some(index_start) = index_start {
            self.raw_start = index_start;
        }
        self.current = self.effective_start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_waypoints() -> Vec<Vec2> {
        vec![
            Vec2::new(20.0, 20.0),
            Vec2::new(20.0, 180.0),
            Vec2::new(180.0, 180.0),
            Vec2::new(180.0, 20.0),
        ]
    }

    #[test]
    fn waypoint_trajectory_closes_after_full_loop() {
        let mut trajectory =
            Trajectory::from_waypoints(300, 0, &square_waypoints()).expect("trajectory");
        let start_index = trajectory.current_index();
        let first = trajectory.advance();
        for _ in 1..trajectory.len() {
            trajectory.advance();
        }
        assert_eq!(trajectory.current_index(), start_index);
        assert_eq!(trajectory.current(), first);
    }

    #[test]
    fn reversal_returns_to_original_index() {
        let mut trajectory =
            Trajectory::from_waypoints(200, 0, &square_waypoints()).expect("trajectory");
        let origin = trajectory.current_index();
        for _ in 0..17 {
            trajectory.advance();
        }
        trajectory.set_counter_clockwise(true);
        for _ in 0..17 {
            trajectory.advance();
        }
        assert_eq!(trajectory.current_index(), origin);
    }

    #[test]
    fn counter_clockwise_wraps_through_negative_indices() {
        let mut trajectory = Trajectory::from_waypoints(40, 0, &square_waypoints())
            .expect("trajectory")
            .counter_clockwise(true);
        let len = trajectory.len();
        let start = trajectory.current();
        for _ in 0..len {
            trajectory.advance();
        }
        assert_eq!(trajectory.current(), start);
    }

    #[test]
    fn rotations_advance_uniformly_over_the_loop() {
        let trajectory =
            Trajectory::from_waypoints(100, 2, &square_waypoints()).expect("trajectory");
        let len = trajectory.len();
        let quarter = trajectory.point_at(len as isize / 4);
        let expected = ((len / 4) as f32 * 2.0 * TAU / len as f32) % TAU;
        assert!((quarter.angle - expected).abs() < 1e-5);
    }

    #[test]
    fn shape_trajectory_stays_on_circumscribed_circle() {
        let center = Pose::new(100.0, 70.0, 0.0);
        let mut trajectory =
            Trajectory::around_shape(200, 0, TrajectoryShape::Hexagon, center, 50.0)
                .expect("trajectory");
        for _ in 0..trajectory.len() {
            let pose = trajectory.advance();
            let dist = pose.position.distance(center.position);
            assert!(dist <= 50.0 + 1e-3, "point left the hexagon, dist={dist}");
        }
    }

    #[test]
    fn shape_start_is_centered_on_first_side() {
        let center = Pose::new(0.0, 0.0, 0.0);
        let trajectory = Trajectory::around_shape(120, 0, TrajectoryShape::Square, center, 30.0)
            .expect("trajectory");
        let expected = -((trajectory.len() / 4 / 2) as isize);
        assert_eq!(trajectory.current_index(), expected);
    }

    #[test]
    fn reset_restores_start_and_accepts_overrides() {
        let mut trajectory =
            Trajectory::from_waypoints(100, 0, &square_waypoints()).expect("trajectory");
        for _ in 0..7 {
            trajectory.advance();
        }
        trajectory.reset(None);
        assert_eq!(trajectory.current_index(), 0);
        trajectory.reset(Some(5));
        assert_eq!(trajectory.current_index(), 5);
    }

    #[test]
    fn rejects_degenerate_paths() {
        assert_eq!(
            Trajectory::from_waypoints(100, 0, &[Vec2::zero()]),
            Err(TrajectoryError::TooFewWaypoints)
        );
        assert_eq!(
            Trajectory::from_waypoints(100, 0, &[Vec2::zero(), Vec2::zero()]),
            Err(TrajectoryError::ZeroLength)
        );
        assert_eq!(
            Trajectory::from_waypoints(0, 0, &square_waypoints()),
            Err(TrajectoryError::ZeroDuration(0))
        );
    }
}
