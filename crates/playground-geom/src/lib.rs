//! Geometry primitives, area position sampling, and trajectory generation.
//!
//! Entities accept any [`PositionSource`] — a literal pose, a
//! [`CoordinateSampler`] drawing from an area, or a [`Trajectory`] walking a
//! closed path — and query it once per placement or step.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod trajectory;

pub use trajectory::{Trajectory, TrajectoryError, TrajectoryShape};

/// Upper bound on rejection-sampling attempts before a sampler gives up.
pub const MAX_SAMPLE_ATTEMPTS: usize = 1_000;

/// Plain 2D vector.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    /// Construct a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    #[must_use]
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Squared Euclidean length.
    #[must_use]
    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    /// Squared distance to another point.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        (self - other).length_sq()
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_sq(other).sqrt()
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Rotate the vector by `angle` radians.
    #[must_use]
    pub fn rotated(self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Position plus orientation of a body in world space.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub angle: f32,
}

impl Pose {
    /// Construct a pose from coordinates and an orientation.
    #[must_use]
    pub const fn new(x: f32, y: f32, angle: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            angle,
        }
    }
}

/// Errors raised while sampling positions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SamplingError {
    /// Rejection sampling failed to produce an accepted candidate in time.
    #[error("position sampling did not converge after {attempts} attempts")]
    Timeout { attempts: usize },
    /// Indicates area parameters that cannot be sampled from.
    #[error("invalid sampling area: {0}")]
    InvalidArea(&'static str),
}

/// Geometric description of a sampling area.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum AreaShape {
    /// Axis-aligned rectangle of `width x length`.
    Rectangle { width: f32, length: f32 },
    /// Disc of the given radius; candidates are drawn from the bounding box
    /// and rejected until one falls inside.
    Circle { radius: f32 },
    /// Normal distribution truncated to a disc of the given radius.
    Gaussian { radius: f32, variance: f32 },
}

/// Samples random poses within a configured area around a center point.
///
/// The orientation component is always drawn independently and uniformly
/// from the configured angle range, regardless of the area shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinateSampler {
    center: Vec2,
    shape: AreaShape,
    theta_min: f32,
    theta_max: f32,
}

fn uniform<R: Rng>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}

impl CoordinateSampler {
    /// Create a sampler with the full `[-pi, pi)` orientation range.
    pub fn new(center: Vec2, shape: AreaShape) -> Result<Self, SamplingError> {
        Self::with_theta_range(center, shape, -std::f32::consts::PI, std::f32::consts::PI)
    }

    /// Create a sampler with an explicit orientation range.
    pub fn with_theta_range(
        center: Vec2,
        shape: AreaShape,
        theta_min: f32,
        theta_max: f32,
    ) -> Result<Self, SamplingError> {
        match shape {
            AreaShape::Rectangle { width, length } => {
                if width < 0.0 || length < 0.0 {
                    return Err(SamplingError::InvalidArea(
                        "rectangle extents must be non-negative",
                    ));
                }
            }
            AreaShape::Circle { radius } => {
                if radius <= 0.0 {
                    return Err(SamplingError::InvalidArea("circle radius must be positive"));
                }
            }
            AreaShape::Gaussian { radius, variance } => {
                if radius <= 0.0 || variance <= 0.0 {
                    return Err(SamplingError::InvalidArea(
                        "gaussian radius and variance must be positive",
                    ));
                }
            }
        }
        if theta_max < theta_min {
            return Err(SamplingError::InvalidArea(
                "theta_max must not be below theta_min",
            ));
        }
        Ok(Self {
            center,
            shape,
            theta_min,
            theta_max,
        })
    }

    /// The configured area center.
    #[must_use]
    pub const fn center(&self) -> Vec2 {
        self.center
    }

    /// The configured area shape.
    #[must_use]
    pub const fn shape(&self) -> AreaShape {
        self.shape
    }

    /// Move the sampling area to a new center.
    pub fn recenter(&mut self, center: Vec2) {
        self.center = center;
    }

    /// Draw a pose from the area around the configured center.
    ///
    /// Rejection-sampled shapes are bounded to [`MAX_SAMPLE_ATTEMPTS`]
    /// candidates; callers recover from [`SamplingError::Timeout`] by falling
    /// back to [`CoordinateSampler::center_pose`].
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Pose, SamplingError> {
        self.sample_from(rng, self.center)
    }

    /// Draw a pose from the area around an explicit center.
    pub fn sample_from<R: Rng>(&self, rng: &mut R, center: Vec2) -> Result<Pose, SamplingError> {
        let angle = uniform(rng, self.theta_min, self.theta_max);
        let position = match self.shape {
            AreaShape::Rectangle { width, length } => Vec2::new(
                uniform(rng, center.x - width / 2.0, center.x + width / 2.0),
                uniform(rng, center.y - length / 2.0, center.y + length / 2.0),
            ),
            AreaShape::Circle { radius } => {
                let radius_sq = radius * radius;
                let mut accepted = None;
                for _ in 0..MAX_SAMPLE_ATTEMPTS {
                    let candidate = Vec2::new(
                        uniform(rng, center.x - radius, center.x + radius),
                        uniform(rng, center.y - radius, center.y + radius),
                    );
                    if candidate.distance_sq(center) <= radius_sq {
                        accepted = Some(candidate);
                        break;
                    }
                }
                accepted.ok_or(SamplingError::Timeout {
                    attempts: MAX_SAMPLE_ATTEMPTS,
                })?
            }
            AreaShape::Gaussian { radius, variance } => {
                let normal_x = Normal::new(center.x, variance.sqrt())
                    .map_err(|_| SamplingError::InvalidArea("gaussian variance must be finite"))?;
                let normal_y = Normal::new(center.y, variance.sqrt())
                    .map_err(|_| SamplingError::InvalidArea("gaussian variance must be finite"))?;
                let radius_sq = radius * radius;
                let mut accepted = None;
                for _ in 0..MAX_SAMPLE_ATTEMPTS {
                    let candidate = Vec2::new(normal_x.sample(rng), normal_y.sample(rng));
                    if candidate.distance_sq(center) <= radius_sq {
                        accepted = Some(candidate);
                        break;
                    }
                }
                accepted.ok_or(SamplingError::Timeout {
                    attempts: MAX_SAMPLE_ATTEMPTS,
                })?
            }
        };
        Ok(Pose { position, angle })
    }

    /// Deterministic fallback pose at the area center with a sampled angle.
    pub fn center_pose<R: Rng>(&self, rng: &mut R) -> Pose {
        Pose {
            position: self.center,
            angle: uniform(rng, self.theta_min, self.theta_max),
        }
    }
}

/// Polymorphic position provider accepted anywhere an entity is placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PositionSource {
    /// A literal world pose.
    Fixed(Pose),
    /// A pose sampled from an area on every query.
    Area(CoordinateSampler),
    /// The next point of a closed trajectory on every query.
    Path(Trajectory),
}

impl PositionSource {
    /// Query the next pose from the source.
    pub fn next_pose<R: Rng>(&mut self, rng: &mut R) -> Result<Pose, SamplingError> {
        match self {
            Self::Fixed(pose) => Ok(*pose),
            Self::Area(sampler) => sampler.sample(rng),
            Self::Path(trajectory) => Ok(trajectory.advance()),
        }
    }

    /// Deterministic pose used when sampling fails to converge.
    pub fn fallback_pose<R: Rng>(&self, rng: &mut R) -> Pose {
        match self {
            Self::Fixed(pose) => *pose,
            Self::Area(sampler) => sampler.center_pose(rng),
            Self::Path(trajectory) => trajectory.current(),
        }
    }

    /// Whether the source yields a new pose every simulation step.
    #[must_use]
    pub const fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Restore the source to its initial state.
    pub fn reset(&mut self) {
        if let Self::Path(trajectory) = self {
            trajectory.reset(None);
        }
    }
}

impl From<Pose> for PositionSource {
    fn from(pose: Pose) -> Self {
        Self::Fixed(pose)
    }
}

impl From<CoordinateSampler> for PositionSource {
    fn from(sampler: CoordinateSampler) -> Self {
        Self::Area(sampler)
    }
}

impl From<Trajectory> for PositionSource {
    fn from(trajectory: Trajectory) -> Self {
        Self::Path(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0x5EED)
    }

    #[test]
    fn rectangle_samples_stay_inside_bounds() {
        let sampler = CoordinateSampler::new(
            Vec2::new(70.0, 70.0),
            AreaShape::Rectangle {
                width: 30.0,
                length: 100.0,
            },
        )
        .expect("sampler");
        let mut rng = rng();
        for _ in 0..10_000 {
            let pose = sampler.sample(&mut rng).expect("sample");
            assert!((55.0..=85.0).contains(&pose.position.x));
            assert!((20.0..=120.0).contains(&pose.position.y));
            assert!((-std::f32::consts::PI..std::f32::consts::PI).contains(&pose.angle));
        }
    }

    #[test]
    fn circle_samples_stay_inside_radius() {
        let center = Vec2::new(150.0, 50.0);
        let sampler =
            CoordinateSampler::new(center, AreaShape::Circle { radius: 60.0 }).expect("sampler");
        let mut rng = rng();
        for _ in 0..10_000 {
            let pose = sampler.sample(&mut rng).expect("sample");
            assert!(pose.position.distance(center) <= 60.0 + 1e-3);
        }
    }

    #[test]
    fn gaussian_samples_stay_inside_radius() {
        let center = Vec2::new(0.0, 0.0);
        let sampler = CoordinateSampler::new(
            center,
            AreaShape::Gaussian {
                radius: 40.0,
                variance: 300.0,
            },
        )
        .expect("sampler");
        let mut rng = rng();
        for _ in 0..2_000 {
            let pose = sampler.sample(&mut rng).expect("sample");
            assert!(pose.position.distance(center) <= 40.0 + 1e-3);
        }
    }

    #[test]
    fn theta_range_is_honoured() {
        let sampler = CoordinateSampler::with_theta_range(
            Vec2::zero(),
            AreaShape::Rectangle {
                width: 10.0,
                length: 10.0,
            },
            0.5,
            1.5,
        )
        .expect("sampler");
        let mut rng = rng();
        for _ in 0..1_000 {
            let pose = sampler.sample(&mut rng).expect("sample");
            assert!((0.5..1.5).contains(&pose.angle));
        }
    }

    #[test]
    fn degenerate_theta_range_does_not_panic() {
        let sampler = CoordinateSampler::with_theta_range(
            Vec2::zero(),
            AreaShape::Rectangle {
                width: 0.0,
                length: 0.0,
            },
            1.0,
            1.0,
        )
        .expect("sampler");
        let mut rng = rng();
        let pose = sampler.sample(&mut rng).expect("sample");
        assert_eq!(pose.position, Vec2::zero());
        assert!((pose.angle - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn hopeless_gaussian_sampling_times_out() {
        // Acceptance region is vanishingly small relative to the spread, so
        // the bounded retry loop must give up instead of spinning forever.
        let sampler = CoordinateSampler::new(
            Vec2::zero(),
            AreaShape::Gaussian {
                radius: 1e-3,
                variance: 1e12,
            },
        )
        .expect("sampler");
        let mut rng = rng();
        assert_eq!(
            sampler.sample(&mut rng),
            Err(SamplingError::Timeout {
                attempts: MAX_SAMPLE_ATTEMPTS
            })
        );
    }

    #[test]
    fn invalid_areas_are_rejected_at_construction() {
        assert!(CoordinateSampler::new(Vec2::zero(), AreaShape::Circle { radius: 0.0 }).is_err());
        assert!(
            CoordinateSampler::new(
                Vec2::zero(),
                AreaShape::Gaussian {
                    radius: 10.0,
                    variance: 0.0
                }
            )
            .is_err()
        );
    }

    #[test]
    fn position_source_fixed_repeats_pose() {
        let mut source = PositionSource::from(Pose::new(3.0, 4.0, 0.5));
        let mut rng = rng();
        let first = source.next_pose(&mut rng).expect("pose");
        let second = source.next_pose(&mut rng).expect("pose");
        assert_eq!(first, second);
        assert_eq!(first, Pose::new(3.0, 4.0, 0.5));
    }
}
