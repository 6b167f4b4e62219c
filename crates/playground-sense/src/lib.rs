//! Egocentric polar sensor pipeline.
//!
//! The pipeline consumes an externally rendered top-down [`SceneRaster`] and
//! converts it into a bounded per-sensor observation: a nearest-neighbor
//! polar unwarp centered at the sensor, a circular roll aligning the sensor
//! heading with the image center, an angular and radial crop, and a final
//! nearest-neighbor resample to a fixed resolution. Output dimensions depend
//! only on the sensor configuration and the raster geometry, never on scene
//! content.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use thiserror::Error;

/// Errors raised by the sensor pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RasterError {
    /// Raster dimensions or channel count of zero.
    #[error("raster dimensions must be non-zero")]
    EmptyRaster,
    /// Pixel buffer length disagrees with the declared dimensions.
    #[error("pixel buffer holds {actual} values, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },
    /// Entity-id plane length disagrees with the raster dimensions.
    #[error("entity-id plane holds {actual} values, expected {expected}")]
    IdPlaneMismatch { expected: usize, actual: usize },
    /// The radial crop would remove the entire raster width.
    #[error("min_range {min_range} exceeds raster width {width}")]
    MinRangeTooWide { min_range: usize, width: usize },
    /// Sensor configuration values that cannot produce an observation.
    #[error("invalid sensor configuration: {0}")]
    InvalidSensor(&'static str),
}

/// Top-down rendering of the whole scene, plus an optional per-pixel map
/// from pixel to owning entity for semantic sensor variants.
///
/// The raster is produced by an external renderer; this crate only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneRaster {
    width: usize,
    height: usize,
    channels: usize,
    pixels: Vec<f32>,
    entity_ids: Option<Vec<u32>>,
}

impl SceneRaster {
    /// Wrap a `width x height x channels` pixel buffer.
    pub fn new(
        width: usize,
        height: usize,
        channels: usize,
        pixels: Vec<f32>,
    ) -> Result<Self, RasterError> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(RasterError::EmptyRaster);
        }
        let expected = width * height * channels;
        if pixels.len() != expected {
            return Err(RasterError::BufferMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
            entity_ids: None,
        })
    }

    /// Attach a per-pixel entity-id plane (`width x height`, row-major).
    pub fn with_entity_ids(mut self, entity_ids: Vec<u32>) -> Result<Self, RasterError> {
        let expected = self.width * self.height;
        if entity_ids.len() != expected {
            return Err(RasterError::IdPlaneMismatch {
                expected,
                actual: entity_ids.len(),
            });
        }
        self.entity_ids = Some(entity_ids);
        Ok(self)
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Mutable pixel access for renderers writing into the raster.
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> Option<&mut [f32]> {
        if x < self.width && y < self.height {
            let offset = (y * self.width + x) * self.channels;
            Some(&mut self.pixels[offset..offset + self.channels])
        } else {
            None
        }
    }

    #[inline]
    fn flat_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }
}

/// Anchoring and field-of-view configuration of one polar sensor.
///
/// The sensor is rigidly attached to an anchor body through a polar offset:
/// radial distance `d_r`, angular offset `d_theta`, and relative orientation
/// `d_orientation`. Its world pose is always derived from the anchor's
/// current pose; it is never stored independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSpec {
    /// Radial extent of the field of view, in world units.
    pub fov_range: f32,
    /// Angular aperture of the field of view, in radians.
    pub fov_angle: f32,
    /// Number of rows in the resampled observation.
    pub fov_resolution: usize,
    /// Radial pixels closer than this are occluded from the observation.
    pub min_range: usize,
    /// Radial offset of the sensor from the anchor body center.
    pub d_r: f32,
    /// Angular offset (in the anchor frame) of the sensor mount point.
    pub d_theta: f32,
    /// Orientation of the sensor relative to the anchor heading.
    pub d_orientation: f32,
}

impl SensorSpec {
    /// A forward-mounted sensor with the given field of view.
    #[must_use]
    pub const fn forward(fov_range: f32, fov_angle: f32, fov_resolution: usize) -> Self {
        Self {
            fov_range,
            fov_angle,
            fov_resolution,
            min_range: 0,
            d_r: 0.0,
            d_theta: 0.0,
            d_orientation: 0.0,
        }
    }

    fn validate(&self) -> Result<(), RasterError> {
        if !(self.fov_range > 0.0) {
            return Err(RasterError::InvalidSensor("fov_range must be positive"));
        }
        if !(self.fov_angle > 0.0 && self.fov_angle <= TAU) {
            return Err(RasterError::InvalidSensor(
                "fov_angle must be in (0, 2*pi]",
            ));
        }
        if self.fov_resolution == 0 {
            return Err(RasterError::InvalidSensor(
                "fov_resolution must be non-zero",
            ));
        }
        Ok(())
    }

    /// Observation dimensions `(rows, cols)` for a raster of the given size.
    ///
    /// This is a pure function of the configuration and raster geometry; for
    /// a fixed raster size it is constant across steps.
    pub fn observation_dims(&self, raster_width: usize) -> Result<(usize, usize), RasterError> {
        self.validate()?;
        if self.min_range >= raster_width {
            return Err(RasterError::MinRangeTooWide {
                min_range: self.min_range,
                width: raster_width,
            });
        }
        Ok((self.fov_resolution, raster_width - self.min_range))
    }
}

/// World pose of a sensor anchor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AnchorPose {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

impl AnchorPose {
    #[must_use]
    pub const fn new(x: f32, y: f32, angle: f32) -> Self {
        Self { x, y, angle }
    }
}

/// One captured egocentric observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    height: usize,
    width: usize,
    channels: usize,
    pixels: Vec<f32>,
    entity_ids: Option<Vec<u32>>,
}

impl Observation {
    /// Buffer dimensions as `(rows, cols, channels)`.
    #[must_use]
    pub const fn dims(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    /// Channel values of one observation cell.
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[f32]> {
        if row < self.height && col < self.width {
            let offset = (row * self.width + col) * self.channels;
            Some(&self.pixels[offset..offset + self.channels])
        } else {
            None
        }
    }

    /// Owning entity of one observation cell, when the source raster carried
    /// an entity-id plane.
    pub fn entity_at(&self, row: usize, col: usize) -> Option<u32> {
        let ids = self.entity_ids.as_ref()?;
        if row < self.height && col < self.width {
            Some(ids[row * self.width + col])
        } else {
            None
        }
    }

    /// Raw pixel buffer, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }
}

/// Stateless capture engine turning a scene raster into polar observations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolarView {
    spec: SensorSpec,
}

impl PolarView {
    #[must_use]
    pub const fn new(spec: SensorSpec) -> Self {
        Self { spec }
    }

    #[must_use]
    pub const fn spec(&self) -> &SensorSpec {
        &self.spec
    }

    /// Capture one observation around the anchor's current pose.
    pub fn capture(
        &self,
        raster: &SceneRaster,
        anchor: AnchorPose,
    ) -> Result<Observation, RasterError> {
        let spec = &self.spec;
        let (out_rows, out_cols) = spec.observation_dims(raster.width)?;

        let w = raster.width;
        let h = raster.height;

        // World pose of the sensor from the anchor pose plus the fixed
        // polar offset.
        let mount_angle = anchor.angle + spec.d_theta;
        let sensor_x = anchor.x + spec.d_r * mount_angle.cos();
        let sensor_y = anchor.y + spec.d_r * mount_angle.sin();
        let sensor_angle = anchor.angle + spec.d_orientation;

        // Polar unwarp: rows parameterize angle over a full turn, columns
        // parameterize radius up to fov_range. Samples falling outside the
        // raster saturate to the border instead of erroring.
        let mut source_index = vec![0usize; h * w];
        for row in 0..h {
            let angle = row as f32 * TAU / h as f32;
            let (sin, cos) = angle.sin_cos();
            for col in 0..w {
                let radius = col as f32 * spec.fov_range / w as f32;
                let sample_x = (sensor_x + radius * cos).round();
                let sample_y = (sensor_y + radius * sin).round();
                let sample_x = (sample_x as isize).clamp(0, w as isize - 1) as usize;
                let sample_y = (sample_y as isize).clamp(0, h as isize - 1) as usize;
                source_index[row * w + col] = raster.flat_index(sample_x, sample_y);
            }
        }

        // Roll the angular axis so the sensor heading lands on the image
        // center row.
        let angle_center = h as f32 * sensor_angle.rem_euclid(TAU) / TAU;
        let shift = (h as f32 / 2.0 - angle_center) as isize;

        // Angular crop window around the rolled center, radial crop from
        // min_range outward.
        let half_window = (h as f32 * spec.fov_angle / (2.0 * TAU)) as isize;
        let row_lo = h as isize / 2 - half_window;
        let row_hi = h as isize / 2 + half_window + 1;
        let cropped_rows = (row_hi - row_lo) as usize;

        let channels = raster.channels;
        let mut pixels = vec![0.0f32; out_rows * out_cols * channels];
        let mut entity_ids = raster
            .entity_ids
            .as_ref()
            .map(|_| vec![0u32; out_rows * out_cols]);

        for out_row in 0..out_rows {
            // Nearest-neighbor row resample from the cropped window.
            let cropped_row = out_row * cropped_rows / out_rows;
            let rolled_row = row_lo + cropped_row as isize;
            let polar_row = (rolled_row - shift).rem_euclid(h as isize) as usize;
            for out_col in 0..out_cols {
                let col = spec.min_range + out_col;
                let src = source_index[polar_row * w + col];
                let dst = (out_row * out_cols + out_col) * channels;
                pixels[dst..dst + channels]
                    .copy_from_slice(&raster.pixels[src * channels..src * channels + channels]);
                if let (Some(ids), Some(plane)) = (&mut entity_ids, &raster.entity_ids) {
                    ids[out_row * out_cols + out_col] = plane[src];
                }
            }
        }

        Ok(Observation {
            height: out_rows,
            width: out_cols,
            channels,
            pixels,
            entity_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_raster(width: usize, height: usize, value: f32) -> SceneRaster {
        SceneRaster::new(width, height, 1, vec![value; width * height]).expect("raster")
    }

    #[test]
    fn raster_validation_rejects_bad_buffers() {
        assert_eq!(
            SceneRaster::new(0, 4, 1, Vec::new()),
            Err(RasterError::EmptyRaster)
        );
        assert_eq!(
            SceneRaster::new(4, 4, 3, vec![0.0; 10]),
            Err(RasterError::BufferMismatch {
                expected: 48,
                actual: 10
            })
        );
        let raster = uniform_raster(4, 4, 0.0);
        assert_eq!(
            raster.with_entity_ids(vec![0; 3]),
            Err(RasterError::IdPlaneMismatch {
                expected: 16,
                actual: 3
            })
        );
    }

    #[test]
    fn observation_dims_are_independent_of_content() {
        let spec = SensorSpec {
            min_range: 4,
            ..SensorSpec::forward(20.0, TAU / 2.0, 24)
        };
        let view = PolarView::new(spec);
        let anchor = AnchorPose::new(16.0, 16.0, 0.7);

        let empty = view
            .capture(&uniform_raster(32, 32, 0.0), anchor)
            .expect("empty capture");
        let busy = {
            let mut raster = uniform_raster(32, 32, 0.0);
            for x in 0..32 {
                raster.pixel_mut(x, x)
                    .expect("pixel")[0] = 1.0;
            }
            view.capture(&raster, anchor).expect("busy capture")
        };

        assert_eq!(empty.dims(), (24, 28, 1));
        assert_eq!(empty.dims(), busy.dims());
    }

    #[test]
    fn heading_content_lands_on_the_center_row() {
        let mut raster = uniform_raster(32, 32, 0.0);
        // Bright pixel 4 units in front of a sensor at (16, 16) heading +x.
        raster.pixel_mut(20, 16).expect("pixel")[0] = 1.0;

        let spec = SensorSpec::forward(16.0, TAU / 2.0, 17);
        let view = PolarView::new(spec);
        let obs = view
            .capture(&raster, AnchorPose::new(16.0, 16.0, 0.0))
            .expect("capture");

        let (rows, cols, _) = obs.dims();
        let center = rows / 2;
        let center_hits: Vec<usize> = (0..cols)
            .filter(|&c| obs.pixel(center, c).expect("pixel")[0] > 0.5)
            .collect();
        assert!(
            !center_hits.is_empty(),
            "forward content should appear on the center row"
        );
    }

    #[test]
    fn out_of_raster_range_saturates_to_border() {
        let raster = uniform_raster(16, 16, 0.25);
        // fov_range far beyond the raster extent must clip, not error.
        let view = PolarView::new(SensorSpec::forward(10_000.0, TAU, 8));
        let obs = view
            .capture(&raster, AnchorPose::new(8.0, 8.0, 0.0))
            .expect("capture");
        assert_eq!(obs.dims(), (8, 16, 1));
        assert!(obs.pixels().iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn min_range_wider_than_raster_is_rejected() {
        let raster = uniform_raster(8, 8, 0.0);
        let spec = SensorSpec {
            min_range: 8,
            ..SensorSpec::forward(10.0, TAU, 4)
        };
        assert_eq!(
            PolarView::new(spec).capture(&raster, AnchorPose::default()),
            Err(RasterError::MinRangeTooWide {
                min_range: 8,
                width: 8
            })
        );
    }

    #[test]
    fn entity_id_plane_follows_the_same_transform() {
        let mut raster = uniform_raster(32, 32, 0.0);
        raster.pixel_mut(20, 16).expect("pixel")[0] = 1.0;
        let mut ids = vec![0u32; 32 * 32];
        ids[16 * 32 + 20] = 7;
        let raster = raster.with_entity_ids(ids).expect("ids");

        let view = PolarView::new(SensorSpec::forward(16.0, TAU / 2.0, 17));
        let obs = view
            .capture(&raster, AnchorPose::new(16.0, 16.0, 0.0))
            .expect("capture");

        let (rows, cols, _) = obs.dims();
        let mut matched = false;
        for row in 0..rows {
            for col in 0..cols {
                let bright = obs.pixel(row, col).expect("pixel")[0] > 0.5;
                let id = obs.entity_at(row, col).expect("id");
                if bright {
                    assert_eq!(id, 7, "bright cell must map to entity 7");
                    matched = true;
                } else {
                    assert_eq!(id, 0);
                }
            }
        }
        assert!(matched, "expected at least one bright cell");
    }

    #[test]
    fn invalid_sensor_configurations_are_rejected() {
        let raster = uniform_raster(8, 8, 0.0);
        for spec in [
            SensorSpec::forward(0.0, TAU, 4),
            SensorSpec::forward(10.0, 0.0, 4),
            SensorSpec::forward(10.0, TAU, 0),
        ] {
            assert!(PolarView::new(spec).capture(&raster, AnchorPose::default()).is_err());
        }
    }
}
