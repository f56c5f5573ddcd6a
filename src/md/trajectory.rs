/*
    debris-avoid, conjunction screening and learned avoidance for launch trajectories
    Copyright (C) 2023 The debris-avoid developers

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::cosmic::{finite_or_err, PositionError, PositionProvider};
use crate::linalg::Vector3;
use crate::rl::Action;
use crate::time::Duration;
use approx::abs_diff_eq;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

const VEHICLE: &str = "vehicle";

/// Straight line ascent of the vehicle from its launch position.
///
/// The position at elapsed time `t` (seconds) is
/// ```text
/// x(t) = x0 + v t cos(θ) cos(φ)
/// y(t) = y0 + v t cos(θ) sin(φ)
/// z(t) = z0 + v t sin(θ)
/// ```
/// where θ is the elevation (launch angle) and φ the azimuth (inclination angle).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryExpression {
    /// Launch position in km
    pub origin: Vector3<f64>,
    /// Speed in km/s
    pub speed_km_s: f64,
    /// Elevation in radians
    pub elevation_rad: f64,
    /// Azimuth in radians
    pub azimuth_rad: f64,
}

impl TrajectoryExpression {
    pub fn new(origin: Vector3<f64>, speed_km_s: f64, elevation_rad: f64, azimuth_rad: f64) -> Self {
        Self {
            origin,
            speed_km_s,
            elevation_rad,
            azimuth_rad,
        }
    }

    /// Initializes a new trajectory from angles in degrees.
    pub fn from_degrees(
        origin: Vector3<f64>,
        speed_km_s: f64,
        elevation_deg: f64,
        azimuth_deg: f64,
    ) -> Self {
        Self::new(
            origin,
            speed_km_s,
            elevation_deg.to_radians(),
            azimuth_deg.to_radians(),
        )
    }

    /// Unit vector of the direction of motion
    pub fn direction(&self) -> Vector3<f64> {
        let (sin_el, cos_el) = self.elevation_rad.sin_cos();
        let (sin_az, cos_az) = self.azimuth_rad.sin_cos();
        Vector3::new(cos_el * cos_az, cos_el * sin_az, sin_el)
    }
}

impl PositionProvider for TrajectoryExpression {
    fn position(&self, elapsed: Duration) -> Result<Vector3<f64>, PositionError> {
        let t = elapsed.to_seconds();
        finite_or_err(
            self.origin + self.direction() * (self.speed_km_s * t),
            VEHICLE,
            elapsed,
        )
    }
}

impl fmt::Display for TrajectoryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x0, y0, z0) = (self.origin.x, self.origin.y, self.origin.z);
        let (v, el, az) = (self.speed_km_s, self.elevation_rad, self.azimuth_rad);
        writeln!(f, "x(t) = {x0} + {v} * t * cos({el}) * cos({az})")?;
        writeln!(f, "y(t) = {y0} + {v} * t * cos({el}) * sin({az})")?;
        write!(f, "z(t) = {z0} + {v} * t * sin({el})")
    }
}

/// A vehicle trajectory given by an arbitrary function of the elapsed seconds.
#[derive(Copy, Clone)]
pub struct FnTrajectory<F: Fn(f64) -> Vector3<f64>> {
    func: F,
}

impl<F: Fn(f64) -> Vector3<f64>> FnTrajectory<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F: Fn(f64) -> Vector3<f64>> PositionProvider for FnTrajectory<F> {
    fn position(&self, elapsed: Duration) -> Result<Vector3<f64>, PositionError> {
        finite_or_err((self.func)(elapsed.to_seconds()), VEHICLE, elapsed)
    }
}

impl<F: Fn(f64) -> Vector3<f64>> fmt::Debug for FnTrajectory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnTrajectory")
    }
}

/// Accumulates the per axis offset rates chosen during an episode.
///
/// The accumulated rates are the exact in-order sum of every action applied since the last
/// reset, and are added to the original trajectory as `rate * t` terms.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryAdjuster {
    /// Cumulative x offset rate in km/s
    pub x_rate: f64,
    /// Cumulative y offset rate in km/s
    pub y_rate: f64,
}

impl TrajectoryAdjuster {
    pub fn new(x_rate: f64, y_rate: f64) -> Self {
        Self { x_rate, y_rate }
    }

    pub fn accumulate(&mut self, action: &Action) {
        self.x_rate += action.x_rate;
        self.y_rate += action.y_rate;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns whether these offsets leave the trajectory untouched
    pub fn is_identity(&self) -> bool {
        abs_diff_eq!(self.x_rate, 0.0) && abs_diff_eq!(self.y_rate, 0.0)
    }

    /// Offset in km added to the original trajectory at the provided elapsed time
    pub fn offset_at(&self, elapsed: Duration) -> Vector3<f64> {
        let t = elapsed.to_seconds();
        Vector3::new(self.x_rate * t, self.y_rate * t, 0.0)
    }

    /// Builds the adjusted trajectory of the provided base trajectory.
    pub fn apply<P: PositionProvider>(&self, base: P) -> AdjustedTrajectory<P> {
        AdjustedTrajectory {
            base,
            offsets: *self,
        }
    }
}

/// The original vehicle trajectory plus accumulated offset terms.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AdjustedTrajectory<P: PositionProvider> {
    pub base: P,
    pub offsets: TrajectoryAdjuster,
}

impl<P: PositionProvider> PositionProvider for AdjustedTrajectory<P> {
    fn position(&self, elapsed: Duration) -> Result<Vector3<f64>, PositionError> {
        let position = self.base.position(elapsed)? + self.offsets.offset_at(elapsed);
        finite_or_err(position, VEHICLE, elapsed)
    }
}

impl<P: PositionProvider + fmt::Display> fmt::Display for AdjustedTrajectory<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offsets.is_identity() {
            return write!(f, "{}", self.base);
        }
        let base = format!("{}", self.base);
        for line in base.lines() {
            if line.starts_with("x(t)") {
                writeln!(f, "{line} + {} * t", self.offsets.x_rate)?;
            } else if line.starts_with("y(t)") {
                writeln!(f, "{line} + {} * t", self.offsets.y_rate)?;
            } else {
                write!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod ut_trajectory {
    use super::*;
    use crate::time::TimeUnits;
    use approx::assert_abs_diff_eq;

    fn ascent() -> TrajectoryExpression {
        TrajectoryExpression::new(Vector3::new(30.0, 50.0, 0.0), 40.0, 1.047, 0.523)
    }

    #[test]
    fn straight_line_ascent() {
        let traj = ascent();
        let pos = traj.position(2.seconds()).unwrap();
        assert_abs_diff_eq!(pos.x, 30.0 + 80.0 * 1.047_f64.cos() * 0.523_f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(pos.y, 50.0 + 80.0 * 1.047_f64.cos() * 0.523_f64.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(pos.z, 80.0 * 1.047_f64.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(traj.direction().norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn identity_adjustment() {
        let traj = ascent();
        let adjusted = TrajectoryAdjuster::default().apply(traj);
        for seconds in 0..100_i64 {
            let t = seconds.seconds();
            let delta = adjusted.position(t).unwrap() - traj.position(t).unwrap();
            assert_abs_diff_eq!(delta.norm(), 0.0, epsilon = 1e-12);
        }
        assert_eq!(format!("{adjusted}"), format!("{traj}"));
    }

    #[test]
    fn offsets_accumulate_in_order() {
        let mut adjuster = TrajectoryAdjuster::default();
        for action in [
            Action::new(0, 0.01, 0.0),
            Action::new(1, 0.0, -0.01),
            Action::new(2, 0.01, 0.0),
        ] {
            adjuster.accumulate(&action);
        }
        assert_abs_diff_eq!(adjuster.x_rate, 0.02, epsilon = 1e-15);
        assert_abs_diff_eq!(adjuster.y_rate, -0.01, epsilon = 1e-15);

        let base = FnTrajectory::new(|t| Vector3::new(10.0 * t, 0.0, 0.0));
        let adjusted = adjuster.apply(&base);
        let pos = adjusted.position(10.seconds()).unwrap();
        assert_abs_diff_eq!(pos.x, 100.2, epsilon = 1e-9);
        assert_abs_diff_eq!(pos.y, -0.1, epsilon = 1e-9);

        let shown = format!("{}", adjuster.apply(ascent()));
        assert!(shown.contains("+ 0.02 * t"), "{shown}");
        assert!(shown.lines().nth(2).unwrap().starts_with("z(t)"));

        adjuster.reset();
        assert!(adjuster.is_identity());
    }

    #[test]
    fn nan_trajectory_is_unavailable() {
        let broken = FnTrajectory::new(|t| Vector3::new(t.ln() * f64::NAN, 0.0, 0.0));
        assert!(broken.position(1.seconds()).is_err());
    }
}
