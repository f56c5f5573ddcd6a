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

use super::{KeplerNoConvergenceSnafu, MalformedElementsSnafu, PositionError};
use crate::linalg::Vector3;
use crate::time::Duration;
use nalgebra::Rotation3;
use serde_derive::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;

/// Gravitational parameter of the Earth, in km^3/s^2
pub const EARTH_GM_KM3_S2: f64 = 398_600.441_8;

const KEPLER_MAX_ITER: usize = 50;
const KEPLER_TOL: f64 = 1e-12;

/// Classical orbital elements as published in a two-line element set.
///
/// Angles are in degrees and the mean motion is in revolutions per day, exactly as they appear in
/// the second line of a TLE. Propagation is pure two-body motion, which is sufficient for
/// screening a short launch window but is not SGP4.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeplerianElements {
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
    pub mean_motion_rev_day: f64,
}

impl KeplerianElements {
    /// Mean motion in radians per second
    pub fn mean_motion_rad_s(&self) -> f64 {
        self.mean_motion_rev_day * TAU / 86_400.0
    }

    /// Semi major axis in km, derived from the mean motion
    pub fn sma_km(&self) -> f64 {
        (EARTH_GM_KM3_S2 / self.mean_motion_rad_s().powi(2)).cbrt()
    }

    /// Checks that these elements describe a closed orbit.
    pub fn validate(&self, object: &str) -> Result<(), PositionError> {
        let all = [
            self.inclination_deg,
            self.raan_deg,
            self.eccentricity,
            self.arg_perigee_deg,
            self.mean_anomaly_deg,
            self.mean_motion_rev_day,
        ];
        let reason = if all.iter().any(|v| !v.is_finite()) {
            Some("non finite element".to_string())
        } else if !(0.0..1.0).contains(&self.eccentricity) {
            Some(format!("eccentricity {} outside of [0, 1)", self.eccentricity))
        } else if self.mean_motion_rev_day <= 0.0 {
            Some(format!(
                "mean motion {} rev/day is not positive",
                self.mean_motion_rev_day
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => MalformedElementsSnafu {
                object: object.to_string(),
                reason,
            }
            .fail(),
            None => Ok(()),
        }
    }

    /// Solves Kepler's equation M = E - e sin E for the eccentric anomaly with Newton-Raphson.
    pub fn eccentric_anomaly(
        &self,
        object: &str,
        mean_anomaly_rad: f64,
    ) -> Result<f64, PositionError> {
        let ecc = self.eccentricity;
        let ma = mean_anomaly_rad.rem_euclid(TAU);
        let mut ea = if ecc > 0.8 { std::f64::consts::PI } else { ma };
        for _ in 0..KEPLER_MAX_ITER {
            let delta = (ea - ecc * ea.sin() - ma) / (1.0 - ecc * ea.cos());
            ea -= delta;
            if delta.abs() < KEPLER_TOL {
                return Ok(ea);
            }
        }
        KeplerNoConvergenceSnafu {
            object: object.to_string(),
            iterations: KEPLER_MAX_ITER,
        }
        .fail()
    }

    /// Inertial position in km `elapsed` after the element epoch.
    pub fn position_at(&self, object: &str, elapsed: Duration) -> Result<Vector3<f64>, PositionError> {
        self.validate(object)?;

        let ecc = self.eccentricity;
        let sma = self.sma_km();
        let ma = self.mean_anomaly_deg.to_radians() + self.mean_motion_rad_s() * elapsed.to_seconds();
        let ea = self.eccentric_anomaly(object, ma)?;

        // Position in the perifocal frame
        let r_pqw = Vector3::new(
            sma * (ea.cos() - ecc),
            sma * (1.0 - ecc.powi(2)).sqrt() * ea.sin(),
            0.0,
        );

        // 3-1-3 rotation from perifocal to inertial
        let dcm = Rotation3::from_axis_angle(&Vector3::z_axis(), self.raan_deg.to_radians())
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.inclination_deg.to_radians())
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.arg_perigee_deg.to_radians());

        Ok(dcm * r_pqw)
    }
}

impl fmt::Display for KeplerianElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "i = {:.4} deg  raan = {:.4} deg  e = {:.7}  aop = {:.4} deg  ma = {:.4} deg  n = {:.8} rev/day",
            self.inclination_deg,
            self.raan_deg,
            self.eccentricity,
            self.arg_perigee_deg,
            self.mean_anomaly_deg,
            self.mean_motion_rev_day
        )
    }
}
