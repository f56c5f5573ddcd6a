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

use crate::linalg::Vector3;
use crate::time::Duration;
use serde_derive::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;

mod catalog;
mod elements;

pub use catalog::Catalog;
pub use elements::{KeplerianElements, EARTH_GM_KM3_S2};

/// Anything which can report a Cartesian position, in kilometers in a common inertial frame,
/// some elapsed time after the start of the scenario.
///
/// Implementations must be pure: the same elapsed time always yields the same result.
pub trait PositionProvider {
    fn position(&self, elapsed: Duration) -> Result<Vector3<f64>, PositionError>;
}

impl<P: PositionProvider + ?Sized> PositionProvider for &P {
    fn position(&self, elapsed: Duration) -> Result<Vector3<f64>, PositionError> {
        (**self).position(elapsed)
    }
}

#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PositionError {
    #[snafu(display("{object} has malformed orbital elements: {reason}"))]
    MalformedElements { object: String, reason: String },
    #[snafu(display("Kepler's equation did not converge for {object} after {iterations} iterations"))]
    KeplerNoConvergence { object: String, iterations: usize },
    #[snafu(display("position of {object} is not finite at {elapsed}"))]
    NonFinitePosition { object: String, elapsed: Duration },
}

/// Returns the position if all of its components are finite.
pub(crate) fn finite_or_err(
    position: Vector3<f64>,
    object: &str,
    elapsed: Duration,
) -> Result<Vector3<f64>, PositionError> {
    ensure!(
        position.iter().all(|c| c.is_finite()),
        NonFinitePositionSnafu {
            object: object.to_string(),
            elapsed
        }
    );
    Ok(position)
}

/// How a tracked object moves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObjectMotion {
    /// Two-body propagation of classical orbital elements.
    Keplerian(KeplerianElements),
    /// Linear motion from a precomputed position (km) and velocity (km/s) sample.
    StateVector {
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    },
}

/// A cataloged object (satellite, rocket body, debris) screened against the vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: String,
    pub motion: ObjectMotion,
}

impl TrackedObject {
    pub fn keplerian<S: Into<String>>(id: S, elements: KeplerianElements) -> Self {
        Self {
            id: id.into(),
            motion: ObjectMotion::Keplerian(elements),
        }
    }

    /// An object which moves linearly from `position` with the provided `velocity`.
    pub fn from_state<S: Into<String>>(
        id: S,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            motion: ObjectMotion::StateVector { position, velocity },
        }
    }

    /// An object which stays put for the whole scenario.
    pub fn stationary<S: Into<String>>(id: S, position: Vector3<f64>) -> Self {
        Self::from_state(id, position, Vector3::zeros())
    }
}

impl PositionProvider for TrackedObject {
    fn position(&self, elapsed: Duration) -> Result<Vector3<f64>, PositionError> {
        let position = match &self.motion {
            ObjectMotion::Keplerian(elements) => elements.position_at(&self.id, elapsed)?,
            ObjectMotion::StateVector { position, velocity } => {
                position + velocity * elapsed.to_seconds()
            }
        };
        finite_or_err(position, &self.id, elapsed)
    }
}

impl fmt::Display for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.motion {
            ObjectMotion::Keplerian(elements) => write!(f, "{} ({elements})", self.id),
            ObjectMotion::StateVector { position, velocity } => write!(
                f,
                "{} (r = [{:.3}, {:.3}, {:.3}] km, v = [{:.3}, {:.3}, {:.3}] km/s)",
                self.id, position.x, position.y, position.z, velocity.x, velocity.y, velocity.z
            ),
        }
    }
}
