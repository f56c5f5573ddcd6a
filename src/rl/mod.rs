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

use crate::linalg::Vector4;
use crate::md::TrajectoryAdjuster;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

mod estimator;
mod metrics;
mod policy;
mod replay;
mod training;

pub use estimator::{
    AnyEstimator, EstimatorError, NetworkWeights, NeuralEstimator, NeuralSettings,
    TabularEstimator, TabularSnapshot, ValueEstimator,
};
pub use metrics::{ClassificationMetrics, EvaluationMetrics};
pub use policy::EpsilonGreedy;
pub use replay::ReplayMemory;
pub use training::{EpisodeReport, TrainingLoop, TrainingResult};

/// Number of features of a [SimulationState]
pub const STATE_SIZE: usize = 4;

/// Decision relevant summary of a simulation step.
///
/// The features are, in order:
/// 1. the elapsed fraction of the episode horizon;
/// 2. the cumulative x offset rate, in km/s;
/// 3. the cumulative y offset rate, in km/s;
/// 4. the closest approach observed at this step, divided by the distance cap (and clamped to 1,
///    which is also the value used when no object position was available).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState(pub Vector4<f64>);

impl SimulationState {
    pub fn new(
        elapsed_fraction: f64,
        offsets: &TrajectoryAdjuster,
        closest_km: Option<f64>,
        distance_cap_km: f64,
    ) -> Self {
        let proximity = match closest_km {
            Some(distance) => (distance / distance_cap_km).clamp(0.0, 1.0),
            None => 1.0,
        };
        Self(Vector4::new(
            elapsed_fraction,
            offsets.x_rate,
            offsets.y_rate,
            proximity,
        ))
    }

    pub fn features(&self) -> &Vector4<f64> {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|f| f.is_finite())
    }
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[t = {:.3}, dx = {:.4}, dy = {:.4}, prox = {:.3}]",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// A trajectory perturbation: per second offset rates added to the x and y axes.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub index: usize,
    pub x_rate: f64,
    pub y_rate: f64,
}

impl Action {
    pub fn new(index: usize, x_rate: f64, y_rate: f64) -> Self {
        Self {
            index,
            x_rate,
            y_rate,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.x_rate == 0.0 && self.y_rate == 0.0
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} (dx = {}, dy = {})", self.index, self.x_rate, self.y_rate)
    }
}

/// The finite set of actions available to the policy, fixed for the lifetime of a training run.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionSpace {
    actions: Vec<Action>,
}

impl ActionSpace {
    /// Builds the action space from (x, y) offset rate pairs. Action indexes follow the input order.
    pub fn new(offsets: &[(f64, f64)]) -> Self {
        Self {
            actions: offsets
                .iter()
                .enumerate()
                .map(|(index, (x_rate, y_rate))| Action::new(index, *x_rate, *y_rate))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }
}

/// The unit of experience.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: SimulationState,
    pub action: usize,
    pub reward: f64,
    pub next_state: SimulationState,
    /// Set when the episode ended on this transition (collision or last step)
    pub done: bool,
}
