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

use rand::Rng;
use rand_pcg::Pcg64Mcg;

/// Epsilon-greedy exploration policy.
///
/// With probability epsilon a uniformly random action is picked, otherwise the action with the
/// highest estimated value, ties resolving to the lowest action index. Epsilon decays
/// multiplicatively after each episode and never drops below its floor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EpsilonGreedy {
    epsilon: f64,
    decay: f64,
    floor: f64,
}

impl EpsilonGreedy {
    pub fn new(start: f64, decay: f64, floor: f64) -> Self {
        Self {
            epsilon: start.max(floor),
            decay,
            floor,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Index of the best value, NaN values never win and ties go to the lowest index.
    pub fn greedy(values: &[f64]) -> usize {
        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (index, value) in values.iter().enumerate() {
            let value = if value.is_nan() {
                f64::NEG_INFINITY
            } else {
                *value
            };
            if value > best_value {
                best = index;
                best_value = value;
            }
        }
        best
    }

    /// Selects an action given the estimated value of each action.
    pub fn select(&self, values: &[f64], rng: &mut Pcg64Mcg) -> usize {
        // The exploration draw is consumed even when epsilon is zero.
        let explore = rng.gen::<f64>() < self.epsilon;
        if explore && !values.is_empty() {
            rng.gen_range(0..values.len())
        } else {
            Self::greedy(values)
        }
    }

    /// Applies the end of episode decay and returns the new epsilon.
    pub fn decay(&mut self) -> f64 {
        self.epsilon = (self.epsilon * self.decay).max(self.floor);
        self.epsilon
    }
}
