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

use super::{duration_from_str, duration_to_str, ConfigError, ConfigRepr, InvalidConfigSnafu};
use crate::time::{Duration, Unit};
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use typed_builder::TypedBuilder;

/// Resolution of the grid used to discretize simulation states for the tabular estimator.
///
/// Each resolution applies to the normalized state feature of the same name, cf.
/// [crate::rl::SimulationState].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateGrid {
    /// Resolution on the elapsed fraction of the episode horizon
    pub elapsed: f64,
    /// Resolution on the cumulative offset rates, in km/s
    pub offset: f64,
    /// Resolution on the normalized closest approach
    pub proximity: f64,
}

impl Default for StateGrid {
    fn default() -> Self {
        Self {
            elapsed: 0.01,
            offset: 0.01,
            proximity: 0.05,
        }
    }
}

/// Selects the value estimator used by a training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EstimatorConfig {
    /// Sparse Q-table over a discretized state grid, capped at `max_entries` states.
    Tabular { grid: StateGrid, max_entries: usize },
    /// Neural Q-estimator trained from a replay memory against a periodically synced target network.
    Approximator {
        hidden_layers: Vec<usize>,
        replay_capacity: usize,
        batch_size: usize,
        target_sync_interval: usize,
    },
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self::Tabular {
            grid: StateGrid::default(),
            max_entries: 100_000,
        }
    }
}

impl EstimatorConfig {
    /// Default approximator: two hidden layers of 64 neurons and a 15k transition replay memory.
    pub fn approximator() -> Self {
        Self::Approximator {
            hidden_layers: vec![64, 64],
            replay_capacity: 15_000,
            batch_size: 64,
            target_sync_interval: 10,
        }
    }
}

fn default_actions() -> Vec<(f64, f64)> {
    vec![
        (0.0, 0.0),
        (-0.01, 0.0),
        (0.0, -0.01),
        (0.01, 0.0),
        (0.0, 0.01),
    ]
}

/// Frozen configuration of a training run.
///
/// Actions are pairs of per second offset rates, added to the x and y axes of the vehicle
/// trajectory respectively (the trajectory is shifted by `offset * t`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(doc)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training episodes
    #[builder(default = 100)]
    pub episodes: usize,
    /// Maximum number of steps of each episode
    #[builder(default = 100)]
    pub max_steps: usize,
    /// Time between two probes of the trajectory
    #[builder(default = Unit::Second * 1.0)]
    #[serde(
        serialize_with = "duration_to_str",
        deserialize_with = "duration_from_str"
    )]
    pub step: Duration,
    /// Distance under which the vehicle and a tracked object are in conflict, in km
    #[builder(default = 1.0)]
    pub collision_threshold_km: f64,
    /// Learning rate: the Q-learning alpha, or the optimizer step of the neural estimator
    #[builder(default = 0.1)]
    pub learning_rate: f64,
    /// Discount factor gamma
    #[builder(default = 0.9)]
    pub discount: f64,
    #[builder(default = 1.0)]
    pub exploration_start: f64,
    /// Multiplicative decay of epsilon applied after each episode
    #[builder(default = 0.995)]
    pub exploration_decay: f64,
    #[builder(default = 0.1)]
    pub exploration_floor: f64,
    /// Offset rate pairs (x, y) in km/s
    #[builder(default = default_actions())]
    pub actions: Vec<(f64, f64)>,
    /// Magnitude of the (negative) reward on collision
    #[builder(default = 100.0)]
    pub collision_penalty: f64,
    /// Half width of the uniform jitter added to the collision reward
    #[builder(default = 0.0)]
    pub collision_jitter: f64,
    /// Reward of a step without collision
    #[builder(default = 10.0)]
    pub safe_reward: f64,
    /// Half width of the uniform jitter added to the safe reward
    #[builder(default = 0.0)]
    pub safe_jitter: f64,
    /// Closest approach distances are clamped to this value when building the state, in km
    #[builder(default = 100.0)]
    pub distance_cap_km: f64,
    /// Seed of the random number generator used for exploration, jitter and replay sampling
    #[builder(default)]
    pub seed: u64,
    /// Cooperative budget: training halts at the first episode boundary after this many steps
    #[builder(default, setter(strip_option))]
    pub max_total_steps: Option<usize>,
    #[builder(default)]
    pub show_progress: bool,
    #[builder(default)]
    pub estimator: EstimatorConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigRepr for TrainingConfig {}

impl TrainingConfig {
    /// Total duration of an episode which runs all of its steps
    pub fn horizon(&self) -> Duration {
        self.step * (self.max_steps as f64)
    }

    /// Checks every bound of this configuration. An invalid configuration is fatal and must be
    /// reported before any episode runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.episodes > 0,
            InvalidConfigSnafu {
                msg: "episode count must be positive"
            }
        );
        ensure!(
            self.max_steps > 0,
            InvalidConfigSnafu {
                msg: "max steps per episode must be positive"
            }
        );
        ensure!(
            self.step > Duration::ZERO,
            InvalidConfigSnafu {
                msg: format!("step must be positive, got {}", self.step)
            }
        );
        ensure!(
            self.collision_threshold_km.is_finite() && self.collision_threshold_km > 0.0,
            InvalidConfigSnafu {
                msg: format!(
                    "collision threshold must be positive, got {} km",
                    self.collision_threshold_km
                )
            }
        );
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate <= 1.0,
            InvalidConfigSnafu {
                msg: format!("learning rate {} outside of (0, 1]", self.learning_rate)
            }
        );
        ensure!(
            self.discount > 0.0 && self.discount <= 1.0,
            InvalidConfigSnafu {
                msg: format!("discount {} outside of (0, 1]", self.discount)
            }
        );
        ensure!(
            (0.0..=1.0).contains(&self.exploration_start),
            InvalidConfigSnafu {
                msg: format!(
                    "exploration start {} outside of [0, 1]",
                    self.exploration_start
                )
            }
        );
        ensure!(
            self.exploration_decay > 0.0 && self.exploration_decay <= 1.0,
            InvalidConfigSnafu {
                msg: format!(
                    "exploration decay {} outside of (0, 1]",
                    self.exploration_decay
                )
            }
        );
        ensure!(
            (0.0..=self.exploration_start).contains(&self.exploration_floor),
            InvalidConfigSnafu {
                msg: format!(
                    "exploration floor {} outside of [0, {}]",
                    self.exploration_floor, self.exploration_start
                )
            }
        );
        ensure!(
            !self.actions.is_empty(),
            InvalidConfigSnafu {
                msg: "action set is empty"
            }
        );
        ensure!(
            self.actions
                .iter()
                .all(|(dx, dy)| dx.is_finite() && dy.is_finite()),
            InvalidConfigSnafu {
                msg: "action set contains non finite offsets"
            }
        );
        ensure!(
            self.collision_penalty.is_finite() && self.collision_penalty > 0.0,
            InvalidConfigSnafu {
                msg: format!(
                    "collision penalty must be positive, got {}",
                    self.collision_penalty
                )
            }
        );
        ensure!(
            (0.0..self.collision_penalty).contains(&self.collision_jitter),
            InvalidConfigSnafu {
                msg: format!(
                    "collision jitter {} must be in [0, {})",
                    self.collision_jitter, self.collision_penalty
                )
            }
        );
        ensure!(
            (self.collision_penalty + self.collision_jitter).is_finite()
                && (2.0 * self.collision_jitter).is_finite(),
            InvalidConfigSnafu {
                msg: format!(
                    "collision penalty {} with jitter {} overflows",
                    self.collision_penalty, self.collision_jitter
                )
            }
        );
        ensure!(
            self.safe_reward.is_finite() && self.safe_jitter.is_finite() && self.safe_jitter >= 0.0,
            InvalidConfigSnafu {
                msg: format!(
                    "safe reward {} with jitter {} is invalid",
                    self.safe_reward, self.safe_jitter
                )
            }
        );
        ensure!(
            (self.safe_reward.abs() + self.safe_jitter).is_finite()
                && (2.0 * self.safe_jitter).is_finite(),
            InvalidConfigSnafu {
                msg: format!(
                    "safe reward {} with jitter {} overflows",
                    self.safe_reward, self.safe_jitter
                )
            }
        );
        ensure!(
            self.distance_cap_km.is_finite() && self.distance_cap_km > 0.0,
            InvalidConfigSnafu {
                msg: format!(
                    "distance cap must be positive, got {} km",
                    self.distance_cap_km
                )
            }
        );

        match &self.estimator {
            EstimatorConfig::Tabular { grid, max_entries } => {
                ensure!(
                    [grid.elapsed, grid.offset, grid.proximity]
                        .iter()
                        .all(|r| r.is_finite() && *r > 0.0),
                    InvalidConfigSnafu {
                        msg: format!("state grid resolutions must be positive: {grid:?}")
                    }
                );
                ensure!(
                    *max_entries > 0,
                    InvalidConfigSnafu {
                        msg: "Q-table capacity must be positive"
                    }
                );
            }
            EstimatorConfig::Approximator {
                hidden_layers,
                replay_capacity,
                batch_size,
                target_sync_interval,
            } => {
                ensure!(
                    hidden_layers.iter().all(|n| *n > 0),
                    InvalidConfigSnafu {
                        msg: "hidden layers must have at least one neuron"
                    }
                );
                ensure!(
                    *batch_size > 0 && batch_size <= replay_capacity,
                    InvalidConfigSnafu {
                        msg: format!(
                            "batch size {batch_size} must be in [1, {replay_capacity}]"
                        )
                    }
                );
                ensure!(
                    *target_sync_interval > 0,
                    InvalidConfigSnafu {
                        msg: "target sync interval must be positive"
                    }
                );
            }
        }

        Ok(())
    }
}
