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

use super::{SimulationState, Transition};
use crate::io::{EstimatorConfig, TrainingConfig};
use rand_pcg::Pcg64Mcg;
use snafu::prelude::*;

mod neural;
mod tabular;

pub use neural::{NetworkWeights, NeuralEstimator, NeuralSettings};
pub use tabular::{TabularEstimator, TabularSnapshot};

#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EstimatorError {
    #[snafu(display("expected {expected} values but got {got} ({context})"))]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: &'static str,
    },
    #[snafu(display("action #{action} out of range, estimator has {num_actions} actions"))]
    ActionOutOfRange { action: usize, num_actions: usize },
    #[snafu(display("estimator diverged: loss is {loss}"))]
    Diverged { loss: f64 },
    #[snafu(display("cannot initialize estimator: {msg}"))]
    InvalidInitialization { msg: String },
    #[snafu(display("tensor data error: {msg}"))]
    TensorData { msg: String },
    #[snafu(display("invalid network weights: {msg}"))]
    InvalidWeights { msg: String },
}

/// Estimates the expected cumulative future reward of each action in a given state.
///
/// The training loop is written against this trait only, so both the tabular and the neural
/// estimators go through the exact same episodes. The estimator is the only mutable state shared
/// across episodes and is always accessed by a single writer.
pub trait ValueEstimator {
    /// Number of actions this estimator values
    fn num_actions(&self) -> usize;

    /// Returns the estimated value of every action in this state, indexed by action.
    fn estimate(&self, state: &SimulationState) -> Result<Vec<f64>, EstimatorError>;

    /// Fits the estimator toward the Bellman targets of the provided transitions.
    fn update_batch(&mut self, batch: &[Transition]) -> Result<(), EstimatorError>;

    /// Records one transition of experience and performs the learning update it triggers.
    ///
    /// The random generator is only used by estimators which sample their experience.
    fn learn(&mut self, transition: Transition, rng: &mut Pcg64Mcg) -> Result<(), EstimatorError>;

    /// Called once at the end of each episode, with the index of that episode.
    fn end_episode(&mut self, _episode: usize) {}

    /// Number of updates this estimator could not store
    fn dropped_updates(&self) -> usize {
        0
    }

    /// Short name used in logs and reports
    fn name(&self) -> &'static str;
}

pub(crate) fn check_action(action: usize, num_actions: usize) -> Result<(), EstimatorError> {
    ensure!(
        action < num_actions,
        ActionOutOfRangeSnafu {
            action,
            num_actions
        }
    );
    Ok(())
}

/// Either estimator, as selected by [EstimatorConfig].
#[derive(Debug)]
pub enum AnyEstimator {
    Tabular(TabularEstimator),
    Neural(NeuralEstimator),
}

impl AnyEstimator {
    /// Builds the estimator the configuration selects. The generator is only used to initialize
    /// the weights of the neural estimator.
    pub fn from_config(cfg: &TrainingConfig, rng: &mut Pcg64Mcg) -> Result<Self, EstimatorError> {
        let num_actions = cfg.actions.len();
        match &cfg.estimator {
            EstimatorConfig::Tabular { grid, max_entries } => Ok(Self::Tabular(
                TabularEstimator::new(
                    num_actions,
                    *grid,
                    *max_entries,
                    cfg.learning_rate,
                    cfg.discount,
                ),
            )),
            EstimatorConfig::Approximator {
                hidden_layers,
                replay_capacity,
                batch_size,
                target_sync_interval,
            } => Ok(Self::Neural(
                NeuralSettings::builder()
                    .hidden_layers(hidden_layers.clone())
                    .num_actions(num_actions)
                    .learning_rate(cfg.learning_rate)
                    .discount(cfg.discount)
                    .replay_capacity(*replay_capacity)
                    .batch_size(*batch_size)
                    .target_sync_interval(*target_sync_interval)
                    .build()
                    .init(rng)?,
            )),
        }
    }
}

impl ValueEstimator for AnyEstimator {
    fn num_actions(&self) -> usize {
        match self {
            Self::Tabular(e) => e.num_actions(),
            Self::Neural(e) => e.num_actions(),
        }
    }

    fn estimate(&self, state: &SimulationState) -> Result<Vec<f64>, EstimatorError> {
        match self {
            Self::Tabular(e) => e.estimate(state),
            Self::Neural(e) => e.estimate(state),
        }
    }

    fn update_batch(&mut self, batch: &[Transition]) -> Result<(), EstimatorError> {
        match self {
            Self::Tabular(e) => e.update_batch(batch),
            Self::Neural(e) => e.update_batch(batch),
        }
    }

    fn learn(&mut self, transition: Transition, rng: &mut Pcg64Mcg) -> Result<(), EstimatorError> {
        match self {
            Self::Tabular(e) => e.learn(transition, rng),
            Self::Neural(e) => e.learn(transition, rng),
        }
    }

    fn end_episode(&mut self, episode: usize) {
        match self {
            Self::Tabular(e) => e.end_episode(episode),
            Self::Neural(e) => e.end_episode(episode),
        }
    }

    fn dropped_updates(&self) -> usize {
        match self {
            Self::Tabular(e) => ValueEstimator::dropped_updates(e),
            Self::Neural(e) => e.dropped_updates(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Tabular(e) => e.name(),
            Self::Neural(e) => e.name(),
        }
    }
}
