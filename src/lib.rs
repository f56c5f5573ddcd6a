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

/*! # debris-avoid

Screens a planned launch trajectory against a catalog of tracked orbital objects and, when the
trajectory passes too close to any of them, learns a bounded correction to that trajectory through
a reinforcement learning loop (tabular Q-learning or a neural Q-estimator with experience replay).

The engine is synchronous and single threaded: the value estimator is the one piece of mutable
state shared across episodes, and it is handed to the training loop by exclusive reference.
*/

/// Tracked objects, their motion models, and the position provider contract.
pub mod cosmic;

/// Mission design: the vehicle trajectory, its adjustment, and collision detection.
pub mod md;

/// Reinforcement learning: states, actions, exploration, value estimators, replay and training.
pub mod rl;

/// Configuration files and catalog loading.
pub mod io;

mod errors;
/// Functions which may fail will return an error, a training run only aborts on an [AvoidanceError].
pub use self::errors::AvoidanceError;

#[macro_use]
extern crate log;
extern crate hifitime;
extern crate nalgebra as na;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
}

/// Re-export the most useful items
pub mod prelude {
    pub use crate::cosmic::{
        Catalog, KeplerianElements, ObjectMotion, PositionError, PositionProvider, TrackedObject,
    };
    pub use crate::io::{ConfigError, ConfigRepr, EstimatorConfig, TrainingConfig};
    pub use crate::md::{
        AdjustedTrajectory, CollisionDetector, CollisionEvent, FnTrajectory, Probe,
        TrajectoryAdjuster, TrajectoryExpression,
    };
    pub use crate::rl::{
        Action, ActionSpace, AnyEstimator, ClassificationMetrics, EpisodeReport, EpsilonGreedy,
        EvaluationMetrics, NeuralEstimator, NeuralSettings, ReplayMemory, SimulationState,
        TabularEstimator, TrainingLoop, TrainingResult, Transition, ValueEstimator,
    };
    pub use crate::time::{Duration, TimeUnits, Unit};
    pub use crate::AvoidanceError;
    pub use rand_pcg::Pcg64Mcg;
}
