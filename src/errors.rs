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

use crate::io::ConfigError;
use crate::rl::EstimatorError;
use snafu::prelude::*;

/// Errors which abort a training run.
///
/// Recoverable problems (an object whose position is unavailable, a non-finite sample) never
/// surface here: they are logged, counted in the evaluation metrics, and the run continues.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AvoidanceError {
    #[snafu(display("invalid training configuration: {source}"))]
    Configuration { source: ConfigError },
    #[snafu(display("cannot build the value estimator: {source}"))]
    EstimatorInit { source: EstimatorError },
    #[snafu(display("estimator update failed at episode #{episode} step #{step}: {source}"))]
    EstimatorUpdate {
        episode: usize,
        step: usize,
        source: EstimatorError,
    },
}

impl From<ConfigError> for AvoidanceError {
    fn from(source: ConfigError) -> Self {
        Self::Configuration { source }
    }
}
