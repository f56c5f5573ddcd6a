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

use super::{check_action, DimensionMismatchSnafu, EstimatorError, ValueEstimator};
use crate::io::StateGrid;
use crate::rl::{SimulationState, Transition, STATE_SIZE};
use rand_pcg::Pcg64Mcg;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;

/// Grid cell of a discretized simulation state
pub type StateKey = [i64; STATE_SIZE];

/// Sparse Q-table over a fixed resolution grid of the simulation state.
///
/// Unseen cells are valued at zero for every action. The table holds at most `max_entries` cells:
/// once full, updates of cells it does not already hold are dropped (and counted).
#[derive(Clone, Debug, PartialEq)]
pub struct TabularEstimator {
    num_actions: usize,
    grid: StateGrid,
    max_entries: usize,
    learning_rate: f64,
    discount: f64,
    table: BTreeMap<StateKey, Vec<f64>>,
    dropped_updates: usize,
}

/// Serializable content of a [TabularEstimator], for persistence outside of the training loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabularSnapshot {
    pub num_actions: usize,
    pub grid: StateGrid,
    pub entries: Vec<(StateKey, Vec<f64>)>,
}

impl TabularEstimator {
    pub fn new(
        num_actions: usize,
        grid: StateGrid,
        max_entries: usize,
        learning_rate: f64,
        discount: f64,
    ) -> Self {
        Self {
            num_actions,
            grid,
            max_entries,
            learning_rate,
            discount,
            table: BTreeMap::new(),
            dropped_updates: 0,
        }
    }

    /// Grid cell of this state
    pub fn key(&self, state: &SimulationState) -> StateKey {
        let f = state.features();
        let res = [
            self.grid.elapsed,
            self.grid.offset,
            self.grid.offset,
            self.grid.proximity,
        ];
        let mut key = [0; STATE_SIZE];
        for (i, cell) in key.iter_mut().enumerate() {
            *cell = (f[i] / res[i]).round() as i64;
        }
        key
    }

    /// Number of grid cells currently held
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Value of a single (state, action) pair
    pub fn value(&self, state: &SimulationState, action: usize) -> Result<f64, EstimatorError> {
        check_action(action, self.num_actions)?;
        Ok(self
            .table
            .get(&self.key(state))
            .map_or(0.0, |values| values[action]))
    }

    fn max_value(&self, key: &StateKey) -> f64 {
        self.table.get(key).map_or(0.0, |values| {
            values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
    }

    /// Single step Q-learning update: `Q(s,a) <- (1-α) Q(s,a) + α (r + γ max Q(s',a'))`, without the
    /// bootstrap term on terminal transitions.
    fn update(&mut self, transition: &Transition) -> Result<(), EstimatorError> {
        check_action(transition.action, self.num_actions)?;
        let key = self.key(&transition.state);
        let future = if transition.done {
            0.0
        } else {
            self.max_value(&self.key(&transition.next_state))
        };
        let target = transition.reward + self.discount * future;

        if !self.table.contains_key(&key) && self.table.len() >= self.max_entries {
            self.dropped_updates += 1;
            warn!(
                "Q-table full ({} cells), update of {:?} dropped",
                self.max_entries, key
            );
            return Ok(());
        }

        let num_actions = self.num_actions;
        let values = self
            .table
            .entry(key)
            .or_insert_with(|| vec![0.0; num_actions]);
        let q = values[transition.action];
        values[transition.action] = (1.0 - self.learning_rate) * q + self.learning_rate * target;
        Ok(())
    }

    pub fn snapshot(&self) -> TabularSnapshot {
        TabularSnapshot {
            num_actions: self.num_actions,
            grid: self.grid,
            entries: self
                .table
                .iter()
                .map(|(key, values)| (*key, values.clone()))
                .collect(),
        }
    }

    /// Rebuilds an estimator from a snapshot. The snapshot may hold more cells than `max_entries`,
    /// in which case no new cell is ever added.
    pub fn from_snapshot(
        snapshot: TabularSnapshot,
        max_entries: usize,
        learning_rate: f64,
        discount: f64,
    ) -> Result<Self, EstimatorError> {
        let mut me = Self::new(
            snapshot.num_actions,
            snapshot.grid,
            max_entries,
            learning_rate,
            discount,
        );
        for (key, values) in snapshot.entries {
            ensure!(
                values.len() == snapshot.num_actions,
                DimensionMismatchSnafu {
                    expected: snapshot.num_actions,
                    got: values.len(),
                    context: "Q-table row"
                }
            );
            me.table.insert(key, values);
        }
        Ok(me)
    }
}

impl ValueEstimator for TabularEstimator {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn estimate(&self, state: &SimulationState) -> Result<Vec<f64>, EstimatorError> {
        Ok(self
            .table
            .get(&self.key(state))
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.num_actions]))
    }

    fn update_batch(&mut self, batch: &[Transition]) -> Result<(), EstimatorError> {
        for transition in batch {
            self.update(transition)?;
        }
        Ok(())
    }

    fn learn(&mut self, transition: Transition, _rng: &mut Pcg64Mcg) -> Result<(), EstimatorError> {
        self.update(&transition)
    }

    /// Updates dropped because the table was full
    fn dropped_updates(&self) -> usize {
        self.dropped_updates
    }

    fn name(&self) -> &'static str {
        "tabular"
    }
}
