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

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// Binary classification scores of a predicted label stream against the ground truth, where a
/// positive label is a collision.
///
/// Any score whose denominator is zero is reported as zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationMetrics {
    /// Scores the predictions against the truth, pairwise. Returns `None` if either stream is empty
    /// or if they differ in length.
    pub fn from_labels(truth: &[bool], predicted: &[bool]) -> Option<Self> {
        if truth.is_empty() || truth.len() != predicted.len() {
            return None;
        }
        let mut me = Self::default();
        for (t, p) in truth.iter().zip(predicted) {
            match (t, p) {
                (true, true) => me.true_positives += 1,
                (false, true) => me.false_positives += 1,
                (false, false) => me.true_negatives += 1,
                (true, false) => me.false_negatives += 1,
            }
        }
        me.accuracy = ratio(me.true_positives + me.true_negatives, truth.len());
        me.precision = ratio(me.true_positives, me.true_positives + me.false_positives);
        me.recall = ratio(me.true_positives, me.true_positives + me.false_negatives);
        me.f1 = if me.precision + me.recall > 0.0 {
            2.0 * me.precision * me.recall / (me.precision + me.recall)
        } else {
            0.0
        };
        Some(me)
    }
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accuracy {:.2}%, precision {:.2}, recall {:.2}, F1 {:.2}",
            self.accuracy * 100.0,
            self.precision,
            self.recall,
            self.f1
        )
    }
}

/// Aggregate evaluation of a training run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Mean over the episodes of the total reward of each episode
    pub average_reward_per_episode: f64,
    /// Fraction of the evaluated steps without collision
    pub collision_avoidance_rate: f64,
    pub episodes: usize,
    /// Steps whose reward was computed and learned from
    pub evaluated_steps: usize,
    /// Collisions among the evaluated steps
    pub collisions: usize,
    /// Steps skipped because the vehicle position or the state was unavailable
    pub skipped_steps: usize,
    /// Object positions excluded from a collision check because they were unavailable
    pub skipped_probes: usize,
    /// Estimator updates dropped because the Q-table was full
    pub dropped_updates: usize,
    pub classification: Option<ClassificationMetrics>,
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "average reward per episode: {:.3} over {} episodes",
            self.average_reward_per_episode, self.episodes
        )?;
        writeln!(
            f,
            "collision avoidance rate: {:.2}% ({} collisions in {} steps)",
            self.collision_avoidance_rate * 100.0,
            self.collisions,
            self.evaluated_steps
        )?;
        write!(
            f,
            "skipped: {} steps, {} object probes, {} estimator updates",
            self.skipped_steps, self.skipped_probes, self.dropped_updates
        )?;
        if let Some(classification) = &self.classification {
            write!(f, "\n{classification}")?;
        }
        Ok(())
    }
}
