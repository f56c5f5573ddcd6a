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

use super::{
    Action, ActionSpace, AnyEstimator, ClassificationMetrics, EpsilonGreedy, EstimatorError,
    EvaluationMetrics, SimulationState, Transition, ValueEstimator,
};
use crate::cosmic::{Catalog, PositionProvider};
use crate::errors::{EstimatorInitSnafu, EstimatorUpdateSnafu};
use crate::io::TrainingConfig;
use crate::md::{AdjustedTrajectory, CollisionDetector, CollisionEvent, TrajectoryAdjuster};
use crate::time::Duration;
use crate::AvoidanceError;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand_pcg::Pcg64Mcg;
use serde_derive::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fmt;

/// Summary of a single training episode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episode: usize,
    pub total_reward: f64,
    /// Number of steps run, including the skipped ones
    pub steps: usize,
    pub skipped_steps: usize,
    pub collided: bool,
    /// Exploration rate after the end of episode decay
    pub epsilon: f64,
    /// Cumulative offsets when the episode ended
    pub offsets: TrajectoryAdjuster,
}

/// Outcome of a training run.
#[derive(Clone, Debug)]
pub struct TrainingResult<V: PositionProvider> {
    /// Original vehicle trajectory plus the offsets accumulated by the last episode
    pub optimized: AdjustedTrajectory<V>,
    pub metrics: EvaluationMetrics,
    /// Every collision encountered during training, in order
    pub collisions: Vec<CollisionEvent>,
    pub episodes: Vec<EpisodeReport>,
    /// Index of every action selected, in order, across all episodes
    pub actions_taken: Vec<usize>,
    pub final_epsilon: f64,
    /// Set if the total step budget stopped training before the configured episode count
    pub halted_early: bool,
}

impl<V: PositionProvider + fmt::Display> fmt::Display for TrainingResult<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "optimized trajectory:\n{}", self.optimized)?;
        writeln!(f, "{}", self.metrics)?;
        write!(
            f,
            "{} collisions logged, final epsilon {:.4}{}",
            self.collisions.len(),
            self.final_epsilon,
            if self.halted_early {
                " (halted early)"
            } else {
                ""
            }
        )
    }
}

/// Learns offsets of the vehicle trajectory which avoid the tracked objects.
///
/// Episodes run sequentially: each one starts from the original trajectory and, at every step,
/// picks an action with an epsilon-greedy policy, accumulates its offsets, moves time forward by one
/// step, and checks the adjusted trajectory against the catalog. A collision ends the episode.
#[derive(Clone, Debug)]
pub struct TrainingLoop<V: PositionProvider> {
    config: TrainingConfig,
    vehicle: V,
    detector: CollisionDetector,
    actions: ActionSpace,
}

impl<V: PositionProvider + Clone> TrainingLoop<V> {
    /// Validates the configuration and sets up the loop. An invalid configuration is reported here,
    /// before any episode runs.
    pub fn new(config: TrainingConfig, vehicle: V, catalog: Catalog) -> Result<Self, AvoidanceError> {
        config.validate()?;
        let detector = CollisionDetector::new(catalog, config.collision_threshold_km);
        let actions = ActionSpace::new(&config.actions);
        Ok(Self {
            config,
            vehicle,
            detector,
            actions,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn detector(&self) -> &CollisionDetector {
        &self.detector
    }

    pub fn actions(&self) -> &ActionSpace {
        &self.actions
    }

    pub fn vehicle(&self) -> &V {
        &self.vehicle
    }

    /// Builds the estimator selected by the configuration, seeded from the configured seed.
    pub fn build_estimator(&self) -> Result<AnyEstimator, AvoidanceError> {
        // Separate stream from the one used by training
        let mut rng = Pcg64Mcg::new(u128::from(self.config.seed) | (1 << 64));
        AnyEstimator::from_config(&self.config, &mut rng).context(EstimatorInitSnafu)
    }

    fn elapsed_fraction(&self, elapsed: Duration) -> f64 {
        elapsed.to_seconds() / self.config.horizon().to_seconds()
    }

    fn state_at(
        &self,
        elapsed: Duration,
        offsets: &TrajectoryAdjuster,
        closest: Option<f64>,
    ) -> SimulationState {
        SimulationState::new(
            self.elapsed_fraction(elapsed),
            offsets,
            closest,
            self.config.distance_cap_km,
        )
    }

    fn reward(&self, collided: bool, rng: &mut Pcg64Mcg) -> f64 {
        let (base, jitter) = if collided {
            (-self.config.collision_penalty, self.config.collision_jitter)
        } else {
            (self.config.safe_reward, self.config.safe_jitter)
        };
        if jitter > 0.0 {
            base + rng.gen_range(-jitter..=jitter)
        } else {
            base
        }
    }

    /// Distance to the closest tracked object, if the vehicle position is available.
    fn closest_km<P: PositionProvider>(&self, trajectory: &P, elapsed: Duration) -> Option<f64> {
        match self.detector.probe(trajectory, elapsed) {
            Ok(probe) => probe.closest_km(),
            Err(e) => {
                warn!("no proximity at {elapsed}: {e}");
                None
            }
        }
    }

    fn check_estimate(&self, values: &[f64]) -> Result<(), EstimatorError> {
        if values.len() == self.actions.len() {
            Ok(())
        } else {
            Err(EstimatorError::DimensionMismatch {
                expected: self.actions.len(),
                got: values.len(),
                context: "action values",
            })
        }
    }

    /// Greedy action for the vehicle flown with these offsets, at this elapsed time.
    pub fn predict<E: ValueEstimator + ?Sized>(
        &self,
        estimator: &E,
        elapsed: Duration,
        offsets: &TrajectoryAdjuster,
    ) -> Result<Action, EstimatorError> {
        let closest = self.closest_km(&offsets.apply(&self.vehicle), elapsed);
        let values = estimator.estimate(&self.state_at(elapsed, offsets, closest))?;
        self.check_estimate(&values)?;
        let index = EpsilonGreedy::greedy(&values);
        self.actions.get(index).copied().ok_or(EstimatorError::ActionOutOfRange {
            action: index,
            num_actions: self.actions.len(),
        })
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(self.config.episodes as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:60.cyan/blue} {pos:>7}/{len:7} {msg}",
        ) {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }

    /// Trains the estimator over the configured number of episodes.
    ///
    /// The estimator is updated in place. Recoverable problems (unavailable positions, non finite
    /// states) are logged and counted in the metrics; only an estimator failure aborts the run.
    pub fn train<E: ValueEstimator + ?Sized>(
        &self,
        estimator: &mut E,
    ) -> Result<TrainingResult<V>, AvoidanceError> {
        let cfg = &self.config;
        if estimator.num_actions() != self.actions.len() {
            return Err(AvoidanceError::EstimatorInit {
                source: EstimatorError::DimensionMismatch {
                    expected: self.actions.len(),
                    got: estimator.num_actions(),
                    context: "estimator actions",
                },
            });
        }

        info!(
            "training {} estimator: {} episodes of {} steps of {} against {} objects (seed {})",
            estimator.name(),
            cfg.episodes,
            cfg.max_steps,
            cfg.step,
            self.detector.catalog().len(),
            cfg.seed
        );

        let mut rng = Pcg64Mcg::new(cfg.seed.into());
        let mut policy = EpsilonGreedy::new(
            cfg.exploration_start,
            cfg.exploration_decay,
            cfg.exploration_floor,
        );
        let pb = self.progress_bar();

        let mut metrics = EvaluationMetrics::default();
        let mut collisions = Vec::new();
        let mut reports = Vec::with_capacity(cfg.episodes);
        let mut actions_taken = Vec::new();
        let mut truth = Vec::new();
        let mut predicted = Vec::new();
        let mut offsets = TrajectoryAdjuster::default();
        let mut total_steps = 0;
        let mut halted_early = false;

        for episode in 0..cfg.episodes {
            offsets.reset();
            let mut elapsed = Duration::ZERO;
            let mut report = EpisodeReport {
                episode,
                total_reward: 0.0,
                steps: 0,
                skipped_steps: 0,
                collided: false,
                epsilon: policy.epsilon(),
                offsets,
            };

            let closest = self.closest_km(&self.vehicle, elapsed);
            let mut state = self.state_at(elapsed, &offsets, closest);

            for step in 0..cfg.max_steps {
                report.steps += 1;

                let values = estimator
                    .estimate(&state)
                    .and_then(|values| self.check_estimate(&values).map(|_| values))
                    .context(EstimatorUpdateSnafu { episode, step })?;
                let choice = policy.select(&values, &mut rng);
                let action = *self.actions.get(choice).ok_or(
                    AvoidanceError::EstimatorUpdate {
                        episode,
                        step,
                        source: EstimatorError::ActionOutOfRange {
                            action: choice,
                            num_actions: self.actions.len(),
                        },
                    },
                )?;
                actions_taken.push(choice);
                offsets.accumulate(&action);
                elapsed += cfg.step;

                let adjusted = offsets.apply(&self.vehicle);
                let probe = match self.detector.probe(&adjusted, elapsed) {
                    Ok(probe) => probe,
                    Err(e) => {
                        warn!("episode #{episode} step #{step}: {e}, step skipped");
                        report.skipped_steps += 1;
                        state = self.state_at(elapsed, &offsets, None);
                        continue;
                    }
                };
                if !probe.unavailable.is_empty() {
                    warn!(
                        "episode #{episode} step #{step}: position unavailable for {:?}",
                        probe.unavailable
                    );
                    metrics.skipped_probes += probe.unavailable.len();
                }

                let next_state = self.state_at(elapsed, &offsets, probe.closest_km());
                let collided = probe.event.is_some();
                let reward = self.reward(collided, &mut rng);
                if state.is_finite() && next_state.is_finite() && reward.is_finite() {
                    let done = collided || step + 1 == cfg.max_steps;
                    debug!(
                        "episode #{episode} step #{step}: {state} -> action {action} -> reward {reward:.3}"
                    );

                    truth.push(collided);
                    predicted.push(values[choice] < 0.0);

                    let transition = Transition {
                        state,
                        action: choice,
                        reward,
                        next_state,
                        done,
                    };
                    if let Err(e) = estimator.learn(transition, &mut rng) {
                        error!("episode #{episode} step #{step}: estimator update failed: {e}");
                        return Err(e).context(EstimatorUpdateSnafu { episode, step });
                    }

                    metrics.evaluated_steps += 1;
                    if collided {
                        metrics.collisions += 1;
                    }
                    report.total_reward += reward;
                } else {
                    warn!("episode #{episode} step #{step}: non finite state or reward, step skipped");
                    report.skipped_steps += 1;
                }

                // A collision ends the episode even when the step could not be learned from
                if let Some(mut event) = probe.event {
                    event.episode = episode;
                    event.step = step;
                    info!("episode #{episode}: {event}");
                    collisions.push(event);
                    report.collided = true;
                    break;
                }
                state = next_state;
            }

            estimator.end_episode(episode);
            report.epsilon = policy.decay();
            report.offsets = offsets;
            total_steps += report.steps;
            metrics.skipped_steps += report.skipped_steps;

            info!(
                "episode #{episode}: reward {:.3} in {} steps{}, offsets ({}, {}) km/s, epsilon {:.4}",
                report.total_reward,
                report.steps,
                if report.collided { " (collision)" } else { "" },
                offsets.x_rate,
                offsets.y_rate,
                report.epsilon
            );
            pb.set_message(format!("epsilon = {:.3}", report.epsilon));
            pb.inc(1);
            reports.push(report);

            if let Some(budget) = cfg.max_total_steps {
                if total_steps >= budget && episode + 1 < cfg.episodes {
                    warn!(
                        "step budget of {budget} exhausted after {total_steps} steps, halting after episode #{episode}"
                    );
                    halted_early = true;
                    break;
                }
            }
        }
        pb.finish_and_clear();

        metrics.episodes = reports.len();
        if metrics.episodes > 0 {
            metrics.average_reward_per_episode =
                reports.iter().map(|r| r.total_reward).sum::<f64>() / metrics.episodes as f64;
        }
        metrics.collision_avoidance_rate = if metrics.evaluated_steps > 0 {
            (metrics.evaluated_steps - metrics.collisions) as f64 / metrics.evaluated_steps as f64
        } else {
            1.0
        };
        metrics.dropped_updates = estimator.dropped_updates();
        metrics.classification = ClassificationMetrics::from_labels(&truth, &predicted);

        let optimized = offsets.apply(self.vehicle.clone());
        info!(
            "training complete: {} episodes, average reward {:.3}, collision avoidance rate {:.2}%",
            metrics.episodes,
            metrics.average_reward_per_episode,
            metrics.collision_avoidance_rate * 100.0
        );

        Ok(TrainingResult {
            optimized,
            metrics,
            collisions,
            episodes: reports,
            actions_taken,
            final_epsilon: policy.epsilon(),
            halted_early,
        })
    }
}
