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
    check_action, DimensionMismatchSnafu, DivergedSnafu, EstimatorError,
    InvalidInitializationSnafu, ValueEstimator,
};
use crate::rl::{ReplayMemory, SimulationState, Transition, STATE_SIZE};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::module::{AutodiffModule, Param};
use burn::nn::{Linear, LinearConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{AdamW, AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::relu;
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64Mcg;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use typed_builder::TypedBuilder;

/// Backend of the target network and of inference
type Inner = NdArray<f64>;
/// Backend of the live network, which is trained
type Train = Autodiff<Inner>;

type LayerRecord = <Linear<Train> as Module<Train>>::Record;

/// Hyperparameters of a [NeuralEstimator].
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(doc)]
pub struct NeuralSettings {
    #[builder(default = vec![64, 64])]
    pub hidden_layers: Vec<usize>,
    pub num_actions: usize,
    /// Step size of the Adam optimizer
    #[builder(default = 1e-3)]
    pub learning_rate: f64,
    #[builder(default = 0.9)]
    pub discount: f64,
    #[builder(default = 15_000)]
    pub replay_capacity: usize,
    #[builder(default = 64)]
    pub batch_size: usize,
    /// The target network is synced every `target_sync_interval` episodes
    #[builder(default = 10)]
    pub target_sync_interval: usize,
}

impl NeuralSettings {
    /// Initializes the network weights (He initialization drawn from the provided generator) and
    /// syncs the target network.
    pub fn init(self, rng: &mut Pcg64Mcg) -> Result<NeuralEstimator, EstimatorError> {
        ensure!(
            self.num_actions > 0,
            InvalidInitializationSnafu {
                msg: "no action to estimate"
            }
        );
        ensure!(
            self.hidden_layers.iter().all(|n| *n > 0),
            InvalidInitializationSnafu {
                msg: format!("empty hidden layer in {:?}", self.hidden_layers)
            }
        );
        ensure!(
            self.batch_size > 0 && self.target_sync_interval > 0,
            InvalidInitializationSnafu {
                msg: "batch size and target sync interval must be positive"
            }
        );
        ensure!(
            self.batch_size <= self.replay_capacity,
            InvalidInitializationSnafu {
                msg: format!(
                    "batch size {} exceeds the replay capacity of {}",
                    self.batch_size, self.replay_capacity
                )
            }
        );

        let device = NdArrayDevice::default();
        let mut sizes = vec![STATE_SIZE];
        sizes.extend(self.hidden_layers.iter().copied());
        sizes.push(self.num_actions);

        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            layers.push(he_layer(pair[0], pair[1], rng, &device)?);
        }
        let online = QNetwork { layers };
        let target = online.valid();

        Ok(NeuralEstimator {
            memory: ReplayMemory::new(self.replay_capacity),
            settings: self,
            online,
            target,
            optimizer: optimizer(),
            device,
            last_loss: None,
        })
    }
}

/// Feed forward network: ReLU on every hidden layer, linear output with one value per action.
#[derive(Module, Debug)]
struct QNetwork<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> QNetwork<B> {
    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len().saturating_sub(1);
        self.layers
            .iter()
            .enumerate()
            .fold(input, |x, (i, layer)| {
                let z = layer.forward(x);
                if i < last {
                    relu(z)
                } else {
                    z
                }
            })
    }
}

/// Linear layer with He normal weights and zero bias.
fn he_layer(
    fan_in: usize,
    fan_out: usize,
    rng: &mut Pcg64Mcg,
    device: &NdArrayDevice,
) -> Result<Linear<Train>, EstimatorError> {
    let normal = Normal::new(0.0, (2.0 / fan_in as f64).sqrt()).map_err(|e| {
        EstimatorError::InvalidInitialization {
            msg: format!("{e}"),
        }
    })?;
    // Burn stores linear weights as [inputs, outputs]
    let weights: Vec<f64> = (0..fan_in * fan_out).map(|_| normal.sample(rng)).collect();

    let mut layer = LinearConfig::new(fan_in, fan_out).init::<Train>(device);
    layer.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weights, [fan_in, fan_out]).convert::<f64>(),
        device,
    ));
    layer.bias = Some(Param::from_tensor(Tensor::zeros([fan_out], device)));
    Ok(layer)
}

fn optimizer() -> OptimizerAdaptor<AdamW, QNetwork<Train>, Train> {
    AdamWConfig::new().with_weight_decay(0.0).init()
}

/// Stacks the features of the states as the rows of a [batch, features] tensor.
fn batch_input<'a, B, I>(states: I, device: &B::Device) -> Tensor<B, 2>
where
    B: Backend,
    I: Iterator<Item = &'a SimulationState>,
{
    let mut data = Vec::new();
    let mut rows = 0;
    for state in states {
        data.extend(state.features().iter().copied());
        rows += 1;
    }
    Tensor::from_data(
        TensorData::new(data, [rows, STATE_SIZE]).convert::<B::FloatElem>(),
        device,
    )
}

fn to_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<Vec<f64>, EstimatorError> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| EstimatorError::TensorData {
            msg: format!("{e:?}"),
        })
}

/// Binary burn records of each layer of the live network of a [NeuralEstimator], input layer
/// first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub layers: Vec<Vec<u8>>,
}

/// Q-network trained with Adam on minibatches drawn from a replay memory, against a periodically
/// synced target network.
pub struct NeuralEstimator {
    settings: NeuralSettings,
    online: QNetwork<Train>,
    target: QNetwork<Inner>,
    optimizer: OptimizerAdaptor<AdamW, QNetwork<Train>, Train>,
    device: NdArrayDevice,
    memory: ReplayMemory,
    last_loss: Option<f64>,
}

impl fmt::Debug for NeuralEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralEstimator")
            .field("settings", &self.settings)
            .field("online", &self.online)
            .field("memory", &self.memory.len())
            .field("last_loss", &self.last_loss)
            .finish_non_exhaustive()
    }
}

impl NeuralEstimator {
    pub fn settings(&self) -> &NeuralSettings {
        &self.settings
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    /// Mean squared error of the last fit, if any
    pub fn last_loss(&self) -> Option<f64> {
        self.last_loss
    }

    /// Copies the live network into the target network.
    pub fn sync_target(&mut self) {
        self.target = self.online.valid();
    }

    /// Target network estimate of each action in this state
    pub fn target_estimate(&self, state: &SimulationState) -> Result<Vec<f64>, EstimatorError> {
        let input = batch_input::<Inner, _>(std::iter::once(state), &self.device);
        to_values(self.target.forward(input))
    }

    pub fn weights(&self) -> Result<NetworkWeights, EstimatorError> {
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let layers = self
            .online
            .layers
            .iter()
            .map(|layer| {
                Recorder::<Train>::record(&recorder, layer.clone().into_record(), ()).map_err(
                    |e| EstimatorError::InvalidWeights {
                        msg: format!("{e:?}"),
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NetworkWeights { layers })
    }

    /// Replaces the live and target networks with these weights, and resets the optimizer.
    pub fn load_weights(&mut self, weights: &NetworkWeights) -> Result<(), EstimatorError> {
        ensure!(
            weights.layers.len() == self.online.layers.len(),
            DimensionMismatchSnafu {
                expected: self.online.layers.len(),
                got: weights.layers.len(),
                context: "layer count"
            }
        );
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let mut layers = Vec::with_capacity(weights.layers.len());
        for (layer, bytes) in self.online.layers.iter().zip(&weights.layers) {
            let record: LayerRecord = Recorder::<Train>::load(&recorder, bytes.clone(), &self.device)
                .map_err(|e| EstimatorError::InvalidWeights {
                    msg: format!("{e:?}"),
                })?;

            let expected = layer.weight.val().dims();
            let got = record.weight.val().dims();
            ensure!(
                got == expected,
                DimensionMismatchSnafu {
                    expected: expected[0] * expected[1],
                    got: got[0] * got[1],
                    context: "layer weights"
                }
            );
            let bias_len = record.bias.as_ref().map_or(0, |b| b.val().dims()[0]);
            ensure!(
                bias_len == expected[1],
                DimensionMismatchSnafu {
                    expected: expected[1],
                    got: bias_len,
                    context: "layer bias"
                }
            );
            layers.push(layer.clone().load_record(record));
        }
        self.online = QNetwork { layers };
        self.optimizer = optimizer();
        self.sync_target();
        Ok(())
    }
}

impl ValueEstimator for NeuralEstimator {
    fn num_actions(&self) -> usize {
        self.settings.num_actions
    }

    fn estimate(&self, state: &SimulationState) -> Result<Vec<f64>, EstimatorError> {
        let input = batch_input::<Inner, _>(std::iter::once(state), &self.device);
        to_values(self.online.valid().forward(input))
    }

    /// One Adam step on the mean squared error between the taken action values and their targets.
    /// The other action outputs do not contribute to the loss.
    fn update_batch(&mut self, batch: &[Transition]) -> Result<(), EstimatorError> {
        if batch.is_empty() {
            return Ok(());
        }
        for transition in batch {
            check_action(transition.action, self.settings.num_actions)?;
        }
        let count = batch.len();

        let next_input = batch_input::<Inner, _>(batch.iter().map(|t| &t.next_state), &self.device);
        let best_next = to_values(self.target.forward(next_input).max_dim(1))?;
        let targets: Vec<f64> = batch
            .iter()
            .zip(&best_next)
            .map(|(transition, best)| {
                if transition.done {
                    transition.reward
                } else {
                    transition.reward + self.settings.discount * best
                }
            })
            .collect();
        let targets = Tensor::<Train, 2>::from_data(
            TensorData::new(targets, [count, 1]).convert::<f64>(),
            &self.device,
        );
        let actions: Vec<i64> = batch.iter().map(|t| t.action as i64).collect();
        let actions = Tensor::<Train, 2, Int>::from_data(
            TensorData::new(actions, [count, 1]).convert::<<Train as Backend>::IntElem>(),
            &self.device,
        );

        let input = batch_input::<Train, _>(batch.iter().map(|t| &t.state), &self.device);
        let taken = self.online.forward(input).gather(1, actions);
        let loss = (taken - targets).powf_scalar(2.0).mean();

        let loss_value = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return DivergedSnafu { loss: loss_value }.fail();
        }
        self.last_loss = Some(loss_value);

        let grads = GradientsParams::from_grads(loss.backward(), &self.online);
        self.online = self
            .optimizer
            .step(self.settings.learning_rate, self.online.clone(), grads);

        Ok(())
    }

    /// Stores the transition and fits a uniformly sampled minibatch once the memory holds enough
    /// experience.
    fn learn(&mut self, transition: Transition, rng: &mut Pcg64Mcg) -> Result<(), EstimatorError> {
        check_action(transition.action, self.settings.num_actions)?;
        self.memory.push(transition);
        if self.memory.len() >= self.settings.batch_size {
            let batch = self.memory.sample(self.settings.batch_size, rng);
            self.update_batch(&batch)?;
        }
        Ok(())
    }

    fn end_episode(&mut self, episode: usize) {
        if (episode + 1) % self.settings.target_sync_interval == 0 {
            debug!("syncing target network after episode #{episode}");
            self.sync_target();
        }
    }

    fn name(&self) -> &'static str {
        "neural"
    }
}
