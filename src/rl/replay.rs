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

use super::Transition;
use rand::seq::index;
use rand_pcg::Pcg64Mcg;
use std::collections::VecDeque;

/// Bounded FIFO buffer of past transitions: once full, each insertion evicts the oldest entry.
#[derive(Clone, Debug)]
pub struct ReplayMemory {
    capacity: usize,
    buffer: VecDeque<Transition>,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Stores a transition and returns the evicted one, if any.
    pub fn push(&mut self, transition: Transition) -> Option<Transition> {
        if self.capacity == 0 {
            return Some(transition);
        }
        let evicted = if self.buffer.len() == self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(transition);
        evicted
    }

    /// Samples `batch_size` distinct transitions uniformly at random, or all of them if the memory
    /// holds fewer.
    pub fn sample(&self, batch_size: usize, rng: &mut Pcg64Mcg) -> Vec<Transition> {
        let amount = batch_size.min(self.buffer.len());
        index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| self.buffer[i])
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod ut_replay {
    use super::*;
    use crate::md::TrajectoryAdjuster;
    use crate::rl::SimulationState;

    fn transition(reward: f64) -> Transition {
        let state = SimulationState::new(0.0, &TrajectoryAdjuster::default(), None, 1.0);
        Transition {
            state,
            action: 0,
            reward,
            next_state: state,
            done: false,
        }
    }

    #[test]
    fn fifo_eviction() {
        let mut memory = ReplayMemory::new(3);
        for i in 0..3 {
            assert!(memory.push(transition(i as f64)).is_none());
        }
        let evicted = memory.push(transition(3.0)).unwrap();
        assert_eq!(evicted.reward, 0.0);
        assert_eq!(memory.len(), 3);
        let rewards: Vec<f64> = memory.iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sampling_without_replacement() {
        let mut memory = ReplayMemory::new(100);
        for i in 0..50 {
            memory.push(transition(i as f64));
        }
        let mut rng = Pcg64Mcg::new(42);
        let batch = memory.sample(20, &mut rng);
        assert_eq!(batch.len(), 20);
        let mut rewards: Vec<i64> = batch.iter().map(|t| t.reward as i64).collect();
        rewards.sort_unstable();
        rewards.dedup();
        assert_eq!(rewards.len(), 20);

        assert_eq!(memory.sample(80, &mut rng).len(), 50);
    }
}
