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

use crate::cosmic::{Catalog, PositionError, PositionProvider};
use crate::io::{duration_from_str, duration_to_str};
use crate::time::Duration;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A conjunction between the vehicle and a tracked object, closer than the collision threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    /// Elapsed time since the start of the episode
    #[serde(
        serialize_with = "duration_to_str",
        deserialize_with = "duration_from_str"
    )]
    pub elapsed: Duration,
    pub object_id: String,
    /// Distance between the vehicle and the object, in km
    pub distance_km: f64,
    /// Training episode and step which encountered this event, zero outside of training
    pub episode: usize,
    pub step: usize,
}

impl fmt::Display for CollisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collision with {} at {} ({:.6} km) [episode #{} step #{}]",
            self.object_id, self.elapsed, self.distance_km, self.episode, self.step
        )
    }
}

/// Result of probing the vehicle against the whole catalog at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Probe {
    /// Closest approach over all objects whose position is known, as (catalog index, distance)
    pub closest: Option<(usize, f64)>,
    /// Closest object within the collision threshold
    pub event: Option<CollisionEvent>,
    /// Identifiers of the objects whose position was unavailable at this instant
    pub unavailable: Vec<String>,
}

impl Probe {
    pub fn closest_km(&self) -> Option<f64> {
        self.closest.map(|(_, distance)| distance)
    }
}

/// Screens the vehicle against every object of the catalog.
#[derive(Clone, Debug)]
pub struct CollisionDetector {
    catalog: Catalog,
    threshold_km: f64,
}

impl CollisionDetector {
    pub fn new(catalog: Catalog, threshold_km: f64) -> Self {
        Self {
            catalog,
            threshold_km,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    /// Computes the distance from the vehicle to every object at `elapsed`.
    ///
    /// Returns an error only if the vehicle position itself is unavailable. Objects whose position
    /// cannot be computed are skipped and listed in [Probe::unavailable]. If several objects are
    /// within the threshold, the closest one is reported and ties resolve to the earliest object in
    /// the catalog.
    pub fn probe<V: PositionProvider>(
        &self,
        vehicle: &V,
        elapsed: Duration,
    ) -> Result<Probe, PositionError> {
        let vehicle_pos = vehicle.position(elapsed)?;

        // Collected in catalog order, so the resolution below stays deterministic.
        let positions = self
            .catalog
            .objects()
            .par_iter()
            .map(|obj| obj.position(elapsed))
            .collect::<Vec<_>>();

        let mut probe = Probe::default();
        for (index, (obj, position)) in self.catalog.iter().zip(positions).enumerate() {
            let distance = match position {
                Ok(position) => (position - vehicle_pos).norm(),
                Err(e) => {
                    debug!("{} skipped at {elapsed}: {e}", obj.id);
                    probe.unavailable.push(obj.id.clone());
                    continue;
                }
            };

            if !distance.is_finite() {
                debug!("{} skipped at {elapsed}: non finite distance", obj.id);
                probe.unavailable.push(obj.id.clone());
                continue;
            }

            if probe.closest.map_or(true, |(_, best)| distance < best) {
                probe.closest = Some((index, distance));
            }
        }

        if let Some((index, distance)) = probe.closest {
            if distance <= self.threshold_km {
                let obj = &self.catalog.objects()[index];
                debug!(
                    "collision with {} at {elapsed}: {distance:.6} km <= {} km",
                    obj.id, self.threshold_km
                );
                probe.event = Some(CollisionEvent {
                    elapsed,
                    object_id: obj.id.clone(),
                    distance_km: distance,
                    episode: 0,
                    step: 0,
                });
            }
        }

        Ok(probe)
    }

    /// Returns the collision event at `elapsed`, if any.
    ///
    /// An unavailable vehicle position is treated as "no data" and yields no event.
    pub fn check<V: PositionProvider>(
        &self,
        vehicle: &V,
        elapsed: Duration,
    ) -> Option<CollisionEvent> {
        match self.probe(vehicle, elapsed) {
            Ok(probe) => probe.event,
            Err(e) => {
                warn!("no collision check at {elapsed}: {e}");
                None
            }
        }
    }
}
