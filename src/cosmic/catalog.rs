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

use super::{KeplerianElements, TrackedObject};
use crate::io::{CatalogCsvSnafu, ConfigError};
use crate::linalg::Vector3;
use serde_derive::Deserialize;
use snafu::ResultExt;
use std::path::Path;

/// TLE eccentricity is published with an implied leading decimal point.
const TLE_ECCENTRICITY_SCALE: f64 = 1e-7;

/// The ordered set of tracked objects screened against the vehicle.
///
/// Iteration order is insertion order, which is the order in which collisions are resolved.
/// The catalog is read-only once training starts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    objects: Vec<TrackedObject>,
}

#[derive(Debug, Deserialize)]
struct ElementsRow {
    #[serde(rename = "Object_ID", default)]
    object_id: Option<String>,
    #[serde(rename = "Inclination_deg")]
    inclination_deg: f64,
    #[serde(rename = "RAAN_deg")]
    raan_deg: f64,
    #[serde(rename = "Eccentricity")]
    eccentricity: f64,
    #[serde(rename = "Argument_of_Perigee_deg")]
    arg_perigee_deg: f64,
    #[serde(rename = "Mean_Anomaly_deg")]
    mean_anomaly_deg: f64,
    #[serde(rename = "Mean_Motion")]
    mean_motion: f64,
}

#[derive(Debug, Deserialize)]
struct StateRow {
    #[serde(rename = "Object_ID")]
    object_id: String,
    x: f64,
    y: f64,
    z: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: TrackedObject) {
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TrackedObject> {
        self.objects.iter()
    }

    /// Loads a catalog of orbital elements from a CSV file with the columns
    /// `Object_ID` (optional), `Inclination_deg`, `RAAN_deg`, `Eccentricity`,
    /// `Argument_of_Perigee_deg`, `Mean_Anomaly_deg` and `Mean_Motion`.
    ///
    /// The eccentricity column is in TLE form and is scaled by 1e-7. Rows which cannot be parsed
    /// are skipped with a warning.
    pub fn from_elements_csv<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut rdr = csv::Reader::from_path(path.as_ref()).context(CatalogCsvSnafu {
            path: path.as_ref().to_path_buf(),
        })?;

        let mut catalog = Self::new();
        for (index, row) in rdr.deserialize::<ElementsRow>().enumerate() {
            match row {
                Ok(row) => catalog.push(TrackedObject::keplerian(
                    row.object_id
                        .unwrap_or_else(|| format!("Satellite {index}")),
                    KeplerianElements {
                        inclination_deg: row.inclination_deg,
                        raan_deg: row.raan_deg,
                        eccentricity: row.eccentricity * TLE_ECCENTRICITY_SCALE,
                        arg_perigee_deg: row.arg_perigee_deg,
                        mean_anomaly_deg: row.mean_anomaly_deg,
                        mean_motion_rev_day: row.mean_motion,
                    },
                )),
                Err(e) => warn!("skipping catalog row #{index}: {e}"),
            }
        }

        info!(
            "loaded {} objects from {}",
            catalog.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }

    /// Loads a catalog of precomputed state vectors from a CSV file with the columns
    /// `Object_ID,x,y,z,vx,vy,vz` (km and km/s).
    pub fn from_state_csv<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut rdr = csv::Reader::from_path(path.as_ref()).context(CatalogCsvSnafu {
            path: path.as_ref().to_path_buf(),
        })?;

        let mut catalog = Self::new();
        for (index, row) in rdr.deserialize::<StateRow>().enumerate() {
            match row {
                Ok(row) => catalog.push(TrackedObject::from_state(
                    row.object_id,
                    Vector3::new(row.x, row.y, row.z),
                    Vector3::new(row.vx, row.vy, row.vz),
                )),
                Err(e) => warn!("skipping catalog row #{index}: {e}"),
            }
        }

        info!(
            "loaded {} state vectors from {}",
            catalog.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }
}

impl FromIterator<TrackedObject> for Catalog {
    fn from_iter<I: IntoIterator<Item = TrackedObject>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a TrackedObject;
    type IntoIter = std::slice::Iter<'a, TrackedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}
