// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of stonne-bridge (tensor compiler to STONNE simulator bridge).

//! Tiling hints for the native dense convolution path.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{read_toml, ConfigError};

/// Convolution tile mapped onto the multiplier network at once.
///
/// Keys use the simulator spelling (`T_R`, `T_S`, ..., `T_X_`, `T_Y_`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileConfig {
    #[serde(rename = "T_R")]
    pub t_r: usize,
    #[serde(rename = "T_S")]
    pub t_s: usize,
    #[serde(rename = "T_C")]
    pub t_c: usize,
    #[serde(rename = "T_K")]
    pub t_k: usize,
    #[serde(rename = "T_G", default = "one")]
    pub t_g: usize,
    #[serde(rename = "T_N", default = "one")]
    pub t_n: usize,
    #[serde(rename = "T_X_")]
    pub t_x: usize,
    #[serde(rename = "T_Y_")]
    pub t_y: usize,
}

fn one() -> usize {
    1
}

impl TileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let tile: TileConfig = read_toml(path).map_err(|err| ConfigError::Load {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })?;
        tile.validate()?;
        Ok(tile)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.footprint() {
            Some(0) => Err(ConfigError::InvalidValue {
                key: "tile",
                message: "every tile extent must be positive".into(),
            }),
            None => Err(ConfigError::InvalidValue {
                key: "tile",
                message: "tile footprint overflows".into(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Multipliers occupied by one tile; `None` on overflow.
    pub fn footprint(&self) -> Option<usize> {
        [
            self.t_r, self.t_s, self.t_c, self.t_k, self.t_g, self.t_n, self.t_x, self.t_y,
        ]
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::TileConfig;
    use crate::config::ConfigError;

    #[test]
    fn loads_tile_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tile.toml");
        fs::write(&path, "T_R = 3\nT_S = 3\nT_C = 1\nT_K = 1\nT_X_ = 1\nT_Y_ = 2\n")
            .expect("write tile");
        let tile = TileConfig::load(&path).expect("tile");
        assert_eq!(tile.t_g, 1);
        assert_eq!(tile.footprint(), Some(18));
    }

    #[test]
    fn zero_extent_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tile.toml");
        fs::write(&path, "T_R = 0\nT_S = 3\nT_C = 1\nT_K = 1\nT_X_ = 1\nT_Y_ = 1\n")
            .expect("write tile");
        assert!(matches!(
            TileConfig::load(&path),
            Err(ConfigError::InvalidValue { key: "tile", .. })
        ));
    }

    #[test]
    fn overflowing_footprint_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tile.toml");
        let huge = u32::MAX;
        fs::write(
            &path,
            format!("T_R = {huge}\nT_S = {huge}\nT_C = {huge}\nT_K = 1\nT_X_ = 1\nT_Y_ = 1\n"),
        )
        .expect("write tile");
        let err = TileConfig::load(&path).unwrap_err();
        assert!(
            matches!(&err, ConfigError::InvalidValue { key: "tile", message } if message.contains("overflows")),
            "{err}"
        );
    }
}
