// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Build and evaluation configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::csg::Attribute;

/// Heuristic used to choose the split plane of an internal node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Midpoint of the longest axis of the triangle-center bounds
    #[default]
    Center,
    /// Mean triangle center along the longest axis of the node bounds
    Average,
    /// Surface area heuristic
    Sah,
}

impl FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "center" => Ok(Self::Center),
            "average" => Ok(Self::Average),
            "sah" => Ok(Self::Sah),
            other => Err(format!("unknown split strategy: {}", other)),
        }
    }
}

/// BVH build options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub strategy: SplitStrategy,
    /// Depth at which splitting stops regardless of leaf size
    pub max_depth: u32,
    /// Leaves are emitted once a range holds this many triangles or fewer
    pub max_leaf_triangles: u32,
    /// Keep the mesh index untouched and reorder an auxiliary table instead
    pub indirect: bool,
    /// Back node buffers with reference-counted storage so clones share memory
    pub shared_buffers: bool,
    /// Log a warning when the depth limit is hit
    pub verbose: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::Center,
            max_depth: 40,
            max_leaf_triangles: 10,
            indirect: false,
            shared_buffers: false,
            verbose: true,
        }
    }
}

/// CSG evaluator options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorOptions {
    /// Attributes written to the result; `None` keeps those present on both brushes
    pub attributes: Option<Vec<Attribute>>,
    /// Split the output by the material groups of the inputs
    pub use_groups: bool,
    /// Merge output groups sharing a material index
    pub consolidate_groups: bool,
    /// Seed for the jittered rays of the coplanar classification vote
    pub jitter_seed: u64,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            attributes: None,
            use_groups: true,
            consolidate_groups: true,
            jitter_seed: 0x5eed,
        }
    }
}

/// Kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub bvh: BuildOptions,
    pub csg: EvaluatorOptions,
}

impl KernelConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: KernelConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load `polyframe-bvh.toml` when present, then apply environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from("polyframe-bvh.toml").exists() {
            Self::from_file("polyframe-bvh.toml")?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(strategy) = std::env::var("POLYFRAME_BVH_STRATEGY") {
            self.bvh.strategy = strategy
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid POLYFRAME_BVH_STRATEGY")?;
        }

        if let Ok(depth) = std::env::var("POLYFRAME_BVH_MAX_DEPTH") {
            self.bvh.max_depth = depth
                .parse()
                .context("Invalid POLYFRAME_BVH_MAX_DEPTH")?;
        }

        if let Ok(leaf) = std::env::var("POLYFRAME_BVH_MAX_LEAF_TRIANGLES") {
            self.bvh.max_leaf_triangles = leaf
                .parse()
                .context("Invalid POLYFRAME_BVH_MAX_LEAF_TRIANGLES")?;
        }

        if let Ok(seed) = std::env::var("POLYFRAME_CSG_SEED") {
            self.csg.jitter_seed = seed.parse().context("Invalid POLYFRAME_CSG_SEED")?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }
}
