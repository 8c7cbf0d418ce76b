//! Engine configuration types.
//!
//! Constructed by the caller (in code or via [`parse_config`](super::parser::parse_config))
//! and passed into [`Pipeline`](crate::Pipeline). Nothing here is global.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_PARTITION_LINES: usize = 1024;
pub const DEFAULT_MAX_WORKERS: u32 = 64;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;
const MAX_AUTO_WORKERS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
}

impl EngineConfig {
    /// Config with default compute settings reading from `base_uri`.
    #[must_use]
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            storage: StorageConfig {
                base_uri: base_uri.into(),
                partition_lines: DEFAULT_PARTITION_LINES,
                skip_blank_lines: false,
            },
            compute: ComputeConfig::default(),
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: WorkerCount) -> Self {
        self.compute.workers = workers;
        self
    }

    #[must_use]
    pub fn with_partition_lines(mut self, lines: usize) -> Self {
        self.storage.partition_lines = lines;
        self
    }
}

/// Where corpora live and how they are split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory path or `file://` URI holding `<topic>.txt` files.
    pub base_uri: String,
    #[serde(default = "default_partition_lines")]
    pub partition_lines: usize,
    #[serde(default)]
    pub skip_blank_lines: bool,
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeConfig {
    #[serde(default)]
    pub workers: WorkerCount,
    /// Ceiling enforced by [`LocalCluster`](crate::LocalCluster) at acquisition.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,
    /// Partitions buffered between the reader and the pool.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            workers: WorkerCount::Auto,
            max_workers: DEFAULT_MAX_WORKERS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ComputeConfig {
    /// Number of workers a session should request.
    ///
    /// `auto` never asks for more than `max_workers`.
    #[must_use]
    pub fn effective_workers(&self) -> u32 {
        match self.workers {
            WorkerCount::Manual(n) => n.max(1),
            WorkerCount::Auto => {
                let cores = std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1);
                self.auto_workers(cores)
            }
        }
    }

    fn auto_workers(&self, cores: usize) -> u32 {
        let ceiling = self.max_workers.min(MAX_AUTO_WORKERS).max(1);
        u32::try_from(cores).unwrap_or(u32::MAX).clamp(1, ceiling)
    }
}

/// `workers: auto` or `workers: <n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerCount {
    #[default]
    Auto,
    Manual(u32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkerCountRepr {
    Number(u32),
    Text(String),
}

impl<'de> Deserialize<'de> for WorkerCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WorkerCountRepr::deserialize(deserializer)? {
            WorkerCountRepr::Number(n) => Ok(Self::Manual(n)),
            WorkerCountRepr::Text(s) if s.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            WorkerCountRepr::Text(s) => Err(serde::de::Error::custom(format!(
                "invalid workers value '{s}', expected 'auto' or a positive integer"
            ))),
        }
    }
}

impl Serialize for WorkerCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Manual(n) => serializer.serialize_u32(*n),
        }
    }
}

fn default_partition_lines() -> usize {
    DEFAULT_PARTITION_LINES
}

fn default_max_workers() -> u32 {
    DEFAULT_MAX_WORKERS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
