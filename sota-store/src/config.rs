// ---------------------------------------------------------------------------
// Store configuration
// ---------------------------------------------------------------------------
//
// Where records live on disk and how each metric is ranked. Every metric is
// ranked through its `MetricDirection`; unlisted metrics fall back to
// `default_direction`.
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Whether larger or smaller values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricDirection {
	/// Accuracy, NDCG, F1, BLEU ...
	#[default]
	Higher,
	/// Latency, error rate, perplexity ...
	Lower,
}

impl MetricDirection {
	/// Ordering that puts the better of two scores first. `-0.0` and `0.0`
	/// compare equal; scores are validated finite before they are stored.
	pub fn compare(self, a: f64, b: f64) -> Ordering {
		let ordering = match self {
			Self::Higher => b.partial_cmp(&a),
			Self::Lower => a.partial_cmp(&b),
		};
		ordering.unwrap_or(Ordering::Equal)
	}
}

/// Configuration for an `EntityStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
	/// Root data directory; record families live in subdirectories.
	#[serde(rename = "rootDir")]
	pub root_dir: PathBuf,
	/// Per-metric ranking direction, keyed by exact metric name.
	#[serde(rename = "metricDirections")]
	pub metric_directions: HashMap<String, MetricDirection>,
	/// Direction for metrics not listed in `metric_directions`.
	#[serde(rename = "defaultDirection")]
	pub default_direction: MetricDirection,
	/// Limit callers use for top-performer queries when they have none.
	#[serde(rename = "topPerformersLimit")]
	pub top_performers_limit: usize,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			root_dir: default_root_dir(),
			metric_directions: HashMap::new(),
			default_direction: MetricDirection::Higher,
			top_performers_limit: 10,
		}
	}
}

impl StoreConfig {
	pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
		Self {
			root_dir: root_dir.into(),
			..Self::default()
		}
	}

	/// Load a JSON config file. Missing fields take their defaults.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path)?;
		serde_json::from_str(&raw).map_err(|e| {
			StoreError::Validation(format!("Invalid config {}: {}", path.display(), e))
		})
	}

	pub fn direction_for(&self, metric_name: &str) -> MetricDirection {
		self.metric_directions
			.get(metric_name)
			.copied()
			.unwrap_or(self.default_direction)
	}

	pub fn set_direction(&mut self, metric_name: impl Into<String>, direction: MetricDirection) {
		self.metric_directions.insert(metric_name.into(), direction);
	}
}

fn default_root_dir() -> PathBuf {
	dirs::data_dir()
		.map(|dir| dir.join("sota-store"))
		.unwrap_or_else(|| PathBuf::from("data").join("research"))
}
