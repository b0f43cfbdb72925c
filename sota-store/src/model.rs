// ---------------------------------------------------------------------------
// Record schema — entities, relationships, benchmark scores
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// The kind of research artifact an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
	Method,
	Paper,
	Repository,
	Benchmark,
	Dataset,
	Feature,
	Metric,
}

impl EntityType {
	pub const ALL: [EntityType; 7] = [
		Self::Method,
		Self::Paper,
		Self::Repository,
		Self::Benchmark,
		Self::Dataset,
		Self::Feature,
		Self::Metric,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Method => "method",
			Self::Paper => "paper",
			Self::Repository => "repository",
			Self::Benchmark => "benchmark",
			Self::Dataset => "dataset",
			Self::Feature => "feature",
			Self::Metric => "metric",
		}
	}
}

impl fmt::Display for EntityType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EntityType {
	type Err = StoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|t| t.as_str() == s)
			.ok_or_else(|| StoreError::Validation(format!("Unknown entity type: {}", s)))
	}
}

/// The semantic kind of a directed edge between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
	Implements,
	Uses,
	ImprovesUpon,
	EvaluatedOn,
	PartOf,
	ComparedWith,
	BasedOn,
}

impl RelationType {
	pub const ALL: [RelationType; 7] = [
		Self::Implements,
		Self::Uses,
		Self::ImprovesUpon,
		Self::EvaluatedOn,
		Self::PartOf,
		Self::ComparedWith,
		Self::BasedOn,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Implements => "implements",
			Self::Uses => "uses",
			Self::ImprovesUpon => "improves_upon",
			Self::EvaluatedOn => "evaluated_on",
			Self::PartOf => "part_of",
			Self::ComparedWith => "compared_with",
			Self::BasedOn => "based_on",
		}
	}
}

impl fmt::Display for RelationType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for RelationType {
	type Err = StoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|t| t.as_str() == s)
			.ok_or_else(|| StoreError::Validation(format!("Unknown relation type: {}", s)))
	}
}

// ---------------------------------------------------------------------------
// Feature values
// ---------------------------------------------------------------------------

/// A single value in an entity's open feature bag.
///
/// Serialized untagged, so on disk a feature is plain JSON
/// (`null`, `true`, `0.53`, `"dense"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
	Null,
	Bool(bool),
	Number(f64),
	Text(String),
}

impl fmt::Display for FeatureValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("null"),
			Self::Bool(b) => write!(f, "{}", b),
			Self::Number(n) => write!(f, "{}", n),
			Self::Text(s) => f.write_str(s),
		}
	}
}

impl From<bool> for FeatureValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<f64> for FeatureValue {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}

impl From<i64> for FeatureValue {
	fn from(value: i64) -> Self {
		Self::Number(value as f64)
	}
}

impl From<&str> for FeatureValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}

impl From<String> for FeatureValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}

fn require_non_empty(field: &str, value: &str) -> Result<(), StoreError> {
	if value.trim().is_empty() {
		return Err(StoreError::Validation(format!("{} must not be empty", field)));
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A method, paper, repository, benchmark, dataset, feature or metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
	/// Globally unique across all entity types; doubles as the storage key.
	pub id: String,
	pub name: String,
	pub entity_type: EntityType,
	#[serde(default)]
	pub features: BTreeMap<String, FeatureValue>,
	/// Free-form provenance: urls, authors, dates.
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default = "Utc::now")]
	pub created_at: DateTime<Utc>,
}

impl Entity {
	pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
		Self {
			id: id.into(),
			name: name.into(),
			entity_type,
			features: BTreeMap::new(),
			metadata: Map::new(),
			created_at: Utc::now(),
		}
	}

	pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
		self.features.insert(key.into(), value.into());
		self
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}

	pub fn feature(&self, key: &str) -> Option<&FeatureValue> {
		self.features.get(key)
	}

	pub fn validate(&self) -> Result<(), StoreError> {
		require_non_empty("Entity id", &self.id)?;
		require_non_empty("Entity name", &self.name)?;
		if let Some((key, _)) = self
			.features
			.iter()
			.find(|(_, v)| matches!(v, FeatureValue::Number(n) if !n.is_finite()))
		{
			return Err(StoreError::Validation(format!(
				"Feature '{}' of entity '{}' is not a finite number",
				key, self.id
			)));
		}
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Relationship
// ---------------------------------------------------------------------------

fn default_confidence() -> f64 {
	1.0
}

/// A directed, typed edge from `source_id` to `target_id`.
///
/// Endpoints are not checked against stored entities; see
/// `EntityStore::check_integrity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
	pub source_id: String,
	pub target_id: String,
	pub relation_type: RelationType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	#[serde(default)]
	pub properties: Map<String, Value>,
	/// Extractor confidence in `[0, 1]`; manual edges use 1.0.
	#[serde(default = "default_confidence")]
	pub confidence: f64,
	#[serde(default = "Utc::now")]
	pub created_at: DateTime<Utc>,
}

impl Relationship {
	pub fn new(
		source_id: impl Into<String>,
		target_id: impl Into<String>,
		relation_type: RelationType,
	) -> Self {
		Self {
			source_id: source_id.into(),
			target_id: target_id.into(),
			relation_type,
			note: None,
			properties: Map::new(),
			confidence: default_confidence(),
			created_at: Utc::now(),
		}
	}

	pub fn with_note(mut self, note: impl Into<String>) -> Self {
		self.note = Some(note.into());
		self
	}

	pub fn with_confidence(mut self, confidence: f64) -> Self {
		self.confidence = confidence;
		self
	}

	pub fn validate(&self) -> Result<(), StoreError> {
		require_non_empty("Relationship source_id", &self.source_id)?;
		require_non_empty("Relationship target_id", &self.target_id)?;
		if !(0.0..=1.0).contains(&self.confidence) {
			return Err(StoreError::Validation(format!(
				"Relationship confidence must be within [0, 1], got {}",
				self.confidence
			)));
		}
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// BenchmarkScore
// ---------------------------------------------------------------------------

/// One measurement of a method on a benchmark under a metric.
///
/// `(method_id, benchmark_id, metric_name)` identifies the score; saving the
/// same triple again replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkScore {
	pub method_id: String,
	pub benchmark_id: String,
	pub metric_name: String,
	pub score: f64,
	/// Hardware, run date, conditions.
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

impl BenchmarkScore {
	pub fn new(
		method_id: impl Into<String>,
		benchmark_id: impl Into<String>,
		metric_name: impl Into<String>,
		score: f64,
	) -> Self {
		Self {
			method_id: method_id.into(),
			benchmark_id: benchmark_id.into(),
			metric_name: metric_name.into(),
			score,
			metadata: Map::new(),
		}
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}

	pub fn validate(&self) -> Result<(), StoreError> {
		require_non_empty("BenchmarkScore method_id", &self.method_id)?;
		require_non_empty("BenchmarkScore benchmark_id", &self.benchmark_id)?;
		require_non_empty("BenchmarkScore metric_name", &self.metric_name)?;
		if !self.score.is_finite() {
			return Err(StoreError::Validation(format!(
				"Score for '{}' on '{}' ({}) is not finite",
				self.method_id, self.benchmark_id, self.metric_name
			)));
		}
		Ok(())
	}
}
