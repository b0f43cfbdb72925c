//! File-backed catalogue of research methods, their relationships and
//! benchmark scores, with ranking and feature comparison on top.
//!
//! Three layers, leaf first:
//!
//! - [`record_store::RecordStore`]: one JSON file per key.
//! - [`entity_store::EntityStore`]: entities, relationships and scores.
//! - [`comparison::ComparisonEngine`]: read-only ranking and comparison.

pub mod comparison;
pub mod config;
pub mod entity_store;
pub mod error;
pub mod model;
pub mod ranking;
pub mod record_store;

pub use comparison::{
	ComparisonEngine, FeatureCell, FeatureCountEntry, FeatureMatrix, FeatureRow, RankedEntry,
	RankingResult, SolutionCandidates, SotaResult,
};
pub use config::{MetricDirection, StoreConfig};
pub use entity_store::{
	EntityRef, EntityStore, IntegrityReport, RelationshipFilter, ScoreFilter, TopPerformer,
};
pub use error::StoreError;
pub use model::{BenchmarkScore, Entity, EntityType, FeatureValue, Relationship, RelationType};
pub use record_store::RecordStore;
