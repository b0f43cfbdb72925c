// ---------------------------------------------------------------------------
// EntityStore — typed layer over three record families
// ---------------------------------------------------------------------------
//
// Layout under the configured root:
//
//   entities/       one record per entity id
//   relationships/  one record per (source_id, relation_type, target_id)
//   benchmarks/     one record per (method_id, benchmark_id, metric_name)
//
// Every stored document carries a `type` discriminator next to its fields:
// the entity type, the relation type, or `benchmark_score`.
//
// Relationships and scores are never checked against stored entities on
// write. Reads that resolve them report missing endpoints as
// `EntityRef::Dangling` instead of failing.
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::{BenchmarkScore, Entity, EntityType, FeatureValue, Relationship, RelationType};
use crate::ranking::{self, RankKey};
use crate::record_store::RecordStore;

pub const ENTITIES_DIR: &str = "entities";
pub const RELATIONSHIPS_DIR: &str = "relationships";
pub const SCORES_DIR: &str = "benchmarks";

/// `type` discriminator stored on every benchmark score document.
pub const SCORE_MARKER: &str = "benchmark_score";

// ---------------------------------------------------------------------------
// Stored document shape
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TaggedRef<'a, T: Serialize> {
	#[serde(rename = "type")]
	kind: &'a str,
	#[serde(flatten)]
	record: &'a T,
}

#[derive(Deserialize)]
struct Tagged<T> {
	#[serde(rename = "type")]
	kind: String,
	#[serde(flatten)]
	record: T,
}

/// Join key parts with `/`, escaping `%` and `/` inside each part so the
/// compound key is unambiguous whatever the ids contain.
fn compound_key(parts: &[&str]) -> String {
	parts
		.iter()
		.map(|part| part.replace('%', "%25").replace('/', "%2F"))
		.collect::<Vec<_>>()
		.join("/")
}

fn relationship_key(source_id: &str, relation_type: RelationType, target_id: &str) -> String {
	compound_key(&[source_id, relation_type.as_str(), target_id])
}

fn score_key(method_id: &str, benchmark_id: &str, metric_name: &str) -> String {
	compound_key(&[method_id, benchmark_id, metric_name])
}

fn check_kind(key: &str, found: &str, expected: &str) -> Result<(), StoreError> {
	if found != expected {
		return Err(StoreError::Corruption(format!(
			"Record '{}' is tagged '{}', expected '{}'",
			key, found, expected
		)));
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

/// An entity id that may or may not resolve to a stored entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum EntityRef {
	Resolved(Entity),
	Dangling(String),
}

impl EntityRef {
	pub fn id(&self) -> &str {
		match self {
			Self::Resolved(entity) => &entity.id,
			Self::Dangling(id) => id,
		}
	}

	/// Display name; a dangling reference falls back to its raw id.
	pub fn name(&self) -> &str {
		match self {
			Self::Resolved(entity) => &entity.name,
			Self::Dangling(id) => id,
		}
	}

	pub fn entity(&self) -> Option<&Entity> {
		match self {
			Self::Resolved(entity) => Some(entity),
			Self::Dangling(_) => None,
		}
	}

	pub fn is_resolved(&self) -> bool {
		matches!(self, Self::Resolved(_))
	}
}

/// Conjunctive relationship filter; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RelationshipFilter {
	pub source_id: Option<String>,
	pub target_id: Option<String>,
	pub relation_type: Option<RelationType>,
}

impl RelationshipFilter {
	pub fn source(mut self, id: impl Into<String>) -> Self {
		self.source_id = Some(id.into());
		self
	}

	pub fn target(mut self, id: impl Into<String>) -> Self {
		self.target_id = Some(id.into());
		self
	}

	pub fn relation(mut self, relation_type: RelationType) -> Self {
		self.relation_type = Some(relation_type);
		self
	}

	pub fn matches(&self, rel: &Relationship) -> bool {
		self.source_id.as_deref().is_none_or(|id| rel.source_id == id)
			&& self.target_id.as_deref().is_none_or(|id| rel.target_id == id)
			&& self.relation_type.is_none_or(|t| rel.relation_type == t)
	}
}

/// Conjunctive score filter; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct ScoreFilter {
	pub method_id: Option<String>,
	pub benchmark_id: Option<String>,
	pub metric_name: Option<String>,
}

impl ScoreFilter {
	pub fn method(mut self, id: impl Into<String>) -> Self {
		self.method_id = Some(id.into());
		self
	}

	pub fn benchmark(mut self, id: impl Into<String>) -> Self {
		self.benchmark_id = Some(id.into());
		self
	}

	pub fn metric(mut self, name: impl Into<String>) -> Self {
		self.metric_name = Some(name.into());
		self
	}

	pub fn matches(&self, score: &BenchmarkScore) -> bool {
		self.method_id.as_deref().is_none_or(|id| score.method_id == id)
			&& self.benchmark_id.as_deref().is_none_or(|id| score.benchmark_id == id)
			&& self.metric_name.as_deref().is_none_or(|m| score.metric_name == m)
	}
}

/// A relationship with both endpoints looked up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRelationship {
	pub relationship: Relationship,
	pub source: EntityRef,
	pub target: EntityRef,
}

/// One row of `get_top_performers`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPerformer {
	pub method: EntityRef,
	pub score: f64,
	pub metric: String,
	pub benchmark: String,
	pub metadata: Map<String, Value>,
}

impl TopPerformer {
	pub fn rank_key(&self) -> RankKey<'_> {
		RankKey {
			score: self.score,
			name: self.method.name(),
			id: self.method.id(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DanglingRelationship {
	pub relationship: Relationship,
	pub missing_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DanglingScore {
	pub score: BenchmarkScore,
	pub missing_ids: Vec<String>,
}

/// Relationships and scores whose endpoints are not stored entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
	pub dangling_relationships: Vec<DanglingRelationship>,
	pub dangling_scores: Vec<DanglingScore>,
}

impl IntegrityReport {
	pub fn is_clean(&self) -> bool {
		self.dangling_relationships.is_empty() && self.dangling_scores.is_empty()
	}
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// Typed façade over the entity, relationship and score record stores.
///
/// Writes take `&mut self`: one handle is the single writer for its data
/// directory within a process.
#[derive(Debug)]
pub struct EntityStore {
	entities: RecordStore,
	relationships: RecordStore,
	scores: RecordStore,
	config: StoreConfig,
}

impl EntityStore {
	/// Open (creating if needed) the store rooted at `config.root_dir`.
	pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
		let root = config.root_dir.clone();
		for dir in [ENTITIES_DIR, RELATIONSHIPS_DIR, SCORES_DIR] {
			std::fs::create_dir_all(root.join(dir))?;
		}
		tracing::info!(root = %root.display(), "entity store opened");
		Ok(Self {
			entities: RecordStore::new(root.join(ENTITIES_DIR)),
			relationships: RecordStore::new(root.join(RELATIONSHIPS_DIR)),
			scores: RecordStore::new(root.join(SCORES_DIR)),
			config,
		})
	}

	pub fn config(&self) -> &StoreConfig {
		&self.config
	}

	// -- Entities ------------------------------------------------------------

	/// Insert or replace the entity with `entity.id`.
	pub fn save_entity(&mut self, entity: &Entity) -> Result<(), StoreError> {
		entity.validate()?;
		let doc = TaggedRef {
			kind: entity.entity_type.as_str(),
			record: entity,
		};
		self.entities.save(&entity.id, &doc)?;
		tracing::debug!(id = %entity.id, entity_type = %entity.entity_type, "entity saved");
		Ok(())
	}

	pub fn get_entity(&self, id: &str) -> Result<Entity, StoreError> {
		let tagged: Tagged<Entity> = self.entities.get(id).map_err(|e| match e {
			StoreError::NotFound(_) => StoreError::NotFound(format!("Entity not found: {}", id)),
			other => other,
		})?;
		check_kind(id, &tagged.kind, tagged.record.entity_type.as_str())?;
		Ok(tagged.record)
	}

	/// Best-effort lookup: a missing entity becomes `EntityRef::Dangling`.
	/// Storage and corruption errors still propagate.
	pub fn resolve(&self, id: &str) -> Result<EntityRef, StoreError> {
		match self.get_entity(id) {
			Ok(entity) => Ok(EntityRef::Resolved(entity)),
			Err(StoreError::NotFound(_)) => {
				tracing::warn!(id, "dangling entity reference");
				Ok(EntityRef::Dangling(id.to_string()))
			}
			Err(e) => Err(e),
		}
	}

	/// Remove an entity. Relationships and scores that reference it are
	/// left in place.
	pub fn delete_entity(&mut self, id: &str) -> Result<(), StoreError> {
		self.entities.delete(id)?;
		tracing::debug!(id, "entity deleted");
		Ok(())
	}

	/// All entities, optionally of one type, in no particular order.
	pub fn list_entities(&self, entity_type: Option<EntityType>) -> Result<Vec<Entity>, StoreError> {
		let mut out = Vec::new();
		for (key, tagged) in self.entities.list::<Tagged<Entity>>()? {
			check_kind(&key, &tagged.kind, tagged.record.entity_type.as_str())?;
			if entity_type.is_none_or(|t| tagged.record.entity_type == t) {
				out.push(tagged.record);
			}
		}
		Ok(out)
	}

	/// Case-insensitive substring search over entity names and the
	/// stringified values of their features. Unranked.
	pub fn search_entities(
		&self,
		query: &str,
		entity_type: Option<EntityType>,
	) -> Result<Vec<Entity>, StoreError> {
		let needle = query.to_lowercase();
		let results = self
			.list_entities(entity_type)?
			.into_iter()
			.filter(|entity| entity_matches(entity, &needle))
			.collect();
		Ok(results)
	}

	// -- Relationships -------------------------------------------------------

	/// Insert or replace the edge identified by (source, relation, target).
	pub fn save_relationship(&mut self, relationship: &Relationship) -> Result<(), StoreError> {
		relationship.validate()?;
		let key = relationship_key(
			&relationship.source_id,
			relationship.relation_type,
			&relationship.target_id,
		);
		let doc = TaggedRef {
			kind: relationship.relation_type.as_str(),
			record: relationship,
		};
		self.relationships.save(&key, &doc)?;
		tracing::debug!(
			source = %relationship.source_id,
			target = %relationship.target_id,
			relation = %relationship.relation_type,
			"relationship saved"
		);
		Ok(())
	}

	pub fn delete_relationship(
		&mut self,
		source_id: &str,
		target_id: &str,
		relation_type: RelationType,
	) -> Result<(), StoreError> {
		self.relationships
			.delete(&relationship_key(source_id, relation_type, target_id))
	}

	pub fn list_relationships(
		&self,
		filter: &RelationshipFilter,
	) -> Result<Vec<Relationship>, StoreError> {
		let mut out = Vec::new();
		for (key, tagged) in self.relationships.list::<Tagged<Relationship>>()? {
			check_kind(&key, &tagged.kind, tagged.record.relation_type.as_str())?;
			if filter.matches(&tagged.record) {
				out.push(tagged.record);
			}
		}
		Ok(out)
	}

	/// `list_relationships` with both endpoints resolved best-effort.
	pub fn list_resolved_relationships(
		&self,
		filter: &RelationshipFilter,
	) -> Result<Vec<ResolvedRelationship>, StoreError> {
		self.list_relationships(filter)?
			.into_iter()
			.map(|relationship| -> Result<ResolvedRelationship, StoreError> {
				Ok(ResolvedRelationship {
					source: self.resolve(&relationship.source_id)?,
					target: self.resolve(&relationship.target_id)?,
					relationship,
				})
			})
			.collect()
	}

	// -- Benchmark scores ----------------------------------------------------

	/// Insert or replace the score for (method, benchmark, metric).
	pub fn save_benchmark_score(&mut self, score: &BenchmarkScore) -> Result<(), StoreError> {
		score.validate()?;
		let key = score_key(&score.method_id, &score.benchmark_id, &score.metric_name);
		let doc = TaggedRef {
			kind: SCORE_MARKER,
			record: score,
		};
		self.scores.save(&key, &doc)?;
		tracing::debug!(
			method = %score.method_id,
			benchmark = %score.benchmark_id,
			metric = %score.metric_name,
			score = score.score,
			"benchmark score saved"
		);
		Ok(())
	}

	pub fn delete_benchmark_score(
		&mut self,
		method_id: &str,
		benchmark_id: &str,
		metric_name: &str,
	) -> Result<(), StoreError> {
		self.scores
			.delete(&score_key(method_id, benchmark_id, metric_name))
	}

	pub fn list_scores(&self, filter: &ScoreFilter) -> Result<Vec<BenchmarkScore>, StoreError> {
		let mut out = Vec::new();
		for (key, tagged) in self.scores.list::<Tagged<BenchmarkScore>>()? {
			check_kind(&key, &tagged.kind, SCORE_MARKER)?;
			if filter.matches(&tagged.record) {
				out.push(tagged.record);
			}
		}
		Ok(out)
	}

	/// Best `limit` methods on `benchmark_id` under `metric_name`.
	///
	/// Ordered by score in the metric's configured direction, ties by
	/// method name then id. Methods whose entity is missing are kept as
	/// `EntityRef::Dangling` and ranked by their raw id.
	pub fn get_top_performers(
		&self,
		benchmark_id: &str,
		metric_name: &str,
		limit: usize,
	) -> Result<Vec<TopPerformer>, StoreError> {
		let filter = ScoreFilter::default()
			.benchmark(benchmark_id)
			.metric(metric_name);

		let mut rows = Vec::new();
		for score in self.list_scores(&filter)? {
			rows.push(TopPerformer {
				method: self.resolve(&score.method_id)?,
				score: score.score,
				metric: score.metric_name,
				benchmark: score.benchmark_id,
				metadata: score.metadata,
			});
		}

		let direction = self.config.direction_for(metric_name);
		rows.sort_by(|a, b| ranking::compare(direction, &a.rank_key(), &b.rank_key()));
		rows.truncate(limit);
		Ok(rows)
	}

	// -- Integrity -----------------------------------------------------------

	/// Scan relationships and scores for endpoints that are not stored.
	pub fn check_integrity(&self) -> Result<IntegrityReport, StoreError> {
		let mut report = IntegrityReport::default();

		for relationship in self.list_relationships(&RelationshipFilter::default())? {
			let missing =
				self.missing_ids(&[relationship.source_id.as_str(), relationship.target_id.as_str()])?;
			if !missing.is_empty() {
				report.dangling_relationships.push(DanglingRelationship {
					relationship,
					missing_ids: missing,
				});
			}
		}

		for score in self.list_scores(&ScoreFilter::default())? {
			let missing = self.missing_ids(&[score.method_id.as_str(), score.benchmark_id.as_str()])?;
			if !missing.is_empty() {
				report.dangling_scores.push(DanglingScore {
					score,
					missing_ids: missing,
				});
			}
		}

		Ok(report)
	}

	fn missing_ids(&self, ids: &[&str]) -> Result<Vec<String>, StoreError> {
		let mut missing: Vec<String> = Vec::new();
		for &id in ids {
			if !self.entities.contains(id)? && !missing.iter().any(|m| m == id) {
				missing.push(id.to_string());
			}
		}
		Ok(missing)
	}
}

fn entity_matches(entity: &Entity, needle: &str) -> bool {
	if entity.name.to_lowercase().contains(needle) {
		return true;
	}
	entity.features.values().any(|value| {
		!matches!(value, FeatureValue::Null)
			&& value.to_string().to_lowercase().contains(needle)
	})
}
