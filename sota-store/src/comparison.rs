// ---------------------------------------------------------------------------
// ComparisonEngine — read-only ranking and feature comparison
// ---------------------------------------------------------------------------
//
// Queries over an `EntityStore`:
//
// - benchmark ranking (every method scored on a benchmark/metric),
// - feature matrix (entities as rows, union of feature keys as columns,
//   plus a ranking of the rows by how many features each entity records),
// - state-of-the-art search (domain text filter ∩ benchmark ranking, plus
//   the feature matrix of the ranked methods),
// - solution search without a benchmark (domain text filter ranked by
//   feature count).
//
// Nothing here writes. "No candidates" is an empty result, never an error.
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::MetricDirection;
use crate::entity_store::{EntityRef, EntityStore, TopPerformer};
use crate::error::StoreError;
use crate::model::{Entity, EntityType, FeatureValue};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One row of a benchmark ranking. `rank` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
	pub rank: usize,
	pub id: String,
	pub name: String,
	pub score: f64,
	pub metric: String,
	/// False when the scored method id has no stored entity.
	pub resolved: bool,
	pub features: BTreeMap<String, FeatureValue>,
	/// Metadata recorded with the score (hardware, run date ...).
	pub score_metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingResult {
	pub benchmark_id: String,
	pub metric_name: String,
	pub direction: MetricDirection,
	pub entries: Vec<RankedEntry>,
}

impl RankingResult {
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn best(&self) -> Option<&RankedEntry> {
		self.entries.first()
	}

	pub fn ids(&self) -> Vec<&str> {
		self.entries.iter().map(|e| e.id.as_str()).collect()
	}
}

/// A matrix cell. `Absent` means the entity has no such feature, which is
/// distinct from any stored value (including `0`, `""` and `null`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FeatureCell {
	Present(FeatureValue),
	Absent,
}

impl FeatureCell {
	pub fn value(&self) -> Option<&FeatureValue> {
		match self {
			Self::Present(v) => Some(v),
			Self::Absent => None,
		}
	}

	pub fn is_absent(&self) -> bool {
		matches!(self, Self::Absent)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
	pub entity_id: String,
	pub name: String,
	/// One cell per matrix column, no more and no fewer.
	pub cells: BTreeMap<String, FeatureCell>,
}

/// An entity ranked by the number of features it records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCountEntry {
	pub rank: usize,
	pub entity_id: String,
	pub name: String,
	pub entity_type: EntityType,
	/// All of the entity's features, not only the matrix columns.
	pub feature_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureMatrix {
	pub columns: Vec<String>,
	pub rows: Vec<FeatureRow>,
	/// The rows' entities, most features first, then name, then id.
	pub feature_ranking: Vec<FeatureCountEntry>,
	/// Requested ids that have no stored entity.
	pub unresolved: Vec<String>,
}

impl FeatureMatrix {
	/// Rows × columns from `entities`, in the given order.
	///
	/// With `columns == None` the columns are the sorted union of every
	/// entity's feature keys.
	pub fn build(entities: &[Entity], columns: Option<&[&str]>) -> Self {
		let columns: Vec<String> = match columns {
			Some(cols) => {
				let mut seen = HashSet::new();
				cols.iter()
					.filter(|c| seen.insert(**c))
					.map(|c| c.to_string())
					.collect()
			}
			None => entities
				.iter()
				.flat_map(|e| e.features.keys().cloned())
				.collect::<BTreeSet<_>>()
				.into_iter()
				.collect(),
		};

		let rows = entities
			.iter()
			.map(|entity| FeatureRow {
				entity_id: entity.id.clone(),
				name: entity.name.clone(),
				cells: columns
					.iter()
					.map(|col| {
						let cell = match entity.feature(col) {
							Some(v) => FeatureCell::Present(v.clone()),
							None => FeatureCell::Absent,
						};
						(col.clone(), cell)
					})
					.collect(),
			})
			.collect();

		let mut by_count: Vec<&Entity> = entities.iter().collect();
		by_count.sort_by(|a, b| feature_count_order(a, b));
		let feature_ranking = by_count
			.into_iter()
			.enumerate()
			.map(|(i, entity)| FeatureCountEntry {
				rank: i + 1,
				entity_id: entity.id.clone(),
				name: entity.name.clone(),
				entity_type: entity.entity_type,
				feature_count: entity.features.len(),
			})
			.collect();

		Self {
			columns,
			rows,
			feature_ranking,
			unresolved: Vec::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn row(&self, entity_id: &str) -> Option<&FeatureRow> {
		self.rows.iter().find(|r| r.entity_id == entity_id)
	}

	pub fn cell(&self, entity_id: &str, column: &str) -> Option<&FeatureCell> {
		self.row(entity_id)?.cells.get(column)
	}

	pub fn absent_count(&self) -> usize {
		self.rows
			.iter()
			.flat_map(|r| r.cells.values())
			.filter(|c| c.is_absent())
			.count()
	}
}

/// Answer to "which method is best for `query` on this benchmark/metric".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SotaResult {
	pub query: String,
	/// Methods the domain filter matched, scored or not.
	pub candidate_count: usize,
	pub ranking: RankingResult,
	pub feature_matrix: FeatureMatrix,
}

impl SotaResult {
	pub fn best(&self) -> Option<&RankedEntry> {
		self.ranking.best()
	}
}

/// Domain-matched methods when no benchmark is named.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionCandidates {
	pub query: String,
	/// Methods the domain filter matched, before the limit.
	pub candidate_count: usize,
	/// Rows in candidate order; `feature_ranking` holds the ranks.
	pub feature_matrix: FeatureMatrix,
}

impl SolutionCandidates {
	pub fn candidates(&self) -> &[FeatureCountEntry] {
		&self.feature_matrix.feature_ranking
	}

	pub fn ids(&self) -> Vec<&str> {
		self.candidates().iter().map(|c| c.entity_id.as_str()).collect()
	}
}

fn feature_count_order(a: &Entity, b: &Entity) -> Ordering {
	b.features
		.len()
		.cmp(&a.features.len())
		.then_with(|| a.name.cmp(&b.name))
		.then_with(|| a.id.cmp(&b.id))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ComparisonEngine<'a> {
	store: &'a EntityStore,
}

impl<'a> ComparisonEngine<'a> {
	pub fn new(store: &'a EntityStore) -> Self {
		Self { store }
	}

	/// Every method scored on `benchmark_id`/`metric_name`, best first.
	pub fn compare_methods_on_benchmark(
		&self,
		benchmark_id: &str,
		metric_name: &str,
	) -> Result<RankingResult, StoreError> {
		let performers = self
			.store
			.get_top_performers(benchmark_id, metric_name, usize::MAX)?;
		let ranking = self.ranking_from(benchmark_id, metric_name, performers);
		tracing::debug!(
			benchmark = benchmark_id,
			metric = metric_name,
			ranked = ranking.entries.len(),
			"benchmark comparison"
		);
		Ok(ranking)
	}

	/// Feature matrix over `entity_ids` (duplicates collapsed, request order
	/// kept). Ids without an entity go to `unresolved`.
	pub fn compare_entities_by_features(
		&self,
		entity_ids: &[&str],
		columns: Option<&[&str]>,
	) -> Result<FeatureMatrix, StoreError> {
		let mut seen = HashSet::new();
		let mut entities = Vec::new();
		let mut unresolved = Vec::new();
		for id in entity_ids.iter().filter(|id| seen.insert(**id)) {
			match self.store.resolve(id)? {
				EntityRef::Resolved(entity) => entities.push(entity),
				EntityRef::Dangling(id) => unresolved.push(id),
			}
		}

		let mut matrix = FeatureMatrix::build(&entities, columns);
		matrix.unresolved = unresolved;
		Ok(matrix)
	}

	/// Rank the methods matching `query` that are scored on the benchmark.
	///
	/// The domain filter is `search_entities(query, Method)`, a permissive
	/// substring match. The ranking uses the same order as
	/// `compare_methods_on_benchmark`; the feature matrix follows it.
	pub fn find_best_solution(
		&self,
		query: &str,
		benchmark_id: &str,
		metric_name: &str,
	) -> Result<SotaResult, StoreError> {
		let candidates: HashSet<String> = self
			.store
			.search_entities(query, Some(EntityType::Method))?
			.into_iter()
			.map(|e| e.id)
			.collect();

		let performers: Vec<TopPerformer> = if candidates.is_empty() {
			Vec::new()
		} else {
			self.store
				.get_top_performers(benchmark_id, metric_name, usize::MAX)?
				.into_iter()
				.filter(|p| p.method.is_resolved() && candidates.contains(p.method.id()))
				.collect()
		};

		let ranked_entities: Vec<Entity> = performers
			.iter()
			.filter_map(|p| p.method.entity().cloned())
			.collect();
		let ranking = self.ranking_from(benchmark_id, metric_name, performers);
		let feature_matrix = FeatureMatrix::build(&ranked_entities, None);

		tracing::debug!(
			query,
			benchmark = benchmark_id,
			metric = metric_name,
			candidates = candidates.len(),
			ranked = ranking.entries.len(),
			"state-of-the-art search"
		);

		Ok(SotaResult {
			query: query.to_string(),
			candidate_count: candidates.len(),
			ranking,
			feature_matrix,
		})
	}

	/// Methods matching `query` without a benchmark: at most `limit` of
	/// them, most features first, then name, then id. The feature matrix
	/// rows follow the same order.
	pub fn find_solutions(&self, query: &str, limit: usize) -> Result<SolutionCandidates, StoreError> {
		let mut candidates = self.store.search_entities(query, Some(EntityType::Method))?;
		let candidate_count = candidates.len();
		candidates.sort_by(feature_count_order);
		candidates.truncate(limit);
		let feature_matrix = FeatureMatrix::build(&candidates, None);

		tracing::debug!(
			query,
			candidates = candidate_count,
			kept = candidates.len(),
			"solution search"
		);

		Ok(SolutionCandidates {
			query: query.to_string(),
			candidate_count,
			feature_matrix,
		})
	}

	fn ranking_from(
		&self,
		benchmark_id: &str,
		metric_name: &str,
		performers: Vec<TopPerformer>,
	) -> RankingResult {
		let entries = performers
			.into_iter()
			.enumerate()
			.map(|(i, p)| RankedEntry {
				rank: i + 1,
				id: p.method.id().to_string(),
				name: p.method.name().to_string(),
				score: p.score,
				metric: p.metric,
				resolved: p.method.is_resolved(),
				features: p
					.method
					.entity()
					.map(|e| e.features.clone())
					.unwrap_or_default(),
				score_metadata: p.metadata,
			})
			.collect();

		RankingResult {
			benchmark_id: benchmark_id.to_string(),
			metric_name: metric_name.to_string(),
			direction: self.store.config().direction_for(metric_name),
			entries,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::StoreConfig;
	use crate::model::BenchmarkScore;
	use serde_json::json;

	fn temp_store() -> (tempfile::TempDir, EntityStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = EntityStore::open(StoreConfig::with_root(dir.path())).unwrap();
		(dir, store)
	}

	fn scored_method(store: &mut EntityStore, id: &str, name: &str, score: f64) {
		store
			.save_entity(&Entity::new(id, name, EntityType::Method).with_feature("family", "retrieval"))
			.unwrap();
		store
			.save_benchmark_score(&BenchmarkScore::new(id, "bench", "acc", score))
			.unwrap();
	}

	#[test]
	fn benchmark_ranking_is_complete_and_numbered() {
		let (_dir, mut store) = temp_store();
		for i in 0..12 {
			scored_method(&mut store, &format!("m{:02}", i), &format!("Method {:02}", i), i as f64);
		}
		let engine = ComparisonEngine::new(&store);
		let ranking = engine.compare_methods_on_benchmark("bench", "acc").unwrap();

		assert_eq!(ranking.entries.len(), 12);
		assert_eq!(ranking.best().unwrap().id, "m11");
		assert_eq!(ranking.direction, MetricDirection::Higher);
		for (i, entry) in ranking.entries.iter().enumerate() {
			assert_eq!(entry.rank, i + 1);
			assert_eq!(entry.metric, "acc");
			assert_eq!(entry.features["family"], FeatureValue::from("retrieval"));
		}
	}

	#[test]
	fn benchmark_ranking_on_unknown_benchmark_is_empty() {
		let (_dir, store) = temp_store();
		let engine = ComparisonEngine::new(&store);
		let ranking = engine.compare_methods_on_benchmark("nothing", "acc").unwrap();
		assert!(ranking.is_empty());
		assert!(ranking.best().is_none());
	}

	#[test]
	fn disjoint_features_produce_union_with_absence_markers() {
		let (_dir, mut store) = temp_store();
		store
			.save_entity(&Entity::new("x", "X", EntityType::Method).with_feature("year", 2020))
			.unwrap();
		store
			.save_entity(&Entity::new("y", "Y", EntityType::Method).with_feature("arch", "dense"))
			.unwrap();

		let engine = ComparisonEngine::new(&store);
		let matrix = engine.compare_entities_by_features(&["x", "y"], None).unwrap();

		assert_eq!(matrix.columns, vec!["arch".to_string(), "year".to_string()]);
		assert_eq!(matrix.rows.len(), 2);
		assert_eq!(matrix.absent_count(), 2);
		assert_eq!(matrix.cell("x", "year"), Some(&FeatureCell::Present(FeatureValue::from(2020))));
		assert_eq!(matrix.cell("x", "arch"), Some(&FeatureCell::Absent));
		assert_eq!(matrix.cell("y", "year"), Some(&FeatureCell::Absent));
		assert_eq!(matrix.cell("y", "arch").and_then(|c| c.value()), Some(&FeatureValue::from("dense")));
	}

	#[test]
	fn zero_is_not_absent() {
		let (_dir, mut store) = temp_store();
		store
			.save_entity(&Entity::new("z", "Z", EntityType::Method).with_feature("params", 0))
			.unwrap();
		store.save_entity(&Entity::new("w", "W", EntityType::Method)).unwrap();

		let engine = ComparisonEngine::new(&store);
		let matrix = engine.compare_entities_by_features(&["z", "w"], None).unwrap();
		assert_eq!(matrix.cell("z", "params"), Some(&FeatureCell::Present(FeatureValue::Number(0.0))));
		assert_eq!(matrix.cell("w", "params"), Some(&FeatureCell::Absent));

		let json = serde_json::to_value(&matrix).unwrap();
		assert_eq!(json["rows"][0]["cells"]["params"], json!({ "state": "present", "value": 0.0 }));
		assert_eq!(json["rows"][1]["cells"]["params"], json!({ "state": "absent" }));
	}

	#[test]
	fn feature_comparison_reports_missing_ids_and_honours_columns() {
		let (_dir, mut store) = temp_store();
		store
			.save_entity(
				&Entity::new("a", "A", EntityType::Method)
					.with_feature("year", 2021)
					.with_feature("arch", "sparse"),
			)
			.unwrap();

		let engine = ComparisonEngine::new(&store);
		let matrix = engine
			.compare_entities_by_features(&["a", "ghost", "a"], Some(&["year", "license", "year"][..]))
			.unwrap();
		assert_eq!(matrix.columns, vec!["year".to_string(), "license".to_string()]);
		assert_eq!(matrix.rows.len(), 1);
		assert_eq!(matrix.unresolved, vec!["ghost".to_string()]);
		assert_eq!(matrix.cell("a", "license"), Some(&FeatureCell::Absent));
		assert_eq!(matrix.cell("a", "arch"), None);
		assert_eq!(matrix.feature_ranking.len(), 1);
		assert_eq!(matrix.feature_ranking[0].feature_count, 2);
	}

	#[test]
	fn feature_ranking_orders_by_count_then_name() {
		let (_dir, mut store) = temp_store();
		store
			.save_entity(
				&Entity::new("rich", "Zeta", EntityType::Method)
					.with_feature("year", 2021)
					.with_feature("arch", "dense")
					.with_feature("license", "mit"),
			)
			.unwrap();
		store
			.save_entity(&Entity::new("b", "Beta", EntityType::Method).with_feature("year", 2019))
			.unwrap();
		store
			.save_entity(&Entity::new("a", "Alpha", EntityType::Paper).with_feature("arch", "sparse"))
			.unwrap();
		store.save_entity(&Entity::new("bare", "Bare", EntityType::Method)).unwrap();

		let engine = ComparisonEngine::new(&store);
		let matrix = engine
			.compare_entities_by_features(&["bare", "b", "a", "rich"], Some(&["year"][..]))
			.unwrap();

		let row_ids: Vec<&str> = matrix.rows.iter().map(|r| r.entity_id.as_str()).collect();
		assert_eq!(row_ids, vec!["bare", "b", "a", "rich"]);
		let ranked: Vec<(&str, usize, usize)> = matrix
			.feature_ranking
			.iter()
			.map(|e| (e.entity_id.as_str(), e.rank, e.feature_count))
			.collect();
		assert_eq!(ranked, vec![("rich", 1, 3), ("a", 2, 1), ("b", 3, 1), ("bare", 4, 0)]);
		assert_eq!(matrix.feature_ranking[1].entity_type, EntityType::Paper);
	}

	#[test]
	fn sota_intersects_domain_with_scored_methods() {
		let (_dir, mut store) = temp_store();
		for (id, name, score) in [("dpr", "DPR", 0.530), ("colbert", "ColBERT", 0.521), ("retro", "RETRO", 0.573)] {
			store
				.save_entity(&Entity::new(id, name, EntityType::Method).with_feature("domain", "RAG"))
				.unwrap();
			store
				.save_benchmark_score(&BenchmarkScore::new(id, "benchmark_beir", "NDCG@10", score))
				.unwrap();
		}
		// Scored but outside the domain.
		store.save_entity(&Entity::new("resnet", "ResNet", EntityType::Method)).unwrap();
		store
			.save_benchmark_score(&BenchmarkScore::new("resnet", "benchmark_beir", "NDCG@10", 0.9))
			.unwrap();
		// In the domain but unscored.
		store
			.save_entity(&Entity::new("rag_fusion", "RAG-Fusion", EntityType::Method))
			.unwrap();

		let engine = ComparisonEngine::new(&store);
		let result = engine.find_best_solution("RAG", "benchmark_beir", "NDCG@10").unwrap();

		assert_eq!(result.ranking.ids(), vec!["retro", "dpr", "colbert"]);
		assert_eq!(result.candidate_count, 4);
		assert_eq!(result.best().unwrap().name, "RETRO");
		let matrix_ids: Vec<&str> = result.feature_matrix.rows.iter().map(|r| r.entity_id.as_str()).collect();
		assert_eq!(matrix_ids, vec!["retro", "dpr", "colbert"]);
		assert_eq!(result.feature_matrix.columns, vec!["domain".to_string()]);
	}

	#[test]
	fn sota_with_no_match_is_empty_not_error() {
		let (_dir, mut store) = temp_store();
		scored_method(&mut store, "m", "Method", 0.5);

		let engine = ComparisonEngine::new(&store);
		let result = engine.find_best_solution("diffusion", "bench", "acc").unwrap();
		assert!(result.ranking.is_empty());
		assert!(result.feature_matrix.is_empty());
		assert_eq!(result.candidate_count, 0);

		let result = engine.find_best_solution("method", "other-bench", "acc").unwrap();
		assert!(result.ranking.is_empty());
		assert_eq!(result.candidate_count, 1);
	}

	#[test]
	fn solutions_without_benchmark_rank_by_feature_count_and_cap() {
		let (_dir, mut store) = temp_store();
		for i in 0..12 {
			let mut entity = Entity::new(format!("m{:02}", i), format!("RAG {:02}", i), EntityType::Method);
			for f in 0..(i % 3) {
				entity = entity.with_feature(format!("f{}", f), f as i64);
			}
			store.save_entity(&entity).unwrap();
		}
		store
			.save_entity(&Entity::new("paper", "RAG survey", EntityType::Paper).with_feature("a", 1))
			.unwrap();

		let engine = ComparisonEngine::new(&store);
		let result = engine.find_solutions("rag", 10).unwrap();

		assert_eq!(result.candidate_count, 12);
		assert_eq!(
			result.ids(),
			vec!["m02", "m05", "m08", "m11", "m01", "m04", "m07", "m10", "m00", "m03"]
		);
		let ranks: Vec<usize> = result.candidates().iter().map(|c| c.rank).collect();
		assert_eq!(ranks, (1..=10).collect::<Vec<_>>());
		assert_eq!(result.candidates()[0].feature_count, 2);

		let matrix_ids: Vec<&str> = result.feature_matrix.rows.iter().map(|r| r.entity_id.as_str()).collect();
		assert_eq!(matrix_ids, result.ids());
		assert_eq!(result.feature_matrix.columns, vec!["f0".to_string(), "f1".to_string()]);
		assert_eq!(result.feature_matrix.cell("m03", "f0"), Some(&FeatureCell::Absent));

		let none = engine.find_solutions("diffusion", 10).unwrap();
		assert_eq!(none.candidate_count, 0);
		assert!(none.feature_matrix.is_empty());
	}
}
