//! Total order used for every ranked list the store produces.

use std::cmp::Ordering;

use crate::config::MetricDirection;

/// What a ranked row is ordered by.
#[derive(Debug, Clone, Copy)]
pub struct RankKey<'a> {
	pub score: f64,
	pub name: &'a str,
	pub id: &'a str,
}

/// Better score first (per `direction`), then name ascending, then id
/// ascending so rows with equal score and name still order stably.
pub fn compare(direction: MetricDirection, a: &RankKey<'_>, b: &RankKey<'_>) -> Ordering {
	direction
		.compare(a.score, b.score)
		.then_with(|| a.name.cmp(b.name))
		.then_with(|| a.id.cmp(b.id))
}
