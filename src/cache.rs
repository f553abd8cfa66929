//! Timesliced caching of directory query results.
use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::query::ResultSet;

/// The fully substituted (base, filter) pair identifying one search.
pub(crate) type CacheKey = (String, String);

/// Query result cache invalidated wholesale at timeslice boundaries.
///
/// Invalidation is generational: whenever a lookup observes that the current
/// timeslice has advanced past the recorded one, the entire mapping is
/// discarded. Entries are never evicted individually and the mapping is
/// unbounded within a single timeslice.
#[derive(Debug)]
pub(crate) struct SearchCache {
	/// Width of one timeslice in seconds.
	period: i64,
	/// State shared by all executions of the owning query.
	state: Mutex<CacheState>,
}

/// Mutable state of a [`SearchCache`].
#[derive(Debug, Default)]
struct CacheState {
	/// Timeslice boundary observed by the most recent flush.
	last_timeslice: i64,
	/// Results stored during the current timeslice.
	entries: HashMap<CacheKey, ResultSet>,
}

impl SearchCache {
	/// Create an empty cache with the given period in seconds.
	pub(crate) fn new(period: u64) -> Self {
		Self {
			period: i64::try_from(period).unwrap_or(i64::MAX),
			state: Mutex::new(CacheState::default()),
		}
	}

	/// Look up a cached result, flushing the whole mapping first if the
	/// current timeslice has advanced.
	pub(crate) async fn lookup(&self, key: &CacheKey) -> Option<ResultSet> {
		self.lookup_at(key, OffsetDateTime::now_utc().unix_timestamp()).await
	}

	/// Timeslice-checked lookup against an explicit clock.
	async fn lookup_at(&self, key: &CacheKey, now: i64) -> Option<ResultSet> {
		let timeslice = timeslice(self.period, now);
		let mut state = self.state.lock().await;
		if timeslice > state.last_timeslice {
			tracing::debug!(
				new_timeslice = timeslice,
				last_timeslice = state.last_timeslice,
				"dumping query cache"
			);
			state.entries.clear();
			state.last_timeslice = timeslice;
		}
		state.entries.get(key).cloned()
	}

	/// Store a result under the given key.
	pub(crate) async fn store(&self, key: CacheKey, result: ResultSet) {
		self.state.lock().await.entries.insert(key, result);
	}
}

/// Start of the timeslice containing `when`.
fn timeslice(period: i64, when: i64) -> i64 {
	when - when.rem_euclid(period)
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::SearchCache;
	use crate::query::ResultSet;

	/// A one-entry result set for cache tests.
	fn sample_result(dn: &str) -> ResultSet {
		vec![(dn.to_owned(), std::collections::HashMap::new())]
	}

	#[test]
	fn timeslice_boundaries() {
		assert_eq!(super::timeslice(30, 100), 90);
		assert_eq!(super::timeslice(30, 119), 90);
		assert_eq!(super::timeslice(30, 120), 120);
		assert_eq!(super::timeslice(600, 1234), 1200);
	}

	#[tokio::test]
	async fn lookup_hits_within_the_same_timeslice() {
		let cache = SearchCache::new(30);
		let key = ("ou=people".to_owned(), "(uid=alice)".to_owned());

		assert_eq!(cache.lookup_at(&key, 100).await, None);
		cache.store(key.clone(), sample_result("uid=alice,ou=people")).await;

		assert_eq!(cache.lookup_at(&key, 101).await, Some(sample_result("uid=alice,ou=people")));
		assert_eq!(cache.lookup_at(&key, 119).await, Some(sample_result("uid=alice,ou=people")));
	}

	#[tokio::test]
	async fn advancing_the_timeslice_flushes_everything() {
		let cache = SearchCache::new(30);
		let first = ("ou=people".to_owned(), "(uid=alice)".to_owned());
		let second = ("ou=people".to_owned(), "(uid=bob)".to_owned());

		assert_eq!(cache.lookup_at(&first, 100).await, None);
		cache.store(first.clone(), sample_result("uid=alice,ou=people")).await;
		cache.store(second.clone(), sample_result("uid=bob,ou=people")).await;

		// A store immediately before the boundary does not survive it.
		assert_eq!(cache.lookup_at(&first, 120).await, None);
		assert_eq!(cache.lookup_at(&second, 121).await, None);
	}

	#[tokio::test]
	async fn stale_clock_does_not_flush() {
		let cache = SearchCache::new(30);
		let key = ("ou=people".to_owned(), "(uid=alice)".to_owned());

		assert_eq!(cache.lookup_at(&key, 100).await, None);
		cache.store(key.clone(), sample_result("uid=alice,ou=people")).await;

		// A lookup with an earlier clock stays within the recorded slice.
		assert_eq!(cache.lookup_at(&key, 95).await, Some(sample_result("uid=alice,ou=people")));
	}
}
