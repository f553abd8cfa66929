//! Cache-checked execution of registered directory searches.

use std::collections::HashMap;

use tracing::debug;

use crate::{
	cache::SearchCache,
	config::QueryConfig,
	error::Error,
	manager::ConnectionManager,
};

/// Attribute values of one directory entry, keyed by attribute name.
pub type AttributeMap = HashMap<String, Vec<String>>;

/// An ordered sequence of `(distinguished name, attributes)` pairs, in the
/// order the server returned them.
pub type ResultSet = Vec<(String, AttributeMap)>;

/// A registered directory search bound to its result cache.
///
/// One instance exists per realm for the login search and one for the groups
/// search. The definition is immutable after registration; the cache is
/// shared by every execution.
#[derive(Debug)]
pub struct LdapQuery {
	/// The search definition.
	config: QueryConfig,
	/// Results cached for the current timeslice.
	cache: SearchCache,
}

impl LdapQuery {
	/// Create a query from its definition.
	#[must_use]
	pub fn new(config: QueryConfig) -> Self {
		let cache = SearchCache::new(config.cache_period);
		Self { config, cache }
	}

	/// Execute the search with the given template substitutions.
	///
	/// The substituted `(base, filter)` pair doubles as the cache key. With a
	/// nonzero cache period the cache is consulted first and the mapped
	/// result is stored back after a miss. Entries without a distinguished
	/// name are dropped; an empty response yields an empty result set.
	pub async fn execute(
		&self,
		manager: &ConnectionManager,
		vars: &[(&str, &str)],
	) -> Result<ResultSet, Error> {
		let key = (substitute(&self.config.base, vars), substitute(&self.config.filter, vars));
		debug!(base = %key.0, filter = %key.1, "searching directory");

		if self.config.cache_period > 0 {
			if let Some(result) = self.cache.lookup(&key).await {
				debug!(base = %key.0, filter = %key.1, "result retrieved from cache");
				return Ok(result);
			}
		}

		let mut conn = manager.connect().await?;
		let searched =
			conn.search(&key.0, self.config.scope.into(), &key.1, self.config.attr_list()).await;
		match &searched {
			Ok(_) => conn.release().await,
			Err(_) => conn.discard().await,
		}

		let result: ResultSet = searched?
			.into_iter()
			.filter(|entry| !entry.dn.is_empty())
			.map(|entry| (entry.dn, entry.attrs))
			.collect();

		if self.config.cache_period > 0 {
			self.cache.store(key, result.clone()).await;
		}
		Ok(result)
	}
}

/// Replace `{name}` placeholders in a template with the given values.
/// Placeholders without a matching value are left as they are.
fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
	let mut rendered = template.to_owned();
	for (name, value) in vars {
		rendered = rendered.replace(&format!("{{{name}}}"), value);
	}
	rendered
}
