//! Per-realm registration of connection managers and queries.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
	config::{ManagerConfig, QueryConfig},
	connector::Connector,
	error::Error,
	manager::ConnectionManager,
	query::LdapQuery,
};

/// Identifies one directory backend configuration.
///
/// Realms partition independent sets of connection manager, login query and
/// groups query, so multiple directory backends can coexist. The key is
/// structured rather than a delimited string, so realm names cannot collide
/// with the base identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Realm {
	/// The unnamed realm used when no realm is specified.
	#[default]
	Default,
	/// A named realm.
	Named(String),
}

impl Realm {
	/// Create a named realm.
	#[must_use]
	pub fn named(name: impl Into<String>) -> Self {
		Self::Named(name.into())
	}
}

impl fmt::Display for Realm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Default => f.write_str("default"),
			Self::Named(name) => f.write_str(name),
		}
	}
}

/// Everything registered for one realm.
#[derive(Debug, Default)]
struct RealmState {
	/// The realm's connection manager, present once setup ran.
	manager: Option<Arc<ConnectionManager>>,
	/// The registered login query.
	login_query: Option<Arc<LdapQuery>>,
	/// The registered groups query.
	groups_query: Option<Arc<LdapQuery>>,
}

/// Explicit per-realm configuration map owned by the application context.
///
/// The host environment registers a connection manager and the two queries
/// for each realm during setup, then hands out request-scoped [`Connector`]s
/// through [`connector`]. Registration order within a realm does not matter;
/// using a realm that was never set up is a configuration error.
///
/// [`connector`]: Self::connector
#[derive(Debug, Default)]
pub struct DirectoryRegistry {
	/// State per realm.
	realms: HashMap<Realm, RealmState>,
}

impl DirectoryRegistry {
	/// Create an empty registry.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Set up the connection manager for a realm.
	///
	/// Parses the configured endpoint URIs; fails with [`Error::Invalid`]
	/// when none are given or one is malformed. Calling this again for the
	/// same realm replaces the manager and drops its pooled connections.
	pub fn setup(&mut self, realm: Realm, config: ManagerConfig) -> Result<(), Error> {
		let manager = ConnectionManager::new(config, realm.clone())?;
		self.realms.entry(realm).or_default().manager = Some(Arc::new(manager));
		Ok(())
	}

	/// Register the login query for a realm.
	///
	/// The query's base and filter templates may reference `{login}` and
	/// `{password}`. The search must match exactly one entry for a login to
	/// be considered valid.
	pub fn set_login_query(&mut self, realm: Realm, config: QueryConfig) {
		self.realms.entry(realm).or_default().login_query = Some(Arc::new(LdapQuery::new(config)));
	}

	/// Register the groups query for a realm.
	///
	/// The query's base and filter templates may reference `{userdn}`.
	pub fn set_groups_query(&mut self, realm: Realm, config: QueryConfig) {
		self.realms.entry(realm).or_default().groups_query = Some(Arc::new(LdapQuery::new(config)));
	}

	/// Get a connector bound to a realm's manager and queries.
	///
	/// Fails with [`Error::Configuration`] when [`setup`] was never called
	/// for the realm. Missing queries are detected when the connector is
	/// used, not here, so registration order stays flexible.
	///
	/// [`setup`]: Self::setup
	pub fn connector(&self, realm: &Realm) -> Result<Connector, Error> {
		let state = self.realms.get(realm);
		let manager = state.and_then(|state| state.manager.clone()).ok_or_else(|| {
			Error::Configuration(format!("setup was not called for realm {realm}"))
		})?;
		Ok(Connector::new(
			manager,
			state.and_then(|state| state.login_query.clone()),
			state.and_then(|state| state.groups_query.clone()),
			realm.clone(),
		))
	}
}
