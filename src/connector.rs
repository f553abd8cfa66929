//! Login verification and group resolution on top of the registered queries.

use std::sync::Arc;

use tracing::debug;

use crate::{
	error::Error,
	escape::escape_filter,
	manager::ConnectionManager,
	query::{AttributeMap, LdapQuery, ResultSet},
	registry::Realm,
};

/// Request-scoped facade for authenticating logins and resolving group
/// memberships against one realm's directory backend.
///
/// Connectors are cheap to create, one per request; they share the realm's
/// [`ConnectionManager`] and [`LdapQuery`] instances (and thereby the query
/// caches) with every other connector of the same realm.
#[derive(Clone, Debug)]
pub struct Connector {
	/// The realm's connection manager.
	manager: Arc<ConnectionManager>,
	/// The registered login query, if any.
	login_query: Option<Arc<LdapQuery>>,
	/// The registered groups query, if any.
	groups_query: Option<Arc<LdapQuery>>,
	/// The realm this connector serves, for diagnostics.
	realm: Realm,
}

impl Connector {
	/// Create a connector over a realm's manager and registered queries.
	#[must_use]
	pub fn new(
		manager: Arc<ConnectionManager>,
		login_query: Option<Arc<LdapQuery>>,
		groups_query: Option<Arc<LdapQuery>>,
		realm: Realm,
	) -> Self {
		Self { manager, login_query, groups_query, realm }
	}

	/// Validate the given login name and password.
	///
	/// Returns the `(dn, attributes)` pair of the matching directory entry
	/// when the user exists, matches uniquely and the password verifies
	/// against a fresh bind as that entry. Returns `None` otherwise; a
	/// failed or rejected verification bind is indistinguishable from an
	/// unknown user.
	///
	/// A zero-length password is always considered invalid since it would
	/// result in a request for "unauthenticated authentication" (RFC 4513
	/// section 5.1.2), which must not be used for authentication. No
	/// directory operation is performed in that case.
	///
	/// Fails with [`Error::Configuration`] when no login query was
	/// registered for the realm.
	pub async fn authenticate(
		&self,
		login: &str,
		password: &str,
	) -> Result<Option<(String, AttributeMap)>, Error> {
		if password.is_empty() {
			return Ok(None);
		}

		let query = self.login_query.as_ref().ok_or_else(|| {
			Error::Configuration(format!(
				"no login query was registered for realm {}",
				self.realm
			))
		})?;

		let escaped_login = escape_filter(login);
		let escaped_password = escape_filter(password);
		let mut result = query
			.execute(
				&self.manager,
				&[("login", escaped_login.as_str()), ("password", escaped_password.as_str())],
			)
			.await?;

		// The login has to match exactly one entry; anything else is a
		// failed authentication, not an error.
		if result.len() != 1 {
			return Ok(None);
		}
		let Some((dn, attributes)) = result.pop() else { return Ok(None) };

		match self.manager.connect_as(&dn, password).await {
			Ok(conn) => conn.release().await,
			Err(Error::Ldap(err)) => {
				debug!(realm = %self.realm, login, "verification bind failed: {err}");
				return Ok(None);
			}
			Err(err) => return Err(err),
		}

		Ok(Some((dn, attributes)))
	}

	/// Get the groups the user belongs to.
	///
	/// Returns the `(dn, attributes)` pairs of the matching group entries in
	/// server order, or `None` when the lookup itself failed with a protocol
	/// error. "Has no groups" is an empty result set, not `None`.
	///
	/// Fails with [`Error::Configuration`] when no groups query was
	/// registered for the realm.
	pub async fn user_groups(&self, dn: &str) -> Result<Option<ResultSet>, Error> {
		let query = self.groups_query.as_ref().ok_or_else(|| {
			Error::Configuration(format!(
				"no groups query was registered for realm {}",
				self.realm
			))
		})?;

		let escaped_dn = escape_filter(dn);
		match query.execute(&self.manager, &[("userdn", escaped_dn.as_str())]).await {
			Ok(result) => Ok(Some(result)),
			Err(Error::Ldap(err)) => {
				debug!(realm = %self.realm, dn, "group lookup failed: {err}");
				Ok(None)
			}
			Err(err) => Err(err),
		}
	}

	/// Resolve the user's groups to just their distinguished names.
	///
	/// Convenience adapter over [`user_groups`] for use as an
	/// authorization-principal resolver: each group entry is flattened to
	/// its DN, preserving server order. Returns `None` when the underlying
	/// lookup returned `None`.
	///
	/// [`user_groups`]: Self::user_groups
	pub async fn group_names(&self, dn: &str) -> Result<Option<Vec<String>>, Error> {
		Ok(self.user_groups(dn).await?.map(flatten_groups))
	}
}

/// Flatten a group query result to the ordered list of group DNs.
fn flatten_groups(groups: ResultSet) -> Vec<String> {
	groups.into_iter().map(|(dn, _attributes)| dn).collect()
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::flatten_groups;
	use crate::query::ResultSet;

	#[test]
	fn group_results_flatten_to_dns_in_order() {
		let groups: ResultSet = vec![
			(
				"cn=admins,ou=groups,dc=example,dc=com".to_owned(),
				HashMap::from([("cn".to_owned(), vec!["admins".to_owned()])]),
			),
			("cn=users,ou=groups,dc=example,dc=com".to_owned(), HashMap::new()),
			("cn=ops,ou=groups,dc=example,dc=com".to_owned(), HashMap::new()),
		];
		assert_eq!(
			flatten_groups(groups),
			[
				"cn=admins,ou=groups,dc=example,dc=com",
				"cn=users,ou=groups,dc=example,dc=com",
				"cn=ops,ou=groups,dc=example,dc=com"
			]
		);
	}

	#[test]
	fn empty_group_results_flatten_to_an_empty_list() {
		assert!(flatten_groups(Vec::new()).is_empty());
	}
}
