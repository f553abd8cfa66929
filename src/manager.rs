//! Connection management: server endpoints, the reusable connection pool and
//! scoped connections.

use std::{
	borrow::Cow,
	sync::atomic::{AtomicUsize, Ordering},
	time::{Duration, Instant},
};

use ldap3::{LdapConnAsync, LdapResult, Scope, SearchEntry};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};
use url::Url;

use crate::{config::ManagerConfig, error::Error, registry::Realm};

/// A single parsed directory server endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEndpoint {
	/// Server host name or address.
	pub host: String,
	/// Server port.
	pub port: u16,
	/// Whether the connection uses TLS on a dedicated port.
	pub secure: bool,
	/// Canonical URL the connection is opened against.
	url: Url,
}

impl DirectoryEndpoint {
	/// Parse an endpoint from a `scheme://host[:port]` URI.
	///
	/// A URI without a scheme is treated as `ldap`. The `ldaps` scheme
	/// enables TLS and defaults the port to 636, any other scheme defaults
	/// it to 389.
	pub fn parse(uri: &str) -> Result<Self, Error> {
		let raw = if uri.contains("://") {
			Cow::Borrowed(uri)
		} else {
			Cow::Owned(format!("ldap://{uri}"))
		};
		let mut url = Url::parse(&raw)
			.map_err(|err| Error::Invalid(format!("server uri {uri:?}: {err}")))?;
		let secure = url.scheme() == "ldaps";
		let host = url
			.host_str()
			.ok_or_else(|| Error::Invalid(format!("server uri {uri:?} has no host")))?
			.to_owned();
		let port = url.port().unwrap_or(if secure { 636 } else { 389 });
		url.set_port(Some(port))
			.map_err(|()| Error::Invalid(format!("server uri {uri:?} does not accept a port")))?;
		Ok(Self { host, port, secure, url })
	}

	/// The URL the connection is opened against.
	#[must_use]
	pub fn url(&self) -> &Url {
		&self.url
	}
}

/// An established, bound connection together with its driver task.
struct Conn {
	/// Handle for issuing operations.
	ldap: ldap3::Ldap,
	/// Task driving the underlying connection.
	driver: JoinHandle<()>,
	/// When the connection was opened, for pool lifetime checks.
	created: Instant,
}

/// Produces directory connections for one realm, either from a reusable
/// pool or freshly bound per call.
///
/// The manager owns the endpoint configuration and the pool of idle service
/// connections. It never mutates endpoint or query state; all connections it
/// hands out are ephemeral [`ScopedConnection`]s.
pub struct ConnectionManager {
	/// Parsed server endpoints.
	endpoints: Vec<DirectoryEndpoint>,
	/// The configuration the manager was built from.
	config: ManagerConfig,
	/// The realm this manager serves, for diagnostics.
	realm: Realm,
	/// Round-robin cursor over `endpoints`.
	next_endpoint: AtomicUsize,
	/// Idle pooled service connections.
	pool: Mutex<Vec<Conn>>,
}

impl ConnectionManager {
	/// Parse the configured endpoints and create a manager with an empty
	/// pool.
	pub fn new(config: ManagerConfig, realm: Realm) -> Result<Self, Error> {
		if config.urls.is_empty() {
			return Err(Error::Invalid("no directory server uris configured".to_owned()));
		}
		let endpoints = config
			.urls
			.iter()
			.map(|uri| DirectoryEndpoint::parse(uri))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self {
			endpoints,
			config,
			realm,
			next_endpoint: AtomicUsize::new(0),
			pool: Mutex::new(Vec::new()),
		})
	}

	/// The parsed server endpoints.
	#[must_use]
	pub fn endpoints(&self) -> &[DirectoryEndpoint] {
		&self.endpoints
	}

	/// Acquire a connection bound with the default service identity.
	///
	/// With pooling enabled this reuses an idle pooled connection when one
	/// is available and fresh enough, and otherwise opens a new one.
	/// Releasing the returned connection puts it back into the pool.
	pub async fn connect(&self) -> Result<ScopedConnection<'_>, Error> {
		if self.config.use_pool {
			loop {
				let idle = self.pool.lock().await.pop();
				match idle {
					Some(conn) if conn.created.elapsed() < self.pool_lifetime() => {
						debug!(realm = %self.realm, "reusing pooled directory connection");
						return Ok(ScopedConnection { manager: self, conn, pooled: true });
					}
					Some(conn) => close(conn).await,
					None => break,
				}
			}
		}
		let conn = self.open(None).await?;
		Ok(ScopedConnection { manager: self, conn, pooled: self.config.use_pool })
	}

	/// Open a fresh connection bound as the given identity.
	///
	/// This never touches the pool: credential verification must not share
	/// connections with service searches. The caller is expected to release
	/// the connection immediately after use.
	pub async fn connect_as(
		&self,
		identity: &str,
		secret: &str,
	) -> Result<ScopedConnection<'_>, Error> {
		let conn = self.open(Some((identity, secret))).await?;
		Ok(ScopedConnection { manager: self, conn, pooled: false })
	}

	/// Open a connection to the next endpoint and bind it eagerly.
	async fn open(&self, bind: Option<(&str, &str)>) -> Result<Conn, Error> {
		let endpoint = self.next_endpoint();
		debug!(realm = %self.realm, url = %endpoint.url(), "opening directory connection");
		let settings = self.config.connection.to_settings().await?;
		let (conn, mut ldap) =
			LdapConnAsync::from_url_with_settings(settings, endpoint.url()).await?;
		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});
		let bound = match bind {
			Some((identity, secret)) => ldap.simple_bind(identity, secret).await,
			None => match &self.config.bind_dn {
				Some(bind_dn) => {
					let password = self.config.bind_password.as_deref().unwrap_or_default();
					ldap.simple_bind(bind_dn, password).await
				}
				None => ldap.simple_bind("", "").await,
			},
		};
		match bound.and_then(LdapResult::success) {
			Ok(_) => Ok(Conn { ldap, driver, created: Instant::now() }),
			Err(err) => {
				drop(ldap);
				if let Err(join_err) = driver.await {
					warn!("Failed to join connection driver: {join_err}");
				}
				Err(err.into())
			}
		}
	}

	/// Pick the next endpoint of the server pool, round-robin.
	fn next_endpoint(&self) -> &DirectoryEndpoint {
		let cursor = self.next_endpoint.fetch_add(1, Ordering::Relaxed);
		&self.endpoints[cursor % self.endpoints.len()]
	}

	/// Maximum age of a pooled connection.
	fn pool_lifetime(&self) -> Duration {
		Duration::from_secs(self.config.pool_lifetime)
	}

	/// The configured per-operation timeout.
	pub(crate) fn operation_timeout(&self) -> Duration {
		self.config.connection.operation_timeout
	}

	/// Return a connection to the pool, or tear it down when the pool is
	/// full or the connection has outlived its configured lifetime.
	async fn restore(&self, conn: Conn) {
		if conn.created.elapsed() >= self.pool_lifetime() {
			close(conn).await;
			return;
		}
		let mut idle = self.pool.lock().await;
		if idle.len() < self.config.pool_size {
			idle.push(conn);
		} else {
			drop(idle);
			close(conn).await;
		}
	}
}

/// Unbind a connection and wait for its driver to finish. Protocol errors
/// during teardown are logged, not propagated.
async fn close(conn: Conn) {
	let Conn { mut ldap, driver, created: _ } = conn;
	if let Err(err) = ldap.unbind().await {
		debug!("closing directory connection failed: {err}");
	}
	drop(ldap);
	if let Err(err) = driver.await {
		warn!("Failed to join connection driver: {err}");
	}
}

/// A connection on loan from a [`ConnectionManager`].
///
/// The connection is already bound. Only search operations are exposed, so
/// holders cannot modify directory state. Call [`release`] when done with
/// it; a dropped connection is still torn down by the runtime, but without
/// a clean unbind.
///
/// [`release`]: Self::release
pub struct ScopedConnection<'a> {
	/// The manager the connection came from.
	manager: &'a ConnectionManager,
	/// The live connection.
	conn: Conn,
	/// Whether release should put the connection back into the pool.
	pooled: bool,
}

impl ScopedConnection<'_> {
	/// Perform a search and collect the returned entries.
	///
	/// An empty response is an empty list of entries, not an error.
	pub async fn search(
		&mut self,
		base: &str,
		scope: Scope,
		filter: &str,
		attributes: Vec<String>,
	) -> Result<Vec<SearchEntry>, Error> {
		let timeout = self.manager.operation_timeout();
		let (entries, _result) = self
			.conn
			.ldap
			.with_timeout(timeout)
			.search(base, scope, filter, attributes)
			.await?
			.success()?;
		Ok(entries.into_iter().map(SearchEntry::construct).collect())
	}

	/// Give the connection back: pooled connections return to the pool,
	/// directly bound ones are unbound. Teardown failures are swallowed.
	pub async fn release(self) {
		if self.pooled {
			self.manager.restore(self.conn).await;
		} else {
			close(self.conn).await;
		}
	}

	/// Tear the connection down without returning it to the pool. Used when
	/// an operation on it failed and its state is suspect.
	pub(crate) async fn discard(self) {
		close(self.conn).await;
	}
}

impl std::fmt::Debug for ConnectionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectionManager")
			.field("endpoints", &self.endpoints)
			.field("realm", &self.realm)
			.field("use_pool", &self.config.use_pool)
			.field("pool_size", &self.config.pool_size)
			.finish_non_exhaustive()
	}
}

impl std::fmt::Debug for ScopedConnection<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ScopedConnection").field("pooled", &self.pooled).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{ConnectionManager, DirectoryEndpoint};
	use crate::{config::ManagerConfig, error::Error, registry::Realm};

	#[test]
	fn ldap_scheme_defaults_to_port_389() {
		let endpoint = DirectoryEndpoint::parse("ldap://directory.example.com").unwrap();
		assert_eq!(endpoint.host, "directory.example.com");
		assert_eq!(endpoint.port, 389);
		assert!(!endpoint.secure);
		assert_eq!(endpoint.url().as_str(), "ldap://directory.example.com:389");
	}

	#[test]
	fn ldaps_scheme_enables_tls_and_defaults_to_port_636() {
		let endpoint = DirectoryEndpoint::parse("ldaps://directory.example.com").unwrap();
		assert_eq!(endpoint.port, 636);
		assert!(endpoint.secure);
	}

	#[test]
	fn explicit_ports_are_kept() {
		let endpoint = DirectoryEndpoint::parse("ldaps://directory.example.com:1636").unwrap();
		assert_eq!(endpoint.port, 1636);
		assert!(endpoint.secure);
	}

	#[test]
	fn missing_scheme_is_treated_as_ldap() {
		let endpoint = DirectoryEndpoint::parse("directory.example.com:1389").unwrap();
		assert_eq!(endpoint.host, "directory.example.com");
		assert_eq!(endpoint.port, 1389);
		assert!(!endpoint.secure);
	}

	#[test]
	fn malformed_uris_are_rejected() {
		assert!(matches!(
			DirectoryEndpoint::parse("ldap://directory:notaport").err().unwrap(),
			Error::Invalid(_)
		));
	}

	#[test]
	fn manager_requires_at_least_one_endpoint() {
		assert!(matches!(
			ConnectionManager::new(ManagerConfig::new(Vec::new()), Realm::Default).err().unwrap(),
			Error::Invalid(_)
		));
	}

	#[test]
	fn manager_parses_all_endpoints() {
		let config = ManagerConfig::new(vec![
			"ldap://one.example.com".to_owned(),
			"ldaps://two.example.com".to_owned(),
		]);
		let manager = ConnectionManager::new(config, Realm::Default).unwrap();
		assert_eq!(manager.endpoints().len(), 2);
		assert_eq!(manager.endpoints()[0].port, 389);
		assert_eq!(manager.endpoints()[1].port, 636);
	}
}
