//! Config for connection managers and directory queries.
use std::{path::PathBuf, sync::Arc, time::Duration};

use ldap3::{LdapConnSettings, Scope};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Configuration for a realm's connection manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
	/// URIs of the directory servers, in `scheme://host[:port]` form. A
	/// missing scheme defaults to `ldap`; the `ldaps` scheme enables TLS.
	/// More than one URI forms a load-distributing server pool.
	pub urls: Vec<String>,
	/// DN used for the default service bind. Unset means anonymous.
	#[serde(default)]
	pub bind_dn: Option<String>,
	/// Password for the default service bind.
	#[serde(default)]
	pub bind_password: Option<String>,
	/// Whether service connections are kept in a reusable pool. When false,
	/// every service connection is opened and torn down per call.
	#[serde(default = "default_use_pool")]
	pub use_pool: bool,
	/// Maximum number of idle pooled connections.
	#[serde(default = "default_pool_size")]
	pub pool_size: usize,
	/// Seconds before a pooled connection is discarded and reopened.
	#[serde(default = "default_pool_lifetime")]
	pub pool_lifetime: u64,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
}

impl ManagerConfig {
	/// Create a configuration for the given server URIs with default
	/// pooling, an anonymous service bind and default connection settings.
	#[must_use]
	pub fn new(urls: Vec<String>) -> Self {
		Self {
			urls,
			bind_dn: None,
			bind_password: None,
			use_pool: default_use_pool(),
			pool_size: default_pool_size(),
			pool_lifetime: default_pool_lifetime(),
			connection: ConnectionConfig::default(),
		}
	}
}

/// Default for [`ManagerConfig::use_pool`].
fn default_use_pool() -> bool {
	true
}

/// Default for [`ManagerConfig::pool_size`].
fn default_pool_size() -> usize {
	10
}

/// Default for [`ManagerConfig::pool_lifetime`].
fn default_pool_lifetime() -> u64 {
	3600
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// LDAP operation timeout. For search per reply.
	pub operation_timeout: Duration,

	/// TLS config
	pub tls: TLSConfig,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self { timeout: 10, operation_timeout: Duration::from_secs(60), tls: TLSConfig::default() }
	}
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let pem = tokio::fs::read(path).await?;
			let certificates = rustls_pemfile::certs(&mut pem.as_slice())?;
			let mut roots = rustls::RootCertStore::empty();
			let (added, _ignored) = roots.add_parsable_certificates(&certificates);
			if added == 0 {
				return Err(Error::Invalid(format!(
					"no usable root certificates in {}",
					path.display()
				)));
			}
			let tls_config = rustls::ClientConfig::builder()
				.with_safe_defaults()
				.with_root_certificates(roots)
				.with_no_client_auth();
			settings = settings.set_config(Arc::new(tls_config));
		}
		Ok(settings)
	}
}

/// Definition of a registered directory search.
///
/// The base DN and filter are templates: `{name}` placeholders are replaced
/// with caller-supplied values at execution time. The login query templates
/// may reference `{login}` and `{password}`, the groups query template
/// `{userdn}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
	/// Base DN template at which the search begins.
	pub base: String,
	/// Filter template.
	pub filter: String,
	/// Search breadth.
	pub scope: SearchScope,
	/// Attributes the server should return. Empty selects all attributes.
	#[serde(default)]
	pub attributes: Vec<String>,
	/// Seconds to cache search results. 0 disables caching.
	#[serde(default)]
	pub cache_period: u64,
}

impl QueryConfig {
	/// Returns the list of LDAP object attributes the server should return.
	pub(crate) fn attr_list(&self) -> Vec<String> {
		if self.attributes.is_empty() {
			vec!["*".to_owned()]
		} else {
			self.attributes.clone()
		}
	}
}

/// Search breadth for a directory query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
	/// Immediate children of the base DN only.
	OneLevel,
	/// The base DN and its whole subtree.
	Subtree,
}

impl From<SearchScope> for Scope {
	fn from(scope: SearchScope) -> Self {
		match scope {
			SearchScope::OneLevel => Scope::OneLevel,
			SearchScope::Subtree => Scope::Subtree,
		}
	}
}
