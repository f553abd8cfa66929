//! Authenticate users and resolve their group memberships against an LDAP
//! directory server.
//!
//! The library is built around three pieces: a [`ConnectionManager`] that
//! owns the server endpoints and a reusable pool of service connections, two
//! registered [`LdapQuery`] instances per realm (one finding the entry for a
//! login name, one finding the groups a DN belongs to) whose results are
//! cached per timeslice, and a request-scoped [`Connector`] that verifies
//! credentials by re-binding as the matched entry and resolves group
//! memberships through the groups query. A [`DirectoryRegistry`] keeps the
//! per-realm wiring so several directory backends can coexist in one
//! process.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate
//! which is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldap_connector::{DirectoryRegistry, ManagerConfig, QueryConfig, Realm, SearchScope};
//!
//! // Configuration can also be deserialized with serde. It's hand-constructed
//! // here for demonstration purposes.
//! let mut registry = DirectoryRegistry::new();
//! registry.setup(Realm::Default, ManagerConfig {
//! 	bind_dn: Some("cn=service,dc=example,dc=com".to_owned()),
//! 	bind_password: Some("verysecret".to_owned()),
//! 	..ManagerConfig::new(vec!["ldaps://directory.example.com".to_owned()])
//! })?;
//! registry.set_login_query(Realm::Default, QueryConfig {
//! 	base: "ou=people,dc=example,dc=com".to_owned(),
//! 	filter: "(uid={login})".to_owned(),
//! 	scope: SearchScope::OneLevel,
//! 	attributes: Vec::new(),
//! 	cache_period: 0,
//! });
//! registry.set_groups_query(Realm::Default, QueryConfig {
//! 	base: "ou=groups,dc=example,dc=com".to_owned(),
//! 	filter: "(&(objectClass=groupOfNames)(member={userdn}))".to_owned(),
//! 	scope: SearchScope::Subtree,
//! 	attributes: Vec::new(),
//! 	cache_period: 600,
//! });
//!
//! let connector = registry.connector(&Realm::Default)?;
//! if let Some((dn, _attributes)) = connector.authenticate("alice", "password").await? {
//! 	let groups = connector.group_names(&dn).await?;
//! 	println!("{dn} belongs to {groups:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Query result caching is generational: the whole cache of a query is
//!   flushed when the timeslice advances, and growth within one timeslice is
//!   unbounded.
//! * Directory operations rely on the connection timeouts of the underlying
//!   `ldap3` client; there is no separate cancellation mechanism. Callers
//!   needing a deadline must wrap calls externally.
//! * [secrecy](https://docs.rs/secrecy) is not used for storing the service
//!   bind password, it probably should be

mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod escape;
pub mod manager;
pub mod query;
pub mod registry;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{ConnectionConfig, ManagerConfig, QueryConfig, SearchScope, TLSConfig},
	connector::Connector,
	error::Error,
	escape::{escape_filter, escape_filter_bytes},
	manager::{ConnectionManager, DirectoryEndpoint, ScopedConnection},
	query::{AttributeMap, LdapQuery, ResultSet},
	registry::{DirectoryRegistry, Realm},
};
