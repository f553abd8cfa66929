//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A realm was used before the required setup call registered its
	/// connection manager or queries.
	#[error("configuration error: {0}")]
	Configuration(String),
	/// A configuration value could not be used, such as a malformed server
	/// URI or unusable TLS material.
	#[error("invalid configuration: {0}")]
	Invalid(String),
	/// Reading TLS material from disk failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// An underlying protocol error or similar occurred, or the LDAP library
	/// was used incorrectly.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}
