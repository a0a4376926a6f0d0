//! Credential error types.

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
	#[error("io error: {0}")]
	Io(String),

	#[error("serialization error: {0}")]
	Serde(String),

	#[error("permission error: {0}")]
	Permission(String),

	#[error("no credential stored for reference: {0}")]
	NotFound(String),
}

impl From<std::io::Error> for CredentialError {
	fn from(err: std::io::Error) -> Self {
		CredentialError::Io(err.to_string())
	}
}

impl From<serde_json::Error> for CredentialError {
	fn from(err: serde_json::Error) -> Self {
		CredentialError::Serde(err.to_string())
	}
}
