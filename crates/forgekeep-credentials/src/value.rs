//! Credential value types for mirror upstream/downstream remotes.

use forgekeep_common_secret::SecretString;
use serde::{Deserialize, Serialize};

/// On-disk representation (JSON serializable, secrets stored in plaintext
/// string form — the file itself is the security boundary, see
/// `FileCredentialStore`'s 0600 permissions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PersistedCredentialValue {
	#[serde(rename = "username_password")]
	UsernamePassword { username: String, password: String },

	#[serde(rename = "token")]
	Token { token: String },

	#[serde(rename = "ssh_private_key")]
	SshPrivateKey {
		key: String,
		passphrase: Option<String>,
	},
}

/// Runtime representation with secret protection; what `MirrorSyncer`
/// actually resolves `upstream_creds_ref`/`downstream_creds_ref` to.
#[derive(Debug, Clone)]
pub enum CredentialValue {
	UsernamePassword {
		username: String,
		password: SecretString,
	},
	Token {
		token: SecretString,
	},
	SshPrivateKey {
		key: SecretString,
		passphrase: Option<SecretString>,
	},
}

impl From<PersistedCredentialValue> for CredentialValue {
	fn from(persisted: PersistedCredentialValue) -> Self {
		match persisted {
			PersistedCredentialValue::UsernamePassword { username, password } => {
				CredentialValue::UsernamePassword {
					username,
					password: SecretString::new(password),
				}
			}
			PersistedCredentialValue::Token { token } => CredentialValue::Token {
				token: SecretString::new(token),
			},
			PersistedCredentialValue::SshPrivateKey { key, passphrase } => {
				CredentialValue::SshPrivateKey {
					key: SecretString::new(key),
					passphrase: passphrase.map(SecretString::new),
				}
			}
		}
	}
}

impl From<&CredentialValue> for PersistedCredentialValue {
	fn from(cred: &CredentialValue) -> Self {
		match cred {
			CredentialValue::UsernamePassword { username, password } => {
				PersistedCredentialValue::UsernamePassword {
					username: username.clone(),
					password: password.expose().clone(),
				}
			}
			CredentialValue::Token { token } => PersistedCredentialValue::Token {
				token: token.expose().clone(),
			},
			CredentialValue::SshPrivateKey { key, passphrase } => {
				PersistedCredentialValue::SshPrivateKey {
					key: key.expose().clone(),
					passphrase: passphrase.as_ref().map(|p| p.expose().clone()),
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_serialization_tags_variant() {
		let token = PersistedCredentialValue::Token {
			token: "ghp_test".to_string(),
		};
		let json = serde_json::to_string(&token).unwrap();
		assert!(json.contains("\"type\":\"token\""));
		assert!(json.contains("\"token\":\"ghp_test\""));
	}

	#[test]
	fn round_trips_through_persisted_form() {
		let persisted = PersistedCredentialValue::UsernamePassword {
			username: "mirror-bot".to_string(),
			password: "hunter2".to_string(),
		};
		let runtime: CredentialValue = persisted.into();
		if let CredentialValue::UsernamePassword { username, password } = &runtime {
			assert_eq!(username, "mirror-bot");
			assert_eq!(password.expose(), "hunter2");
		} else {
			panic!("expected UsernamePassword");
		}
		let back = PersistedCredentialValue::from(&runtime);
		match back {
			PersistedCredentialValue::UsernamePassword { username, password } => {
				assert_eq!(username, "mirror-bot");
				assert_eq!(password, "hunter2");
			}
			_ => panic!("expected UsernamePassword"),
		}
	}
}
