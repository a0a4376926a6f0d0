//! `AuthResolver`: session JWTs, personal access tokens, SSH fingerprints,
//! repository ACL, PAT scope gating, and OIDC first-login provisioning —
//! the AuthResolver component of the hosting service.

pub mod claims;
pub mod error;
pub mod fingerprint;
pub mod resolver;
pub mod username;

pub use claims::{SessionClaims, SESSION_LIFETIME_SECS};
pub use error::{AuthError, Result};
pub use fingerprint::{fingerprint_from_authorized_keys_line, fingerprint_from_blob};
pub use resolver::{hash_token, Action, AuthResolver};
