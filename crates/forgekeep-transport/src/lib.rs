//! Git Smart-HTTP and SSH front ends, plus ambient `/healthz` and `/metrics`
//! (§4.6). `forgekeep-server` merges [`git_http::router`], [`health::router`],
//! and its own `/v1` REST router into one `axum::Router`, and drives
//! [`ssh::ForgekeepSshServer`] as a separate listener via `russh::server::run`.

pub mod error;
pub mod git_http;
pub mod health;
pub mod principal;
pub mod ssh;

pub use error::{ApiError, Result};
pub use git_http::GitHttpState;
pub use health::HealthState;
pub use principal::{authenticate, Principal};
pub use ssh::{ForgekeepSshServer, SshState};
