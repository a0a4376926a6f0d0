//! The single taxonomy-mapping `IntoResponse` impl the transport edge owns
//! (§7, §10.2): every crate beneath this one keeps its own `thiserror` enum;
//! `ApiError` is where those concrete causes finally collapse into the
//! wire-visible `{error, message, details?}` shape and an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("not found")]
	NotFound,

	#[error("unauthorized")]
	Unauthorized,

	#[error("forbidden")]
	Forbidden,

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("{0}")]
	DefaultBranch(String),

	#[error("upstream unavailable: {0}")]
	Upstream(String),

	#[error("internal error: {0}")]
	Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
	error: &'static str,
	message: String,
}

impl ApiError {
	fn code(&self) -> &'static str {
		match self {
			ApiError::NotFound => "NOT_FOUND",
			ApiError::Unauthorized => "UNAUTHORIZED",
			ApiError::Forbidden => "FORBIDDEN",
			ApiError::Conflict(_) => "CONFLICT",
			ApiError::BadRequest(_) => "BAD_REQUEST",
			ApiError::DefaultBranch(_) => "DEFAULT_BRANCH",
			ApiError::Upstream(_) => "UPSTREAM",
			ApiError::Internal(_) => "INTERNAL",
		}
	}

	fn status(&self) -> StatusCode {
		match self {
			ApiError::NotFound => StatusCode::NOT_FOUND,
			ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
			ApiError::Forbidden => StatusCode::FORBIDDEN,
			ApiError::Conflict(_) => StatusCode::CONFLICT,
			ApiError::BadRequest(_) | ApiError::DefaultBranch(_) => StatusCode::BAD_REQUEST,
			ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		if matches!(self, ApiError::Internal(_)) {
			tracing::error!(error = %self, "internal error reaching transport edge");
		}
		let body = ErrorBody {
			error: self.code(),
			message: self.to_string(),
		};
		(self.status(), Json(body)).into_response()
	}
}

impl From<forgekeep_scm::ScmError> for ApiError {
	fn from(e: forgekeep_scm::ScmError) -> Self {
		use forgekeep_scm::ScmError;
		match e {
			ScmError::NotFound => ApiError::NotFound,
			ScmError::AlreadyExists => ApiError::Conflict("already exists".into()),
			ScmError::InvalidName(m) => ApiError::BadRequest(m),
			ScmError::DefaultBranch => ApiError::DefaultBranch("refusing to delete the default branch".into()),
			ScmError::Network(m) => ApiError::Upstream(m),
			ScmError::Auth(_) => ApiError::Unauthorized,
			ScmError::Cancelled => ApiError::Internal("operation cancelled".into()),
			ScmError::Storage(m) | ScmError::Git(m) => ApiError::Internal(m),
			ScmError::Db(e) => e.into(),
			ScmError::Io(e) => ApiError::Internal(e.to_string()),
			ScmError::Internal(m) => ApiError::Internal(m),
		}
	}
}

impl From<forgekeep_db::DbError> for ApiError {
	fn from(e: forgekeep_db::DbError) -> Self {
		use forgekeep_db::DbError;
		match e {
			DbError::NotFound(_) => ApiError::NotFound,
			DbError::Conflict(m) => ApiError::Conflict(m),
			DbError::Sqlx(e) => ApiError::Internal(e.to_string()),
			DbError::Internal(m) => ApiError::Internal(m),
			DbError::Serialization(e) => ApiError::Internal(e.to_string()),
		}
	}
}

impl From<forgekeep_auth::AuthError> for ApiError {
	fn from(e: forgekeep_auth::AuthError) -> Self {
		use forgekeep_auth::AuthError;
		match e {
			AuthError::InvalidCredential(_) => ApiError::Unauthorized,
			AuthError::Expired => ApiError::Unauthorized,
			AuthError::NotFound => ApiError::Unauthorized,
			AuthError::Denied => ApiError::Forbidden,
			AuthError::Db(e) => e.into(),
			AuthError::Internal(m) => ApiError::Internal(m),
		}
	}
}

impl From<forgekeep_ci::CiError> for ApiError {
	fn from(e: forgekeep_ci::CiError) -> Self {
		use forgekeep_ci::CiError;
		match e {
			CiError::NotFound => ApiError::NotFound,
			CiError::Upstream(m) => ApiError::Upstream(m),
			CiError::Db(e) => e.into(),
			CiError::Internal(m) => ApiError::Internal(m),
		}
	}
}
