//! HTTP client for the external CI runner (§4.5, §6). A thin `reqwest`
//! wrapper with the `X-API-Key` header baked in and a bounded
//! exponential-backoff retry around the submission call, the same shape
//! `SerperClient` uses for its one outbound call.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CiError, Result};
use crate::types::SubmitJobRequest;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct RunnerClient {
	http: Client,
	base_url: String,
	api_key: forgekeep_common_secret::SecretString,
}

impl RunnerClient {
	pub fn new(base_url: impl Into<String>, api_key: forgekeep_common_secret::SecretString, timeout: Duration) -> Self {
		let http = Client::builder()
			.timeout(timeout)
			.build()
			.expect("failed to build CI runner HTTP client");
		Self {
			http,
			base_url: base_url.into(),
			api_key,
		}
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url.trim_end_matches('/'), path)
	}

	/// POSTs `<runner>/api/v1/jobs`; retried up to [`MAX_ATTEMPTS`] times with
	/// backoff doubling from [`INITIAL_BACKOFF`] to [`MAX_BACKOFF`] (§4.5).
	#[tracing::instrument(skip(self, request), fields(job_id = %request.job_id))]
	pub async fn submit_job(&self, request: &SubmitJobRequest) -> Result<()> {
		let mut backoff = INITIAL_BACKOFF;
		let mut last_err = None;

		for attempt in 1..=MAX_ATTEMPTS {
			match self.submit_job_once(request).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					warn!(attempt, error = %e, "ci runner submission attempt failed");
					last_err = Some(e);
					if attempt < MAX_ATTEMPTS {
						tokio::time::sleep(backoff).await;
						backoff = (backoff * 2).min(MAX_BACKOFF);
					}
				}
			}
		}
		Err(last_err.unwrap_or_else(|| CiError::Upstream("submission failed".into())))
	}

	async fn submit_job_once(&self, request: &SubmitJobRequest) -> Result<()> {
		let response = self
			.http
			.post(self.url("/api/v1/jobs"))
			.header("X-API-Key", self.api_key.expose())
			.json(request)
			.send()
			.await
			.map_err(|e| CiError::Upstream(e.to_string()))?;

		if !response.status().is_success() {
			let status = response.status();
			let body = response.text().await.unwrap_or_default();
			return Err(CiError::Upstream(format!("runner returned {status}: {body}")));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
		let response = self
			.http
			.get(self.url(path))
			.header("X-API-Key", self.api_key.expose())
			.send()
			.await
			.map_err(|e| CiError::Upstream(e.to_string()))?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !response.status().is_success() {
			return Err(CiError::Upstream(format!("runner returned {}", response.status())));
		}
		let body = response
			.json::<T>()
			.await
			.map_err(|e| CiError::Upstream(format!("invalid runner response: {e}")))?;
		Ok(Some(body))
	}

	#[tracing::instrument(skip(self))]
	pub async fn post_empty(&self, path: &str) -> Result<()> {
		let response = self
			.http
			.post(self.url(path))
			.header("X-API-Key", self.api_key.expose())
			.send()
			.await
			.map_err(|e| CiError::Upstream(e.to_string()))?;
		if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
			return Err(CiError::Upstream(format!("runner returned {}", response.status())));
		}
		debug!(path, status = %response.status(), "ci runner pass-through complete");
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn download_artifact(&self, job_id: Uuid, artifact_name: &str) -> Result<Vec<u8>> {
		let path = format!("/api/v1/jobs/{job_id}/artifacts/{artifact_name}/download");
		let response = self
			.http
			.get(self.url(&path))
			.header("X-API-Key", self.api_key.expose())
			.send()
			.await
			.map_err(|e| CiError::Upstream(e.to_string()))?;
		if response.status() == StatusCode::NOT_FOUND {
			return Err(CiError::NotFound);
		}
		if !response.status().is_success() {
			return Err(CiError::Upstream(format!("runner returned {}", response.status())));
		}
		response
			.bytes()
			.await
			.map(|b| b.to_vec())
			.map_err(|e| CiError::Upstream(e.to_string()))
	}
}
