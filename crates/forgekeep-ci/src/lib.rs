//! CIDispatcher: submits jobs to an external CI runner over HTTP, ingests
//! its status/log/artifact callbacks, and fans those events out to live
//! subscribers (§4.5).

pub mod dispatcher;
pub mod error;
pub mod runner_client;
pub mod subscribers;
pub mod types;

pub use dispatcher::CiDispatcher;
pub use error::{CiError, Result};
pub use runner_client::RunnerClient;
pub use subscribers::{SharedSubscriberRegistry, SubscriberId, SubscriberRegistry};
pub use types::{
	CiArtifact, CiJob, CiJobLog, JobEvent, JobStatus, RefType, SubmitJobRequest, TriggerRequest,
	TriggerType,
};
