//! Mirror fetch/push: the MirrorSyncer component the MirrorScheduler
//! dispatches to once a repository's mirror config is due (§4.4).

pub mod direction;
pub mod error;
pub mod fetch;
pub mod push;
pub mod syncer;
pub mod url;

pub use direction::Direction;
pub use error::{MirrorError, Result};
pub use fetch::fetch_upstream;
pub use push::push_downstream;
pub use syncer::{sync_repository, SyncOutcome};
pub use url::build_authenticated_url;
