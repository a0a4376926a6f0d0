//! `MirrorConfigRecord::direction` parsing.

use crate::error::{MirrorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Upstream,
	Downstream,
	Both,
}

impl Direction {
	pub fn parse(raw: &str) -> Result<Self> {
		match raw {
			"upstream" => Ok(Direction::Upstream),
			"downstream" => Ok(Direction::Downstream),
			"both" => Ok(Direction::Both),
			other => Err(MirrorError::InvalidDirection(other.to_string())),
		}
	}

	pub fn fetches_upstream(self) -> bool {
		matches!(self, Direction::Upstream | Direction::Both)
	}

	pub fn pushes_downstream(self) -> bool {
		matches!(self, Direction::Downstream | Direction::Both)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_known_directions() {
		assert_eq!(Direction::parse("upstream").unwrap(), Direction::Upstream);
		assert_eq!(Direction::parse("downstream").unwrap(), Direction::Downstream);
		assert_eq!(Direction::parse("both").unwrap(), Direction::Both);
	}

	#[test]
	fn rejects_unknown_direction() {
		assert!(Direction::parse("sideways").is_err());
	}

	#[test]
	fn both_fetches_and_pushes() {
		assert!(Direction::Both.fetches_upstream());
		assert!(Direction::Both.pushes_downstream());
		assert!(!Direction::Upstream.pushes_downstream());
		assert!(!Direction::Downstream.fetches_upstream());
	}
}
