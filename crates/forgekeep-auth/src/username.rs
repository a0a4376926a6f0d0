//! Username derivation for OIDC first-login (§4.2).

const MAX_LEN: usize = 50;
const MIN_LEN: usize = 3;

fn sanitize(raw: &str) -> String {
	let mut out: String = raw
		.to_lowercase()
		.chars()
		.filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
		.collect();

	if out.is_empty() {
		out.push_str("user");
	}
	if !out.chars().next().unwrap().is_ascii_alphabetic() {
		out.insert(0, 'u');
	}
	while out.len() < MIN_LEN {
		out.push('x');
	}
	out.truncate(MAX_LEN);
	out
}

/// First candidate that sanitizes to something non-empty, in the order the
/// spec prescribes: `preferred_username`, email local-part, display name
/// with spaces removed, then a random fallback.
pub fn candidate_username(
	preferred_username: Option<&str>,
	email: &str,
	name: Option<&str>,
) -> String {
	if let Some(p) = preferred_username {
		if !p.trim().is_empty() {
			return sanitize(p);
		}
	}
	if let Some(local) = email.split('@').next() {
		if !local.trim().is_empty() {
			return sanitize(local);
		}
	}
	if let Some(n) = name {
		let collapsed: String = n.chars().filter(|c| !c.is_whitespace()).collect();
		if !collapsed.is_empty() {
			return sanitize(&collapsed);
		}
	}
	sanitize(&format!("user{}", rand::random::<u32>()))
}

/// Appends a random 3-digit suffix to resolve a collision, keeping the
/// total length within [`MAX_LEN`].
pub fn with_collision_suffix(base: &str) -> String {
	let suffix = rand::random::<u32>() % 1000;
	let mut trimmed = base.to_string();
	trimmed.truncate(MAX_LEN - 3);
	format!("{trimmed}{suffix:03}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitizes_mixed_case_and_symbols() {
		assert_eq!(sanitize("Jane.Doe+test"), "janedoetest");
	}

	#[test]
	fn forces_leading_letter() {
		assert_eq!(sanitize("123abc"), "u123abc");
	}

	#[test]
	fn pads_short_names() {
		assert_eq!(sanitize("ab"), "abx");
	}

	#[test]
	fn truncates_long_names() {
		let long = "a".repeat(80);
		assert_eq!(sanitize(&long).len(), MAX_LEN);
	}

	#[test]
	fn prefers_preferred_username_over_email() {
		let name = candidate_username(Some("octocat"), "someone@example.com", None);
		assert_eq!(name, "octocat");
	}

	#[test]
	fn falls_back_to_email_local_part() {
		let name = candidate_username(None, "jane.doe@example.com", None);
		assert_eq!(name, "janedoe");
	}

	#[test]
	fn collision_suffix_keeps_length_bounded() {
		let base = "a".repeat(MAX_LEN);
		let suffixed = with_collision_suffix(&base);
		assert_eq!(suffixed.len(), MAX_LEN);
	}
}
