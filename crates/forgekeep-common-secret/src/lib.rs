//! Secret wrapper type that prevents accidental logging of sensitive values.
//!
//! Wrap anything that should never show up in a log line, a panic message, or a
//! serialized payload in [`Secret<T>`]. `Debug` and `Display` always print
//! `[REDACTED]`; the only way to see the real value is [`Secret::expose`].

use std::fmt;

use zeroize::Zeroize;

/// A value that zeroizes on drop and never prints itself.
#[derive(Clone)]
pub struct Secret<T: Zeroize + Clone>(T);

/// The common case: a secret string (PAT raw value, JWT signing key, API key, ...).
pub type SecretString = Secret<String>;

impl<T: Zeroize + Clone> Secret<T> {
	pub fn new(value: T) -> Self {
		Self(value)
	}

	/// Access the wrapped value. Named loudly on purpose: every call site is a
	/// place that could leak the secret if misused, so it should stand out in
	/// a diff and in a code review.
	pub fn expose(&self) -> &T {
		&self.0
	}

	pub fn expose_mut(&mut self) -> &mut T {
		&mut self.0
	}

	pub fn into_inner(mut self) -> T {
		std::mem::replace(&mut self.0, zeroized_default(&self.0))
	}
}

fn zeroized_default<T: Zeroize + Clone>(sample: &T) -> T {
	let mut v = sample.clone();
	v.zeroize();
	v
}

impl<T: Zeroize + Clone> Drop for Secret<T> {
	fn drop(&mut self) {
		self.0.zeroize();
	}
}

impl<T: Zeroize + Clone> fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl<T: Zeroize + Clone> fmt::Display for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl<T: Zeroize + Clone + PartialEq> PartialEq for Secret<T> {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl<T: Zeroize + Clone + Eq> Eq for Secret<T> {}

#[cfg(feature = "serde")]
impl<T: Zeroize + Clone> serde::Serialize for Secret<T> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(Secret::new(s))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn debug_never_leaks() {
		let s = SecretString::new("super-secret-value".to_string());
		assert_eq!(format!("{:?}", s), "[REDACTED]");
	}

	#[test]
	fn display_never_leaks() {
		let s = SecretString::new("super-secret-value".to_string());
		assert_eq!(format!("{}", s), "[REDACTED]");
	}

	#[test]
	fn expose_returns_original() {
		let s = SecretString::new("token-value".to_string());
		assert_eq!(s.expose(), "token-value");
	}

	#[cfg(feature = "serde")]
	#[test]
	fn serialize_never_leaks() {
		let s = SecretString::new("super-secret-value".to_string());
		let json = serde_json::to_string(&s).unwrap();
		assert_eq!(json, "\"[REDACTED]\"");
	}

	#[cfg(feature = "serde")]
	#[test]
	fn deserialize_round_trips_plaintext() {
		let s: SecretString = serde_json::from_str("\"hello\"").unwrap();
		assert_eq!(s.expose(), "hello");
	}

	proptest! {
		#[test]
		fn prop_debug_never_contains_value(value in "\\PC{1,64}") {
			let s = SecretString::new(value.clone());
			let debug = format!("{:?}", s);
			prop_assert_eq!(debug, "[REDACTED]");
			if !value.is_empty() && value != "[REDACTED]" {
				prop_assert!(!format!("{:?}", s).contains(&value));
			}
		}

		#[cfg(feature = "serde")]
		#[test]
		fn prop_serialize_never_contains_value(value in "\\PC{1,64}") {
			let s = SecretString::new(value.clone());
			let json = serde_json::to_string(&s).unwrap();
			prop_assert_eq!(json, "\"[REDACTED]\"");
		}
	}
}
