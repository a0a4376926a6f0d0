use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
	pub name: String,
	pub target_commit: String,
	pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSignature {
	pub name: String,
	pub email: String,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
	pub name: String,
	/// The commit the tag ultimately points at (annotated tags are dereferenced).
	pub target_commit: String,
	pub annotation: Option<String>,
	pub signature: Option<TagSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
	pub hash: String,
	pub parents: Vec<String>,
	pub author_name: String,
	pub author_email: String,
	pub author_time: DateTime<Utc>,
	pub committer_name: String,
	pub committer_email: String,
	pub committer_time: DateTime<Utc>,
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
	Blob,
	Tree,
	Commit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
	pub name: String,
	pub full_path: String,
	pub kind: EntryKind,
	pub mode: u32,
	pub hash: String,
	pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
	Utf8,
	Base64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
	pub data: Vec<u8>,
	pub is_binary: bool,
	pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
	pub line_no: u32,
	pub commit: String,
	pub author_name: String,
	pub author_email: String,
	pub timestamp: DateTime<Utc>,
	pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeStatus {
	Added,
	Modified,
	Deleted,
	Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
	pub old_path: Option<String>,
	pub new_path: Option<String>,
	pub status: FileChangeStatus,
	pub additions: u32,
	pub deletions: u32,
	pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResult {
	pub raw_patch: String,
	pub files: Vec<FileDiff>,
}

/// Percentages keyed by language name, rounded to two decimal places and
/// summing to ~100.0 (subject to rounding). Computed on demand, never cached.
pub type LanguageStats = BTreeMap<String, f64>;

pub const MAINTENANCE_SKIP_DIRS: &[&str] = &[
	"vendor",
	"node_modules",
	".git",
	".github",
	"dist",
	"build",
	"out",
	"coverage",
];

pub const BINARY_EXTENSIONS: &[&str] = &[
	"png", "jpg", "jpeg", "gif", "svg", "ico", "pdf", "zip", "tar", "gz", "rar", "7z", "woff",
	"woff2", "ttf", "eot", "mp3", "mp4", "mov", "avi", "bin", "exe", "dll", "so", "dylib",
];

pub const SKIPPED_FILENAMES: &[&str] = &[
	"package-lock.json",
	"yarn.lock",
	"pnpm-lock.yaml",
	"Cargo.lock",
];

/// Closed extension -> language table, per spec §4.1. `Dockerfile` is
/// special-cased by filename in `language_stats::classify`, not here.
pub fn language_for_extension(ext: &str) -> &'static str {
	match ext {
		"go" => "Go",
		"py" => "Python",
		"rs" => "Rust",
		"js" => "JavaScript",
		"jsx" => "JavaScript",
		"ts" => "TypeScript",
		"tsx" => "TypeScript",
		"java" => "Java",
		"rb" => "Ruby",
		"php" => "PHP",
		"c" => "C",
		"h" => "C",
		"cpp" | "cc" | "cxx" | "hpp" => "C++",
		"cs" => "C#",
		"swift" => "Swift",
		"kt" | "kts" => "Kotlin",
		"scala" => "Scala",
		"sh" | "bash" => "Shell",
		"html" | "htm" => "HTML",
		"css" => "CSS",
		"scss" | "sass" => "SCSS",
		"md" | "markdown" => "Markdown",
		"yaml" | "yml" => "YAML",
		"json" => "JSON",
		"toml" => "TOML",
		"sql" => "SQL",
		"lua" => "Lua",
		"zig" => "Zig",
		"ex" | "exs" => "Elixir",
		"erl" => "Erlang",
		"hs" => "Haskell",
		"dart" => "Dart",
		_ => "Other",
	}
}
