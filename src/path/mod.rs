//! Path Validator — the sole trust boundary crossed by every externally
//! supplied path before it reaches the Filesystem Engine (spec §4.1).
//!
//! Sanitization is never used here: a bad path is rejected, never "cleaned
//! up". The validator is a pure, stateless singleton, matching the
//! shared-singleton pattern the teacher keeps for its own path validator
//! (spec Design Notes §9).

use crate::error::FsError;

const MAX_PATH_BYTES: usize = 4096;
const MAX_SEGMENT_BYTES: usize = 255;

/// Stateless path validator. Zero-sized so it can be shared freely without
/// an `Arc`, matching the "pure singleton" note in spec §9.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathValidator;

impl PathValidator {
	pub fn new() -> Self {
		Self
	}

	/// Validate and normalize `path` against `root`, enforcing the jail.
	pub fn validate(&self, path: &str, root: &str) -> Result<String, FsError> {
		validate(path, root)
	}

	/// Non-throwing escape check: true if `path` would escape `root`.
	pub fn is_escape(&self, path: &str, root: &str) -> bool {
		validate(path, root).is_err()
	}

	/// Checks whether a symlink's `target` (stored verbatim at `link_path`)
	/// would resolve outside of `root`.
	pub fn is_symlink_escape(&self, target: &str, link_path: &str, root: &str) -> bool {
		is_symlink_escape(target, link_path, root)
	}
}

/// Free-function form, used internally and by callers that don't want to
/// carry a `PathValidator` instance around.
pub fn validate(path: &str, root: &str) -> Result<String, FsError> {
	reject_bad_input(path)?;

	let normalized_root = normalize_components(root, "/")?;
	let normalized = normalize_components(path, &normalized_root)?;

	enforce_jail(&normalized, &normalized_root)?;

	if normalized.len() > MAX_PATH_BYTES {
		return Err(FsError::NameTooLong { path: normalized });
	}
	for seg in normalized.split('/').filter(|s| !s.is_empty()) {
		if seg.len() > MAX_SEGMENT_BYTES {
			return Err(FsError::NameTooLong {
				path: normalized.clone(),
			});
		}
	}

	Ok(normalized)
}

pub fn is_symlink_escape(target: &str, link_path: &str, root: &str) -> bool {
	if target.starts_with('/') {
		validate(target, root).is_err()
	} else {
		let parent = parent_of(link_path);
		let joined = format!("{}/{}", parent.trim_end_matches('/'), target);
		validate(&joined, root).is_err()
	}
}

fn parent_of(path: &str) -> String {
	match path.rfind('/') {
		Some(0) => "/".to_string(),
		Some(idx) => path[..idx].to_string(),
		None => "/".to_string(),
	}
}

/// Reject inputs that must never be "cleaned up", only refused outright.
fn reject_bad_input(path: &str) -> Result<(), FsError> {
	if path.trim().is_empty() {
		return Err(FsError::invalid_argument("empty or whitespace-only path"));
	}

	if path != path.trim_end() {
		return Err(FsError::invalid_argument("trailing whitespace"));
	}

	if path.contains("%00") {
		return Err(FsError::invalid_argument("embedded %00 sequence"));
	}

	for ch in path.chars() {
		if is_rejected_char(ch) {
			return Err(FsError::invalid_argument(format!(
				"rejected character U+{:04X}",
				ch as u32
			)));
		}
	}

	// A bare `.`/`..` with no other segments is refused outright rather
	// than normalized, since it carries no path to resolve against.
	// `.`/`..` appearing as one segment among several is legitimate input;
	// `normalize_components` below resolves those per spec §4.1.
	if path == "." || path == ".." {
		return Err(FsError::invalid_argument("bare . or .. segment"));
	}

	for segment in path.split(['/', '\\']) {
		if segment.is_empty() {
			continue;
		}
		if segment.starts_with(char::is_whitespace) {
			return Err(FsError::invalid_argument(
				"segment begins with whitespace",
			));
		}
	}

	Ok(())
}

fn is_rejected_char(ch: char) -> bool {
	matches!(ch,
		'\u{0000}'
		| '\u{0001}'..='\u{001F}'
		| '\u{007F}'
		| '\u{2028}'
		| '\u{2029}'
		| '\u{202E}'
		| '\u{FFFD}'
	)
}

/// Normalize separators, `.`/`..`, alternate-stream tails, multi-slash runs
/// and trailing slashes; resolve relative inputs against `base`.
fn normalize_components(path: &str, base: &str) -> Result<String, FsError> {
	let slashed: String = path.chars().map(|c| if c == '\\' { '/' } else { c }).collect();

	let absolute = slashed.starts_with('/');
	let mut stack: Vec<String> = Vec::new();

	if !absolute {
		for seg in base.split('/').filter(|s| !s.is_empty()) {
			stack.push(seg.to_string());
		}
	}

	for raw_seg in slashed.split('/') {
		if raw_seg.is_empty() {
			continue;
		}
		// Strip alternate-data-stream tail (e.g. "file.txt:hidden").
		let seg = raw_seg.split(':').next().unwrap_or(raw_seg);
		if seg.is_empty() || seg == "." {
			continue;
		}
		if seg == ".." {
			stack.pop();
			continue;
		}
		stack.push(seg.to_string());
	}

	if stack.is_empty() {
		Ok("/".to_string())
	} else {
		Ok(format!("/{}", stack.join("/")))
	}
}

/// After normalization the result must equal `root` or begin with
/// `root + "/"` (spec §4.1 jail rule).
fn enforce_jail(normalized: &str, root: &str) -> Result<(), FsError> {
	let ok = normalized == root
		|| (root == "/" && normalized.starts_with('/'))
		|| normalized.starts_with(&format!("{}/", root));
	if ok {
		Ok(())
	} else {
		Err(FsError::PermissionDenied {
			path: normalized.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_traversal_above_root() {
		let err = validate("../../../etc/passwd", "/app/data").unwrap_err();
		assert!(matches!(err, FsError::PermissionDenied { .. }));
	}

	#[test]
	fn normalizes_internal_traversal() {
		let out = validate("a/b/../c.txt", "/app/data").unwrap();
		assert_eq!(out, "/app/data/a/c.txt");
	}

	#[test]
	fn rejects_null_byte() {
		let err = validate("file\u{0000}.txt", "/").unwrap_err();
		assert!(matches!(err, FsError::InvalidArgument { .. }));
	}

	#[test]
	fn rejects_percent_encoded_null() {
		let err = validate("file%00.txt", "/").unwrap_err();
		assert!(matches!(err, FsError::InvalidArgument { .. }));
	}

	#[test]
	fn rejects_bare_dot_dot_token() {
		let err = validate("..", "/").unwrap_err();
		assert!(matches!(err, FsError::InvalidArgument { .. }));
	}

	#[test]
	fn boundary_path_length() {
		let long_seg = "a".repeat(250);
		let mut segments = Vec::new();
		let mut total = 0usize;
		while total < 4096 - 260 {
			segments.push(long_seg.clone());
			total += long_seg.len() + 1;
		}
		let path = format!("/{}", segments.join("/"));
		assert!(path.len() <= 4096);
		assert!(validate(&path, "/").is_ok());
	}

	#[test]
	fn segment_too_long_fails() {
		let seg = "a".repeat(256);
		let path = format!("/{}", seg);
		let err = validate(&path, "/").unwrap_err();
		assert!(matches!(err, FsError::NameTooLong { .. }));
	}

	#[test]
	fn idempotent_on_already_normalized_input() {
		let once = validate("/app/data/a/c.txt", "/app/data").unwrap();
		let twice = validate(&once, "/app/data").unwrap();
		assert_eq!(once, twice);
	}

	#[test]
	fn root_jail_exact_match() {
		assert_eq!(validate("/app/data", "/app/data").unwrap(), "/app/data");
	}

	#[test]
	fn symlink_escape_relative() {
		assert!(is_symlink_escape("../../etc", "/app/data/link", "/app/data"));
		assert!(!is_symlink_escape("sibling.txt", "/app/data/link", "/app/data"));
	}

	#[test]
	fn symlink_escape_absolute() {
		assert!(is_symlink_escape("/etc/passwd", "/app/data/link", "/app/data"));
		assert!(!is_symlink_escape("/app/data/x", "/app/data/link", "/app/data"));
	}
}
