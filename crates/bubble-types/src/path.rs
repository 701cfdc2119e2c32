//! `Path` (a.k.a. `BubbleFilename`) — `<32-byte-hex>[/POSIX-name]`.
//!
//! A `Path` names content inside a bubble: a 32-byte hash `H` that is the unit
//! the Access Control Contract grants permissions against, and an optional
//! single-component POSIX-like name `E` addressing an entry inside the
//! directory `H` names. `H` alone, all-zero, denotes the bubble root, which is
//! always a directory. Nesting beyond one `/` never occurs: `E` itself may not
//! contain `/`.

use crate::permissions::Permissions;

fn zero_hash() -> String {
    format!("0x{}", "0".repeat(64))
}

/// Errors that can occur while parsing a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path hash must be exactly 32 bytes of hex, optionally 0x-prefixed")]
    InvalidHash,
    #[error("path name must be non-empty, at most 255 bytes, contain no NUL or '/', and not be '.' or '..'")]
    InvalidName,
}

/// A parsed, canonicalized `Path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    hash: String,
    name: Option<String>,
}

impl Path {
    /// The bubble root: the all-zero hash with no name component.
    pub fn root() -> Path {
        Path {
            hash: zero_hash(),
            name: None,
        }
    }

    /// Parses and canonicalizes a path string per the bubble path grammar.
    pub fn parse(input: &str) -> Result<Path, PathError> {
        let (hash_part, name_part) = match input.split_once('/') {
            Some((h, rest)) => (h, Some(rest)),
            None => (input, None),
        };
        let hash = canonicalize_hash(hash_part)?;
        let name = match name_part {
            None => None,
            Some(n) => {
                validate_name(n)?;
                Some(n.to_string())
            }
        };
        Ok(Path { hash, name })
    }

    /// `true` if this is the bubble root (all-zero hash, no name).
    pub fn is_root(&self) -> bool {
        self.name.is_none() && self.hash == zero_hash()
    }

    /// Grammar-level classification: a name component is present.
    ///
    /// This reflects only the parsed grammar, not the ACC's permission
    /// overlay — use [`Path::apply_permissions`] for the authoritative
    /// classification used to gate an operation.
    pub fn is_file(&self) -> bool {
        self.name.is_some()
    }

    /// Grammar-level classification: no name component is present.
    pub fn is_directory(&self) -> bool {
        self.name.is_none()
    }

    /// The 32-byte hash component, canonical lowercase with `0x` prefix. This
    /// is always what is passed to `BlockchainProvider::get_permissions`,
    /// whether or not a name component is present.
    pub fn permissioned_part(&self) -> &str {
        &self.hash
    }

    /// The optional name component (the `E` grammar production).
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The canonical string form of this path.
    pub fn as_str(&self) -> String {
        match &self.name {
            Some(n) => format!("{}/{}", self.hash, n),
            None => self.hash.clone(),
        }
    }

    /// Overlays an ACC permission word on this path.
    ///
    /// If the permissions say `H` is not a directory but the path carries a
    /// name component, the path becomes invalid for dispatch — unless
    /// `terminated_overlay` is set, in which case the downgrade is suppressed
    /// so a `terminate` call on an already-terminated bubble remains
    /// dispatchable regardless of the stale directory flag.
    pub fn apply_permissions(&self, permissions: &Permissions, terminated_overlay: bool) -> PermissionedPath {
        // `H` being the root hash makes it a directory regardless of what the
        // ACC's permission word says — this must hold whether or not a name
        // component is addressing something inside it, not just when the
        // whole compound path is exactly the root.
        let effective_is_directory = self.hash == zero_hash() || permissions.is_directory();
        let valid = !(self.name.is_some() && !effective_is_directory && !terminated_overlay);
        PermissionedPath {
            path: self.clone(),
            permissions: permissions.clone(),
            effective_is_directory,
            valid,
        }
    }
}

/// The result of overlaying an ACC permission word on a [`Path`].
///
/// This is the shape the Guardian's method-specific permission gate (§4.7
/// step 7) actually inspects: `is_directory`/`is_file` here reflect the ACC's
/// answer, not just the grammar.
#[derive(Debug, Clone)]
pub struct PermissionedPath {
    path: Path,
    permissions: Permissions,
    effective_is_directory: bool,
    valid: bool,
}

impl PermissionedPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// `false` if the grammar/permission combination is inconsistent (a name
    /// component under an `H` the ACC says is not a directory).
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn is_directory(&self) -> bool {
        self.effective_is_directory
    }

    pub fn is_file(&self) -> bool {
        self.path.name.is_some() && self.effective_is_directory
    }
}

fn canonicalize_hash(raw: &str) -> Result<String, PathError> {
    let without_prefix = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw);
    if without_prefix.len() != 64 || !without_prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PathError::InvalidHash);
    }
    Ok(format!("0x{}", without_prefix.to_ascii_lowercase()))
}

fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() || name.as_bytes().len() > 255 {
        return Err(PathError::InvalidName);
    }
    if name.contains('\0') || name.contains('/') {
        return Err(PathError::InvalidName);
    }
    if name == "." || name == ".." {
        return Err(PathError::InvalidName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HASH: &str = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcd";

    #[test]
    fn parses_bare_hash_without_prefix() {
        let path = Path::parse(SAMPLE_HASH).unwrap();
        assert_eq!(path.permissioned_part(), format!("0x{SAMPLE_HASH}"));
        assert!(path.is_directory());
        assert!(!path.is_file());
    }

    #[test]
    fn parses_hash_with_prefix_and_uppercase() {
        let upper = format!("0x{}", SAMPLE_HASH.to_ascii_uppercase());
        let path = Path::parse(&upper).unwrap();
        assert_eq!(path.permissioned_part(), format!("0x{SAMPLE_HASH}"));
    }

    #[test]
    fn parses_hash_with_name() {
        let input = format!("{SAMPLE_HASH}/notes.txt");
        let path = Path::parse(&input).unwrap();
        assert_eq!(path.name(), Some("notes.txt"));
        assert!(path.is_file());
    }

    #[test]
    fn rejects_short_hash() {
        assert!(Path::parse("0x1234").is_err());
    }

    #[test]
    fn rejects_dot_and_dotdot_names() {
        assert!(Path::parse(&format!("{SAMPLE_HASH}/.")).is_err());
        assert!(Path::parse(&format!("{SAMPLE_HASH}/..")).is_err());
    }

    #[test]
    fn rejects_name_with_slash() {
        assert!(Path::parse(&format!("{SAMPLE_HASH}/a/b")).is_err());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(Path::parse(&format!("{SAMPLE_HASH}/")).is_err());
    }

    #[test]
    fn root_is_always_directory() {
        let root = Path::root();
        assert!(root.is_root());
        assert!(root.is_directory());
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = Path::parse(&format!("0X{}", SAMPLE_HASH.to_ascii_uppercase())).unwrap();
        let twice = Path::parse(&once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn apply_permissions_downgrades_file_when_not_directory() {
        let path = Path::parse(&format!("{SAMPLE_HASH}/child")).unwrap();
        let perms = Permissions::none();
        let overlaid = path.apply_permissions(&perms, false);
        assert!(!overlaid.is_valid());
    }

    #[test]
    fn apply_permissions_terminated_overlay_suppresses_downgrade() {
        let path = Path::parse(&format!("{SAMPLE_HASH}/child")).unwrap();
        let perms = Permissions::none().with_bubble_terminated(true);
        let overlaid = path.apply_permissions(&perms, true);
        assert!(overlaid.is_valid());
    }

    #[test]
    fn apply_permissions_root_is_always_directory_even_if_acc_says_otherwise() {
        let root = Path::root();
        let perms = Permissions::none();
        let overlaid = root.apply_permissions(&perms, false);
        assert!(overlaid.is_directory());
        assert!(overlaid.is_valid());
    }

    #[test]
    fn apply_permissions_file_under_root_hash_is_still_valid_without_directory_bit() {
        let path = Path::parse(&format!("{}/file1.txt", "0".repeat(64))).unwrap();
        let perms = Permissions::none().with_write(true);
        let overlaid = path.apply_permissions(&perms, false);
        assert!(overlaid.is_valid());
        assert!(overlaid.is_file());
    }
}
