//! Logical path handling for nested entries
//!
//! Archive members carry stored names that may use either separator and may
//! try to escape their extraction directory. This module handles:
//! - Joining ancestor names into a manifest `logical_path`
//! - Picking a safe on-disk file name for a transient extraction
//! - Case-insensitive suffix checks used by format sniffing

/// Separator between nesting levels in a logical path.
pub const SEPARATOR: char = '/';

/// Fallback on-disk name when a stored name has no usable final component.
const FALLBACK_FILE_NAME: &str = "entry";

/// Longest on-disk name produced, in bytes (filesystems cap names at 255).
const MAX_FILE_NAME_BYTES: usize = 200;

/// Extensions kept when a long name is shortened, e.g. `.tar` + `.gz`.
const MAX_SUFFIX_PARTS: usize = 2;

/// Longer "extensions" are treated as part of the stem.
const MAX_SUFFIX_PART_BYTES: usize = 16;

/// Join a parent's logical path with a child's stored name.
///
/// The root has an empty prefix, so top-level entries carry no leading separator:
/// `("", "a.txt")` -> `a.txt`, `("b.zip", "c.txt")` -> `b.zip/c.txt`
pub fn join_logical(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{name}")
    }
}

/// Get the filename from a stored name (handles both / and \)
pub fn file_name(path: &str) -> &str {
    path.rfind(['\\', '/'])
        .map(|idx| &path[idx + 1..])
        .unwrap_or(path)
}

/// Pick the on-disk name for an extracted entry.
///
/// Only the final component survives, so `../../etc/passwd` lands as `passwd`
/// inside the scratch directory. The suffix is kept because sniffing one level
/// down relies on it. Overlong names lose the end of their stem.
pub fn transient_file_name(stored: &str) -> String {
    let name: String = file_name(stored).chars().filter(|c| *c != '\0').collect();

    match name.as_str() {
        "" | "." | ".." => FALLBACK_FILE_NAME.to_string(),
        _ => shorten(name),
    }
}

/// Byte offset where the kept suffix chain (`.tar.gz`) starts.
fn suffix_start(name: &str) -> usize {
    let mut start = name.len();
    for _ in 0..MAX_SUFFIX_PARTS {
        match name[..start].rfind('.') {
            Some(dot) if dot > 0 && start - dot <= MAX_SUFFIX_PART_BYTES + 1 => start = dot,
            _ => break,
        }
    }
    start
}

fn shorten(name: String) -> String {
    if name.len() <= MAX_FILE_NAME_BYTES {
        return name;
    }

    let (stem, suffix) = name.split_at(suffix_start(&name));
    let mut cut = MAX_FILE_NAME_BYTES.saturating_sub(suffix.len()).min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], suffix)
}

/// Check whether `name` ends with any of `suffixes`, ignoring ASCII case.
pub fn has_suffix(name: &str, suffixes: &[&str]) -> bool {
    let lower = name.to_ascii_lowercase();
    suffixes.iter().any(|suffix| lower.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_logical() {
        assert_eq!(join_logical("", "a.txt"), "a.txt");
        assert_eq!(join_logical("b.zip", "c.txt"), "b.zip/c.txt");
        assert_eq!(join_logical("a/b.tar", "dir/c.zip"), "a/b.tar/dir/c.zip");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("Data\\Textures\\armor.dds"), "armor.dds");
        assert_eq!(file_name("dir/sub/file.bin"), "file.bin");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn test_transient_file_name() {
        assert_eq!(transient_file_name("dir/inner.tar.gz"), "inner.tar.gz");
        assert_eq!(transient_file_name("../../etc/passwd"), "passwd");
        assert_eq!(transient_file_name("dir/"), "entry");
        assert_eq!(transient_file_name(".."), "entry");
        assert_eq!(transient_file_name("a\0b"), "ab");
    }

    #[test]
    fn test_transient_file_name_caps_length_and_keeps_suffix() {
        let long = format!("dir/{}.tar.gz", "a".repeat(300));
        let name = transient_file_name(&long);
        assert_eq!(name.len(), MAX_FILE_NAME_BYTES);
        assert!(name.ends_with("a.tar.gz"));
        assert!(has_suffix(&name, &[".tar.gz"]));

        // Truncation never splits a multi-byte character
        let wide = format!("{}.zip", "é".repeat(150));
        let name = transient_file_name(&wide);
        assert!(name.len() <= MAX_FILE_NAME_BYTES);
        assert!(name.ends_with("é.zip"));

        // A long dotted tail is stem, not suffix
        let dotted = format!("{}.{}", "b".repeat(10), "c".repeat(290));
        assert_eq!(transient_file_name(&dotted).len(), MAX_FILE_NAME_BYTES);

        assert_eq!(transient_file_name("short.tar.gz"), "short.tar.gz");
    }

    #[test]
    fn test_has_suffix() {
        assert!(has_suffix("CAPTURE.WARC.GZ", &[".warc.gz"]));
        assert!(has_suffix("x.tar.zst", &[".tar.zstd", ".tar.zst"]));
        assert!(!has_suffix("x.tar", &[".tar.gz"]));
    }
}
