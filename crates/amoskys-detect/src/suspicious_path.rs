//! Suspicious execution path check (§4.5): a short-circuiting trusted
//! prefix list, a blacklist of world-writable or staging locations, a
//! hidden-directory check, a suspicious-extension table, and a
//! base-name randomness heuristic for payloads dropped under a name
//! with no obvious trust signal at all.

const TRUSTED_PREFIXES: &[&str] = &[
    "/usr/bin/",
    "/usr/sbin/",
    "/bin/",
    "/sbin/",
    "/usr/local/bin/",
    "/Applications/",
    "/System/",
    "/Library/",
];

const SUSPICIOUS_PREFIXES: &[&str] = &[
    "/tmp/",
    "/var/tmp/",
    "/dev/shm/",
    "/private/tmp/",
];

/// Directory segments that are suspicious no matter where they fall in
/// the path, rather than only at its start — a per-user staging area
/// (`Downloads`, the trash, a browser cache) reached via any home
/// directory.
const SUSPICIOUS_SEGMENTS: &[&str] = &["/Downloads/", "/.Trash/", "/Library/Caches/"];

const SUSPICIOUS_EXTENSIONS: &[&str] = &[".scpt", ".command", ".sh", ".py", ".rb", ".pl", ".jar"];

/// Why [`check`] flagged a path, for the caller to fold into an
/// incident summary or a log field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspiciousPathReason {
    SuspiciousLocation,
    HiddenDirectory,
    SuspiciousExtension,
    RandomlyNamed,
}

/// Checks `path` against the trusted/blacklist/heuristic chain. A path
/// under a trusted prefix short-circuits to "not suspicious" before any
/// other check runs, so e.g. a hidden dotfile under `/Library/` is never
/// flagged just for looking hidden.
pub fn check(path: &str) -> Option<SuspiciousPathReason> {
    if TRUSTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return None;
    }

    if SUSPICIOUS_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
        || SUSPICIOUS_SEGMENTS.iter().any(|segment| path.contains(segment))
    {
        return Some(SuspiciousPathReason::SuspiciousLocation);
    }

    if path.contains("/.") && !path.starts_with("/Applications") {
        return Some(SuspiciousPathReason::HiddenDirectory);
    }

    let path_lower = path.to_ascii_lowercase();
    if SUSPICIOUS_EXTENSIONS.iter().any(|ext| path_lower.ends_with(ext)) {
        return Some(SuspiciousPathReason::SuspiciousExtension);
    }

    let basename = path.rsplit('/').next().unwrap_or(path);
    if looks_random(basename) {
        return Some(SuspiciousPathReason::RandomlyNamed);
    }

    None
}

pub fn is_suspicious(path: &str) -> bool {
    check(path).is_some()
}

/// A base name "looks random" if it's at least 8 characters (before its
/// extension), has a character-diversity ratio above 0.8, and reads as a
/// hex or base64-like string rather than a word.
fn looks_random(basename: &str) -> bool {
    let stem = basename.split('.').next().unwrap_or(basename);
    if stem.len() < 8 {
        return false;
    }

    let distinct = stem.chars().collect::<std::collections::HashSet<_>>().len();
    let ratio = distinct as f64 / stem.len() as f64;
    if ratio <= 0.8 {
        return false;
    }

    let is_hex = stem.chars().all(|c| c.is_ascii_hexdigit()) && stem.chars().any(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let is_base64_like = stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=');

    is_hex || is_base64_like
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_prefix_short_circuits() {
        assert_eq!(check("/usr/bin/.hidden"), None);
    }

    #[test]
    fn flags_tmp_execution() {
        assert_eq!(check("/tmp/payload"), Some(SuspiciousPathReason::SuspiciousLocation));
    }

    #[test]
    fn flags_downloads_segment_regardless_of_user() {
        assert_eq!(check("/Users/alice/Downloads/installer"), Some(SuspiciousPathReason::SuspiciousLocation));
    }

    #[test]
    fn flags_hidden_directory() {
        assert_eq!(check("/home/alice/.config/evil"), Some(SuspiciousPathReason::HiddenDirectory));
    }

    #[test]
    fn flags_suspicious_extension() {
        assert_eq!(check("/home/alice/run.sh"), Some(SuspiciousPathReason::SuspiciousExtension));
    }

    #[test]
    fn flags_randomly_named_hex_binary() {
        assert_eq!(check("/home/alice/a1b2c3d4e5f6"), Some(SuspiciousPathReason::RandomlyNamed));
    }

    #[test]
    fn ordinary_named_binary_does_not_flag() {
        assert_eq!(check("/home/alice/backup_script"), None);
    }

    #[test]
    fn short_basenames_are_never_flagged_as_random() {
        assert_eq!(check("/home/alice/ab"), None);
    }
}
