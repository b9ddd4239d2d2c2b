//! File-type admission policy
//!
//! Fixed deny-list of executable and script file types, applied by the
//! session layer before a transfer is scheduled. The core never consults
//! this implicitly; it is a collaborator-facing check.

/// File extensions rejected before transfer begins
const DENIED_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "ps1", "sh", "vbs", "js", "jar", "app", "dmg",
];

/// MIME types rejected before transfer begins
const DENIED_MIME_TYPES: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-sh",
    "application/x-bat",
    "application/java-archive",
    "application/x-apple-diskimage",
    "text/javascript",
];

/// Whether a file passes the admission deny-list
///
/// Both the extension (case-insensitive) and the declared MIME type must
/// be clear of the deny-list.
#[must_use]
pub fn is_file_allowed(file_name: &str, mime_type: &str) -> bool {
    rejection_reason(file_name, mime_type).is_none()
}

/// Why a file is denied, or `None` if it is allowed
#[must_use]
pub fn rejection_reason(file_name: &str, mime_type: &str) -> Option<String> {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    if DENIED_EXTENSIONS.contains(&ext.as_str()) {
        return Some(format!("file extension .{ext} is not allowed"));
    }

    let mime = mime_type.to_ascii_lowercase();
    if DENIED_MIME_TYPES.contains(&mime.as_str()) {
        return Some(format!("MIME type {mime} is not allowed"));
    }
    None
}
