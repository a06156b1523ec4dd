//! MIME policy (spec §6): first matching file-extension rule wins,
//! otherwise `application/octet-stream`.

const RULES: &[(&str, &str)] = &[
    ("css", "text/css"),
    ("htm", "text/html"),
    ("jpg", "image/jpeg"),
    ("js", "application/javascript"),
    ("png", "image/png"),
    ("txt", "text/plain"),
];

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Resolve a path's MIME type from its extension.
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    RULES
        .iter()
        .find(|(rule_ext, _)| *rule_ext == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}
