/// Which transform engine handles an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Extension → (kind, MIME type). The only place either mapping lives.
const MEDIA_TYPES: &[(&str, MediaKind, &str)] = &[
    ("jpg", MediaKind::Image, "image/jpeg"),
    ("jpeg", MediaKind::Image, "image/jpeg"),
    ("png", MediaKind::Image, "image/png"),
    ("webp", MediaKind::Image, "image/webp"),
    ("avif", MediaKind::Image, "image/avif"),
    ("gif", MediaKind::Image, "image/gif"),
    ("mp4", MediaKind::Video, "video/mp4"),
    ("mov", MediaKind::Video, "video/quicktime"),
    ("webm", MediaKind::Video, "video/webm"),
];

fn lookup(ext: &str) -> Option<&'static (&'static str, MediaKind, &'static str)> {
    MEDIA_TYPES
        .iter()
        .find(|(known, _, _)| known.eq_ignore_ascii_case(ext))
}

/// MIME type for an extension; `None` means no Content-Type header is set.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    lookup(ext).map(|(_, _, mime)| *mime)
}

/// Classifies an extension; `None` means the type is unsupported.
pub fn classify(ext: &str) -> Option<MediaKind> {
    lookup(ext).map(|(_, kind, _)| *kind)
}
