use crate::media;
use crate::transform::params::{TransformParams, DEFAULT_MAX_DIMENSION, PARAM_MARKER};

/// A media request split into the logical file path and its transform options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    /// File path relative to the origin root, without parameter segments.
    pub path: String,
    /// Lowercased extension of `path`; empty when the file has none.
    pub extension: String,
    pub params: TransformParams,
}

impl TransformRequest {
    /// Parses the part of a request path that follows the route prefix.
    ///
    /// `w:300,h:200/photos/cat.png` yields path `photos/cat.png` with width and
    /// height set. Empty, `.` and `..` segments are dropped so the logical path
    /// stays inside the origin root.
    pub fn parse(route_path: &str) -> Self {
        Self::parse_within(route_path, DEFAULT_MAX_DIMENSION)
    }

    /// Parses with a custom bound on requested width and height.
    pub fn parse_within(route_path: &str, max_dimension: u32) -> Self {
        let mut params = TransformParams::default();
        let mut segments = Vec::new();

        for segment in route_path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                continue;
            }
            if segment.contains(PARAM_MARKER) {
                params.apply_segment_within(segment, max_dimension);
            } else {
                segments.push(segment);
            }
        }

        let path = segments.join("/");
        let extension = segments
            .last()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        Self { path, extension, params }
    }

    /// Extension of the produced variant: the requested format, else the source's.
    pub fn output_extension(&self) -> &str {
        match self.params.format {
            Some(format) => format.extension(),
            None => &self.extension,
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        media::content_type_for_extension(self.output_extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::params::Format;

    #[test]
    fn separates_params_from_path() {
        let req = TransformRequest::parse("w:300/photos/q:80/cat.PNG");
        assert_eq!(req.path, "photos/cat.PNG");
        assert_eq!(req.extension, "png");
        assert_eq!(req.params.width, Some(300));
        assert_eq!(req.params.quality, Some(80));
    }

    #[test]
    fn drops_traversal_segments() {
        let req = TransformRequest::parse("../../etc/./passwd.png");
        assert_eq!(req.path, "etc/passwd.png");
    }

    #[test]
    fn dimensions_beyond_the_bound_do_not_reach_the_key() {
        let bounded = TransformRequest::parse_within("w:2000/h:300/cat.png", 1024);
        assert_eq!(bounded.params.width, None);
        assert_eq!(bounded.params.height, Some(300));
        assert_eq!(bounded.params, TransformRequest::parse("h:300/cat.png").params);
    }

    #[test]
    fn missing_extension_is_empty() {
        let req = TransformRequest::parse("w:10/README");
        assert_eq!(req.path, "README");
        assert_eq!(req.extension, "");
        assert_eq!(req.content_type(), None);
    }

    #[test]
    fn output_extension_follows_format() {
        let req = TransformRequest::parse("f:webp/cat.png");
        assert_eq!(req.params.format, Some(Format::Webp));
        assert_eq!(req.output_extension(), "webp");
        assert_eq!(req.content_type(), Some("image/webp"));
    }
}
