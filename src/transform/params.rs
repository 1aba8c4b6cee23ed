use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Marker that distinguishes a parameter segment from a path segment.
pub const PARAM_MARKER: char = ':';

/// Largest width or height accepted unless configured otherwise.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// Output container/encoding requested with `f:` / `format:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Jpeg,
    Png,
    Webp,
    Avif,
    Gif,
    Mp4,
    Webm,
    Mov,
}

impl Format {
    /// File extension the encoded output carries.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Avif => "avif",
            Format::Gif => "gif",
            Format::Mp4 => "mp4",
            Format::Webm => "webm",
            Format::Mov => "mov",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Format::Jpeg),
            "png" => Ok(Format::Png),
            "webp" => Ok(Format::Webp),
            "avif" => Ok(Format::Avif),
            "gif" => Ok(Format::Gif),
            "mp4" => Ok(Format::Mp4),
            "webm" => Ok(Format::Webm),
            "mov" => Ok(Format::Mov),
            _ => Err(format!("Invalid format: {}", s)),
        }
    }
}

/// How the source is fitted into the requested width/height box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitMode {
    Cover,
    Contain,
    Fill,
    Inside,
    Outside,
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMode::Cover => write!(f, "cover"),
            FitMode::Contain => write!(f, "contain"),
            FitMode::Fill => write!(f, "fill"),
            FitMode::Inside => write!(f, "inside"),
            FitMode::Outside => write!(f, "outside"),
        }
    }
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cover" => Ok(FitMode::Cover),
            "contain" => Ok(FitMode::Contain),
            "fill" => Ok(FitMode::Fill),
            "inside" => Ok(FitMode::Inside),
            "outside" => Ok(FitMode::Outside),
            _ => Err(format!("Invalid fit mode: {}", s)),
        }
    }
}

/// Transformation options collected from the parameter segments of a request path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformParams {
    /// Desired width of the output
    pub width: Option<u32>,

    /// Desired height of the output
    pub height: Option<u32>,

    /// Output encoding; the source extension is kept when absent
    pub format: Option<Format>,

    /// Encoder quality, 1-100
    pub quality: Option<u8>,

    /// Fit mode used when both dimensions are given
    pub fit: Option<FitMode>,
}

impl TransformParams {
    /// Applies every `name:value` pair found in one parameter segment.
    ///
    /// A segment may carry several pairs separated by `,`. Unknown names and
    /// values that do not parse are skipped; a later valid pair overrides an
    /// earlier one.
    pub fn apply_segment(&mut self, segment: &str) {
        self.apply_segment_within(segment, DEFAULT_MAX_DIMENSION);
    }

    /// Like [`apply_segment`](Self::apply_segment), with dimensions above
    /// `max_dimension` treated as malformed.
    pub fn apply_segment_within(&mut self, segment: &str, max_dimension: u32) {
        for pair in segment.split(',') {
            let Some((name, value)) = pair.split_once(PARAM_MARKER) else {
                tracing::debug!(pair, "Skipping parameter without marker");
                continue;
            };
            if let Err(e) = self.apply(name.trim(), value.trim(), max_dimension) {
                tracing::debug!(pair, error = %e, "Skipping malformed parameter");
            }
        }
    }

    fn apply(&mut self, name: &str, value: &str, max_dimension: u32) -> Result<(), String> {
        match name.to_lowercase().as_str() {
            "w" | "width" => self.width = Some(parse_dimension(value, max_dimension)?),
            "h" | "height" => self.height = Some(parse_dimension(value, max_dimension)?),
            "q" | "quality" => {
                let q = value.parse::<u8>().map_err(|e| e.to_string())?;
                if q == 0 || q > 100 {
                    return Err(format!("Quality out of range: {}", q));
                }
                self.quality = Some(q);
            }
            "f" | "format" => self.format = Some(value.parse()?),
            "fit" => self.fit = Some(value.parse()?),
            other => return Err(format!("Unknown parameter: {}", other)),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Canonical name/value pairs, ordered by name.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        if let Some(w) = self.width {
            map.insert("width", w.to_string());
        }
        if let Some(h) = self.height {
            map.insert("height", h.to_string());
        }
        if let Some(q) = self.quality {
            map.insert("quality", q.to_string());
        }
        if let Some(f) = self.format {
            map.insert("format", f.to_string());
        }
        if let Some(fit) = self.fit {
            map.insert("fit", fit.to_string());
        }
        map
    }

    /// Order-independent serialization, e.g. `fit=cover&format=webp&width=300`.
    pub fn canonical(&self) -> String {
        self.to_map()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn parse_dimension(value: &str, max: u32) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(0) => Err("Dimension must be > 0".into()),
        Ok(v) if v > max => Err(format!("Dimension {} exceeds limit {}", v, max)),
        Ok(v) => Ok(v),
        Err(e) => Err(e.to_string()),
    }
}
