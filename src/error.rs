//! Error types for the IIIF image server.
//!
//! Every failure in request parsing, derivation and information handling is
//! an [`IiifError`]: an HTTP status code, the request parameter at fault, a
//! human readable text and an optional set of extra response headers.
//!
//! Two renderings are provided:
//!
//! - [`IiifError::as_txt`] - plain text, used for Image API 1.1 and later
//! - [`IiifError::as_xml`] - the XML error document mandated by Image API 1.0

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Namespace of the Image API 1.0 XML error document.
pub const IIIF_1_0_NS: &str = "http://library.stanford.edu/iiif/image-api/ns/";

// =============================================================================
// Parameter
// =============================================================================

/// The request parameter an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parameter {
    Identifier,
    Region,
    Size,
    Rotation,
    Quality,
    Format,
    #[default]
    Unknown,
}

impl Parameter {
    /// The parameter name as used in error documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Identifier => "identifier",
            Parameter::Region => "region",
            Parameter::Size => "size",
            Parameter::Rotation => "rotation",
            Parameter::Quality => "quality",
            Parameter::Format => "format",
            Parameter::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// IiifError
// =============================================================================

/// Classification of an [`IiifError`].
///
/// The kind determines the default status code and lets callers treat some
/// conditions specially (zero-size results are not worth logging, path
/// errors are reported as 404 by the HTTP layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed region, size, rotation, quality or format token (400)
    Parse,

    /// Valid syntax but the computed output has a zero dimension (400)
    ZeroSize,

    /// Could not tell an illegal identifier from a bad segment count (400)
    RequestPath,

    /// Feature valid in the API but not supported by the engine (501)
    Unsupported,

    /// Output format not supported (415)
    UnsupportedFormat,

    /// Source or output image exceeds the configured pixel budget (413)
    PayloadTooLarge,

    /// Identifier cannot be resolved (404)
    NotFound,

    /// Access requires authorization (401)
    Unauthorized,

    /// Request path longer than allowed (414)
    UriTooLong,

    /// Unexpected failure (500)
    Internal,
}

/// An IIIF image server error.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}, parameter={parameter}, code={code}", text_or_unknown(.text))]
pub struct IiifError {
    kind: ErrorKind,
    code: u16,
    parameter: Parameter,
    text: String,
    headers: BTreeMap<String, String>,
}

impl IiifError {
    /// Create an error with explicit kind, status code and parameter.
    pub fn new(kind: ErrorKind, code: u16, parameter: Parameter, text: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            parameter,
            text: text.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Malformed request parameter (400).
    pub fn bad_request(parameter: Parameter, text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, 400, parameter, text)
    }

    /// Request would produce a zero-size image (400).
    pub fn zero_size(parameter: Parameter, text: impl Into<String>) -> Self {
        Self::new(ErrorKind::ZeroSize, 400, parameter, text)
    }

    /// Bad path that may be an illegal identifier or bad segment count.
    pub fn request_path(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestPath, 400, Parameter::Unknown, text)
    }

    /// Feature not implemented by the configured engine (501).
    pub fn unsupported(parameter: Parameter, text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, 501, parameter, text)
    }

    /// Output format not supported (415).
    pub fn unsupported_format(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, 415, Parameter::Format, text)
    }

    /// Source or output image too large to process (413).
    pub fn payload_too_large(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, 413, Parameter::Unknown, text)
    }

    /// Unknown identifier (404).
    pub fn not_found(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, 404, Parameter::Identifier, text)
    }

    /// Access requires authorization (401).
    pub fn unauthorized(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, 401, Parameter::Unknown, text)
    }

    /// Path exceeds the maximum request length (414).
    pub fn uri_too_long(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::UriTooLong, 414, Parameter::Unknown, text)
    }

    /// Unclassified failure (500).
    pub fn internal(text: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, 500, Parameter::Unknown, text)
    }

    /// Attach an extra HTTP header to be sent with the error response.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the parameter the error is attributed to.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn parameter(&self) -> Parameter {
        self.parameter
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// True for the zero-size subtype.
    pub fn is_zero_size(&self) -> bool {
        self.kind == ErrorKind::ZeroSize
    }

    /// Plain text rendering used for Image API 1.1 and later.
    pub fn as_txt(&self) -> String {
        let mut s = String::from("IIIF Image Server Error\n\n");
        s.push_str(text_or_unknown(&self.text));
        s.push_str("\n\n");
        s.push_str(&format!("parameter={}\n", self.parameter));
        s.push_str(&format!("code={}\n\n", self.code));
        for (name, value) in &self.headers {
            s.push_str(&format!("header {}={}\n", name, value));
        }
        s
    }

    /// XML error document of Image API 1.0.
    pub fn as_xml(&self) -> String {
        let mut s = String::from("<?xml version='1.0' encoding='UTF-8'?>\n");
        s.push_str(&format!("<error xmlns=\"{}\">\n", IIIF_1_0_NS));
        s.push_str(&format!(
            "<parameter>{}</parameter>\n",
            xml_escape(self.parameter.as_str())
        ));
        if !self.text.is_empty() {
            s.push_str(&format!("<text>{}</text>\n", xml_escape(&self.text)));
        }
        s.push_str("</error>");
        s
    }
}

/// Error text, with a placeholder when none was given.
fn text_or_unknown(text: &str) -> &str {
    if text.is_empty() {
        "UNKNOWN_ERROR"
    } else {
        text
    }
}

impl From<std::io::Error> for IiifError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IiifError::not_found(err.to_string()),
            _ => IiifError::internal(format!("I/O error: {}", err)),
        }
    }
}

impl From<image::ImageError> for IiifError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(e) => {
                IiifError::payload_too_large(format!("Image size limit exceeded: {}", e))
            }
            image::ImageError::Unsupported(e) => {
                IiifError::unsupported_format(format!("Unsupported image format: {}", e))
            }
            image::ImageError::IoError(e) => IiifError::from(e),
            other => IiifError::internal(format!("Image processing failed: {}", other)),
        }
    }
}

/// Escape the XML special characters in element text.
pub(crate) fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

// =============================================================================
// InfoError
// =============================================================================

/// Errors reading or validating an Image Information document.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InfoError {
    /// The `@context` is absent (with no version hint) or not recognized
    #[error("Bad @context: {0}")]
    Context(String),

    /// A required field is missing
    #[error("Missing {0} parameter")]
    Missing(&'static str),

    /// A field is present but has the wrong shape
    #[error("Bad value for {field}: {message}")]
    Invalid { field: String, message: String },

    /// The document is not valid JSON
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for InfoError {
    fn from(err: serde_json::Error) -> Self {
        InfoError::Json(err.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
