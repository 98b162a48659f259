//! Canonical URL rendering and the percent codec.

use std::fmt::Write;

use super::{Region, Request, Rotation, Size, SizeMode};

/// Characters left unescaped besides ASCII alphanumerics.
const SAFE: &[u8] = b"-._~!$&'()*+,;=:";

/// Percent-encode a path segment.
///
/// Everything except unreserved characters and the sub-delimiters
/// `!$&'()*+,;=` and `:` is escaped, including `/`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || SAFE.contains(&b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

/// Percent-decode a path segment, replacing invalid UTF-8 lossily.
pub fn unquote(s: &str) -> String {
    match urlencoding::decode(s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned(),
    }
}

impl Region {
    /// Canonical string form.
    pub fn render(&self) -> String {
        match self {
            Region::Full => "full".to_string(),
            Region::Square => "square".to_string(),
            Region::Pct { x, y, w, h } => format!("pct:{},{},{},{}", x, y, w, h),
            Region::Pixel { x, y, w, h } => format!("{},{},{},{}", x, y, w, h),
        }
    }
}

impl Size {
    /// Canonical string form.
    pub fn render(&self) -> String {
        let body = match self.mode {
            SizeMode::Full => "full".to_string(),
            SizeMode::Max => "max".to_string(),
            SizeMode::Pct(p) => format!("pct:{}", p),
            SizeMode::Width(w) => format!("{},", w),
            SizeMode::Height(h) => format!(",{}", h),
            SizeMode::Exact { w, h } => format!("{},{}", w, h),
            SizeMode::BestFit { w, h } => format!("!{},{}", w, h),
        };
        if self.upscale {
            format!("^{}", body)
        } else {
            body
        }
    }
}

impl Rotation {
    /// Canonical string form, e.g. `0`, `!90`, `22.5`.
    pub fn render(&self) -> String {
        format!("{}{}", if self.mirror { "!" } else { "" }, self.degrees)
    }
}

impl Request {
    /// Path of this request relative to `base_url`.
    ///
    /// Only the identifier needs escaping; parameter tokens are built from
    /// characters that are safe in a path segment.
    pub fn path(&self) -> String {
        let mut path = format!(
            "{}/{}/{}/{}/{}",
            quote(&self.identifier),
            self.region.render(),
            self.size.render(),
            self.rotation.render(),
            self.quality.token(self.api_version)
        );
        if let Some(format) = &self.format {
            path.push('.');
            path.push_str(format);
        }
        path
    }

    /// Full URL of this request including the base URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.as_deref().unwrap_or(""), self.path())
    }

    /// URL of the info document for this request's identifier.
    pub fn info_url(&self, format: &str) -> String {
        info_url(
            self.base_url.as_deref().unwrap_or(""),
            &self.identifier,
            format,
        )
    }
}

/// URL of an info document.
pub fn info_url(base_url: &str, identifier: &str, format: &str) -> String {
    format!("{}{}/info.{}", base_url, quote(identifier), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{IiifPath, RequestParser};
    use crate::version::ApiVersion;
    use crate::version::Quality;

    fn roundtrip(path: &str, version: ApiVersion) -> String {
        match RequestParser::new(version).split(path).unwrap() {
            IiifPath::Image(segments) => segments.parse(version).unwrap().url(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("abc"), "abc");
        assert_eq!(quote("ark:/12025/654xz321"), "ark:%2F12025%2F654xz321");
        assert_eq!(quote("a b"), "a%20b");
        assert_eq!(quote("!$&'()*+,;=:-._~"), "!$&'()*+,;=:-._~");
        assert_eq!(quote("é"), "%C3%A9");
        assert_eq!(quote("?#[]@%"), "%3F%23%5B%5D%40%25");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("ark:%2F12025%2F654xz321"), "ark:/12025/654xz321");
        assert_eq!(unquote("%C3%A9"), "é");
        assert_eq!(unquote("plain"), "plain");
        // Invalid UTF-8 is recovered rather than rejected
        assert_eq!(unquote("%FF"), "\u{FFFD}");
    }

    #[test]
    fn test_render_canonical_3_0() {
        let v = ApiVersion::V3_0;
        let r = Request::new(v, "abc1").with_size(Size::new(SizeMode::Exact { w: 11, h: 22 }));
        assert_eq!(r.url(), "abc1/full/11,22/0/default");

        let r = Request::new(v, "abc2").with_size(Size::new(SizeMode::Width(100)));
        assert_eq!(r.url(), "abc2/full/100,/0/default");

        let r = Request::new(v, "abc3").with_size(Size::new(SizeMode::Height(999)));
        assert_eq!(r.url(), "abc3/full/,999/0/default");

        let r = Request::new(v, "abc5");
        assert_eq!(r.url(), "abc5/full/max/0/default");

        let r = Request::new(v, "abc6")
            .with_size(Size::upscaled(SizeMode::BestFit { w: 9, h: 8 }))
            .with_rotation(Rotation::new(true, 90.0))
            .with_quality(Quality::Gray)
            .with_format("png");
        assert_eq!(r.url(), "abc6/full/^!9,8/!90/gray.png");
    }

    #[test]
    fn test_render_1_1_tokens() {
        let r = Request::new(ApiVersion::V1_1, "x").with_quality(Quality::Gray);
        assert_eq!(r.url(), "x/full/full/0/grey");
        assert_eq!(Request::new(ApiVersion::V1_1, "x").url(), "x/full/full/0/native");
    }

    #[test]
    fn test_render_with_base_url() {
        let r = Request::new(ApiVersion::V2_1, "a/b")
            .with_base_url("http://example.org/iiif/")
            .with_region(Region::Pixel {
                x: 0,
                y: 10,
                w: 20,
                h: 30,
            })
            .with_format("jpg");
        assert_eq!(
            r.url(),
            "http://example.org/iiif/a%2Fb/0,10,20,30/full/0/default.jpg"
        );
        assert_eq!(r.info_url("json"), "http://example.org/iiif/a%2Fb/info.json");
    }

    #[test]
    fn test_parse_render_identity() {
        for path in [
            "id1/full/full/0/default.jpg",
            "id1/square/max/!90/gray.png",
            "id1/pct:10,20,30.5,40/pct:50/22.5/bitonal",
            "ark:%2F12025%2F654xz321/0,0,10,10/!5,6/!0/color",
        ] {
            assert_eq!(roundtrip(path, ApiVersion::V2_1), path);
        }
        assert_eq!(
            roundtrip("id/full/^2000,/0/default", ApiVersion::V3_0),
            "id/full/^2000,/0/default"
        );
    }

    #[test]
    fn test_rotation_normalization_renders() {
        assert_eq!(roundtrip("i/full/full/360/default", ApiVersion::V2_1), "i/full/full/0/default");
        assert_eq!(roundtrip("i/full/full/!0/default", ApiVersion::V2_1), "i/full/full/!0/default");
        assert_eq!(
            roundtrip("i/pct:0,0,100,100/full/0/default", ApiVersion::V2_1),
            "i/full/full/0/default"
        );
    }
}
