//! HTML pages: the OpenSeadragon viewer and the identifier indexes.

/// Where the viewer page loads OpenSeadragon from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdAssets {
    /// The public CDN build
    Cdn,

    /// A copy under `openseadragon/` next to the page
    Local,
}

impl OsdAssets {
    pub fn script(&self) -> &'static str {
        match self {
            OsdAssets::Cdn => {
                "https://cdn.jsdelivr.net/npm/openseadragon@4.1/build/openseadragon/openseadragon.min.js"
            }
            OsdAssets::Local => "openseadragon/openseadragon.min.js",
        }
    }

    pub fn images(&self) -> &'static str {
        match self {
            OsdAssets::Cdn => "https://cdn.jsdelivr.net/npm/openseadragon@4.1/build/openseadragon/images/",
            OsdAssets::Local => "openseadragon/images/",
        }
    }
}

/// Escape HTML special characters to prevent XSS attacks.
pub(crate) fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape a string for use inside a double quoted JavaScript literal.
fn js_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '<' => result.push_str("\\u003c"),
            '>' => result.push_str("\\u003e"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

/// OpenSeadragon page showing the image described by `info_url`.
pub fn osd_page(identifier: &str, info_url: &str, assets: OsdAssets) -> String {
    let escaped_identifier = html_escape(identifier);
    let info_url = js_escape(info_url);

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>IIIF Viewer - {escaped_identifier}</title>
    <script src="{script}"></script>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            background: #0f0f0f;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
            overflow: hidden;
        }}
        #viewer {{
            width: 100vw;
            height: 100vh;
        }}
        .info-panel {{
            position: absolute;
            top: 16px;
            left: 16px;
            background: rgba(0, 0, 0, 0.85);
            color: #fff;
            padding: 12px 16px;
            border-radius: 8px;
            font-size: 13px;
            max-width: 320px;
            z-index: 1000;
            word-break: break-all;
        }}
        .error-banner {{
            position: absolute;
            top: 0;
            left: 0;
            right: 0;
            background: rgba(220, 38, 38, 0.95);
            color: white;
            padding: 12px 20px;
            font-size: 14px;
            z-index: 1000;
            display: none;
        }}
        .error-banner.visible {{
            display: block;
        }}
    </style>
</head>
<body>
    <div id="error-banner" class="error-banner">Failed to load image</div>
    <div id="viewer"></div>
    <div class="info-panel">{escaped_identifier}</div>

    <script>
        const viewer = OpenSeadragon({{
            id: "viewer",
            prefixUrl: "{images}",
            tileSources: "{info_url}",
            showNavigator: true,
            navigatorPosition: "BOTTOM_RIGHT",
            showRotationControl: true,
            crossOriginPolicy: "Anonymous"
        }});

        viewer.addHandler('open-failed', function() {{
            document.getElementById('error-banner').classList.add('visible');
        }});
    </script>
</body>
</html>"##,
        escaped_identifier = escaped_identifier,
        script = assets.script(),
        images = assets.images(),
        info_url = info_url,
    )
}

/// A link in an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub label: String,
    pub links: Vec<(String, String)>,
}

/// Simple HTML list page.
pub fn index_page(title: &str, intro: &str, entries: &[IndexEntry]) -> String {
    let mut items = String::new();
    for entry in entries {
        items.push_str("    <li>");
        items.push_str(&html_escape(&entry.label));
        for (text, href) in &entry.links {
            items.push_str(&format!(
                " [<a href=\"{}\">{}</a>]",
                html_escape(href),
                html_escape(text)
            ));
        }
        items.push_str("</li>\n");
    }
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    \
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<p>{intro}</p>\n<ul>\n{items}</ul>\n\
         </body>\n</html>\n",
        title = html_escape(title),
        intro = html_escape(intro),
        items = items,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osd_page_cdn() {
        let html = osd_page("img.png", "http://localhost/2.1_image/img.png/info.json", OsdAssets::Cdn);
        assert!(html.contains("OpenSeadragon"));
        assert!(html.contains("cdn.jsdelivr.net"));
        assert!(html.contains("tileSources: \"http://localhost/2.1_image/img.png/info.json\""));
        assert!(html.contains("IIIF Viewer - img.png"));
    }

    #[test]
    fn test_osd_page_local() {
        let html = osd_page("a", "a/info.json", OsdAssets::Local);
        assert!(html.contains("<script src=\"openseadragon/openseadragon.min.js\">"));
        assert!(html.contains("prefixUrl: \"openseadragon/images/\""));
    }

    #[test]
    fn test_osd_page_escapes() {
        let html = osd_page("<script>alert(1)</script>", "x\"</script>", OsdAssets::Cdn);
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("x\\\"\\u003c/script\\u003e"));
    }

    #[test]
    fn test_html_escape_special_chars() {
        assert_eq!(html_escape("hello"), "hello");
        assert_eq!(html_escape("<b>"), "&lt;b&gt;");
        assert_eq!(html_escape("a & b"), "a &amp; b");
        assert_eq!(html_escape("it's \"q\""), "it&#x27;s &quot;q&quot;");
    }

    #[test]
    fn test_index_page() {
        let entries = vec![IndexEntry {
            label: "a.png".to_string(),
            links: vec![
                ("info".to_string(), "a.png/info.json".to_string()),
                ("osd".to_string(), "a.png/osd.html".to_string()),
            ],
        }];
        let html = index_page("Prefix 2.1_image", "Images:", &entries);
        assert!(html.contains("<h1>Prefix 2.1_image</h1>"));
        assert!(html.contains("<li>a.png [<a href=\"a.png/info.json\">info</a>] [<a href=\"a.png/osd.html\">osd</a>]</li>"));
    }
}
