//! Core type definitions for blockgate
//!
//! These types are shared by the engines, the compiled rule format and the
//! orchestrator.

/// Identifier of one configured engine. Doubles as the whitelist lookup key.
pub type FeatureKey = String;

// =============================================================================
// Block Decision
// =============================================================================

/// Verdict of a single engine, or of the orchestrator as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockDecision {
    /// Request may proceed
    Allow,
    /// Request must be cancelled
    Block,
    /// The engine has not finished loading and gave no opinion
    EngineNotReady,
}

// =============================================================================
// Content Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Content type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContentType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;

        /// All content types
        const ALL = 0x0FFF;
    }
}

impl ContentType {
    /// Parse from a raw content type name as reported by the renderer.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Self::SCRIPT,
            "image" | "img" => Self::IMAGE,
            "stylesheet" | "css" => Self::STYLESHEET,
            "object" => Self::OBJECT,
            "sub_frame" | "subdocument" | "iframe" => Self::SUBDOCUMENT,
            "document" | "main_frame" => Self::DOCUMENT,
            "xmlhttprequest" | "xhr" | "fetch" => Self::XMLHTTPREQUEST,
            "websocket" => Self::WEBSOCKET,
            "font" => Self::FONT,
            "media" => Self::MEDIA,
            "ping" | "beacon" => Self::PING,
            _ => Self::OTHER,
        }
    }

    /// Canonical name of a single content type. Combined masks report "other".
    pub fn raw_name(self) -> &'static str {
        CONTENT_TYPE_NAMES
            .iter()
            .find(|(ty, _)| *ty == self)
            .map(|(_, name)| *name)
            .unwrap_or("other")
    }
}

const CONTENT_TYPE_NAMES: [(ContentType, &str); 11] = [
    (ContentType::SCRIPT, "script"),
    (ContentType::IMAGE, "image"),
    (ContentType::STYLESHEET, "stylesheet"),
    (ContentType::OBJECT, "object"),
    (ContentType::SUBDOCUMENT, "sub_frame"),
    (ContentType::DOCUMENT, "document"),
    (ContentType::XMLHTTPREQUEST, "xmlhttprequest"),
    (ContentType::WEBSOCKET, "websocket"),
    (ContentType::FONT, "font"),
    (ContentType::MEDIA, "media"),
    (ContentType::PING, "ping"),
];

// =============================================================================
// Request
// =============================================================================

/// A request being decided.
#[derive(Debug, Clone, Copy)]
pub struct BlockRequest<'a> {
    /// URL of the page that issued the request, if known
    pub site_url: Option<&'a str>,
    /// Full request URL
    pub request_url: &'a str,
    /// Content type of the request
    pub content_type: ContentType,
}

impl<'a> BlockRequest<'a> {
    pub fn new(site_url: Option<&'a str>, request_url: &'a str, content_type: ContentType) -> Self {
        Self {
            site_url,
            request_url,
            content_type,
        }
    }

    /// Host of the requested URL, or `""` when it cannot be extracted.
    pub fn request_host(&self) -> &'a str {
        crate::url::extract_host(self.request_url).unwrap_or("")
    }

    /// Host of the site URL, or `""` when absent.
    pub fn site_host(&self) -> &'a str {
        self.site_url.and_then(crate::url::extract_host).unwrap_or("")
    }
}
