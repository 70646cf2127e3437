//! Core type definitions for AdXGuard
//!
//! These types map directly to the host's declarative rule JSON and are
//! used throughout the compiler and the synchronizer.

use serde::{Deserialize, Serialize};

/// First identifier reserved for user-managed rules. Everything below is
/// owned by the extension's static rule sets and is never touched.
pub const CUSTOM_RULE_ID_BASE: i32 = 1000;

/// Priority given to every custom block rule.
pub const CUSTOM_RULE_PRIORITY: u32 = 1;

/// Maximum accepted pattern length, in characters.
pub const MAX_PATTERN_LEN: usize = 500;

/// Wildcard marker in patterns and url filters.
pub const WILDCARD: char = '*';

// =============================================================================
// Resource Types (host vocabulary)
// =============================================================================

/// Resource type of a network request as named by the host rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
    Ping,
    CspReport,
    Media,
    #[serde(rename = "websocket")]
    WebSocket,
    #[serde(rename = "webtransport")]
    WebTransport,
    #[serde(rename = "webbundle")]
    WebBundle,
    Other,
}

/// Resource categories every custom rule applies to.
pub const BLOCKED_RESOURCE_TYPES: [ResourceType; 10] = [
    ResourceType::MainFrame,
    ResourceType::SubFrame,
    ResourceType::Script,
    ResourceType::Image,
    ResourceType::XmlHttpRequest,
    ResourceType::Stylesheet,
    ResourceType::Font,
    ResourceType::Media,
    ResourceType::WebSocket,
    ResourceType::Other,
];

impl ResourceType {
    /// Parse from browser request type string. Unknown types map to `Other`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MainFrame,
            "sub_frame" | "subdocument" => Self::SubFrame,
            "stylesheet" => Self::Stylesheet,
            "script" => Self::Script,
            "image" => Self::Image,
            "font" => Self::Font,
            "object" => Self::Object,
            "xmlhttprequest" | "xhr" => Self::XmlHttpRequest,
            "ping" => Self::Ping,
            "csp_report" => Self::CspReport,
            "media" => Self::Media,
            "websocket" => Self::WebSocket,
            "webtransport" => Self::WebTransport,
            "webbundle" => Self::WebBundle,
            _ => Self::Other,
        }
    }

    /// Name used in the host rule JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainFrame => "main_frame",
            Self::SubFrame => "sub_frame",
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::Image => "image",
            Self::Font => "font",
            Self::Object => "object",
            Self::XmlHttpRequest => "xmlhttprequest",
            Self::Ping => "ping",
            Self::CspReport => "csp_report",
            Self::Media => "media",
            Self::WebSocket => "websocket",
            Self::WebTransport => "webtransport",
            Self::WebBundle => "webbundle",
            Self::Other => "other",
        }
    }

    /// Bit for this type in a [`ResourceMask`].
    pub fn mask(&self) -> ResourceMask {
        match self {
            Self::MainFrame => ResourceMask::MAIN_FRAME,
            Self::SubFrame => ResourceMask::SUB_FRAME,
            Self::Stylesheet => ResourceMask::STYLESHEET,
            Self::Script => ResourceMask::SCRIPT,
            Self::Image => ResourceMask::IMAGE,
            Self::Font => ResourceMask::FONT,
            Self::Object => ResourceMask::OBJECT,
            Self::XmlHttpRequest => ResourceMask::XMLHTTPREQUEST,
            Self::Ping => ResourceMask::PING,
            Self::CspReport => ResourceMask::CSP_REPORT,
            Self::Media => ResourceMask::MEDIA,
            Self::WebSocket => ResourceMask::WEBSOCKET,
            Self::WebTransport => ResourceMask::WEBTRANSPORT,
            Self::WebBundle => ResourceMask::WEBBUNDLE,
            Self::Other => ResourceMask::OTHER,
        }
    }
}

// =============================================================================
// Resource Masks (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceMask: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUB_FRAME = 1 << 5;
        const MAIN_FRAME = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;
        const CSP_REPORT = 1 << 12;
        const WEBTRANSPORT = 1 << 13;
        const WEBBUNDLE = 1 << 14;

        /// Document types (main_frame + sub_frame)
        const DOCUMENT = Self::MAIN_FRAME.bits() | Self::SUB_FRAME.bits();
    }
}

impl ResourceMask {
    /// Collapse a list of resource types into a mask.
    pub fn from_types(types: &[ResourceType]) -> Self {
        types
            .iter()
            .fold(Self::empty(), |mask, ty| mask | ty.mask())
    }
}

// =============================================================================
// Rule Actions
// =============================================================================

/// Action type understood by the host rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionType {
    /// Cancels the request
    Block,
    /// Exempts the request from lower priority rules
    Allow,
    /// Exempts the whole frame
    AllowAllRequests,
    /// Redirects the request
    Redirect,
    /// Upgrades http/ws to https/wss
    UpgradeScheme,
    /// Rewrites request or response headers
    ModifyHeaders,
}

/// The `action` object of a host rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: RuleActionType,
}

impl RuleAction {
    pub const BLOCK: Self = Self {
        kind: RuleActionType::Block,
    };
}

// =============================================================================
// Rule Condition
// =============================================================================

/// The `condition` object of a host rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<ResourceType>,
}

// =============================================================================
// Compiled Rule
// =============================================================================

/// A block rule derived from one blocked pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRule {
    pub id: i32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl CompiledRule {
    /// Build a custom block rule for the given identifier and url filter.
    pub fn block(id: i32, url_filter: String) -> Self {
        Self {
            id,
            priority: CUSTOM_RULE_PRIORITY,
            action: RuleAction::BLOCK,
            condition: RuleCondition {
                url_filter: Some(url_filter),
                resource_types: BLOCKED_RESOURCE_TYPES.to_vec(),
            },
        }
    }

    /// The rule's url filter, or an empty string when the rule has none.
    pub fn url_filter(&self) -> &str {
        self.condition.url_filter.as_deref().unwrap_or("")
    }

    /// Resource types this rule applies to as a mask. An empty list means
    /// every type except `main_frame`, which is how the host reads it.
    pub fn resource_mask(&self) -> ResourceMask {
        if self.condition.resource_types.is_empty() {
            ResourceMask::all() & !ResourceMask::MAIN_FRAME
        } else {
            ResourceMask::from_types(&self.condition.resource_types)
        }
    }
}

// =============================================================================
// Installed Rule
// =============================================================================

/// A rule as reported back by the host engine. Only `id` and `condition`
/// are read; anything else the host sends is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledRule {
    pub id: i32,
    #[serde(default)]
    pub condition: RuleCondition,
}

impl InstalledRule {
    /// Whether this rule lives in the custom identifier range.
    #[inline]
    pub fn is_custom(&self) -> bool {
        is_custom_rule_id(self.id)
    }
}

impl From<&CompiledRule> for InstalledRule {
    fn from(rule: &CompiledRule) -> Self {
        Self {
            id: rule.id,
            condition: rule.condition.clone(),
        }
    }
}

/// Whether an identifier belongs to the custom-managed range.
#[inline]
pub fn is_custom_rule_id(id: i32) -> bool {
    id >= CUSTOM_RULE_ID_BASE
}
