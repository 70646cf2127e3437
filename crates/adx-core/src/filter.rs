//! Host `urlFilter` evaluation
//!
//! Lets compiled rules be checked against sample URLs without a browser.
//! Supported syntax:
//!
//! - `*` wildcard, any run of characters
//! - `^` separator, anything but alphanumerics and `_ - . %`, or end of URL
//! - `|` at the start anchors to the beginning of the URL
//! - `||` at the start anchors to the host or one of its subdomains
//! - `|` at the end anchors to the end of the URL
//!
//! Matching is case-insensitive.

use crate::types::{CompiledRule, ResourceType};
use crate::url::get_host_position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    None,
    Left,
    Host,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(Vec<u8>),
    Wildcard,
    Separator,
}

/// A parsed url filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilter {
    anchor: Anchor,
    right_anchor: bool,
    tokens: Vec<Token>,
}

impl UrlFilter {
    /// Parse a filter string. Never fails: every string is a valid (if
    /// possibly useless) filter.
    pub fn parse(filter: &str) -> Self {
        let (anchor, mut body) = if let Some(rest) = filter.strip_prefix("||") {
            (Anchor::Host, rest)
        } else if let Some(rest) = filter.strip_prefix('|') {
            (Anchor::Left, rest)
        } else {
            (Anchor::None, filter)
        };

        let mut right_anchor = false;
        if let Some(rest) = body.strip_suffix('|') {
            right_anchor = true;
            body = rest;
        }

        let mut tokens = Vec::new();
        let mut literal = Vec::new();
        for b in body.bytes() {
            match b {
                b'*' | b'^' => {
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    let token = if b == b'*' { Token::Wildcard } else { Token::Separator };
                    // Consecutive wildcards collapse
                    if !(token == Token::Wildcard && tokens.last() == Some(&Token::Wildcard)) {
                        tokens.push(token);
                    }
                }
                _ => literal.push(b.to_ascii_lowercase()),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self {
            anchor,
            right_anchor,
            tokens,
        }
    }

    /// Test a URL against this filter.
    pub fn matches(&self, url: &str) -> bool {
        let lowered: Vec<u8> = url.bytes().map(|b| b.to_ascii_lowercase()).collect();

        match self.anchor {
            Anchor::Left => self.match_at(&lowered, 0, 0),
            Anchor::None => (0..=lowered.len()).any(|start| self.match_at(&lowered, 0, start)),
            Anchor::Host => {
                let (host_start, host_end) = match get_host_position(url) {
                    Some(pos) => pos,
                    None => return false,
                };
                let label_starts = std::iter::once(host_start).chain(
                    (host_start..host_end)
                        .filter(|&i| lowered[i] == b'.')
                        .map(|i| i + 1),
                );
                label_starts
                    .filter(|&start| start < host_end)
                    .any(|start| self.match_at(&lowered, 0, start))
            }
        }
    }

    fn match_at(&self, url: &[u8], token_idx: usize, pos: usize) -> bool {
        let token = match self.tokens.get(token_idx) {
            Some(token) => token,
            None => return !self.right_anchor || pos == url.len(),
        };

        match token {
            Token::Literal(lit) => {
                url[pos..].starts_with(lit) && self.match_at(url, token_idx + 1, pos + lit.len())
            }
            Token::Separator => {
                if pos == url.len() {
                    self.match_at(url, token_idx + 1, pos)
                } else {
                    is_separator(url[pos]) && self.match_at(url, token_idx + 1, pos + 1)
                }
            }
            Token::Wildcard => (pos..=url.len()).any(|p| self.match_at(url, token_idx + 1, p)),
        }
    }
}

/// Separator character for `^`.
#[inline]
pub fn is_separator(b: u8) -> bool {
    !(b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' || b == b'%')
}

impl CompiledRule {
    /// Whether this rule would block `url` loaded as `resource_type`.
    pub fn matches(&self, url: &str, resource_type: ResourceType) -> bool {
        self.resource_mask().contains(resource_type.mask())
            && UrlFilter::parse(self.url_filter()).matches(url)
    }
}
