//! Router tuning options.
//!
//! Every field has a default, so a partial document (or none at all) is a
//! valid configuration.
//!
//! ```
//! use rroute::config::RouterOptions;
//!
//! let options = RouterOptions::from_json(r#"{ "matcher": { "jump_table_min": 8 } }"#).unwrap();
//! assert_eq!(options.matcher.jump_table_min, 8);
//! assert_eq!(options.matcher.inline_compare_max, 15);
//! assert!(options.method_not_allowed);
//! ```

use serde::{Deserialize, Serialize};

/// Options for the router as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Matcher code-shape tuning.
    pub matcher: MatcherOptions,

    /// Answer `405 Method Not Allowed` (with an `Allow` header) when the path
    /// is routable under another method. When `false` such requests fall
    /// through to the not-found handler.
    pub method_not_allowed: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            matcher: MatcherOptions::default(),
            method_not_allowed: true,
        }
    }
}

impl RouterOptions {
    /// Parses options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Crossover points used when compiling the route tree.
///
/// These change how the matcher is shaped, never what it matches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatcherOptions {
    /// Static segments up to this many bytes are compared byte by byte;
    /// longer ones with a single slice comparison.
    pub inline_compare_max: usize,

    /// A node with at least this many static children branches through a
    /// 256-entry jump table; fewer children use a sorted key search.
    pub jump_table_min: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            inline_compare_max: 15,
            jump_table_min: 4,
        }
    }
}
