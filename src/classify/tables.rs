//! Built-in pattern tables for user agents and search engines
//!
//! Order matters: specific browser signatures come before the generic
//! engines they embed (Chrome before Safari), and bots come last.

use crate::error::ConfigurationError;
use crate::router::{Patterns, Resolved};

/// Label returned for user agents no rule recognises.
pub const UNKNOWN_BROWSER: &str = "Unknown";

const BROWSER_RULES: &[(&str, &str)] = &[
    // Browsers
    (r"AOL (?P<version>[\d+\.\d+]+)", "AOL"),
    (
        r"Mozilla/(?P<mozilla_version>[-.\w]+) \(compatible; ( ?)MSIE (?P<msie_version>[-.\w]+); ( ?)( ?)America Online Browser (?P<version>[-.\w]+);",
        "AOL",
    ),
    (r"Camino/(?P<version>[-.\w]+)", "Camino"),
    (r"Chrome/(?P<version>[-.\w]+)", "Google Chrome"),
    (r"Firefox(/(?P<version>[-.\w]+)?)", "Firefox"),
    (
        r"Mozilla/(?P<mozilla_version>[-.\w]+) \(compatible; ( ?)MSIE (?P<version>[-.\w]+); ( ?)( ?)(Win|Mac)",
        "Internet Explorer",
    ),
    (r"Konqueror/(?P<version>[-.\w]+)", "Konqueror"),
    (r"Opera( |/)(?P<version>[-.\w]+)", "Opera"),
    (r"OmniWeb(/(?P<version>[-.\w]+)?)", "OmniWeb"),
    (r"Safari/(?P<version>[-.\w]+)", "Safari"),
    (r"(Netscape([\d]?)|Navigator)/(?P<version>[-.\w]+)", "Netscape"),
    (r"Wget/(?P<version>[-.\w]+)", "Wget"),
    // Firefox nightly and testing builds, Debian rebrand
    (r"Minefield(/(?P<version>[-.\w]+)?)", "Firefox"),
    (r"Shiretoko(/(?P<version>[-.\w]+)?)", "Firefox"),
    (r"GranParadiso(/(?P<version>[-.\w]+)?)", "Firefox"),
    (r"Iceweasel(/(?P<version>[-.\w]+)?)", "Firefox"),
    // RSS readers
    (r"(NetNewsWire|NewsGatorOnline)/(?P<version>[-.\w]+)", "NetNewsWire"),
    (r"Feedfetcher-Google", "Google Reader"),
    // Bots
    (r"Googlebot", "Google"),
    (r"Yahoo! Slurp", "Yahoo"),
    (r"msnbot", "MSN Bot"),
    (r"(Baiduspider|BaiduImagespider)", "Baiduspider"),
    (r"Ask Jeeves", "Ask Jeeves"),
    (r"FollowSite", "FollowSite"),
    (r"WebAlta Crawler", "WebAlta Crawler"),
    (r"ScoutJet", "ScoutJet"),
    (r"SurveyBot", "domaintools.com"),
    (r"Gigabot", "Gigabot"),
    (r"Speedy Spider", "entireweb"),
    (r"discobot", "Discovery Engine"),
    (r"Purebot(/(?P<version>[-.\w]+)?);", "Purity search"),
    (r"Yandex(/(?P<version>[-.\w]+)?)", "Yandex"),
    (r"PostRank(/(?P<version>[-.\w]+)?)", "PostRank"),
    (
        r"Mozilla/(?P<mozilla_version>[-.\w]+) \(compatible; DotBot/(?P<version>[-.\w]+); http://www.dotnetdotcom.org/, crawler@dotnetdotcom.org\)",
        "Dotbot",
    ),
    (r"IrssiUrlLog(/(?P<version>[-.\w]+)?)", "irssi"),
    (r"Linguee Bot \(http://www.linguee.com/bot; bot@linguee.com\)", "Linguee"),
    (r"Sphider", "Sphider"),
    // Other
    (r"Mediapartners-Google", "Google Ads"),
    (r"Apple-PubSub", "Apple-PubSub"),
    (r"Python-urllib", "Python"),
];

const ENGINE_RULES: &[(&str, &str)] = &[
    (r"^https?://([\.\w]+)?yahoo.*(?:&|\?)p=(?P<keywords>[\+-_\w]+)", "Yahoo"),
    (r"^https?://([\.\w]+)?google.*(?:&|\?)q=(?P<keywords>[\+-_\w]+)", "Google"),
    (r"^https?://([\.\w]+)?bing.*(?:&|\?)q=(?P<keywords>[\+-_\w]+)", "Bing"),
];

/// User agent table; falls back to `Unknown` with no captures.
pub fn browsers() -> Result<Patterns<Resolved>, ConfigurationError> {
    Patterns::new(Resolved::new(UNKNOWN_BROWSER), BROWSER_RULES.iter().copied())
}

/// Search engine table; each rule captures `keywords`. Falls back to `None`.
pub fn engines() -> Result<Patterns<Option<Resolved>>, ConfigurationError> {
    Patterns::new(None, ENGINE_RULES.iter().copied())
}

/// Ignore list built from configured regexes; `None` means "not ignored".
pub fn ignore_list(rules: &[String]) -> Result<Patterns<Option<Resolved>>, ConfigurationError> {
    Patterns::new(None, rules.iter().map(|rule| rule.as_str()))
}
