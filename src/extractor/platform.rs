//! Source platform detection
//!
//! Classification looks only at the URL text; nothing here touches the network.

use crate::utils::error::{MediagrabError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Platforms the core knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePlatform {
    YouTube,
    TikTok,
    Instagram,
    Facebook,
    Twitter,
    Vimeo,
    Reddit,
    Dailymotion,
    Unknown,
}

impl SourcePlatform {
    pub fn name(&self) -> &'static str {
        match self {
            SourcePlatform::YouTube => "YouTube",
            SourcePlatform::TikTok => "TikTok",
            SourcePlatform::Instagram => "Instagram",
            SourcePlatform::Facebook => "Facebook",
            SourcePlatform::Twitter => "Twitter",
            SourcePlatform::Vimeo => "Vimeo",
            SourcePlatform::Reddit => "Reddit",
            SourcePlatform::Dailymotion => "Dailymotion",
            SourcePlatform::Unknown => "Unknown",
        }
    }

    /// Platforms that throttle or reject scripted clients often
    pub fn is_fragile(&self) -> bool {
        matches!(
            self,
            SourcePlatform::YouTube
                | SourcePlatform::TikTok
                | SourcePlatform::Instagram
                | SourcePlatform::Facebook
        )
    }

    /// Platforms whose metadata extraction routinely takes longer
    pub fn is_slow(&self) -> bool {
        matches!(self, SourcePlatform::Instagram | SourcePlatform::Facebook)
    }
}

impl fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of classifying a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformMatch {
    Supported(SourcePlatform),
    /// Recognized, but rejected by policy
    NotSupported(&'static str),
    Unknown,
}

struct HostRule {
    platform: SourcePlatform,
    pattern: Regex,
}

/// Recognized platforms that are refused outright (DRM-protected streams)
const BLOCKED_HOSTS: &[(&str, &str)] = &[("Spotify", r"^(?:[a-z0-9-]+\.)*spotify\.com$")];

fn host_rules() -> &'static [HostRule] {
    static RULES: OnceLock<Vec<HostRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (
                SourcePlatform::YouTube,
                r"^(?:[a-z0-9-]+\.)*(?:youtube\.com|youtu\.be|youtube-nocookie\.com)$",
            ),
            (SourcePlatform::TikTok, r"^(?:[a-z0-9-]+\.)*tiktok\.com$"),
            (SourcePlatform::Instagram, r"^(?:[a-z0-9-]+\.)*(?:instagram\.com|instagr\.am)$"),
            (SourcePlatform::Facebook, r"^(?:[a-z0-9-]+\.)*(?:facebook\.com|fb\.watch|fb\.com)$"),
            (SourcePlatform::Twitter, r"^(?:[a-z0-9-]+\.)*(?:twitter\.com|x\.com)$"),
            (SourcePlatform::Vimeo, r"^(?:[a-z0-9-]+\.)*vimeo\.com$"),
            (SourcePlatform::Reddit, r"^(?:[a-z0-9-]+\.)*(?:reddit\.com|redd\.it)$"),
            (SourcePlatform::Dailymotion, r"^(?:[a-z0-9-]+\.)*(?:dailymotion\.com|dai\.ly)$"),
        ]
        .into_iter()
        .filter_map(|(platform, pattern)| {
            Regex::new(pattern)
                .ok()
                .map(|pattern| HostRule { platform, pattern })
        })
        .collect()
    })
}

fn blocked_rules() -> &'static [(&'static str, Regex)] {
    static RULES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        BLOCKED_HOSTS
            .iter()
            .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (*name, re)))
            .collect()
    })
}

/// Extract the lower-cased host from an http(s) URL
pub fn host_of(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let lower = trimmed.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;

    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = host_port.split(':').next()?.trim_end_matches('.');

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Classify a URL into a platform
pub fn resolve(url: &str) -> PlatformMatch {
    let Some(host) = host_of(url) else {
        return PlatformMatch::Unknown;
    };

    if let Some((name, _)) = blocked_rules().iter().find(|(_, re)| re.is_match(&host)) {
        return PlatformMatch::NotSupported(name);
    }

    host_rules()
        .iter()
        .find(|rule| rule.pattern.is_match(&host))
        .map(|rule| PlatformMatch::Supported(rule.platform))
        .unwrap_or(PlatformMatch::Unknown)
}

/// Classify a URL, converting anything but a supported platform into an error
pub fn require_supported(url: &str) -> Result<SourcePlatform> {
    match resolve(url) {
        PlatformMatch::Supported(platform) => Ok(platform),
        PlatformMatch::NotSupported(name) => Err(MediagrabError::UnsupportedPlatform(format!(
            "{} links are not supported",
            name
        ))),
        PlatformMatch::Unknown => Err(MediagrabError::UnsupportedPlatform(
            "This URL does not belong to a supported platform".to_string(),
        )),
    }
}
