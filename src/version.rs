use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Dotted numeric app version (`"1.4"`, `"2.0.3"`).
///
/// Parsing never fails: each segment contributes its leading decimal digits,
/// and a segment without any counts as `0`. Comparison pads the shorter
/// version with zeros, so `"1.2" == "1.2.0"`. The original string is kept
/// for display and for dismissal markers, which match the exact text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AppVersion {
    raw: String,
    segments: Vec<u64>,
}

impl AppVersion {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let segments = raw.split('.').map(leading_number).collect();
        Self {
            raw: raw.to_owned(),
            segments,
        }
    }

    /// The version exactly as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..len]
    }
}

fn leading_number(segment: &str) -> u64 {
    segment
        .trim()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, b| acc.saturating_mul(10).saturating_add(u64::from(b - b'0')))
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| {
                let a = self.segments.get(i).copied().unwrap_or(0);
                let b = other.segments.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AppVersion {}

// Trailing zeros are ignored so that equal versions hash alike.
impl Hash for AppVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl std::fmt::Display for AppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for AppVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for AppVersion {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for AppVersion {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<AppVersion> for String {
    fn from(v: AppVersion) -> Self {
        v.raw
    }
}
