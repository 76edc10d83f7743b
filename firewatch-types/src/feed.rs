//! Feed identity.

use core::fmt;

/// One of the two independent sensor sources fused by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Feed {
    Thermal,
    Imagery,
}

impl Feed {
    /// Both feeds, in the order they are reported.
    pub const ALL: [Feed; 2] = [Feed::Thermal, Feed::Imagery];

    /// Lowercase name used in logs and configuration keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Feed::Thermal => "thermal",
            Feed::Imagery => "imagery",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_as_str() {
        for feed in Feed::ALL {
            assert_eq!(feed.to_string(), feed.as_str());
        }
    }

    #[test]
    fn all_lists_thermal_first() {
        assert_eq!(Feed::ALL, [Feed::Thermal, Feed::Imagery]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Feed::Imagery).unwrap();
        assert_eq!(json, "\"imagery\"");
        let feed: Feed = serde_json::from_str("\"thermal\"").unwrap();
        assert_eq!(feed, Feed::Thermal);
    }
}
