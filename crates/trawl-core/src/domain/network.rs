use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source platform a task targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Youtube,
    Tiktok,
    Instagram,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Youtube, Network::Tiktok, Network::Instagram];

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Youtube => "youtube",
            Network::Tiktok => "tiktok",
            Network::Instagram => "instagram",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| UnknownNetwork(s.to_string()))
    }
}
