//! Tiers and Pricing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PaymentError;

/// Purchasable flame tiers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Basic,
    Premium,
}

/// Pricing information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierPricing {
    pub name: &'static str,
    pub description: &'static str,
    pub cents: i64,
}

impl Tier {
    pub const ALL: [Self; 2] = [Self::Basic, Self::Premium];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }

    /// Get pricing for this tier
    pub const fn pricing(self) -> TierPricing {
        match self {
            Self::Basic => TierPricing {
                name: "Eternal Flame • Basic",
                description: "A personal flame page with watermark",
                cents: 499, // $4.99 one-time
            },
            Self::Premium => TierPricing {
                name: "Eternal Flame • Premium",
                description: "No watermark, replies from loved ones",
                cents: 999, // $9.99 one-time
            },
        }
    }

    /// Basic flames carry the watermark
    pub const fn watermarked(self) -> bool {
        matches!(self, Self::Basic)
    }

    /// Only premium flames accept replies
    pub const fn allows_replies(self) -> bool {
        matches!(self, Self::Premium)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            _ => Err(PaymentError::InvalidTier(s.to_string())),
        }
    }
}
