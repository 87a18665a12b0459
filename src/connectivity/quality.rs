//! Connection quality classification.
//!
//! Only tunes cache aggressiveness; correctness never depends on it.

use serde::{Deserialize, Serialize};

/// Downlink below which a 3G connection counts as slow (Mbps).
pub const SLOW_3G_DOWNLINK_MBPS: f64 = 1.5;

/// Effective connection type as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    Unknown,
}

impl std::str::FromStr for EffectiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(EffectiveType::Slow2g),
            "2g" => Ok(EffectiveType::TwoG),
            "3g" => Ok(EffectiveType::ThreeG),
            "4g" => Ok(EffectiveType::FourG),
            "unknown" => Ok(EffectiveType::Unknown),
            other => Err(format!("unknown connection type: {}", other)),
        }
    }
}

/// Connection metadata snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub effective_type: EffectiveType,
    /// Estimated downlink in Mbps.
    pub downlink_mbps: f64,
}

impl ConnectionInfo {
    pub fn new(effective_type: EffectiveType, downlink_mbps: f64) -> Self {
        Self {
            effective_type,
            downlink_mbps,
        }
    }

    /// 2G or slow-2G, or 3G with a downlink under 1.5 Mbps.
    pub fn is_slow(&self) -> bool {
        match self.effective_type {
            EffectiveType::Slow2g | EffectiveType::TwoG => true,
            EffectiveType::ThreeG => self.downlink_mbps < SLOW_3G_DOWNLINK_MBPS,
            EffectiveType::FourG | EffectiveType::Unknown => false,
        }
    }
}
