//! Market-related types shared by every venue adapter.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Side of a binary market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// YES token.
    #[strum(serialize = "yes", serialize = "YES", serialize = "Yes")]
    #[default]
    Yes,
    /// NO token.
    #[strum(serialize = "no", serialize = "NO", serialize = "No")]
    No,
}

/// One tradeable outcome of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leg {
    /// Outcome name as published by the venue.
    pub name: String,
    /// Token (or venue ticker) used to fetch books and place orders.
    pub token_id: String,
}

impl Leg {
    /// Create a leg.
    pub fn new(name: impl Into<String>, token_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token_id: token_id.into(),
        }
    }
}

/// A market as seen for one scan cycle.
///
/// Binary instruments have exactly two legs in YES, NO order; categorical
/// instruments have more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instrument {
    /// Market identifier.
    pub id: String,
    /// Parent event identifier, used for correlation caps.
    pub event_id: String,
    /// URL slug, or ticker on venues without slugs.
    pub slug: String,
    /// Human-readable question.
    pub label: String,
    /// Trailing 24h volume in USD.
    pub volume_24h: Decimal,
    /// Outcome legs.
    pub legs: Vec<Leg>,
}

impl Instrument {
    /// Whether this is a two-outcome market.
    pub fn is_binary(&self) -> bool {
        self.legs.len() == 2
    }
}

/// Market listing entry from the Gamma API.
///
/// Gamma encodes `outcomes` and `clobTokenIds` as JSON strings inside the
/// JSON document, and volume sometimes as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    /// Market ID.
    pub id: String,
    /// Market slug.
    pub slug: Option<String>,
    /// Market question.
    pub question: Option<String>,
    /// Outcome names.
    #[serde(default, deserialize_with = "string_encoded_list")]
    pub outcomes: Vec<String>,
    /// CLOB token IDs, aligned with `outcomes`.
    #[serde(default, deserialize_with = "string_encoded_list")]
    pub clob_token_ids: Vec<String>,
    /// Trailing 24h volume.
    #[serde(default, rename = "volume24hr", deserialize_with = "lenient_decimal")]
    pub volume_24hr: Decimal,
    /// Whether market is closed.
    pub closed: Option<bool>,
    /// Parent events.
    #[serde(default)]
    pub events: Vec<GammaEvent>,
}

/// Parent event reference inside a Gamma market.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
    /// Event ID.
    pub id: String,
}

/// Open market entry from the Kalshi markets endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarket {
    /// Market ticker.
    pub ticker: String,
    /// Parent event ticker.
    #[serde(default)]
    pub event_ticker: String,
    /// Market title.
    #[serde(default)]
    pub title: String,
    /// Subtitle, often the strike.
    #[serde(default)]
    pub subtitle: String,
    /// 24h contract volume.
    #[serde(default)]
    pub volume_24h: Option<i64>,
}

fn string_encoded_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Encoded(String),
        List(Vec<String>),
        Null(Option<()>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Encoded(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
        Raw::List(v) => Ok(v),
        Raw::Null(_) => Ok(Vec::new()),
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null(Option<()>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Decimal::try_from(n).map_err(serde::de::Error::custom),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Null(_) => Ok(Decimal::ZERO),
    }
}
