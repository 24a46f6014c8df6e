//! Fixed commodity catalogue and plausibility bands
//!
//! Each indicator page publishes one daily reference price. The bands below are
//! market heuristics in R$ per trading unit and reject captures that are
//! obviously wrong (a US$ figure, a variation percentage, a volume).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Indicator pages on Notícias Agrícolas that mirror the CEPEA/ESALQ series
pub mod sources {
    pub const SOJA_URL: &str =
        "https://www.noticiasagricolas.com.br/cotacoes/soja/soja-indicador-cepea-esalq-porto-paranagua";
    pub const MILHO_URL: &str =
        "https://www.noticiasagricolas.com.br/cotacoes/milho/indicador-cepea-esalq-milho";
    pub const BOI_GORDO_URL: &str =
        "https://www.noticiasagricolas.com.br/cotacoes/boi-gordo/boi-gordo-indicador-esalq-bmf";
}

/// Inclusive plausibility band per commodity keyword
const PLAUSIBILITY_BANDS: [(&str, f64, f64); 3] = [
    ("soja", 50.0, 300.0),
    ("milho", 20.0, 150.0),
    // Priced per arroba, hence the higher floor.
    ("boi", 150.0, 400.0),
];

/// One of the three tracked commodities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Commodity {
    Soja,
    Milho,
    BoiGordo,
}

impl Commodity {
    /// Report order
    pub const ALL: [Self; 3] = [Self::Soja, Self::Milho, Self::BoiGordo];

    /// Display label, also the cache key
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Soja => "Soja",
            Self::Milho => "Milho",
            Self::BoiGordo => "Boi Gordo",
        }
    }

    #[must_use]
    pub const fn source_url(self) -> &'static str {
        match self {
            Self::Soja => sources::SOJA_URL,
            Self::Milho => sources::MILHO_URL,
            Self::BoiGordo => sources::BOI_GORDO_URL,
        }
    }

    /// Trading unit shown next to the price
    #[must_use]
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Soja | Self::Milho => "sc 60kg",
            Self::BoiGordo => "@",
        }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Commodity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "soja" | "soy" | "soybean" => Ok(Self::Soja),
            "milho" | "corn" => Ok(Self::Milho),
            "boi" | "boi gordo" | "boi-gordo" | "boi_gordo" | "cattle" => Ok(Self::BoiGordo),
            other => Err(format!("unknown commodity '{other}' (expected soja, milho or boi)")),
        }
    }
}

/// Accept or reject a candidate value for the commodity with this display name.
///
/// Matching is by keyword substring on the lowercased name. A name that matches
/// no keyword is always plausible, so a commodity added later without a band
/// admits any value.
#[must_use]
pub fn is_plausible(commodity_name: &str, value: Option<f64>) -> bool {
    let Some(value) = value else {
        return false;
    };

    let normalized = commodity_name.to_lowercase();
    PLAUSIBILITY_BANDS
        .iter()
        .find(|(keyword, _, _)| normalized.contains(keyword))
        .is_none_or(|(_, min, max)| (*min..=*max).contains(&value))
}
