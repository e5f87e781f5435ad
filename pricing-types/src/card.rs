use serde::{Deserialize, Serialize};

/// Physical parcel size in whole centimeters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub length: u32,
    #[serde(default)]
    pub is_valid: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeVariant {
    #[serde(default)]
    pub skus: Vec<String>,
}

/// Marketplace product card as delivered by the catalog listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductCard {
    #[serde(rename = "nmID")]
    pub nm_id: u64,
    pub vendor_code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub sizes: Vec<SizeVariant>,
}

impl ProductCard {
    pub fn skus(&self) -> impl Iterator<Item = &String> {
        self.sizes.iter().flat_map(|s| s.skus.iter())
    }

    /// Returns the only stock-keeping identifier of the card, or the number
    /// of identifiers found when there is not exactly one.
    pub fn single_sku(&self) -> Result<&str, usize> {
        let mut skus = self.skus();
        match (skus.next(), skus.next()) {
            (Some(sku), None) => Ok(sku.as_str()),
            (None, _) => Err(0),
            (Some(_), Some(_)) => Err(2 + skus.count()),
        }
    }
}
