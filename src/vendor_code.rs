use derive_more::{Display, Error};
use regex::Regex;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(ignore)]
    #[display("vendor code {_0:?} does not match the configured pattern")]
    PatternMismatch(String),
    #[error(ignore)]
    #[display("vendor code {_0:?} has no product segment")]
    MissingProductId(String),
    #[error(ignore)]
    #[display("vendor code {_0:?} has a zero or out of range pack count")]
    InvalidPackCount(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedVendorCode {
    pub product_id: String,
    pub pack_count: u32,
}

/// Splits vendor codes like `box_4821_3` into supplier product id and pack
/// size.
#[derive(Debug, Clone)]
pub struct VendorCodeDecoder {
    pattern: Regex,
    use_pack_count: bool,
}

impl VendorCodeDecoder {
    pub const DELIMITER: char = '_';

    pub fn new(pattern: Regex, use_pack_count: bool) -> Self {
        Self {
            pattern,
            use_pack_count,
        }
    }

    pub fn decode(&self, vendor_code: &str) -> Result<DecodedVendorCode, DecodeError> {
        if !self.pattern.is_match(vendor_code) {
            return Err(DecodeError::PatternMismatch(vendor_code.to_string()));
        }
        let mut segments = vendor_code.split(Self::DELIMITER).skip(1);
        let product_id = segments
            .next()
            .ok_or_else(|| DecodeError::MissingProductId(vendor_code.to_string()))?;
        let pack_count = match segments.next().filter(|_| self.use_pack_count) {
            Some(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
                .parse::<u32>()
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| DecodeError::InvalidPackCount(vendor_code.to_string()))?,
            _ => 1,
        };
        Ok(DecodedVendorCode {
            product_id: product_id.to_string(),
            pack_count,
        })
    }
}
