//! # Identity Newtypes
//!
//! Identifiers for every record the verification engine touches. Record
//! identifiers are UUIDs and always valid by construction. Business keys
//! ([`CardNumber`], [`ShopCode`]) and staff references ([`StaffRef`]) are
//! validated when constructed and when deserialized.
//!
//! ## Canonical forms
//!
//! - Card numbers are trimmed and upper-cased, so `bpl-0042 ` and `BPL-0042`
//!   name the same card and collide on the registry's unique key.
//! - Shop codes follow the same rule.
//! - Staff references are trimmed but otherwise kept as given.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Route string deserialization through the type's validating constructor.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Declare a UUID-backed record identifier.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// Identifier of a registered beneficiary.
    BeneficiaryId
);
uuid_identifier!(
    /// Identifier of a ration shop (distribution point).
    ShopId
);
uuid_identifier!(
    /// Identifier of a distribution cycle.
    CycleId
);
uuid_identifier!(
    /// Identifier of a ledger transaction.
    TransactionId
);
uuid_identifier!(
    /// Identifier of a duplicate alert.
    AlertId
);

// ---------------------------------------------------------------------------
// Business keys
// ---------------------------------------------------------------------------

/// Upper-case and trim, then check length and alphabet.
fn canonical_key(raw: &str, min: usize, max: usize, extra: &[char]) -> Option<String> {
    let s = raw.trim().to_ascii_uppercase();
    let len = s.chars().count();
    if len < min || len > max {
        return None;
    }
    if !s.chars().all(|c| c.is_ascii_alphanumeric() || extra.contains(&c)) {
        return None;
    }
    Some(s)
}

/// A ration card number: the beneficiary's immutable business key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CardNumber(String);

impl_validating_deserialize!(CardNumber);

impl CardNumber {
    /// Minimum length after trimming.
    pub const MIN_LEN: usize = 4;
    /// Maximum length after trimming.
    pub const MAX_LEN: usize = 32;

    /// Parse and canonicalize a card number.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for blank input and
    /// [`ValidationError::InvalidCardNumber`] when the trimmed value is not
    /// 4-32 characters of `A-Z`, `0-9`, `-` or `/`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "card_number",
            });
        }
        canonical_key(&raw, Self::MIN_LEN, Self::MAX_LEN, &['-', '/'])
            .map(Self)
            .ok_or(ValidationError::InvalidCardNumber(raw))
    }

    /// Access the canonical card number.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CardNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CardNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A ration shop's public code, unique across shops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ShopCode(String);

impl_validating_deserialize!(ShopCode);

impl ShopCode {
    /// Parse and canonicalize a shop code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidShopCode`] when the trimmed value is
    /// not 1-32 characters of `A-Z`, `0-9`, `-` or `_`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        canonical_key(&raw, 1, 32, &['-', '_'])
            .map(Self)
            .ok_or(ValidationError::InvalidShopCode(raw))
    }

    /// Access the canonical shop code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShopCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a staff member (shop operator, alert reviewer, registrar).
///
/// Staff authentication is handled elsewhere; this is only the recorded name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StaffRef(String);

impl_validating_deserialize!(StaffRef);

impl StaffRef {
    /// Maximum length after trimming.
    pub const MAX_LEN: usize = 64;

    /// Build a staff reference from non-blank text.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for blank input or
    /// [`ValidationError::FieldTooLong`] above [`Self::MAX_LEN`] characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let s = raw.trim();
        if s.is_empty() {
            return Err(ValidationError::MissingField { field: "staff" });
        }
        if s.chars().count() > Self::MAX_LEN {
            return Err(ValidationError::FieldTooLong {
                field: "staff",
                max: Self::MAX_LEN,
            });
        }
        Ok(Self(s.to_string()))
    }

    /// Access the reference text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StaffRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn card_number_is_canonicalized() {
        let card = CardNumber::new("  bpl-2024/0042 ").unwrap();
        assert_eq!(card.as_str(), "BPL-2024/0042");
        assert_eq!(card, CardNumber::new("BPL-2024/0042").unwrap());
    }

    #[test]
    fn card_number_rejects_blank_and_bad_alphabet() {
        assert_eq!(
            CardNumber::new("   "),
            Err(ValidationError::MissingField {
                field: "card_number"
            })
        );
        assert!(matches!(
            CardNumber::new("BPL 0042"),
            Err(ValidationError::InvalidCardNumber(_))
        ));
        assert!(matches!(
            CardNumber::new("AB1"),
            Err(ValidationError::InvalidCardNumber(_))
        ));
        assert!(CardNumber::new("A".repeat(33)).is_err());
    }

    #[test]
    fn card_number_deserialize_validates() {
        let ok: CardNumber = serde_json::from_str("\"wb-001\"").unwrap();
        assert_eq!(ok.as_str(), "WB-001");
        assert!(serde_json::from_str::<CardNumber>("\"bad card\"").is_err());
    }

    #[test]
    fn shop_code_accepts_underscore() {
        assert_eq!(ShopCode::new("fps_kol_12").unwrap().as_str(), "FPS_KOL_12");
        assert!(ShopCode::new("").is_err());
    }

    #[test]
    fn staff_ref_trims_and_bounds() {
        assert_eq!(StaffRef::new(" op-7 ").unwrap().as_str(), "op-7");
        assert!(StaffRef::new("").is_err());
        assert!(matches!(
            StaffRef::new("x".repeat(65)),
            Err(ValidationError::FieldTooLong { .. })
        ));
    }

    #[test]
    fn uuid_identifiers_round_trip_through_display() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    proptest! {
        #[test]
        fn card_number_canonical_form_is_a_fixed_point(raw in "[a-zA-Z0-9/-]{4,32}") {
            let card = CardNumber::new(raw.as_str()).unwrap();
            prop_assert_eq!(card.as_str(), raw.to_ascii_uppercase());
            prop_assert_eq!(CardNumber::new(card.as_str()).unwrap(), card.clone());
            prop_assert_eq!(CardNumber::new(format!("  {raw}\t")).unwrap(), card);
        }
    }
}
