//! Newtype identifiers shared across the wire schema, the stores, and the
//! correlation engine, so that "a device id" and "an idempotency key" stop
//! being interchangeable `String`s at call sites.

use std::fmt;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Construct from any owned/borrowed string. Empty strings are
            /// rejected: every id in this module is meant to key a map or
            /// index, and an empty key is almost always a bug upstream.
            pub fn new(value: impl Into<String>) -> Result<Self, crate::CoreError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(crate::CoreError::new(
                        crate::error::codes::BUS_PAYLOAD_INVALID,
                        concat!(stringify!($name), " must not be empty"),
                    ));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

string_id!(DeviceId, "Stable identifier for a producing device/endpoint.");
string_id!(
    EventId,
    "Identifier for a single `TelemetryEvent`, unique within a device within 24h (§3.2)."
);
string_id!(
    IdempotencyKey,
    "Basis for bus-side dedupe and WAL keying; ≤128 bytes per §3.1."
);
string_id!(IncidentId, "Deterministic id derived from (rule_name, device_id, start_ts).");

impl IdempotencyKey {
    /// Wire-size limit from §3.1.
    pub const MAX_BYTES: usize = 128;

    /// Parse and additionally enforce the §3.1 byte-length invariant.
    pub fn parse(value: impl Into<String>) -> Result<Self, crate::CoreError> {
        let key = Self::new(value)?;
        if key.as_str().len() > Self::MAX_BYTES {
            return Err(crate::CoreError::new(
                crate::error::codes::BUS_PAYLOAD_INVALID,
                format!(
                    "idempotency_key too long ({} > {} bytes)",
                    key.as_str().len(),
                    Self::MAX_BYTES
                ),
            ));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(DeviceId::new("").is_err());
    }

    #[test]
    fn accepts_nonempty() {
        assert_eq!(DeviceId::new("dev-1").unwrap().as_str(), "dev-1");
    }

    #[test]
    fn idempotency_key_enforces_length() {
        let long = "x".repeat(129);
        assert!(IdempotencyKey::parse(long).is_err());
        assert!(IdempotencyKey::parse("k1").is_ok());
    }
}
