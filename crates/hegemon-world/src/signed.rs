//! Origin authenticity for shared records.
//!
//! The CRDT merge applies no access control, so a record carries its own
//! proof of origin: a signature over [`compute_data_hash`] and the hex
//! public key of the signer. Any relay can be untrusted.

use hegemon_core::{hash_canonical, CanonicalError};
use hegemon_wallet::Wallet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SIGNATURE_FIELD: &str = "signature";
const SIGNER_FIELD: &str = "signedBy";

/// Optional signature fields, flattened into every shared record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seal {
    /// Hex Ed25519 signature over the record without its seal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Hex public key of the signer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,
}

/// A record that can carry a [`Seal`].
pub trait SignedRecord: Serialize {
    /// The record's signature fields.
    fn seal(&self) -> &Seal;

    /// Mutable access for signing.
    fn seal_mut(&mut self) -> &mut Seal;

    /// Sign the record's data hash with `wallet`, replacing any prior seal.
    fn sign_with(&mut self, wallet: &Wallet) -> Result<(), CanonicalError> {
        let hash = compute_data_hash(self)?;
        *self.seal_mut() = Seal {
            signature: Some(wallet.sign(hash.as_bytes())),
            signed_by: Some(wallet.public_key_hex()),
        };
        Ok(())
    }

    /// [`verify_signed_data`] with Ed25519.
    fn verify_seal(&self) -> bool {
        verify_signed_data(self, Some(hegemon_wallet::verify))
    }
}

/// Hash over every top-level field except `signature` and `signedBy`, with
/// object keys sorted so field order never matters.
pub fn compute_data_hash<T: Serialize + ?Sized>(record: &T) -> Result<String, CanonicalError> {
    let mut value = serde_json::to_value(record).map_err(CanonicalError::from)?;
    if let Value::Object(fields) = &mut value {
        fields.remove(SIGNATURE_FIELD);
        fields.remove(SIGNER_FIELD);
    }
    hash_canonical(&value)
}

/// Whether `record` carries a valid signature by its declared signer.
///
/// `verify` is called as `verify(data_hash, signature, signed_by)`. The
/// result is `false` when either seal field is missing or not a string, when
/// no verifier is supplied, or when verification fails.
pub fn verify_signed_data<T, F>(record: &T, verify: Option<F>) -> bool
where
    T: Serialize + ?Sized,
    F: Fn(&[u8], &str, &str) -> bool,
{
    let Some(verify) = verify else {
        return false;
    };
    let Ok(value) = serde_json::to_value(record) else {
        return false;
    };
    let (Some(signature), Some(signer)) = (
        value.get(SIGNATURE_FIELD).and_then(Value::as_str),
        value.get(SIGNER_FIELD).and_then(Value::as_str),
    ) else {
        return false;
    };
    let Ok(hash) = compute_data_hash(&value) else {
        return false;
    };
    verify(hash.as_bytes(), signature, signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ed25519(message: &[u8], signature: &str, signer: &str) -> bool {
        hegemon_wallet::verify(message, signature, signer)
    }

    fn signed(wallet: &Wallet, mut record: Value) -> Value {
        let hash = compute_data_hash(&record).unwrap();
        record["signature"] = json!(wallet.sign(hash.as_bytes()));
        record["signedBy"] = json!(wallet.public_key_hex());
        record
    }

    #[test]
    fn seal_fields_do_not_affect_the_hash() {
        let record = json!({"id": "t-1", "price": 12});
        let mut sealed = record.clone();
        sealed["signature"] = json!("x");
        sealed["signedBy"] = json!("y");
        assert_eq!(
            compute_data_hash(&record).unwrap(),
            compute_data_hash(&sealed).unwrap()
        );
    }

    #[test]
    fn untampered_record_verifies() {
        let wallet = Wallet::generate();
        let record = signed(&wallet, json!({"id": "a-1", "members": ["p1", "p2"]}));
        assert!(verify_signed_data(&record, Some(ed25519)));
    }

    #[test]
    fn single_field_mutation_fails() {
        let wallet = Wallet::generate();
        let mut record = signed(&wallet, json!({"id": "a-1", "name": "North"}));
        record["name"] = json!("South");
        assert!(!verify_signed_data(&record, Some(ed25519)));
    }

    #[test]
    fn missing_seal_or_verifier_fails() {
        let wallet = Wallet::generate();
        let record = signed(&wallet, json!({"id": "a-1"}));

        let mut unsigned_by = record.clone();
        unsigned_by.as_object_mut().unwrap().remove("signedBy");
        assert!(!verify_signed_data(&unsigned_by, Some(ed25519)));

        let mut unsigned = record.clone();
        unsigned.as_object_mut().unwrap().remove("signature");
        assert!(!verify_signed_data(&unsigned, Some(ed25519)));

        assert!(!verify_signed_data(&record, None::<fn(&[u8], &str, &str) -> bool>));
    }

    #[test]
    fn signature_by_someone_else_fails() {
        let wallet = Wallet::generate();
        let mut record = signed(&wallet, json!({"id": "a-1"}));
        record["signedBy"] = json!(Wallet::generate().public_key_hex());
        assert!(!verify_signed_data(&record, Some(ed25519)));
    }

    proptest! {
        #[test]
        fn hash_ignores_field_order_and_seal(
            fields in proptest::collection::btree_map("[a-z]{1,6}", any::<u32>(), 1..8),
            sig in "[0-9a-f]{8}",
        ) {
            let forward: serde_json::Map<String, Value> =
                fields.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let mut reversed = serde_json::Map::new();
            for (k, v) in fields.iter().rev() {
                reversed.insert(k.clone(), json!(v));
            }
            reversed.insert("signature".into(), json!(sig));
            reversed.insert("signedBy".into(), json!("someone"));
            prop_assert_eq!(
                compute_data_hash(&Value::Object(forward)).unwrap(),
                compute_data_hash(&Value::Object(reversed)).unwrap()
            );
        }
    }
}
