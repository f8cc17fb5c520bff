//! Key identifiers in the format the registry derives from its configured
//! certificate bundle: base32 of the SHA-256 of the DER key bytes, cut into
//! twelve colon separated groups of four.

use std::sync::LazyLock;

use base64ct::{Base64, Encoding};
use data_encoding::BASE32;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::errors::TokenError;

static PEM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\A-----BEGIN ([A-Z ]+)-----\s*?([A-Za-z0-9+=/\r\n]+)\s*?-----END ([A-Z ]+)-----\s*\z",
    )
    .expect("PEM pattern compiles")
});

const GROUP_LEN: usize = 4;
const GROUP_COUNT: usize = 12;

/// A decoded PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    pub label: String,
    pub der: Vec<u8>,
}

pub fn parse_pem(input: &str) -> Result<PemBlock, TokenError> {
    let caps = PEM_BLOCK
        .captures(input)
        .ok_or_else(|| TokenError::InvalidKeyMaterial("not a PEM encoded block".into()))?;

    let label = &caps[1];
    if label != &caps[3] {
        return Err(TokenError::InvalidKeyMaterial(format!(
            "PEM labels differ: BEGIN {label} / END {}",
            &caps[3]
        )));
    }

    let body: String = caps[2].chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let der = Base64::decode_vec(&body)
        .map_err(|e| TokenError::InvalidKeyMaterial(format!("PEM body is not base64: {e}")))?;

    Ok(PemBlock {
        label: label.to_string(),
        der,
    })
}

/// Derive the `kid` header value for a PEM encoded key.
pub fn derive_key_id(pem: &str) -> Result<String, TokenError> {
    let block = parse_pem(pem)?;
    Ok(key_id_from_der(&block.der))
}

pub fn key_id_from_der(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let encoded = BASE32.encode(&digest);
    let chars: Vec<char> = encoded.trim_end_matches('=').chars().collect();
    chars
        .chunks(GROUP_LEN)
        .take(GROUP_COUNT)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_PEM: &str = include_str!("../tests/fixtures/public.pem");
    const PRIVATE_PEM: &str = include_str!("../tests/fixtures/private.pem");

    #[test]
    fn test_known_key_id() {
        assert_eq!(
            derive_key_id(PUBLIC_PEM).unwrap(),
            "BZAS:FSKZ:AIUU:BZD3:DIZA:YQ3J:GMXQ:BK2P:LFLO:NEFZ:CH3U:WHQ3"
        );
    }

    #[test]
    fn test_key_id_is_stable_and_well_formed() {
        let a = derive_key_id(PRIVATE_PEM).unwrap();
        let b = derive_key_id(PRIVATE_PEM).unwrap();
        assert_eq!(a, b);

        let groups: Vec<&str> = a.split(':').collect();
        assert_eq!(groups.len(), 12);
        assert!(groups.iter().all(|g| g.len() == 4));
        assert_ne!(a, derive_key_id(PUBLIC_PEM).unwrap());
    }

    #[test]
    fn test_mutated_body_changes_key_id() {
        // flip one base64 character inside the body, keeping the length valid
        let marker = "-----BEGIN PUBLIC KEY-----\n";
        let offset = marker.len() + 40;
        let original = &PUBLIC_PEM[offset..offset + 1];
        let replacement = if original == "A" { "B" } else { "A" };
        let mut mutated = PUBLIC_PEM.to_string();
        mutated.replace_range(offset..offset + 1, replacement);

        assert_ne!(
            derive_key_id(&mutated).unwrap(),
            derive_key_id(PUBLIC_PEM).unwrap()
        );
    }

    #[test]
    fn test_missing_footer_is_rejected() {
        let truncated = PUBLIC_PEM.replace("-----END PUBLIC KEY-----", "");
        assert!(matches!(
            derive_key_id(&truncated),
            Err(TokenError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_mismatched_labels_are_rejected() {
        let mixed = PUBLIC_PEM.replace("-----END PUBLIC KEY-----", "-----END PRIVATE KEY-----");
        assert!(matches!(
            parse_pem(&mixed),
            Err(TokenError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_parse_pem_returns_label_and_der() {
        let block = parse_pem(PUBLIC_PEM).unwrap();
        assert_eq!(block.label, "PUBLIC KEY");
        // SubjectPublicKeyInfo DER starts with a SEQUENCE tag
        assert_eq!(block.der[0], 0x30);
    }
}
