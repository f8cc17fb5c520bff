use josekit::jws::{JwsHeader, RS256};
use josekit::jwt::{self, JwtPayload};
use tollgate::keys::KeyManager;
use tollgate::settings::KidSource;

pub const PUBLIC_PEM: &str = include_str!("../fixtures/public.pem");
pub const PRIVATE_PEM: &str = include_str!("../fixtures/private.pem");

pub fn key_manager() -> KeyManager {
    KeyManager::from_pem(PRIVATE_PEM, PUBLIC_PEM, "RS256", KidSource::Public)
        .expect("Failed to load fixture keys")
}

/// Verify an RS256 token against the fixture public key.
pub fn decode_token(token: &str) -> (JwtPayload, JwsHeader) {
    let verifier = RS256
        .verifier_from_pem(PUBLIC_PEM.as_bytes())
        .expect("Failed to build verifier");
    jwt::decode_with_verifier(token, &verifier).expect("Token signature did not verify")
}
