use crate::claims::ClaimSet;
use crate::errors::TokenError;
use crate::kid;
use crate::settings::{KidSource, Keys};
use josekit::jws::alg::rsassa::{RsassaJwsAlgorithm, RsassaJwsSigner};
use josekit::jws::{JwsAlgorithm, JwsHeader, RS256, RS384, RS512};
use josekit::jwt::{self, JwtPayload};
use std::fs;
use std::sync::Arc;

/// Signing key pair loaded once at startup.
#[derive(Clone)]
pub struct KeyManager {
    alg: RsassaJwsAlgorithm,
    key_id: Arc<str>,
    public_pem: Arc<str>,
    signer: Arc<RsassaJwsSigner>,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("alg", &self.alg.name())
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

pub fn algorithm(name: &str) -> Result<RsassaJwsAlgorithm, TokenError> {
    match name {
        "RS256" => Ok(RS256),
        "RS384" => Ok(RS384),
        "RS512" => Ok(RS512),
        other => Err(TokenError::InvalidSettings(format!(
            "unsupported signing algorithm `{other}`"
        ))),
    }
}

impl KeyManager {
    pub fn load(cfg: &Keys) -> Result<Self, TokenError> {
        let private_pem = fs::read_to_string(&cfg.private_key_path).map_err(|e| {
            TokenError::InvalidKeyMaterial(format!(
                "cannot read private key {}: {e}",
                cfg.private_key_path.display()
            ))
        })?;
        let public_pem = fs::read_to_string(&cfg.public_key_path).map_err(|e| {
            TokenError::InvalidKeyMaterial(format!(
                "cannot read public key {}: {e}",
                cfg.public_key_path.display()
            ))
        })?;

        let mgr = Self::from_pem(&private_pem, &public_pem, &cfg.alg, cfg.kid_source)?;
        tracing::info!(
            alg = %cfg.alg,
            kid = %mgr.key_id,
            kid_source = ?cfg.kid_source,
            "Loaded signing keys"
        );
        Ok(mgr)
    }

    pub fn from_pem(
        private_pem: &str,
        public_pem: &str,
        alg: &str,
        kid_source: KidSource,
    ) -> Result<Self, TokenError> {
        let alg = algorithm(alg)?;

        // Both files must satisfy the PEM grammar even if only one feeds the kid
        let private_block = kid::parse_pem(private_pem)?;
        let public_block = kid::parse_pem(public_pem)?;
        let key_id = match kid_source {
            KidSource::Public => kid::key_id_from_der(&public_block.der),
            KidSource::Private => kid::key_id_from_der(&private_block.der),
        };

        let signer = alg
            .signer_from_pem(private_pem.as_bytes())
            .map_err(|e| TokenError::InvalidKeyMaterial(format!("unusable private key: {e}")))?;

        Ok(Self {
            alg,
            key_id: key_id.into(),
            public_pem: public_pem.into(),
            signer: Arc::new(signer),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn alg_name(&self) -> &str {
        self.alg.name()
    }

    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// Sign the claim set as a compact JWT carrying this key's `kid`.
    pub fn sign(&self, claims: &ClaimSet) -> Result<String, TokenError> {
        let payload = JwtPayload::from_map(claims.to_claims())?;
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");
        header.set_algorithm(self.alg.name());
        header.set_key_id(self.key_id.as_ref());
        let token = jwt::encode_with_signer(&payload, &header, self.signer.as_ref())?;
        Ok(token)
    }
}
