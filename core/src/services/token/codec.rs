//! JWT implementation of the token codec

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::fmt;
use tracing::debug;

use gk_shared::config::{SessionConfig, SigningAlgorithm};

use crate::domain::entities::{Claims, Token};
use crate::errors::TokenError;

/// Signs claim sets into wire tokens and verifies them back
///
/// Verification checks integrity only. Judging expiry is left to the
/// caller so that an authentic but elapsed token can be told apart from a
/// forged one.
pub trait TokenCodec: Send + Sync {
    /// Signs a claim set
    ///
    /// # Returns
    /// * `Ok(Token)` - The signed wire token
    /// * `Err(TokenError::GenerationFailed)` - The claims could not be encoded
    fn sign(&self, claims: &Claims) -> Result<Token, TokenError>;

    /// Verifies a wire token and decodes its claim set
    ///
    /// # Returns
    /// * `Ok(Claims)` - Signature and structure are valid
    /// * `Err(TokenError)` - Malformed input, wrong algorithm or bad signature
    fn verify(&self, token: &Token) -> Result<Claims, TokenError>;
}

/// HMAC-signed JWT codec
#[derive(Clone)]
pub struct JwtCodec {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtCodec {
    /// Creates a codec for the given secret and algorithm
    ///
    /// # Arguments
    ///
    /// * `secret` - HMAC secret shared by signer and verifier
    /// * `algorithm` - The only algorithm accepted on verification
    pub fn new(secret: &[u8], algorithm: SigningAlgorithm) -> Self {
        let mut validation = Validation::new(jwt_algorithm(algorithm));
        // Expiry is judged by the session layer, with no leeway
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Creates a codec from session configuration
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.secret.as_bytes(), config.algorithm)
    }

    /// Algorithm this codec signs with and accepts
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }
}

impl fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec for JwtCodec {
    fn sign(&self, claims: &Claims) -> Result<Token, TokenError> {
        let header = Header::new(jwt_algorithm(self.algorithm));
        encode(&header, claims, &self.encoding_key)
            .map(Token::from)
            .map_err(|e| TokenError::GenerationFailed { reason: e.to_string() })
    }

    fn verify(&self, token: &Token) -> Result<Claims, TokenError> {
        decode::<Claims>(token.as_str(), &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let error = match e.kind() {
                    ErrorKind::InvalidAlgorithm => TokenError::UnexpectedAlgorithm {
                        found: decode_header(token.as_str())
                            .map(|header| format!("{:?}", header.alg))
                            .unwrap_or_else(|_| "unknown".to_string()),
                    },
                    ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                    _ => TokenError::InvalidFormat { reason: e.to_string() },
                };
                debug!("Token verification failed: {}", error);
                error
            })
    }
}

fn jwt_algorithm(algorithm: SigningAlgorithm) -> Algorithm {
    match algorithm {
        SigningAlgorithm::HS256 => Algorithm::HS256,
        SigningAlgorithm::HS384 => Algorithm::HS384,
        SigningAlgorithm::HS512 => Algorithm::HS512,
    }
}
