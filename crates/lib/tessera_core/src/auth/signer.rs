//! JWT signing and verification.
//!
//! A [`JwtSigner`] is bound to exactly one algorithm. Tokens whose header names
//! any other algorithm are rejected before signature verification.
//!
//! Asymmetric keys are PEM files resolved relative to a key directory; a path
//! that resolves outside that directory is refused.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::models::auth::TokenClaims;

/// Token signing and parsing errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token algorithm does not match the configured algorithm")]
    InvalidAlgorithm,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Refresh token claims must carry a JTI")]
    MissingJti,

    #[error("Access token claims must not carry a JTI")]
    UnexpectedJti,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key path escapes the key directory: {0}")]
    PathTraversal(PathBuf),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Token encoding failed: {0}")]
    Encode(String),
}

/// Signs access and refresh tokens and parses either kind back into claims.
pub trait TokenSigner: Send + Sync {
    /// Sign claims for an access token. Access tokens never carry a JTI.
    fn sign_access_token(&self, claims: &TokenClaims) -> Result<String, SignerError>;

    /// Sign claims for a refresh token. Refresh tokens always carry a JTI.
    fn sign_refresh_token(&self, claims: &TokenClaims) -> Result<String, SignerError>;

    /// Verify algorithm, signature, expiry and claim structure.
    fn parse(&self, token: &str) -> Result<TokenClaims, SignerError>;
}

/// Where signing keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// Shared secret for the HMAC family.
    Secret(Vec<u8>),
    /// PEM key pair for RSA, ECDSA and EdDSA, relative to `base_dir`.
    Files {
        base_dir: PathBuf,
        private_key: PathBuf,
        public_key: PathBuf,
    },
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Secret(_) => f.write_str("Secret(..)"),
            KeySource::Files {
                base_dir,
                private_key,
                public_key,
            } => f
                .debug_struct("Files")
                .field("base_dir", base_dir)
                .field("private_key", private_key)
                .field("public_key", public_key)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

fn family(algorithm: Algorithm) -> Family {
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Family::Hmac,
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => Family::Rsa,
        Algorithm::ES256 | Algorithm::ES384 => Family::Ec,
        Algorithm::EdDSA => Family::Ed,
    }
}

/// Parse an algorithm name such as `HS256` or `EdDSA`.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, SignerError> {
    name.trim()
        .parse::<Algorithm>()
        .map_err(|_| SignerError::UnsupportedAlgorithm(name.to_string()))
}

/// Resolve `key_path` under `base_dir`, refusing anything that lands outside it.
///
/// Absolute paths and `..` components are refused outright; symlinks are
/// followed and the final target must still sit under `base_dir`.
pub fn resolve_key_path(base_dir: &Path, key_path: &Path) -> Result<PathBuf, SignerError> {
    let escapes = key_path.is_absolute()
        || key_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir));
    if escapes {
        return Err(SignerError::PathTraversal(key_path.to_path_buf()));
    }

    let base = base_dir
        .canonicalize()
        .map_err(|e| SignerError::Key(format!("key directory {}: {e}", base_dir.display())))?;
    let resolved = base
        .join(key_path)
        .canonicalize()
        .map_err(|e| SignerError::Key(format!("key file {}: {e}", key_path.display())))?;
    if !resolved.starts_with(&base) {
        return Err(SignerError::PathTraversal(key_path.to_path_buf()));
    }
    Ok(resolved)
}

fn read_key(base_dir: &Path, key_path: &Path) -> Result<Vec<u8>, SignerError> {
    let path = resolve_key_path(base_dir, key_path)?;
    std::fs::read(&path).map_err(|e| SignerError::Key(format!("{}: {e}", path.display())))
}

fn key_error(e: jsonwebtoken::errors::Error) -> SignerError {
    SignerError::Key(e.to_string())
}

fn decode_error(e: jsonwebtoken::errors::Error) -> SignerError {
    match e.kind() {
        ErrorKind::ExpiredSignature => SignerError::Expired,
        ErrorKind::InvalidSignature => SignerError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => SignerError::InvalidAlgorithm,
        _ => SignerError::Malformed(e.to_string()),
    }
}

/// [`TokenSigner`] backed by `jsonwebtoken`.
pub struct JwtSigner {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtSigner {
    pub fn new(algorithm: Algorithm, keys: &KeySource) -> Result<Self, SignerError> {
        let (encoding, decoding) = match (family(algorithm), keys) {
            (Family::Hmac, KeySource::Secret(secret)) => {
                if secret.is_empty() {
                    return Err(SignerError::Key("empty HMAC secret".into()));
                }
                (
                    EncodingKey::from_secret(secret),
                    DecodingKey::from_secret(secret),
                )
            }
            (
                asymmetric,
                KeySource::Files {
                    base_dir,
                    private_key,
                    public_key,
                },
            ) if asymmetric != Family::Hmac => {
                let private_pem = read_key(base_dir, private_key)?;
                let public_pem = read_key(base_dir, public_key)?;
                match asymmetric {
                    Family::Rsa => (
                        EncodingKey::from_rsa_pem(&private_pem).map_err(key_error)?,
                        DecodingKey::from_rsa_pem(&public_pem).map_err(key_error)?,
                    ),
                    Family::Ec => (
                        EncodingKey::from_ec_pem(&private_pem).map_err(key_error)?,
                        DecodingKey::from_ec_pem(&public_pem).map_err(key_error)?,
                    ),
                    _ => (
                        EncodingKey::from_ed_pem(&private_pem).map_err(key_error)?,
                        DecodingKey::from_ed_pem(&public_pem).map_err(key_error)?,
                    ),
                }
            }
            (fam, _) => {
                return Err(SignerError::Key(format!(
                    "{algorithm:?} ({fam:?} family) cannot use the supplied key source"
                )));
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            algorithm,
            encoding,
            decoding,
            validation,
        })
    }

    /// HMAC signer from a shared secret.
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> Result<Self, SignerError> {
        Self::new(algorithm, &KeySource::Secret(secret.to_vec()))
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, SignerError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| SignerError::Encode(e.to_string()))
    }
}

impl TokenSigner for JwtSigner {
    fn sign_access_token(&self, claims: &TokenClaims) -> Result<String, SignerError> {
        if claims.jti.is_some() {
            return Err(SignerError::UnexpectedJti);
        }
        self.sign(claims)
    }

    fn sign_refresh_token(&self, claims: &TokenClaims) -> Result<String, SignerError> {
        if claims.jti.as_deref().is_none_or(str::is_empty) {
            return Err(SignerError::MissingJti);
        }
        self.sign(claims)
    }

    fn parse(&self, token: &str) -> Result<TokenClaims, SignerError> {
        decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(decode_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{AccountSnapshot, Role};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    const SECRET: &[u8] = b"test-secret-that-is-long-enough";

    fn testdata() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata")
    }

    fn claims(jti: Option<&str>) -> TokenClaims {
        let snapshot = AccountSnapshot {
            id: Uuid::new_v4(),
            email: "daniel@example.com".into(),
            role: Role::User,
            active: true,
        };
        TokenClaims::new(
            &snapshot,
            Utc::now(),
            Duration::from_secs(900),
            jti.map(str::to_string),
        )
    }

    fn files(private_key: &str, public_key: &str) -> KeySource {
        KeySource::Files {
            base_dir: testdata(),
            private_key: private_key.into(),
            public_key: public_key.into(),
        }
    }

    #[test]
    fn hmac_roundtrip() {
        let signer = JwtSigner::hmac(Algorithm::HS256, SECRET).unwrap();
        let original = claims(None);
        let token = signer.sign_access_token(&original).unwrap();
        assert_eq!(signer.parse(&token).unwrap(), original);
    }

    #[test]
    fn access_and_refresh_jti_rules() {
        let signer = JwtSigner::hmac(Algorithm::HS256, SECRET).unwrap();
        assert!(matches!(
            signer.sign_access_token(&claims(Some("j"))),
            Err(SignerError::UnexpectedJti)
        ));
        assert!(matches!(
            signer.sign_refresh_token(&claims(None)),
            Err(SignerError::MissingJti)
        ));
        let token = signer.sign_refresh_token(&claims(Some("j"))).unwrap();
        assert_eq!(signer.parse(&token).unwrap().jti.as_deref(), Some("j"));
    }

    #[test]
    fn mismatched_algorithm_is_rejected() {
        let hs384 = JwtSigner::hmac(Algorithm::HS384, SECRET).unwrap();
        let hs256 = JwtSigner::hmac(Algorithm::HS256, SECRET).unwrap();
        let token = hs384.sign_access_token(&claims(None)).unwrap();
        assert!(matches!(hs256.parse(&token), Err(SignerError::InvalidAlgorithm)));
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let a = JwtSigner::hmac(Algorithm::HS256, SECRET).unwrap();
        let b = JwtSigner::hmac(Algorithm::HS256, b"another-secret-entirely").unwrap();
        let token = a.sign_access_token(&claims(None)).unwrap();
        assert!(matches!(b.parse(&token), Err(SignerError::InvalidSignature)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = JwtSigner::hmac(Algorithm::HS256, SECRET).unwrap();
        let mut old = claims(None);
        old.iat -= 7200;
        old.exp = old.iat + 60;
        let token = signer.sign_access_token(&old).unwrap();
        assert!(matches!(signer.parse(&token), Err(SignerError::Expired)));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = JwtSigner::hmac(Algorithm::HS256, SECRET).unwrap();
        assert!(matches!(
            signer.parse("not.a.jwt"),
            Err(SignerError::Malformed(_))
        ));
        assert!(matches!(signer.parse(""), Err(SignerError::Malformed(_))));
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(
            JwtSigner::hmac(Algorithm::HS256, b""),
            Err(SignerError::Key(_))
        ));
    }

    #[test]
    fn key_source_must_match_family() {
        let err = JwtSigner::new(Algorithm::EdDSA, &KeySource::Secret(SECRET.to_vec()));
        assert!(matches!(err, Err(SignerError::Key(_))));
        let err = JwtSigner::new(
            Algorithm::HS256,
            &files("ed25519_private.pem", "ed25519_public.pem"),
        );
        assert!(matches!(err, Err(SignerError::Key(_))));
    }

    #[test]
    fn eddsa_roundtrip() {
        let signer = JwtSigner::new(
            Algorithm::EdDSA,
            &files("ed25519_private.pem", "ed25519_public.pem"),
        )
        .unwrap();
        let original = claims(Some("jti-1"));
        let token = signer.sign_refresh_token(&original).unwrap();
        assert_eq!(signer.parse(&token).unwrap(), original);
    }

    #[test]
    fn es256_roundtrip_and_cross_algorithm_rejection() {
        let es = JwtSigner::new(
            Algorithm::ES256,
            &files("ec256_private.pem", "ec256_public.pem"),
        )
        .unwrap();
        let ed = JwtSigner::new(
            Algorithm::EdDSA,
            &files("ed25519_private.pem", "ed25519_public.pem"),
        )
        .unwrap();
        let token = es.sign_access_token(&claims(None)).unwrap();
        assert!(es.parse(&token).is_ok());
        assert!(matches!(ed.parse(&token), Err(SignerError::InvalidAlgorithm)));
    }

    #[test]
    fn parse_algorithm_names() {
        assert_eq!(parse_algorithm("HS512").unwrap(), Algorithm::HS512);
        assert_eq!(parse_algorithm("EdDSA").unwrap(), Algorithm::EdDSA);
        assert!(matches!(
            parse_algorithm("none"),
            Err(SignerError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn key_paths_cannot_escape_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("keys");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(base.join("inside.pem"), "x").unwrap();
        std::fs::write(dir.path().join("outside.pem"), "x").unwrap();

        assert!(resolve_key_path(&base, Path::new("inside.pem")).is_ok());
        assert!(matches!(
            resolve_key_path(&base, Path::new("../outside.pem")),
            Err(SignerError::PathTraversal(_))
        ));
        assert!(matches!(
            resolve_key_path(&base, Path::new("nested/../../outside.pem")),
            Err(SignerError::PathTraversal(_))
        ));
        let absolute = dir.path().join("outside.pem");
        assert!(matches!(
            resolve_key_path(&base, &absolute),
            Err(SignerError::PathTraversal(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_base_dir_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("keys");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(dir.path().join("outside.pem"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("outside.pem"), base.join("link.pem"))
            .unwrap();
        assert!(matches!(
            resolve_key_path(&base, Path::new("link.pem")),
            Err(SignerError::PathTraversal(_))
        ));
    }

    #[test]
    fn missing_key_file_is_a_key_error() {
        let err = JwtSigner::new(Algorithm::EdDSA, &files("nope.pem", "nope.pem"));
        assert!(matches!(err, Err(SignerError::Key(_))));
    }
}
