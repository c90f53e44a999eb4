// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A crate used to encrypt cluster secrets for the IKS control plane
//!
//! Keys live in an externally mounted, versioned key file of the form
//! `{"data": {"<id>": "<key material>"}}`.  Rotation is handled outside of
//! the control plane: new keys are added under a larger id, and the control
//! plane always encrypts new secrets with the largest id while remembering,
//! per cluster, which id was used.

use std::collections::BTreeMap;
use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes128Gcm;
use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an AES-GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Raw key material as read from the key file
///
/// This should never be used directly, and always wrapped in a
/// `Secret<KeyMaterial>` upon construction.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial(pub Vec<u8>);

/// Key material for a given key id
pub struct VersionedKey {
    pub id: i32,
    pub key: Secret<KeyMaterial>,
}

impl VersionedKey {
    pub fn new(id: i32, data: &[u8]) -> VersionedKey {
        VersionedKey { id, key: Secret::new(KeyMaterial(data.to_vec())) }
    }
}

/// An error returned by the [`KeyManager`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to retrieve secret: {0}")]
    SecretRetrieval(#[from] SecretRetrieverError),

    #[error("unsupported key length {0} (expected 16 or 32 bytes)")]
    InvalidKeyLength(usize),

    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("ciphertext is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to encrypt value")]
    Encrypt,

    #[error("failed to decrypt value")]
    Decrypt,

    #[error("decrypted value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A per-cluster AES-GCM nonce
///
/// Stored base64-encoded alongside the id of the key it was used with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClusterNonce([u8; NONCE_LEN]);

impl ClusterNonce {
    /// Generate a fresh random nonce
    pub fn generate() -> ClusterNonce {
        ClusterNonce(rand::random())
    }

    pub fn from_bytes(bytes: [u8; NONCE_LEN]) -> ClusterNonce {
        ClusterNonce(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<ClusterNonce, Error> {
        let bytes = STANDARD.decode(encoded)?;
        let bytes: [u8; NONCE_LEN] =
            bytes.as_slice().try_into().map_err(|_| {
                Error::InvalidNonce(format!(
                    "expected {} bytes, found {}",
                    NONCE_LEN,
                    bytes.len()
                ))
            })?;
        Ok(ClusterNonce(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

/// The cipher selected by the length of the key material
enum ClusterCipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl ClusterCipher {
    fn new(key: &VersionedKey) -> Result<ClusterCipher, Error> {
        let bytes = &key.key.expose_secret().0;
        match bytes.len() {
            16 => Aes128Gcm::new_from_slice(bytes)
                .map(ClusterCipher::Aes128)
                .map_err(|_| Error::InvalidKeyLength(bytes.len())),
            32 => Aes256Gcm::new_from_slice(bytes)
                .map(ClusterCipher::Aes256)
                .map_err(|_| Error::InvalidKeyLength(bytes.len())),
            n => Err(Error::InvalidKeyLength(n)),
        }
    }

    fn encrypt(
        &self,
        nonce: &ClusterNonce,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let nonce = Nonce::from_slice(&nonce.0);
        let result = match self {
            ClusterCipher::Aes128(c) => c.encrypt(nonce, plaintext),
            ClusterCipher::Aes256(c) => c.encrypt(nonce, plaintext),
        };
        result.map_err(|_| Error::Encrypt)
    }

    fn decrypt(
        &self,
        nonce: &ClusterNonce,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let nonce = Nonce::from_slice(&nonce.0);
        let result = match self {
            ClusterCipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            ClusterCipher::Aes256(c) => c.decrypt(nonce, ciphertext),
        };
        result.map_err(|_| Error::Decrypt)
    }
}

/// Encrypts and decrypts cluster secrets with keys obtained from a
/// [`SecretRetriever`].
pub struct KeyManager<S: SecretRetriever> {
    secret_retriever: S,
}

impl<S: SecretRetriever> KeyManager<S> {
    pub fn new(secret_retriever: S) -> KeyManager<S> {
        KeyManager { secret_retriever }
    }

    /// Return the id of the key new clusters should be encrypted with
    pub async fn latest_key_id(&self) -> Result<i32, Error> {
        Ok(self.secret_retriever.get_latest().await?.id)
    }

    /// Encrypt `plaintext` with key `key_id`, returning base64 ciphertext
    pub async fn encrypt(
        &self,
        key_id: i32,
        nonce: &ClusterNonce,
        plaintext: &str,
    ) -> Result<String, Error> {
        let key = self.secret_retriever.get(key_id).await?;
        let cipher = ClusterCipher::new(&key)?;
        let ciphertext = cipher.encrypt(nonce, plaintext.as_bytes())?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Encrypt every value in `values` with the same key and nonce
    pub async fn encrypt_all<'a, I>(
        &self,
        key_id: i32,
        nonce: &ClusterNonce,
        values: I,
    ) -> Result<Vec<String>, Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let key = self.secret_retriever.get(key_id).await?;
        let cipher = ClusterCipher::new(&key)?;
        values
            .into_iter()
            .map(|v| {
                cipher.encrypt(nonce, v.as_bytes()).map(|c| STANDARD.encode(c))
            })
            .collect()
    }

    /// Decrypt base64 `ciphertext` produced by [`KeyManager::encrypt`]
    pub async fn decrypt(
        &self,
        key_id: i32,
        nonce: &ClusterNonce,
        ciphertext: &str,
    ) -> Result<String, Error> {
        let key = self.secret_retriever.get(key_id).await?;
        let cipher = ClusterCipher::new(&key)?;
        let ciphertext = STANDARD.decode(ciphertext)?;
        let mut plaintext = cipher.decrypt(nonce, &ciphertext)?;
        let result = String::from_utf8(plaintext.clone());
        plaintext.zeroize();
        Ok(result?)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SecretRetrieverError {
    #[error("Secret does not exist for key id {0}")]
    NoSuchKey(i32),

    #[error("Please check encryption key values: no usable key found")]
    NoKeys,

    #[error("key id {0:?} is not a positive integer")]
    InvalidKeyId(String),

    #[error("error reading key file \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("error parsing key file \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: serde_json::Error,
    },
}

/// A mechanism for retrieving encryption keys
#[async_trait]
pub trait SecretRetriever: Send + Sync {
    /// Return the key with the largest id
    ///
    /// Used when a new cluster is created.  Existing clusters must instead be
    /// handled with [`SecretRetriever::get`] and the key id recorded for them.
    async fn get_latest(&self) -> Result<VersionedKey, SecretRetrieverError>;

    /// Get the key for the given id
    async fn get(&self, id: i32) -> Result<VersionedKey, SecretRetrieverError>;
}

#[async_trait]
impl<T: SecretRetriever + ?Sized> SecretRetriever for Arc<T> {
    async fn get_latest(&self) -> Result<VersionedKey, SecretRetrieverError> {
        (**self).get_latest().await
    }

    async fn get(&self, id: i32) -> Result<VersionedKey, SecretRetrieverError> {
        (**self).get(id).await
    }
}

#[derive(Deserialize)]
struct KeyFileContents {
    data: BTreeMap<String, String>,
}

/// Parsed key file, ordered by key id
struct KeyFile {
    keys: BTreeMap<i32, Secret<KeyMaterial>>,
}

impl KeyFile {
    fn parse(
        contents: &str,
        path: &Utf8Path,
    ) -> Result<KeyFile, SecretRetrieverError> {
        let parsed: KeyFileContents = serde_json::from_str(contents)
            .map_err(|err| SecretRetrieverError::Parse {
                path: path.to_owned(),
                err,
            })?;
        let mut keys = BTreeMap::new();
        for (id, value) in parsed.data {
            let id = id
                .parse::<i32>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| SecretRetrieverError::InvalidKeyId(id.clone()))?;
            if value.is_empty() {
                continue;
            }
            keys.insert(id, Secret::new(KeyMaterial(value.into_bytes())));
        }
        Ok(KeyFile { keys })
    }

    fn versioned(&self, id: i32) -> Option<VersionedKey> {
        self.keys
            .get(&id)
            .map(|key| VersionedKey::new(id, &key.expose_secret().0))
    }
}

/// A [`SecretRetriever`] backed by the mounted key file
///
/// The file is re-read on every request so that externally rotated keys are
/// picked up without a restart.
#[derive(Clone, Debug)]
pub struct KeyFileRetriever {
    path: Utf8PathBuf,
}

impl KeyFileRetriever {
    pub fn new(path: impl Into<Utf8PathBuf>) -> KeyFileRetriever {
        KeyFileRetriever { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    async fn load(&self) -> Result<KeyFile, SecretRetrieverError> {
        let contents =
            tokio::fs::read_to_string(&self.path).await.map_err(|err| {
                SecretRetrieverError::Io { path: self.path.clone(), err }
            })?;
        KeyFile::parse(&contents, &self.path)
    }
}

#[async_trait]
impl SecretRetriever for KeyFileRetriever {
    async fn get_latest(&self) -> Result<VersionedKey, SecretRetrieverError> {
        let file = self.load().await?;
        let (id, _) =
            file.keys.last_key_value().ok_or(SecretRetrieverError::NoKeys)?;
        file.versioned(*id).ok_or(SecretRetrieverError::NoKeys)
    }

    async fn get(&self, id: i32) -> Result<VersionedKey, SecretRetrieverError> {
        self.load()
            .await?
            .versioned(id)
            .ok_or(SecretRetrieverError::NoSuchKey(id))
    }
}
