//! Protocol v2 crypto
//!
//! HMAC-MD5 keyed by the shared password authenticates both sides of the
//! login; the session key derived from both tokens keys two independent RC4
//! streams, one per direction, each with the first 1024 keystream bytes
//! discarded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::digest::{Key, KeyInit as MacKeyInit};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::Rng;
use rc4::cipher::generic_array::GenericArray;
use rc4::consts::U16;
use rc4::{KeyInit, Rc4, StreamCipher as _};

/// Length of a login token
pub const TOKEN_SIZE: usize = 22;

/// Length of an MD5 digest
pub const DIGEST_SIZE: usize = 16;

/// Keystream bytes dropped after keying
const DISCARD: usize = 1024;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

type HmacMd5 = Hmac<Md5>;

/// HMAC keyed by `password`, padded or hashed to the MD5 block size
fn keyed(password: &str) -> HmacMd5 {
    let mut key = Key::<HmacMd5>::default();
    let bytes = password.as_bytes();
    if bytes.len() > key.len() {
        key[..DIGEST_SIZE].copy_from_slice(&<Md5 as Digest>::digest(bytes));
    } else {
        key[..bytes.len()].copy_from_slice(bytes);
    }
    <HmacMd5 as MacKeyInit>::new(&key)
}

/// HMAC-MD5 of `data` keyed by `password`
pub fn hmac_md5(data: &[u8], password: &str) -> [u8; DIGEST_SIZE] {
    let mut mac = keyed(password);
    mac.update(data);
    let mut digest = [0u8; DIGEST_SIZE];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    digest
}

/// Random login token drawn from the base64 alphabet
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_SIZE)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Base64 digest a side presents for `token`
pub fn token_digest(token: &str, password: &str) -> String {
    STANDARD.encode(hmac_md5(token.as_bytes(), password))
}

/// Check a server's base64 digest for its token in constant time
pub fn verify_token_digest(token: &str, password: &str, digest: &str) -> bool {
    let Ok(claimed) = STANDARD.decode(digest.trim()) else {
        return false;
    };
    let mut mac = keyed(password);
    mac.update(token.as_bytes());
    mac.verify_slice(&claimed).is_ok()
}

/// One direction's RC4 keystream
pub struct LinkCipher(Rc4<U16>);

impl LinkCipher {
    /// Key a stream and drop the first 1024 keystream bytes
    pub fn new(key: &[u8; DIGEST_SIZE]) -> Self {
        let mut rc4 = <Rc4<U16> as KeyInit>::new(GenericArray::from_slice(key));
        let mut discard = [0u8; DISCARD];
        rc4.apply_keystream(&mut discard);
        Self(rc4)
    }

    /// Encrypt or decrypt in place
    pub fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

impl std::fmt::Debug for LinkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LinkCipher(..)")
    }
}

/// Cipher pair of an authenticated connection
#[derive(Debug)]
pub struct SessionCiphers {
    pub rx: LinkCipher,
    pub tx: LinkCipher,
}

impl SessionCiphers {
    /// Derive both directions from the two login tokens
    pub fn derive(server_token: &str, client_token: &str, password: &str) -> Self {
        let mut material = String::with_capacity(server_token.len() + client_token.len());
        material.push_str(server_token);
        material.push_str(client_token);
        let key = hmac_md5(material.as_bytes(), password);
        Self {
            rx: LinkCipher::new(&key),
            tx: LinkCipher::new(&key),
        }
    }
}
