//! RSA SSH key pairs in OpenSSH format.

use crate::error::{self, Result};
use openssl::bn::BigNumRef;
use openssl::hash::MessageDigest;
use openssl::rsa::Rsa;
use snafu::{OptionExt, ResultExt};

const KEY_TYPE: &str = "ssh-rsa";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKey {
    /// `ssh-rsa AAAA...` as found in `authorized_keys`.
    pub public_key: Vec<u8>,
    /// PEM encoded private key.
    pub private_key: Vec<u8>,
    /// MD5 fingerprint, e.g. `3b:4f:...`, as shown by `ssh-keygen -E md5 -l`.
    pub fingerprint: String,
}

/// Generates a new 2048 bit RSA key pair.
pub fn new_ssh_key_pair() -> Result<SshKey> {
    let operation = "generate ssh key";
    let rsa = Rsa::generate(2048).context(error::CertificateSnafu { operation })?;
    let private_key = rsa
        .private_key_to_pem()
        .context(error::CertificateSnafu { operation })?;
    let wire = public_key_wire(rsa.e(), rsa.n());
    Ok(SshKey {
        public_key: format!("{} {}", KEY_TYPE, base64::encode(&wire)).into_bytes(),
        private_key,
        fingerprint: fingerprint(&wire)?,
    })
}

/// Rebuilds an [`SshKey`] from a stored public and private key.
pub fn parse_ssh_key_pair(public_key: Vec<u8>, private_key: Vec<u8>) -> Result<SshKey> {
    let text = String::from_utf8_lossy(&public_key);
    let encoded = text
        .split_whitespace()
        .nth(1)
        .context(error::SshKeyFormatSnafu)?;
    let wire = base64::decode(encoded).ok().context(error::SshKeyFormatSnafu)?;
    Rsa::private_key_from_pem(&private_key).context(error::PemSnafu {
        what: "ssh private key",
    })?;
    Ok(SshKey {
        public_key,
        private_key,
        fingerprint: fingerprint(&wire)?,
    })
}

fn public_key_wire(e: &BigNumRef, n: &BigNumRef) -> Vec<u8> {
    let mut wire = Vec::new();
    write_string(&mut wire, KEY_TYPE.as_bytes());
    write_mpint(&mut wire, &e.to_vec());
    write_mpint(&mut wire, &n.to_vec());
    wire
}

fn write_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

// Positive integers with the high bit set get a leading zero byte.
fn write_mpint(buf: &mut Vec<u8>, magnitude: &[u8]) {
    if magnitude.first().map_or(false, |b| b & 0x80 != 0) {
        buf.extend_from_slice(&((magnitude.len() + 1) as u32).to_be_bytes());
        buf.push(0);
        buf.extend_from_slice(magnitude);
    } else {
        write_string(buf, magnitude);
    }
}

fn fingerprint(wire: &[u8]) -> Result<String> {
    let digest = openssl::hash::hash(MessageDigest::md5(), wire).context(
        error::CertificateSnafu {
            operation: "fingerprint ssh key",
        },
    )?;
    Ok(digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":"))
}
