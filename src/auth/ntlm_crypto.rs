//! NTLMv2 cryptographic functions (MS-NLMP 3.3.2)

use crate::error::{Error, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use std::time::{SystemTime, UNIX_EPOCH};

/// 100ns intervals between 1601-01-01 and 1970-01-01
pub const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 16]> {
    let mut mac = Hmac::<Md5>::new_from_slice(key)
        .map_err(|e| Error::CryptoError(format!("HMAC error: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}

/// NT hash: MD4 of the UTF-16LE password
pub fn ntlm_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(utf16le(password));
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// NTOWFv2: HMAC-MD5 keyed by the NT hash over uppercase(user) + domain
pub fn ntlmv2_hash(username: &str, domain: &str, password: &str) -> Result<[u8; 16]> {
    let identity = utf16le(&format!("{}{}", username.to_uppercase(), domain));
    hmac_md5(&ntlm_hash(password), &[&identity])
}

/// LMv2 response: HMAC over both challenges, followed by the client challenge
pub fn lmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> Result<Vec<u8>> {
    let proof = hmac_md5(ntlmv2_hash, &[server_challenge, client_challenge])?;
    let mut response = proof.to_vec();
    response.extend_from_slice(client_challenge);
    Ok(response)
}

/// The client-generated structure the NTLMv2 proof is computed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlmV2Blob {
    pub timestamp: u64,
    pub client_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl NtlmV2Blob {
    pub fn new(timestamp: u64, client_challenge: [u8; 8], target_info: Vec<u8>) -> Self {
        Self {
            timestamp,
            client_challenge,
            target_info,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut blob = Vec::with_capacity(32 + self.target_info.len());
        // RespType, HiRespType, reserved
        blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        blob.write_u64::<LittleEndian>(self.timestamp)?;
        blob.extend_from_slice(&self.client_challenge);
        blob.extend_from_slice(&[0x00; 4]);
        blob.extend_from_slice(&self.target_info);
        blob.extend_from_slice(&[0x00; 4]);
        Ok(blob)
    }
}

/// NTLMv2 response: NTProofStr followed by the blob
pub fn ntlmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    blob: &NtlmV2Blob,
) -> Result<Vec<u8>> {
    let blob_bytes = blob.to_bytes()?;
    let proof = hmac_md5(ntlmv2_hash, &[server_challenge, &blob_bytes])?;
    let mut response = proof.to_vec();
    response.extend_from_slice(&blob_bytes);
    Ok(response)
}

/// Recompute the NTProofStr of a received NTLMv2 response
pub fn verify_ntlmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    nt_response: &[u8],
) -> Result<bool> {
    if nt_response.len() < 16 + 28 {
        return Ok(false);
    }
    let (proof, blob) = nt_response.split_at(16);
    let expected = hmac_md5(ntlmv2_hash, &[server_challenge, blob])?;
    Ok(proof == expected)
}

pub fn generate_client_challenge() -> [u8; 8] {
    rand::random()
}

/// Current time as a Windows FILETIME
pub fn windows_timestamp() -> u64 {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    FILETIME_UNIX_EPOCH + since_unix.as_secs() * 10_000_000 + u64::from(since_unix.subsec_nanos()) / 100
}
