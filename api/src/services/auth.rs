//! Password hashing and session tokens.
//!
//! Password format: `<scrypt hash hex>.<salt hex>` with N=2^14, r=8, p=1 and
//! a 64-byte output. The salt is used as its hex string bytes, so hashes
//! produced by the existing admin tooling verify unchanged.

use anyhow::{anyhow, Result};
use rand::RngCore;
use scrypt::{scrypt, Params};
use sha3::{Digest, Sha3_256};

const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const HASH_LEN: usize = 64;
const SALT_LEN: usize = 16;

fn derive(password: &str, salt: &str) -> Result<[u8; HASH_LEN]> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, HASH_LEN)
        .map_err(|e| anyhow!("invalid scrypt params: {e}"))?;
    let mut out = [0u8; HASH_LEN];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut out)
        .map_err(|e| anyhow!("scrypt failed: {e}"))?;
    Ok(out)
}

/// 새 비밀번호 해시 생성
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let hash = derive(password, &salt)?;
    Ok(format!("{}.{}", hex::encode(hash), salt))
}

/// 저장된 해시와 비교. 형식이 잘못된 해시는 불일치로 처리
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((hash_hex, salt)) = stored.split_once('.') else {
        return false;
    };
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    let Ok(actual) = derive(password, salt) else {
        return false;
    };
    constant_time_eq(&expected, &actual)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// CPU를 오래 쓰므로 blocking 풀에서 실행
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

pub async fn verify_password_blocking(password: String, stored: String) -> Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &stored)).await?)
}

/// 새 세션 토큰 (클라이언트에만 전달)
pub fn new_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// DB에는 토큰의 SHA3-256 해시만 저장
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha3_256::digest(token.as_bytes()))
}
