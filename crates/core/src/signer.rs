//! 请求签名
//!
//! RSA PKCS#1 v1.5 + SHA-256，对请求体原始字节签名，输出 Base64。
//! 同一私钥对同一载荷的签名结果完全一致，不含时间戳或随机数。

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};

use crate::errors::{BunqError, BunqResult};

/// 默认 RSA 密钥长度
pub const DEFAULT_KEY_BITS: u32 = 2048;

/// PEM 格式的密钥对
#[derive(Clone)]
pub struct KeyPair {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

fn load_private_key(private_key_pem: &str) -> BunqResult<PKey<Private>> {
    PKey::private_key_from_pem(private_key_pem.as_bytes())
        .map_err(|e| BunqError::Signing(format!("私钥解析失败: {e}")))
}

fn load_public_key(public_key_pem: &str) -> BunqResult<PKey<Public>> {
    PKey::public_key_from_pem(public_key_pem.as_bytes())
        .map_err(|e| BunqError::Signing(format!("公钥解析失败: {e}")))
}

/// 对载荷签名
pub fn sign(payload: &[u8], private_key_pem: &str) -> BunqResult<String> {
    let key = load_private_key(private_key_pem)?;
    let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
    signer.update(payload)?;
    let signature = signer.sign_to_vec()?;
    Ok(BASE64.encode(signature))
}

/// 校验签名
pub fn verify(payload: &[u8], signature_b64: &str, public_key_pem: &str) -> BunqResult<bool> {
    let key = load_public_key(public_key_pem)?;
    let signature = BASE64
        .decode(signature_b64.trim())
        .map_err(|e| BunqError::Signing(format!("签名 Base64 解码失败: {e}")))?;
    let mut verifier = Verifier::new(MessageDigest::sha256(), &key)?;
    verifier.update(payload)?;
    Ok(verifier.verify(&signature)?)
}

/// 生成新的 RSA 密钥对（私钥 PKCS#8，公钥 SPKI）
pub fn generate_key_pair(bits: u32) -> BunqResult<KeyPair> {
    let rsa = Rsa::generate(bits)?;
    let key = PKey::from_rsa(rsa)?;
    let private_key_pem = String::from_utf8(key.private_key_to_pem_pkcs8()?)
        .map_err(|e| BunqError::Signing(e.to_string()))?;
    let public_key_pem = String::from_utf8(key.public_key_to_pem()?)
        .map_err(|e| BunqError::Signing(e.to_string()))?;
    Ok(KeyPair {
        private_key_pem,
        public_key_pem,
    })
}

/// 校验私钥与公钥是否可用
pub fn validate_key_pair(private_key_pem: &str, public_key_pem: &str) -> BunqResult<()> {
    load_private_key(private_key_pem)?;
    load_public_key(public_key_pem)?;
    Ok(())
}
