//! 以太坊地址派生
//!
//! 私钥 -> secp256k1 公钥 -> 未压缩公钥体 (64 字节) 的 Keccak-256
//! 哈希 -> 取后 20 字节。命中验证用同一条路径重新派生地址。

use secp256k1::{PublicKey, SECP256K1, SecretKey};
use sha3::{Digest, Keccak256};

use crate::mode::ADDRESS_LEN;
use crate::seed::BaseSeed;

/// 从 32 字节私钥派生以太坊地址
pub fn derive_address(private_key: &[u8; 32]) -> Result<[u8; ADDRESS_LEN], secp256k1::Error> {
    let secret = SecretKey::from_slice(private_key)?;
    let public = PublicKey::from_secret_key(&SECP256K1, &secret);
    let uncompressed = public.serialize_uncompressed();

    // 跳过 0x04 前缀, 只哈希 64 字节坐标
    let mut hasher = Keccak256::new();
    hasher.update(&uncompressed[1..]);
    let hash = hasher.finalize();

    let mut address = [0u8; ADDRESS_LEN];
    address.copy_from_slice(&hash[12..]);
    Ok(address)
}

/// 由基础种子与轮内偏移重建私钥
///
/// 与候选生成共用 [`BaseSeed::add_offset`] 的公式。
pub fn reconstruct_private_key(seed: &BaseSeed, key_offset: u64) -> [u8; 32] {
    seed.add_offset(key_offset).0
}
