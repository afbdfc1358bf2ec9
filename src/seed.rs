//! 基础种子与种子来源
//!
//! 每台设备每轮从种子源取一个新的 256 位基础种子。工作项 i 的
//! 私钥 = 基础种子 + 轮内偏移 i (mod 曲线阶 n), 因此只要轮与轮
//! 的种子互不相同, 搜索空间的划分就不会重叠。

use std::collections::HashSet;
use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;

/// secp256k1 曲线阶 n (大端字节)
pub const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFE, 0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36,
    0x41, 0x41,
];

/// 一轮搜索的基础种子: 256 位标量, 大端字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseSeed(pub [u8; 32]);

impl BaseSeed {
    pub fn from_bytes(bytes: [u8; 32]) -> BaseSeed {
        BaseSeed(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 种子加 64 位偏移, 结果按曲线阶 n 取模
    ///
    /// 候选生成与命中验证共用这一个公式, 两侧算出的私钥
    /// 必然一致。
    pub fn add_offset(&self, offset: u64) -> BaseSeed {
        let mut out = self.0;
        let mut carry = offset;
        for byte in out.iter_mut().rev() {
            if carry == 0 {
                break;
            }
            let sum = *byte as u64 + (carry & 0xFF);
            *byte = (sum & 0xFF) as u8;
            carry = (carry >> 8) + (sum >> 8);
        }
        // seed < n 且 offset < 2^64, 和最多超出 n 一次
        if geq(&out, &CURVE_ORDER) {
            sub_in_place(&mut out, &CURVE_ORDER);
        }
        BaseSeed(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Display for BaseSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 大端字节比较: a >= b
fn geq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    for i in 0..32 {
        if a[i] != b[i] {
            return a[i] > b[i];
        }
    }
    true
}

/// 大端字节减法: a -= b, 要求 a >= b
fn sub_in_place(a: &mut [u8; 32], b: &[u8; 32]) {
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let diff = a[i] as i16 - b[i] as i16 - borrow;
        if diff < 0 {
            a[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            a[i] = diff as u8;
            borrow = 0;
        }
    }
}

/// 种子来源: 为每台设备的每一轮提供基础种子
pub trait SeedSource: Send {
    /// 下一个种子, 保证非零且小于曲线阶
    fn next_seed(&mut self) -> BaseSeed;
}

/// 操作系统随机数种子源
#[derive(Debug, Default)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn next_seed(&mut self) -> BaseSeed {
        let mut bytes = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut bytes);
            if bytes.iter().all(|&b| b == 0) {
                continue;
            }
            if geq(&bytes, &CURVE_ORDER) {
                continue;
            }
            return BaseSeed(bytes);
        }
    }
}

/// 单设备种子池: 记录已用种子, 保证同一设备不重复使用
#[derive(Debug, Default)]
pub struct SeedPool {
    seen: HashSet<BaseSeed>,
}

impl SeedPool {
    pub fn new() -> SeedPool {
        SeedPool::default()
    }

    /// 从来源取一个本设备从未用过的种子
    pub fn draw(&mut self, source: &mut dyn SeedSource) -> BaseSeed {
        loop {
            let seed = source.next_seed();
            if self.seen.insert(seed) {
                return seed;
            }
        }
    }

    /// 已用种子数
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
