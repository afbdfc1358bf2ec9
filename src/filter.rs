//! 候选过滤与命中验证
//!
//! 每轮回收的候选先过 Mode 谓词, 通过后从 (种子, 偏移) 重建私钥
//! 并重新派生地址, 两边一致才作为命中上报。重建失败或地址不一致
//! 说明设备输出有问题, 记录日志后丢弃。

use log::error;

use crate::address;
use crate::mode::{ADDRESS_LEN, Mode};
use crate::seed::BaseSeed;

/// 单个工作项产生的候选: 轮内私钥偏移 + 派生地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// 相对本轮基础标量的私钥偏移
    pub key_offset: u64,
    pub address: [u8; ADDRESS_LEN],
}

/// 一轮回收的候选批次
///
/// 地址按工作项顺序连续存放, 第 i 项的私钥偏移为
/// `first_offset + i`。
#[derive(Debug, Clone)]
pub struct RoundYield {
    /// 本轮第一个工作项的私钥偏移 (设备计数器值)
    pub first_offset: u64,
    /// 连续的 20 字节地址, 长度 = 候选数 * 20
    pub addresses: Vec<u8>,
}

impl RoundYield {
    /// 候选数量
    pub fn len(&self) -> usize {
        self.addresses.len() / ADDRESS_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// 遍历批次中的候选
    pub fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
        self.addresses
            .chunks_exact(ADDRESS_LEN)
            .enumerate()
            .map(move |(i, chunk)| {
                let mut address = [0u8; ADDRESS_LEN];
                address.copy_from_slice(chunk);
                Candidate {
                    key_offset: self.first_offset + i as u64,
                    address,
                }
            })
    }
}

/// 通过谓词并通过重建验证的命中
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub private_key: [u8; 32],
    pub address: [u8; ADDRESS_LEN],
    /// 产生该命中的设备序号
    pub device_index: usize,
    /// 设备轮次计数
    pub round: u64,
}

/// 候选过滤器: Mode 谓词 + 上报前的私钥重建校验
pub struct MatchFilter {
    mode: Mode,
}

impl MatchFilter {
    pub fn new(mode: Mode) -> MatchFilter {
        MatchFilter { mode }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// 过滤一轮候选, 返回验证通过的命中
    pub fn sift(
        &self,
        seed: &BaseSeed,
        round_yield: &RoundYield,
        device_index: usize,
        round: u64,
    ) -> Vec<Match> {
        let mut matches = Vec::new();
        for candidate in round_yield.candidates() {
            if !self.mode.matches(&candidate.address) {
                continue;
            }
            let private_key = address::reconstruct_private_key(seed, candidate.key_offset);
            match address::derive_address(&private_key) {
                Ok(derived) if derived == candidate.address => {
                    matches.push(Match {
                        private_key,
                        address: candidate.address,
                        device_index,
                        round,
                    });
                }
                Ok(derived) => {
                    error!(
                        "device {} round {}: candidate at offset {} failed verification \
                         (device reported {}, host derived {}), discarding",
                        device_index,
                        round,
                        candidate.key_offset,
                        hex::encode(candidate.address),
                        hex::encode(derived)
                    );
                }
                Err(e) => {
                    error!(
                        "device {} round {}: candidate at offset {} has no valid private key: {}",
                        device_index, round, candidate.key_offset, e
                    );
                }
            }
        }
        matches
    }
}
