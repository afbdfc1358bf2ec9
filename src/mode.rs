//! 搜索模式与地址匹配谓词
//!
//! Mode 在启动时从命令行构造一次, 之后只读共享。谓词直接在
//! 20 字节地址的 nibble 上求值, 不做十六进制字符串分配。

use std::fmt;

use crate::error::SearchError;

/// 以太坊地址字节长度
pub const ADDRESS_LEN: usize = 20;

/// 地址的十六进制字符 (nibble) 个数
pub const ADDRESS_NIBBLES: usize = ADDRESS_LEN * 2;

/// 模式种类
#[derive(Debug, Clone, PartialEq, Eq)]
enum ModeKind {
    /// 基准测试: 恒不匹配, 只测吞吐
    Benchmark,
    /// 前导零 (前 length 个字符均为 0)
    Zeros,
    /// 前导字母 (前 length 个字符均在 a-f)
    Letters,
    /// 前导数字 (前 length 个字符均在 0-9)
    Numbers,
    /// 前导指定字符
    Leading(u8),
    /// 任意位置的十六进制子串
    Matching(Vec<u8>),
    /// 前导字符的 nibble 值区间 [min, max]
    LeadingRange { min: u8, max: u8 },
    /// 地址前缀的数值区间 [min, max], digits 为参与比较的字符数
    Range { min: u64, max: u64, digits: usize },
}

/// 搜索模式: 匹配谓词 + 前导长度
///
/// # Example
///
/// ```
/// use gpu_vanity::mode::Mode;
///
/// let mode = Mode::leading('8', 4).unwrap();
/// let mut address = [0u8; 20];
/// address[0] = 0x88;
/// address[1] = 0x88;
/// assert!(mode.matches(&address));
/// ```
#[derive(Debug, Clone)]
pub struct Mode {
    kind: ModeKind,
    /// 前导类谓词检查的字符个数
    length: usize,
}

impl Mode {
    /// 基准测试模式
    pub fn benchmark() -> Mode {
        Mode {
            kind: ModeKind::Benchmark,
            length: 0,
        }
    }

    /// 前导零模式
    pub fn zeros(length: usize) -> Result<Mode, SearchError> {
        Ok(Mode {
            kind: ModeKind::Zeros,
            length: check_length(length)?,
        })
    }

    /// 前导字母模式 (a-f)
    pub fn letters(length: usize) -> Result<Mode, SearchError> {
        Ok(Mode {
            kind: ModeKind::Letters,
            length: check_length(length)?,
        })
    }

    /// 前导数字模式 (0-9)
    pub fn numbers(length: usize) -> Result<Mode, SearchError> {
        Ok(Mode {
            kind: ModeKind::Numbers,
            length: check_length(length)?,
        })
    }

    /// 前导指定字符模式
    ///
    /// # Arguments
    ///
    /// * `c` - 十六进制字符 (0-9, a-f, 大小写均可)
    /// * `length` - 前导字符个数
    pub fn leading(c: char, length: usize) -> Result<Mode, SearchError> {
        let nibble = hex_nibble(c).ok_or_else(|| {
            SearchError::Config(format!("leading character must be hexadecimal, got '{}'", c))
        })?;
        Ok(Mode {
            kind: ModeKind::Leading(nibble),
            length: check_length(length)?,
        })
    }

    /// 子串匹配模式: 地址任意位置包含给定十六进制串
    pub fn matching(pattern: &str) -> Result<Mode, SearchError> {
        if pattern.is_empty() {
            return Err(SearchError::Config(
                "matching pattern must not be empty".into(),
            ));
        }
        if pattern.len() > ADDRESS_NIBBLES {
            return Err(SearchError::Config(format!(
                "matching pattern exceeds {} characters",
                ADDRESS_NIBBLES
            )));
        }
        let nibbles = pattern
            .chars()
            .map(hex_nibble)
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| {
                SearchError::Config(format!("matching pattern must be hexadecimal: {}", pattern))
            })?;
        Ok(Mode {
            kind: ModeKind::Matching(nibbles),
            length: 0,
        })
    }

    /// 前导 nibble 区间模式: 前 length 个字符的值均落在 [min, max]
    pub fn leading_range(min: u8, max: u8, length: usize) -> Result<Mode, SearchError> {
        if min > 15 || max > 15 {
            return Err(SearchError::Config(format!(
                "leading range bounds must be within 0-15, got {}-{}",
                min, max
            )));
        }
        if min > max {
            return Err(SearchError::Config(format!(
                "leading range min {} exceeds max {}",
                min, max
            )));
        }
        Ok(Mode {
            kind: ModeKind::LeadingRange { min, max },
            length: check_length(length)?,
        })
    }

    /// 数值区间模式: 地址前缀解析为整数后落在 [min, max]
    ///
    /// 上下界为十六进制字符串。参与比较的字符数由 max 的
    /// 有效位数决定, 例如 max = "255" 比较前 3 个字符。
    pub fn range(min: &str, max: &str) -> Result<Mode, SearchError> {
        let min = parse_range_bound(min)?;
        let max = parse_range_bound(max)?;
        if min > max {
            return Err(SearchError::Config(format!(
                "range min {:x} exceeds max {:x}",
                min, max
            )));
        }
        let digits = significant_hex_digits(max);
        Ok(Mode {
            kind: ModeKind::Range { min, max, digits },
            length: digits,
        })
    }

    /// 模式名称
    pub fn name(&self) -> &'static str {
        match self.kind {
            ModeKind::Benchmark => "benchmark",
            ModeKind::Zeros => "zeros",
            ModeKind::Letters => "letters",
            ModeKind::Numbers => "numbers",
            ModeKind::Leading(_) => "leading",
            ModeKind::Matching(_) => "matching",
            ModeKind::LeadingRange { .. } => "leading-range",
            ModeKind::Range { .. } => "range",
        }
    }

    /// 是否基准测试模式
    pub fn is_benchmark(&self) -> bool {
        matches!(self.kind, ModeKind::Benchmark)
    }

    /// 判断地址是否满足谓词。纯函数, 不分配。
    pub fn matches(&self, address: &[u8; ADDRESS_LEN]) -> bool {
        match &self.kind {
            ModeKind::Benchmark => false,
            ModeKind::Zeros => leading_in(address, self.length, 0x0, 0x0),
            ModeKind::Letters => leading_in(address, self.length, 0xa, 0xf),
            ModeKind::Numbers => leading_in(address, self.length, 0x0, 0x9),
            ModeKind::Leading(n) => leading_in(address, self.length, *n, *n),
            ModeKind::LeadingRange { min, max } => leading_in(address, self.length, *min, *max),
            ModeKind::Matching(pattern) => contains_nibbles(address, pattern),
            ModeKind::Range { min, max, digits } => {
                let value = leading_value(address, *digits);
                value >= *min && value <= *max
            }
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 地址第 i 个十六进制字符的 nibble 值
#[inline]
fn nibble(address: &[u8; ADDRESS_LEN], i: usize) -> u8 {
    let byte = address[i / 2];
    if i % 2 == 0 { byte >> 4 } else { byte & 0x0F }
}

/// 前 count 个 nibble 全部落在 [min, max]
fn leading_in(address: &[u8; ADDRESS_LEN], count: usize, min: u8, max: u8) -> bool {
    (0..count).all(|i| {
        let n = nibble(address, i);
        n >= min && n <= max
    })
}

/// 地址的 nibble 序列中是否包含给定子串
fn contains_nibbles(address: &[u8; ADDRESS_LEN], pattern: &[u8]) -> bool {
    if pattern.is_empty() || pattern.len() > ADDRESS_NIBBLES {
        return false;
    }
    (0..=ADDRESS_NIBBLES - pattern.len()).any(|start| {
        pattern
            .iter()
            .enumerate()
            .all(|(i, &p)| nibble(address, start + i) == p)
    })
}

/// 前 digits 个 nibble 组成的整数值 (大端)
fn leading_value(address: &[u8; ADDRESS_LEN], digits: usize) -> u64 {
    (0..digits).fold(0u64, |acc, i| (acc << 4) | nibble(address, i) as u64)
}

fn hex_nibble(c: char) -> Option<u8> {
    c.to_digit(16).map(|d| d as u8)
}

fn check_length(length: usize) -> Result<usize, SearchError> {
    if length == 0 || length > ADDRESS_NIBBLES {
        return Err(SearchError::Config(format!(
            "length must be between 1 and {}, got {}",
            ADDRESS_NIBBLES, length
        )));
    }
    Ok(length)
}

fn parse_range_bound(text: &str) -> Result<u64, SearchError> {
    if text.is_empty() || text.len() > 16 {
        return Err(SearchError::Config(format!(
            "range bound must be 1-16 hexadecimal characters, got '{}'",
            text
        )));
    }
    u64::from_str_radix(text, 16)
        .map_err(|_| SearchError::Config(format!("range bound must be hexadecimal: {}", text)))
}

/// 数值的有效十六进制位数 (0 视为 1 位)
fn significant_hex_digits(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    (64 - value.leading_zeros() as usize).div_ceil(4)
}
