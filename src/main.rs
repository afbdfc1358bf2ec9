//! GPU以太坊靓号地址搜索系统 - 主程序
//!
//! 使用方式:
//!   cargo run --release -- --benchmark
//!   cargo run --release -- --leading 8 --length 5
//!   cargo run --release -- --matching deadbeef
//!   cargo run --release -- --range --min 0 --max 255 --skip 1

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use log::info;

use gpu_vanity::opencl::program::has_cached_binary;
use gpu_vanity::{
    ClRoundEngine, DispatchConfig, Dispatcher, Mode, OsSeedSource, PointTables, SearchError,
    SearchSink, enumerate_gpu_devices,
};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "gpu-vanity")]
#[command(about = "GPU以太坊靓号地址搜索系统 (多设备调度)")]
#[command(version = "0.1.0")]
struct Args {
    /// 基准测试模式 (只测吞吐, 不产生命中)
    #[arg(long, group = "mode")]
    benchmark: bool,

    /// 前导零搜索
    #[arg(long, group = "mode")]
    zeros: bool,

    /// 前导字母搜索 (a-f)
    #[arg(long, group = "mode")]
    letters: bool,

    /// 前导数字搜索 (0-9)
    #[arg(long, group = "mode")]
    numbers: bool,

    /// 前导指定字符搜索 (十六进制字符, 如 8)
    #[arg(long, group = "mode")]
    leading: Option<char>,

    /// 任意位置子串搜索 (十六进制, 如 deadbeef)
    #[arg(long, group = "mode")]
    matching: Option<String>,

    /// 前导 nibble 区间搜索 (配合 --min/--max, 取值 0-15)
    #[arg(long, group = "mode")]
    leading_range: bool,

    /// 地址前缀数值区间搜索 (配合 --min/--max, 十六进制)
    #[arg(long, group = "mode")]
    range: bool,

    /// 区间下界
    #[arg(short = 'm', long)]
    min: Option<String>,

    /// 区间上界
    #[arg(short = 'M', long)]
    max: Option<String>,

    /// 前导类模式检查的字符个数
    #[arg(long, default_value = "4")]
    length: usize,

    /// 跳过的设备序号 (可重复指定)
    #[arg(short, long)]
    skip: Vec<usize>,

    /// 本地工作组大小
    #[arg(short, long, default_value = "64")]
    work: usize,

    /// 全局工作规模上限
    #[arg(short = 'W', long, default_value = "1048576")]
    work_max: usize,

    /// 超时时间 (秒, 0 表示一直搜索)
    #[arg(long, default_value = "0")]
    timeout: u64,

    /// 内核二进制缓存目录
    #[arg(long, default_value = ".")]
    cache_dir: PathBuf,
}

/// 解析搜索模式
fn build_mode(args: &Args) -> anyhow::Result<Mode> {
    if args.benchmark {
        info!("搜索模式: 基准测试");
        return Ok(Mode::benchmark());
    }
    if args.zeros {
        info!("搜索模式: 前导零 x{}", args.length);
        return Ok(Mode::zeros(args.length)?);
    }
    if args.letters {
        info!("搜索模式: 前导字母 x{}", args.length);
        return Ok(Mode::letters(args.length)?);
    }
    if args.numbers {
        info!("搜索模式: 前导数字 x{}", args.length);
        return Ok(Mode::numbers(args.length)?);
    }
    if let Some(c) = args.leading {
        info!("搜索模式: 前导字符 '{}' x{}", c, args.length);
        return Ok(Mode::leading(c, args.length)?);
    }
    if let Some(pattern) = &args.matching {
        info!("搜索模式: 子串匹配 {}", pattern);
        return Ok(Mode::matching(pattern)?);
    }
    if args.leading_range {
        let (min, max) = require_bounds(args)?;
        info!("搜索模式: 前导区间 [{}, {}] x{}", min, max, args.length);
        let min = parse_nibble_bound(&min)?;
        let max = parse_nibble_bound(&max)?;
        return Ok(Mode::leading_range(min, max, args.length)?);
    }
    if args.range {
        let (min, max) = require_bounds(args)?;
        info!("搜索模式: 数值区间 [0x{}, 0x{}]", min, max);
        return Ok(Mode::range(&min, &max)?);
    }
    anyhow::bail!(
        "请指定搜索模式: --benchmark, --zeros, --letters, --numbers, \
         --leading, --matching, --leading-range 或 --range"
    )
}

fn require_bounds(args: &Args) -> anyhow::Result<(String, String)> {
    match (&args.min, &args.max) {
        (Some(min), Some(max)) => Ok((min.clone(), max.clone())),
        _ => anyhow::bail!("区间模式需要同时指定 --min 与 --max"),
    }
}

fn parse_nibble_bound(text: &str) -> anyhow::Result<u8> {
    text.parse::<u8>()
        .map_err(|_| anyhow::anyhow!("前导区间边界必须是 0-15 的十进制数: {}", text))
}

/// 校验工作规模参数并生成调度配置
fn build_dispatch_config(args: &Args) -> Result<DispatchConfig, SearchError> {
    if args.work == 0 {
        return Err(SearchError::Config(
            "local work size must be positive".into(),
        ));
    }
    if args.work_max < args.work {
        return Err(SearchError::Config(format!(
            "work max {} is below local work size {}",
            args.work_max, args.work
        )));
    }
    Ok(DispatchConfig {
        worksize_local: args.work,
        worksize_max: args.work_max,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        ..DispatchConfig::default()
    })
}

/// 主函数
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!("启动 GPU以太坊靓号地址搜索系统 (多设备调度)");

    let mode = build_mode(&args)?;
    let config = build_dispatch_config(&args)?;
    println!("Mode: {}", mode);

    // 设备枚举与列表展示
    let profiles = enumerate_gpu_devices(&args.skip)?;
    if profiles.is_empty() {
        anyhow::bail!("没有可用的 GPU 设备 (全部被跳过或未找到)");
    }
    std::fs::create_dir_all(&args.cache_dir)?;
    println!("Devices:");
    for profile in &profiles {
        println!(
            "  {}: {}, {} bytes available, {} compute units (precompiled = {})",
            profile.label(),
            profile.name,
            profile.global_mem_bytes,
            profile.compute_units,
            if has_cached_binary(&args.cache_dir, profile) {
                "yes"
            } else {
                "no"
            }
        );
    }

    info!("正在预计算偏移点表...");
    let tables = PointTables::generate(args.work_max)?;

    let sink = Arc::new(Mutex::new(SearchSink::new(Box::new(
        gpu_vanity::ConsoleReporter,
    ))));
    let mut dispatcher = Dispatcher::new(
        mode.clone(),
        config,
        Box::new(OsSeedSource),
        Arc::clone(&sink),
    );
    for profile in &profiles {
        let engine = ClRoundEngine::new(
            profile,
            &tables,
            args.work_max,
            args.work,
            &args.cache_dir,
        )?;
        dispatcher.register(profile.uid.clone(), profile.label(), engine);
    }

    // Ctrl+C 置位停止标志, 调度器排干在途轮次后返回
    let stop = Arc::new(AtomicBool::new(false));
    let stop_sig = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        println!("\n收到停止信号, 正在排干在途轮次...");
        stop_sig.store(true, Ordering::SeqCst);
    })
    .ok();

    println!();
    println!("开始搜索 (Ctrl+C 停止)...");
    let summary = dispatcher.run(&stop)?;

    println!();
    println!("========================================");
    if summary.matches > 0 {
        println!("✓ 搜索完成, 共找到 {} 个匹配", summary.matches);
    } else if mode.is_benchmark() {
        println!("✓ 基准测试完成");
    } else {
        println!("✗ 未找到符合条件的地址");
    }
    println!("========================================");
    let secs = summary.elapsed.as_secs_f64();
    let average = if secs > 0.0 {
        summary.candidates as f64 / secs / 1e6
    } else {
        0.0
    };
    println!(
        "轮次总数: {} | 退役设备: {}",
        summary.rounds, summary.devices_retired
    );
    println!(
        "检查地址数: {} | 平均速度: {:.2} MH/s",
        summary.candidates, average
    );
    println!("搜索时间: {:.2} 秒", secs);
    println!("========================================");

    Ok(())
}
