use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::Logger;
use std::path::PathBuf;
use utility_bill_collator::{collect_inputs, run, Settings};

#[derive(Parser)]
#[command(name = "collate_bills")]
#[command(about = "将多份水电账单表格按账户/电表合并为一本工作簿")]
struct Cli {
    /// 账单文件或目录（目录下的 .xls/.xlsx 都会读取），默认当前目录
    inputs: Vec<PathBuf>,
    /// 输出文件路径，默认取配置中的 output_path
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// 配置文件路径（JSON）
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 以 JSON 输出运行汇总
    #[arg(long)]
    json: bool,
    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let _logger = Logger::try_with_env_or_str(level)
        .context("日志配置无效")?
        .start()
        .context("无法初始化日志")?;

    let settings = match &cli.config {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::default(),
    };
    let output = cli.output.clone().unwrap_or_else(|| settings.output_path.clone());

    let roots = if cli.inputs.is_empty() { vec![PathBuf::from(".")] } else { cli.inputs.clone() };
    let mut inputs = collect_inputs(&roots).context("无法列出输入文件")?;
    // 上一次运行的输出不能再作为账单读入
    if let Ok(out) = std::fs::canonicalize(&output) {
        inputs.retain(|p| std::fs::canonicalize(p).map(|p| p != out).unwrap_or(true));
    }
    if inputs.is_empty() {
        anyhow::bail!("没有找到任何 .xls/.xlsx 账单文件");
    }
    log::debug!("待处理文件: {:?}", inputs);

    let summary = run(&inputs, &output, &settings)
        .with_context(|| format!("写出 {} 失败，未生成输出文件", output.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }
    if summary.output.is_some() {
        println!("✅ 合并完成: {}", output.display());
    }
    Ok(())
}
