use anyhow::{Context, Result};
use clap::Parser;
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "generate_sample")]
#[command(about = "生成几份示例账单，用于试用 collate_bills")]
struct Cli {
    /// 输出目录
    #[arg(short, long, default_value = "samples")]
    dir: PathBuf,
}

struct SampleBill {
    file: &'static str,
    account: &'static str,
    meter: &'static str,
    from: &'static str,
    to: &'static str,
    usage_kwh: f64,
    energy: f64,
    delivery: f64,
}

const SAMPLES: &[SampleBill] = &[
    SampleBill { file: "m1_2023_01.xlsx", account: "100234", meter: "M1", from: "2023-01-01", to: "2023-01-31", usage_kwh: 100.0, energy: 20.0, delivery: 6.5 },
    SampleBill { file: "m1_2023_02.xlsx", account: "100234", meter: "M1", from: "2023-02-01", to: "2023-02-28", usage_kwh: 120.0, energy: 24.0, delivery: 6.5 },
    SampleBill { file: "m2_2023_01.xlsx", account: "100234", meter: "M2", from: "01/05/2023", to: "02/04/2023", usage_kwh: 480.0, energy: 96.0, delivery: 11.0 },
    // 与 M1 二月账单周期重叠
    SampleBill { file: "m1_2023_02_rebill.xlsx", account: "100234", meter: "M1", from: "2023-02-15", to: "2023-03-14", usage_kwh: 60.0, energy: 12.0, delivery: 6.5 },
];

fn write_bill(dir: &Path, bill: &SampleBill) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Invoice Summary")?;

    sheet.write_string_with_format(0, 0, "City Hydro - Statement", &bold)?;
    sheet.write_string(2, 0, "Account Number")?;
    sheet.write_string(2, 1, bill.account)?;
    sheet.write_string(3, 0, "Meter Number")?;
    sheet.write_string(3, 1, bill.meter)?;
    sheet.write_string(4, 0, "Reading From Date")?;
    sheet.write_string(4, 1, bill.from)?;
    sheet.write_string(4, 3, "Reading To Date")?;
    sheet.write_string(4, 4, bill.to)?;

    for (col, header) in ["Description", "Metered Usage [kWh]", "Amount"].iter().enumerate() {
        sheet.write_string_with_format(7, col as u16, *header, &bold)?;
    }
    sheet.write_string(8, 0, "Energy")?;
    sheet.write_number(8, 1, bill.usage_kwh)?;
    sheet.write_string(8, 2, format!("${:.2}", bill.energy))?;
    sheet.write_string(9, 0, "Delivery")?;
    sheet.write_number(9, 2, bill.delivery)?;
    sheet.write_string(10, 0, "Total Amount Due")?;
    sheet.write_number(10, 2, bill.energy + bill.delivery)?;

    let path = dir.join(bill.file);
    workbook
        .save(&path)
        .with_context(|| format!("无法写入 {}", path.display()))?;
    println!("生成 {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.dir)
        .with_context(|| format!("无法创建目录: {}", cli.dir.display()))?;
    for bill in SAMPLES {
        write_bill(&cli.dir, bill)?;
    }
    println!("✅ 已生成 {} 份示例账单", SAMPLES.len());
    Ok(())
}
