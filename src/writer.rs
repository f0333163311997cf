use crate::collator::Collation;
use crate::error::WriteError;
use crate::model::{AccountKey, BillRecord};
use crate::settings::{SheetNaming, Settings};
use chrono::Datelike;
use rust_xlsxwriter::{Color, ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const HEADERS: [&str; 6] = ["Period Start", "Period End", "Label", "Quantity", "Unit", "Amount"];
const DERIVED_HEADERS: [&str; 2] = ["Days In Period", "Quantity Per Day"];

/// Excel 工作表名称上限
const MAX_SHEET_NAME_CHARS: usize = 31;
const INVALID_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];
/// 冲突记录所在行的底色
const CONFLICT_FILL: u32 = 0xFFC7CE;

struct Formats {
    header: Format,
    date: Format,
    plain: Format,
    conflict_date: Format,
    conflict: Format,
}

impl Formats {
    fn new() -> Self {
        let date = Format::new().set_num_format("yyyy-mm-dd");
        Self {
            header: Format::new().set_bold(),
            conflict_date: date.clone().set_background_color(Color::RGB(CONFLICT_FILL)),
            date,
            plain: Format::new(),
            conflict: Format::new().set_background_color(Color::RGB(CONFLICT_FILL)),
        }
    }
}

/// 去掉 Excel 不允许的字符并截断到 31 个字符
pub fn sanitize_sheet_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let trimmed = replaced.trim().trim_matches('\'').trim();
    let name: String = trimmed.chars().take(MAX_SHEET_NAME_CHARS).collect();
    let name = name.trim_end_matches('\'').to_string();
    if name.is_empty() { "Sheet".to_string() } else { name }
}

fn base_sheet_name(key: &AccountKey, settings: &Settings) -> String {
    let alias = [key.to_string(), key.meter_id.clone(), key.account_id.clone()]
        .iter()
        .find_map(|k| settings.aliases.get(k).cloned());
    alias.unwrap_or_else(|| match settings.sheet_naming {
        SheetNaming::Meter => key.meter_id.clone(),
        SheetNaming::Account => key.account_id.clone(),
        SheetNaming::AccountMeter => format!("{}-{}", key.account_id, key.meter_id),
    })
}

/// 为每个分组分配工作表名称；清洗后重名的追加 " (2)"、" (3)" 等后缀（不区分大小写）
pub fn sheet_names(collation: &Collation, settings: &Settings) -> Vec<(AccountKey, String)> {
    // Excel 保留名称
    let mut used: HashSet<String> = HashSet::from(["history".to_string()]);
    collation
        .groups
        .keys()
        .map(|key| {
            let base = sanitize_sheet_name(&base_sheet_name(key, settings));
            let mut name = base.clone();
            let mut n = 2;
            while used.contains(&name.to_lowercase()) {
                let suffix = format!(" ({})", n);
                let room = MAX_SHEET_NAME_CHARS - suffix.chars().count();
                name = format!("{}{}", base.chars().take(room).collect::<String>(), suffix);
                n += 1;
            }
            used.insert(name.to_lowercase());
            (key.clone(), name)
        })
        .collect()
}

fn excel_date(date: chrono::NaiveDate) -> Result<ExcelDateTime, XlsxError> {
    // 负年份不截断，交由 from_ymd 报出范围错误
    let year = u16::try_from(date.year()).unwrap_or(0);
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
}

fn write_record_rows(
    worksheet: &mut Worksheet,
    first_row: u32,
    record: &BillRecord,
    conflicted: bool,
    derived: bool,
    formats: &Formats,
) -> Result<u32, XlsxError> {
    let (date_format, format) = if conflicted {
        (&formats.conflict_date, &formats.conflict)
    } else {
        (&formats.date, &formats.plain)
    };
    let start = excel_date(record.period_start())?;
    let end = excel_date(record.period_end())?;
    let days = record.days_in_period();

    let mut row = first_row;
    for item in record.line_items() {
        worksheet.write_datetime_with_format(row, 0, &start, date_format)?;
        worksheet.write_datetime_with_format(row, 1, &end, date_format)?;
        worksheet.write_string_with_format(row, 2, &item.label, format)?;
        match item.quantity {
            Some(q) => worksheet.write_number_with_format(row, 3, q, format)?,
            None => worksheet.write_blank(row, 3, format)?,
        };
        match &item.unit {
            Some(u) => worksheet.write_string_with_format(row, 4, u, format)?,
            None => worksheet.write_blank(row, 4, format)?,
        };
        worksheet.write_number_with_format(row, 5, item.amount, format)?;

        if derived {
            worksheet.write_number_with_format(row, 6, days as f64, format)?;
            match item.quantity.filter(|_| days > 0) {
                Some(q) => worksheet.write_number_with_format(row, 7, q / days as f64, format)?,
                None => worksheet.write_blank(row, 7, format)?,
            };
        }
        row += 1;
    }
    Ok(row)
}

fn write_sheet(
    workbook: &mut Workbook,
    name: &str,
    records: &[BillRecord],
    collation: &Collation,
    settings: &Settings,
    formats: &Formats,
) -> Result<(), XlsxError> {
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(name)?;

    let mut headers: Vec<&str> = HEADERS.to_vec();
    if settings.derived_columns {
        headers.extend(DERIVED_HEADERS);
    }
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &formats.header)?;
        worksheet.set_column_width(col as u16, if col == 2 { 28 } else { 14 })?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    let mut row = 1u32;
    for record in records {
        row = write_record_rows(
            worksheet,
            row,
            record,
            collation.is_conflicted(record),
            settings.derived_columns,
            formats,
        )?;
    }
    Ok(())
}

/// 在内存中生成整本工作簿，返回 xlsx 字节与各工作表名称
pub fn render_workbook(collation: &Collation, settings: &Settings) -> Result<(Vec<u8>, Vec<String>), WriteError> {
    let mut workbook = Workbook::new();
    let formats = Formats::new();
    let mut written = Vec::new();

    for (key, name) in sheet_names(collation, settings) {
        let records = &collation.groups[&key];
        write_sheet(&mut workbook, &name, records, collation, settings, &formats)
            .map_err(|e| WriteError::sheet(&name, e))?;
        log::info!("账户 {} 写入工作表 {}（{} 份账单）", key, name, records.len());
        written.push(name);
    }

    let buf = workbook.save_to_buffer().map_err(WriteError::Workbook)?;
    Ok((buf, written))
}

/// 写出合并后的工作簿。任一工作表失败即整体失败；先写入同目录的临时文件，
/// 成功后再原子地移动到目标位置，失败时不会留下不完整的输出。
pub fn write_workbook(collation: &Collation, destination: &Path, settings: &Settings) -> Result<Vec<String>, WriteError> {
    let (buf, written) = render_workbook(collation, settings)?;

    let dir = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let create_error = |source| WriteError::Create { path: destination.to_path_buf(), source };
    let mut tmp = NamedTempFile::new_in(dir).map_err(create_error)?;
    tmp.write_all(&buf).map_err(create_error)?;
    tmp.flush().map_err(create_error)?;
    tmp.persist(destination)
        .map_err(|e| WriteError::Persist { path: destination.to_path_buf(), source: e.error })?;
    Ok(written)
}
