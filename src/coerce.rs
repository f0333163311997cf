//! 单元格数值与日期的宽松转换。
//!
//! 账单里的数字常带货币符号、千分位和单位（`$1,234.50`、`100 kWh`），
//! 日期可能是原生日期、Excel 序列号或多种文本格式。

use crate::grid::CellValue;
use chrono::{Datelike, Duration, NaiveDate};

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹'];
/// Excel 可表示的年份范围，超出的日期按无法解析处理
const EXCEL_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// 数值转换结果：数值本身与从文本尾部剥离出的单位
#[derive(Debug, Clone, PartialEq)]
pub struct Numeric {
    pub value: f64,
    pub unit: Option<String>,
}

/// 解析文本数字：去掉货币符号、千分位、空白；括号表示负数；尾部字母视为单位
pub fn parse_number(text: &str) -> Option<Numeric> {
    let mut s = text.trim();
    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = &s[1..s.len() - 1];
    }
    let mut cleaned: String = s
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();
    // 贷项标记
    if cleaned.ends_with("CR") {
        negative = !negative;
        cleaned.truncate(cleaned.len() - 2);
    }

    let bytes = cleaned.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    let digits = &cleaned[digits_start..end];
    if !digits.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut value: f64 = cleaned[..end].parse().ok()?;
    if negative {
        value = -value;
    }

    let rest = cleaned[end..].trim();
    let unit = if rest.is_empty() {
        None
    } else if rest.chars().all(|c| c.is_alphabetic() || "%/[]³²".contains(c)) {
        Some(rest.trim_matches(|c| c == '[' || c == ']').to_string()).filter(|u| !u.is_empty())
    } else {
        // 数字后跟的不是单位（例如 "12-34"），视为无法转换
        return None;
    };
    Some(Numeric { value, unit })
}

pub fn number_from_cell(cell: &CellValue) -> Option<Numeric> {
    match cell {
        CellValue::Number(n) => Some(Numeric { value: *n, unit: None }),
        CellValue::Text(s) => parse_number(s),
        _ => None,
    }
}

/// Excel 序列号转日期（1900 日期系统，以 1899-12-30 为零点）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

pub fn in_excel_range(date: NaiveDate) -> bool {
    EXCEL_YEARS.contains(&date.year())
}

/// 按给定格式顺序尝试解析文本日期，第一个成功且年份在 Excel 范围内的为准。
/// `%Y` 不限位数，"02/01/23" 在 `%Y/%m/%d` 下会得到公元 2 年，因此需要范围检查。
/// 带时间的文本（"2023-01-31 00:00:00"）按日期部分解析。
pub fn parse_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let date_part = text.split(['T', ' ']).next().unwrap_or(text);
    for candidate in [text, date_part] {
        if let Some(date) = formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok().filter(|d| in_excel_range(*d)))
        {
            return Some(date);
        }
    }
    None
}

pub fn date_from_cell(cell: &CellValue, formats: &[String]) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d).filter(|d| in_excel_range(*d)),
        CellValue::Number(n) => excel_serial_to_date(*n).filter(|d| in_excel_range(*d)),
        CellValue::Text(s) => parse_date(s, formats),
        _ => None,
    }
}

/// 拆分 "2023-01-01 to 2023-01-31" 一类的合并周期文本
pub fn parse_date_range(text: &str, formats: &[String]) -> Option<(NaiveDate, NaiveDate)> {
    const SEPARATORS: &[&str] = &[" to ", " through ", " thru ", " – ", " — ", " - ", "–", "~"];
    let lower = text.to_ascii_lowercase();
    SEPARATORS.iter().find_map(|sep| {
        let idx = lower.find(sep)?;
        let (left, right) = (&text[..idx], &text[idx + sep.len()..]);
        Some((parse_date(left, formats)?, parse_date(right, formats)?))
    })
}
