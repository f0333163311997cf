//! 从单个账单工作表中提取 `BillRecord`。
//!
//! 账单版式不固定，所有字段都通过标签锚点定位（见 [`crate::locator`]），
//! 用量表从表头行向下扫描，直到遇到结束标记（整行名称相等）或连续两行全空。

use crate::coerce::{date_from_cell, number_from_cell, parse_date_range};
use crate::error::BillError;
use crate::grid::{is_blank_row, CellGrid, CellValue};
use crate::locator::{find_in_row, label_equals, label_matches, locate, Located};
use crate::model::{AccountKey, BillRecord, LineItem, ParseWarning};
use crate::settings::{Field, RowFilter, Settings};
use chrono::NaiveDate;
use std::collections::HashMap;

/// 连续空行达到该数量即视为用量表结束；单个空行（合并单元格造成）会被跳过
const BLANK_ROWS_END_TABLE: usize = 2;

/// 一次提取的结果：记录或失败原因，以及过程中累积的警告
#[derive(Debug)]
pub struct Extraction {
    pub outcome: Result<BillRecord, BillError>,
    pub warnings: Vec<ParseWarning>,
}

/// 用量表的列布局
#[derive(Debug, Clone, Copy, PartialEq)]
struct TableLayout {
    header_row: usize,
    label_col: usize,
    quantity_col: Option<usize>,
    unit_col: Option<usize>,
    amount_col: usize,
}

pub fn extract(grid: &dyn CellGrid, source_file: &str, settings: &Settings) -> Extraction {
    let mut warnings = Vec::new();
    let outcome = extract_record(grid, source_file, settings, &mut warnings);
    if let Err(err) = &outcome {
        warnings.push(ParseWarning::new(source_file, err.to_string()));
    }
    Extraction { outcome, warnings }
}

fn extract_record(
    grid: &dyn CellGrid,
    source_file: &str,
    settings: &Settings,
    warnings: &mut Vec<ParseWarning>,
) -> Result<BillRecord, BillError> {
    let located = locate(grid, &settings.field_label_patterns);

    let account_id = read_identity(grid, &located, Field::AccountId)
        .ok_or(BillError::IdentityMissing("账户号"))?;
    let meter_id = read_identity(grid, &located, Field::MeterId)
        .ok_or(BillError::IdentityMissing("电表号"))?;
    let (period_start, period_end) = read_period(grid, &located, &settings.date_formats)?;
    if period_start > period_end {
        return Err(BillError::InvalidPeriod { start: period_start, end: period_end });
    }

    let layout = table_layout(grid, &located, settings)?;
    let line_items = read_line_items(grid, layout, source_file, settings, warnings);
    log::debug!("{}: 账户 {} 电表 {} 共 {} 行明细", source_file, account_id, meter_id, line_items.len());

    BillRecord::new(
        AccountKey::new(account_id, meter_id),
        period_start,
        period_end,
        line_items,
        source_file,
    )
    .ok_or(BillError::FieldMissing("usage line items"))
}

fn value_at(grid: &dyn CellGrid, located: &HashMap<Field, Located>, field: Field) -> Option<CellValue> {
    located.get(&field).map(|loc| grid.cell(loc.value.row, loc.value.col))
}

/// 账户号与电表号：按文本读取，数值型账户号去掉小数部分
fn read_identity(grid: &dyn CellGrid, located: &HashMap<Field, Located>, field: Field) -> Option<String> {
    let id = value_at(grid, located, field)?.display();
    // 标签与值写在同一单元格时（"Meter #: M1"）值格可能为空，这里不做猜测
    if id.is_empty() { None } else { Some(id) }
}

fn read_period(
    grid: &dyn CellGrid,
    located: &HashMap<Field, Located>,
    formats: &[String],
) -> Result<(NaiveDate, NaiveDate), BillError> {
    let start = value_at(grid, located, Field::PeriodStart).and_then(|c| date_from_cell(&c, formats));
    let end = value_at(grid, located, Field::PeriodEnd).and_then(|c| date_from_cell(&c, formats));
    if let (Some(start), Some(end)) = (start, end) {
        return Ok((start, end));
    }

    // 起止日期不全时退回到合并的“计费周期”字段
    value_at(grid, located, Field::BillingPeriod)
        .and_then(|c| c.as_text().and_then(|text| parse_date_range(text, formats)))
        .ok_or(BillError::FieldMissing("billing period"))
}

fn table_layout(
    grid: &dyn CellGrid,
    located: &HashMap<Field, Located>,
    settings: &Settings,
) -> Result<TableLayout, BillError> {
    let header = located
        .get(&Field::UsageTable)
        .ok_or(BillError::FieldMissing("usage table"))?;
    let columns = &settings.field_label_patterns.columns;
    let row = header.label.row;

    // 明细列自身不参与其余列头的匹配
    let find_after = |labels: &[String]| {
        find_in_row(grid, row, labels).filter(|&c| c != header.label.col)
    };
    let amount_col = find_after(&columns.amount[..]).ok_or(BillError::FieldMissing("amount column"))?;

    Ok(TableLayout {
        header_row: row,
        label_col: header.label.col,
        quantity_col: find_after(&columns.quantity[..]),
        unit_col: find_after(&columns.unit[..]),
        amount_col,
    })
}

/// 数量列表头中方括号内的单位，例如 "Metered Usage [kWh]"
fn header_unit(grid: &dyn CellGrid, row: usize, col: usize) -> Option<String> {
    let header = grid.cell(row, col).display();
    let open = header.find('[')?;
    let close = header[open..].find(']')? + open;
    let unit = header[open + 1..close].trim();
    if unit.is_empty() { None } else { Some(unit.to_string()) }
}

/// 将按列剔除规则解析为表头中的列号；表头中找不到的列不生效
fn row_filters<'a>(
    grid: &dyn CellGrid,
    layout: &TableLayout,
    filters: &'a [RowFilter],
    source_file: &str,
) -> Vec<(usize, &'a RowFilter)> {
    filters
        .iter()
        .filter_map(|filter| {
            let col = find_in_row(grid, layout.header_row, std::slice::from_ref(&filter.column));
            if col.is_none() {
                log::debug!("{}: 表头中没有 {:?} 列，剔除规则不生效", source_file, filter.column);
            }
            col.map(|c| (c, filter))
        })
        .collect()
}

fn read_line_items(
    grid: &dyn CellGrid,
    layout: TableLayout,
    source_file: &str,
    settings: &Settings,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<LineItem> {
    let mut items = Vec::new();
    let mut blank_run = 0;
    let default_unit = layout
        .quantity_col
        .and_then(|col| header_unit(grid, layout.header_row, col));
    let filters = row_filters(grid, &layout, &settings.excluded_rows, source_file);

    for row in layout.header_row + 1..grid.height() {
        if is_blank_row(grid, row) {
            blank_run += 1;
            if blank_run >= BLANK_ROWS_END_TABLE {
                log::debug!("{}: 第{}行起连续空行，用量表结束", source_file, row + 1);
                break;
            }
            continue;
        }
        blank_run = 0;

        let label_cell = grid.cell(row, layout.label_col);
        let label = label_cell.display();
        if label_equals(&label, &settings.table_end_markers) {
            log::debug!("{}: 第{}行遇到结束标记 {:?}", source_file, row + 1, label);
            break;
        }
        let amount_cell = grid.cell(row, layout.amount_col);
        if label_cell.is_blank() && amount_cell.is_blank() {
            continue;
        }
        if label_matches(&label, &settings.excluded_labels) {
            log::debug!("{}: 按配置剔除明细 {:?}", source_file, label);
            continue;
        }
        if let Some((col, filter)) = filters
            .iter()
            .find(|(col, filter)| label_equals(&grid.cell(row, *col).display(), std::slice::from_ref(&filter.value)))
        {
            log::debug!("{}: 第{}行第{}列为 {:?}，剔除明细 {:?}", source_file, row + 1, col + 1, filter.value, label);
            continue;
        }

        match read_line_item(grid, row, &layout, label, default_unit.as_deref()) {
            Ok(item) => items.push(item),
            Err(err) => {
                log::warn!("{}: {}，该明细已丢弃", source_file, err);
                warnings.push(ParseWarning::new(source_file, err.to_string()));
            }
        }
    }
    items
}

fn read_line_item(
    grid: &dyn CellGrid,
    row: usize,
    layout: &TableLayout,
    label: String,
    default_unit: Option<&str>,
) -> Result<LineItem, BillError> {
    let coercion_error = |column: &'static str, cell: &CellValue| BillError::ValueCoercion {
        row: row + 1,
        column,
        value: cell.display(),
    };

    let amount_cell = grid.cell(row, layout.amount_col);
    let amount = number_from_cell(&amount_cell).ok_or_else(|| coercion_error("amount", &amount_cell))?;

    let mut unit = layout
        .unit_col
        .map(|col| grid.cell(row, col).display())
        .filter(|u| !u.is_empty());
    let quantity = match layout.quantity_col.map(|col| grid.cell(row, col)) {
        Some(cell) if !cell.is_blank() => {
            let parsed = number_from_cell(&cell).ok_or_else(|| coercion_error("quantity", &cell))?;
            if unit.is_none() {
                unit = parsed.unit;
            }
            Some(parsed.value)
        }
        _ => None,
    };
    if quantity.is_some() && unit.is_none() {
        unit = default_unit.map(str::to_string);
    }

    Ok(LineItem::new(label, quantity, unit, amount.value))
}
