use crate::coerce::excel_serial_to_date;
use crate::error::BillError;
use calamine::{open_workbook_auto, DataType, Range, Reader};
use chrono::NaiveDate;
use std::path::Path;

/// 单元格取值，与具体表格库解耦
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl CellValue {
    pub fn text(s: &str) -> Self { CellValue::Text(s.to_string()) }

    /// 空单元格或只含空白的文本
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 以文本形式展示；整数值的浮点（如账户号 1234567.0）不带小数
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Bool(b) => b.to_string(),
        }
    }
}

/// 类似工作表的二维网格：只需要按坐标取值
pub trait CellGrid {
    fn height(&self) -> usize;
    fn width(&self) -> usize;
    /// 越界坐标返回 `CellValue::Empty`
    fn cell(&self, row: usize, col: usize) -> CellValue;
}

/// 内存中的行优先网格
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<CellValue>>,
    width: usize,
}

impl Grid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        Self { rows, width }
    }

    /// 测试与样例中常用：用字符串构造网格，空串为空单元格，可解析的数字存为数值
    pub fn from_strs(rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|s| {
                        if s.trim().is_empty() {
                            CellValue::Empty
                        } else if let Ok(n) = s.trim().parse::<f64>() {
                            CellValue::Number(n)
                        } else {
                            CellValue::text(s)
                        }
                    })
                    .collect()
            })
            .collect();
        Self::new(rows)
    }

    pub fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, CellValue::Empty);
        }
        cells[col] = value;
        self.width = self.width.max(col + 1);
    }
}

impl CellGrid for Grid {
    fn height(&self) -> usize { self.rows.len() }
    fn width(&self) -> usize { self.width }

    fn cell(&self, row: usize, col: usize) -> CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or_default()
    }
}

pub fn is_blank_row(grid: &dyn CellGrid, row: usize) -> bool {
    (0..grid.width()).all(|col| grid.cell(row, col).is_blank())
}

fn convert(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty => CellValue::Empty,
        DataType::String(s) => CellValue::Text(s.clone()),
        DataType::Float(f) => CellValue::Number(*f),
        DataType::Int(i) => CellValue::Number(*i as f64),
        DataType::Bool(b) => CellValue::Bool(*b),
        DataType::DateTime(serial) => excel_serial_to_date(*serial)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(*serial)),
        DataType::Error(_) => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

/// 按绝对坐标放置：区域不一定从 A1 开始
fn range_to_grid(range: &Range<DataType>) -> Grid {
    let mut grid = Grid::default();
    let Some((start_row, start_col)) = range.start() else {
        return grid;
    };
    for (i, row) in range.rows().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            let value = convert(cell);
            if value != CellValue::Empty {
                grid.set(start_row as usize + i, start_col as usize + j, value);
            }
        }
    }
    grid
}

/// 读取表格文件的一个工作表（支持 .xls 与 .xlsx）。
/// `preferred_sheet` 存在时读取该表，否则读取第一个工作表。
pub fn load_sheet(path: &Path, preferred_sheet: Option<&str>) -> Result<Grid, BillError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| BillError::Load(format!("无法打开 {}: {}", path.display(), e)))?;
    let names = workbook.sheet_names().to_vec();
    let sheet_name = preferred_sheet
        .and_then(|want| names.iter().find(|n| n.eq_ignore_ascii_case(want)))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| BillError::Load(format!("{} 中没有工作表", path.display())))?;

    log::debug!("读取 {} 的工作表 {}", path.display(), sheet_name);
    let range = workbook
        .worksheet_range(&sheet_name)
        .ok_or_else(|| BillError::Load(format!("找不到工作表: {}", sheet_name)))?
        .map_err(|e| BillError::Load(format!("无法读取工作表 {}: {}", sheet_name, e)))?;
    Ok(range_to_grid(&range))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_cells_are_empty() {
        let grid = Grid::from_strs(&[&["a", "1"], &["b"]]);
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.cell(1, 1), CellValue::Empty);
        assert_eq!(grid.cell(9, 9), CellValue::Empty);
        assert_eq!(grid.cell(0, 1), CellValue::Number(1.0));
    }

    #[test]
    fn blank_rows_ignore_whitespace_text() {
        let grid = Grid::from_strs(&[&["", "  "], &["", "x"]]);
        assert!(is_blank_row(&grid, 0));
        assert!(!is_blank_row(&grid, 1));
        assert!(is_blank_row(&grid, 5));
    }

    #[test]
    fn whole_numbers_display_without_fraction() {
        assert_eq!(CellValue::Number(1234567.0).display(), "1234567");
        assert_eq!(CellValue::Number(12.5).display(), "12.5");
        assert_eq!(CellValue::text("  M1 ").display(), "M1");
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_sheet(Path::new("/nonexistent/bill.xls"), None).unwrap_err();
        assert_eq!(err.kind(), "LoadError");
    }
}
