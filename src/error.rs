use chrono::NaiveDate;
use std::path::PathBuf;

/// 单个输入文件的处理错误：全部在文件级别恢复（跳过该文件继续）
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BillError {
    #[error("无法读取表格文件: {0}")]
    Load(String),

    #[error("未找到{0}，无法确定账单归属")]
    IdentityMissing(&'static str),

    #[error("未找到必需字段: {0}")]
    FieldMissing(&'static str),

    #[error("计费周期无效: 开始 {start} 晚于结束 {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    #[error("第{row}行 {column} 无法转换: {value:?}")]
    ValueCoercion { row: usize, column: &'static str, value: String },
}

impl BillError {
    /// 汇总报告中使用的稳定错误类别名
    pub fn kind(&self) -> &'static str {
        match self {
            BillError::Load(_) => "LoadError",
            BillError::IdentityMissing(_) => "IdentityMissing",
            BillError::FieldMissing(_) => "FieldMissing",
            BillError::InvalidPeriod { .. } => "InvalidPeriod",
            BillError::ValueCoercion { .. } => "ValueCoercionError",
        }
    }
}

/// 输出工作簿写入失败，整个运行终止且不留下半成品文件
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("无法创建输出文件 {}: {source}", .path.display())]
    Create { path: PathBuf, source: std::io::Error },

    #[error("写入工作表 '{sheet}' 失败: {source}")]
    Sheet { sheet: String, source: rust_xlsxwriter::XlsxError },

    #[error("生成工作簿失败: {0}")]
    Workbook(#[source] rust_xlsxwriter::XlsxError),

    #[error("无法将输出移动到 {}: {source}", .path.display())]
    Persist { path: PathBuf, source: std::io::Error },
}

impl WriteError {
    pub fn sheet(sheet: &str, source: rust_xlsxwriter::XlsxError) -> Self {
        WriteError::Sheet { sheet: sheet.to_string(), source }
    }
}
