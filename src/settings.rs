use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 标签与取值单元格之间的位置关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRule {
    /// 值在标签右侧第 N 个单元格
    Right(usize),
    /// 值在标签下方第 N 行、同一列
    Below(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPattern {
    pub labels: Vec<String>,
    #[serde(default = "default_rule")]
    pub rule: ValueRule,
}

fn default_rule() -> ValueRule { ValueRule::Right(1) }

impl FieldPattern {
    pub fn new(labels: &[&str], rule: ValueRule) -> Self {
        Self { labels: labels.iter().map(|s| s.to_string()).collect(), rule }
    }
}

/// 账单中需要定位的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    AccountId,
    MeterId,
    PeriodStart,
    PeriodEnd,
    BillingPeriod,
    /// 用量表的表头（明细名称所在列）
    UsageTable,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::AccountId => "account id",
            Field::MeterId => "meter id",
            Field::PeriodStart => "period start",
            Field::PeriodEnd => "period end",
            Field::BillingPeriod => "billing period",
            Field::UsageTable => "usage table",
        }
    }
}

/// 用量表内各列的表头候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLabels {
    pub quantity: Vec<String>,
    pub unit: Vec<String>,
    pub amount: Vec<String>,
}

impl Default for ColumnLabels {
    fn default() -> Self {
        Self {
            quantity: strings(&["quantity", "usage", "consumption", "kwh"]),
            unit: strings(&["unit", "uom"]),
            amount: strings(&["amount", "cost", "charge ($)", "charges"]),
        }
    }
}

/// 字段定位规则表：字段 -> 可接受的标签及取值位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPatterns {
    pub fields: BTreeMap<Field, FieldPattern>,
    pub columns: ColumnLabels,
}

impl FieldPatterns {
    pub fn get(&self, field: Field) -> Option<&FieldPattern> {
        self.fields.get(&field)
    }
}

impl Default for FieldPatterns {
    fn default() -> Self {
        let right = ValueRule::Right(1);
        let mut fields = BTreeMap::new();
        fields.insert(Field::AccountId, FieldPattern::new(&["account number", "account no", "account #", "account id"], right));
        fields.insert(Field::MeterId, FieldPattern::new(&["meter number", "meter no", "meter #", "meter id"], right));
        fields.insert(Field::PeriodStart, FieldPattern::new(&["reading from date", "period start", "service from", "from date"], right));
        fields.insert(Field::PeriodEnd, FieldPattern::new(&["reading to date", "period end", "service to", "to date"], right));
        fields.insert(Field::BillingPeriod, FieldPattern::new(&["billing period", "service period"], right));
        // 表头单元格本身即为定位点，值从下一行开始
        fields.insert(Field::UsageTable, FieldPattern::new(&["description", "line item", "charge type"], ValueRule::Below(1)));
        Self { fields, columns: ColumnLabels::default() }
    }
}

/// 输出工作表的命名方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetNaming {
    #[default]
    Meter,
    Account,
    AccountMeter,
}

/// 按列剔除明细：表头包含 `column` 的列中，取值等于 `value` 的行被丢弃
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self { column: column.into(), value: value.into() }
    }
}

/// 运行配置，由外部加载后传入核心
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub field_label_patterns: FieldPatterns,
    /// 按顺序尝试的文本日期格式（chrono 格式串）
    pub date_formats: Vec<String>,
    pub output_path: PathBuf,
    /// 优先读取的工作表名称，不存在时读取第一个工作表
    pub preferred_sheet: Option<String>,
    /// 明细名称整体等于其中之一时用量表结束（忽略大小写、空白与末尾冒号）
    pub table_end_markers: Vec<String>,
    /// 需要剔除的明细名称（不区分大小写的子串）
    pub excluded_labels: Vec<String>,
    pub excluded_rows: Vec<RowFilter>,
    /// 工作表别名，键为 "账户/电表"、电表号或账户号
    pub aliases: BTreeMap<String, String>,
    pub sheet_naming: SheetNaming,
    /// 共用边界日的相邻周期是否算作重叠
    pub touching_periods_overlap: bool,
    /// 追加“计费天数”和“日均用量”两列
    pub derived_columns: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            field_label_patterns: FieldPatterns::default(),
            date_formats: strings(&[
                "%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%m/%d/%y", "%d-%b-%Y", "%b %d, %Y", "%B %d, %Y", "%d %B %Y",
            ]),
            output_path: PathBuf::from("output.xlsx"),
            preferred_sheet: Some("Invoice Summary".to_string()),
            table_end_markers: strings(&[
                "total", "totals", "total amount due", "total due", "total charges", "total current charges",
                "amount due", "balance", "balance due",
            ]),
            excluded_labels: Vec::new(),
            excluded_rows: Vec::new(),
            aliases: BTreeMap::new(),
            sheet_naming: SheetNaming::default(),
            touching_periods_overlap: true,
            derived_columns: false,
        }
    }
}

impl Settings {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
        Ok(settings)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
