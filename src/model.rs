use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// 账单中的一行费用明细（一个用量档位或收费项目）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub label: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub amount: f64,
}

impl LineItem {
    pub fn new(label: impl Into<String>, quantity: Option<f64>, unit: Option<String>, amount: f64) -> Self {
        Self { label: label.into(), quantity, unit, amount }
    }
}

/// 账户/电表身份，排序后决定输出工作表的顺序
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AccountKey {
    pub account_id: String,
    pub meter_id: String,
}

impl AccountKey {
    pub fn new(account_id: impl Into<String>, meter_id: impl Into<String>) -> Self {
        Self { account_id: account_id.into(), meter_id: meter_id.into() }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.meter_id)
    }
}

/// 从一份账单中提取出的结构化记录，创建后不可修改
#[derive(Debug, Clone, Serialize)]
pub struct BillRecord {
    key: AccountKey,
    period_start: NaiveDate,
    period_end: NaiveDate,
    line_items: Vec<LineItem>,
    source_file: String,
}

impl BillRecord {
    /// 校验身份非空、起止日期有序、至少一行明细；不满足时返回 `None`
    pub fn new(
        key: AccountKey,
        period_start: NaiveDate,
        period_end: NaiveDate,
        line_items: Vec<LineItem>,
        source_file: impl Into<String>,
    ) -> Option<Self> {
        if key.account_id.trim().is_empty() || key.meter_id.trim().is_empty() {
            return None;
        }
        if period_start > period_end || line_items.is_empty() {
            return None;
        }
        Some(Self { key, period_start, period_end, line_items, source_file: source_file.into() })
    }

    pub fn key(&self) -> &AccountKey { &self.key }
    pub fn account_id(&self) -> &str { &self.key.account_id }
    pub fn meter_id(&self) -> &str { &self.key.meter_id }
    pub fn period_start(&self) -> NaiveDate { self.period_start }
    pub fn period_end(&self) -> NaiveDate { self.period_end }
    pub fn line_items(&self) -> &[LineItem] { &self.line_items }
    pub fn source_file(&self) -> &str { &self.source_file }

    /// 计费天数（结束日减开始日，与原抄表天数口径一致）
    pub fn days_in_period(&self) -> i64 {
        (self.period_end - self.period_start).num_days()
    }

    /// 闭区间重叠判断；`touching` 为 false 时共用边界日不算重叠
    pub fn overlaps(&self, other: &BillRecord, touching: bool) -> bool {
        if touching {
            self.period_start <= other.period_end && other.period_start <= self.period_end
        } else {
            self.period_start < other.period_end && other.period_start < self.period_end
        }
    }
}

// 来源文件不参与比较：两份文件内容完全一致即视为重复账单
impl PartialEq for BillRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.period_start == other.period_start
            && self.period_end == other.period_end
            && self.line_items == other.line_items
    }
}

/// 非致命的解析警告，运行结束时统一汇报
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseWarning {
    pub source_file: String,
    pub reason: String,
}

impl ParseWarning {
    pub fn new(source_file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { source_file: source_file.into(), reason: reason.into() }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_file, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(start: NaiveDate, end: NaiveDate) -> BillRecord {
        BillRecord::new(
            AccountKey::new("A1", "M1"),
            start,
            end,
            vec![LineItem::new("Energy", Some(100.0), Some("kWh".into()), 20.0)],
            "a.xls",
        )
        .unwrap()
    }

    #[test]
    fn rejects_reversed_period_and_blank_identity() {
        let items = vec![LineItem::new("Energy", None, None, 1.0)];
        assert!(BillRecord::new(AccountKey::new("A", "M"), date(2023, 2, 1), date(2023, 1, 1), items.clone(), "x").is_none());
        assert!(BillRecord::new(AccountKey::new(" ", "M"), date(2023, 1, 1), date(2023, 1, 31), items.clone(), "x").is_none());
        assert!(BillRecord::new(AccountKey::new("A", "M"), date(2023, 1, 1), date(2023, 1, 31), Vec::new(), "x").is_none());
    }

    #[test]
    fn equality_ignores_source_file() {
        let a = record(date(2023, 1, 1), date(2023, 1, 31));
        let b = BillRecord::new(a.key().clone(), a.period_start(), a.period_end(), a.line_items().to_vec(), "b.xls").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_boundary_day_depends_on_policy() {
        let jan = record(date(2023, 1, 1), date(2023, 2, 1));
        let feb = record(date(2023, 2, 1), date(2023, 3, 1));
        assert!(jan.overlaps(&feb, true));
        assert!(!jan.overlaps(&feb, false));
        assert_eq!(jan.days_in_period(), 31);
    }
}
