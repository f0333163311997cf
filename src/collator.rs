use crate::model::{AccountKey, BillRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// 同一账户/电表下计费周期重叠的两份账单（两份都会保留在输出中）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub key: AccountKey,
    pub first: BillRecord,
    pub second: BillRecord,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ~ {} ({}) 与 {} ~ {} ({}) 重叠",
            self.key,
            self.first.period_start(),
            self.first.period_end(),
            self.first.source_file(),
            self.second.period_start(),
            self.second.period_end(),
            self.second.source_file(),
        )
    }
}

/// 汇总完成后的结果，之后不再修改
#[derive(Debug, Clone, Default)]
pub struct Collation {
    pub groups: BTreeMap<AccountKey, Vec<BillRecord>>,
    pub conflicts: Vec<Conflict>,
    pub duplicates_removed: usize,
}

impl Collation {
    pub fn is_empty(&self) -> bool { self.groups.is_empty() }

    /// 该记录是否出现在某个冲突中（用于输出时标记）
    pub fn is_conflicted(&self, record: &BillRecord) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.key == *record.key() && (c.first == *record || c.second == *record))
    }
}

/// 按账户/电表分组收集账单
#[derive(Debug, Default)]
pub struct Collator {
    groups: BTreeMap<AccountKey, Vec<BillRecord>>,
    touching_periods_overlap: bool,
}

impl Collator {
    pub fn new(touching_periods_overlap: bool) -> Self {
        Self { groups: BTreeMap::new(), touching_periods_overlap }
    }

    pub fn add(&mut self, record: BillRecord) {
        self.groups.entry(record.key().clone()).or_default().push(record);
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool { self.groups.is_empty() }

    /// 各组按开始日期排序（结束日期为次序），去除完全相同的重复账单，
    /// 再将每份账单与此前结束日期最晚的账单比较，检查周期是否重叠
    pub fn finalize(self) -> Collation {
        let mut collation = Collation::default();
        for (key, mut records) in self.groups {
            // 稳定排序：同一周期的记录保持加入顺序
            records.sort_by_key(|r| (r.period_start(), r.period_end()));

            let mut kept: Vec<BillRecord> = Vec::with_capacity(records.len());
            for record in records {
                let duplicate = kept
                    .iter()
                    .rev()
                    .take_while(|k| k.period_start() == record.period_start() && k.period_end() == record.period_end())
                    .any(|k| *k == record);
                if duplicate {
                    log::info!("{}: {} 与已有账单完全相同，已去重", key, record.source_file());
                    collation.duplicates_removed += 1;
                } else {
                    kept.push(record);
                }
            }

            // 已按开始日期排序，只要与覆盖最远的账单不重叠，就与之前所有账单都不重叠
            let mut reach = 0;
            for i in 1..kept.len() {
                if kept[reach].overlaps(&kept[i], self.touching_periods_overlap) {
                    let conflict = Conflict { key: key.clone(), first: kept[reach].clone(), second: kept[i].clone() };
                    log::warn!("周期冲突 {}", conflict);
                    collation.conflicts.push(conflict);
                }
                if kept[i].period_end() > kept[reach].period_end() {
                    reach = i;
                }
            }
            collation.groups.insert(key, kept);
        }
        collation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(meter: &str, start: NaiveDate, end: NaiveDate, amount: f64, file: &str) -> BillRecord {
        BillRecord::new(
            AccountKey::new("A1", meter),
            start,
            end,
            vec![LineItem::new("Energy", Some(100.0), Some("kWh".into()), amount)],
            file,
        )
        .unwrap()
    }

    #[test]
    fn groups_by_identity_and_sorts_by_period() {
        let mut collator = Collator::new(true);
        collator.add(record("M1", date(2023, 3, 1), date(2023, 3, 31), 3.0, "mar"));
        collator.add(record("M2", date(2023, 1, 1), date(2023, 1, 31), 9.0, "other"));
        collator.add(record("M1", date(2023, 1, 1), date(2023, 1, 31), 1.0, "jan"));
        collator.add(record("M1", date(2023, 2, 1), date(2023, 2, 28), 2.0, "feb"));
        assert_eq!(collator.len(), 4);

        let collation = collator.finalize();
        assert!(collation.conflicts.is_empty());
        let m1: Vec<&str> = collation.groups[&AccountKey::new("A1", "M1")]
            .iter()
            .map(|r| r.source_file())
            .collect();
        assert_eq!(m1, vec!["jan", "feb", "mar"]);
        assert_eq!(collation.groups[&AccountKey::new("A1", "M2")].len(), 1);
    }

    #[test]
    fn tie_on_start_breaks_on_end() {
        let mut collator = Collator::new(false);
        collator.add(record("M1", date(2023, 1, 1), date(2023, 2, 28), 1.0, "long"));
        collator.add(record("M1", date(2023, 1, 1), date(2023, 1, 31), 2.0, "short"));
        let collation = collator.finalize();
        let files: Vec<&str> = collation.groups[&AccountKey::new("A1", "M1")].iter().map(|r| r.source_file()).collect();
        assert_eq!(files, vec!["short", "long"]);
        assert_eq!(collation.conflicts.len(), 1);
    }

    #[test]
    fn exact_duplicates_are_removed_silently() {
        let mut collator = Collator::new(true);
        collator.add(record("M1", date(2023, 1, 1), date(2023, 1, 31), 20.0, "a"));
        collator.add(record("M1", date(2023, 1, 1), date(2023, 1, 31), 21.0, "b"));
        collator.add(record("M1", date(2023, 1, 1), date(2023, 1, 31), 20.0, "c"));
        let collation = collator.finalize();
        assert_eq!(collation.duplicates_removed, 1);
        let group = &collation.groups[&AccountKey::new("A1", "M1")];
        assert_eq!(group.len(), 2);
        // 同周期不同明细仍算冲突
        assert_eq!(collation.conflicts.len(), 1);
    }

    #[test]
    fn overlap_is_reported_once_and_both_records_kept() {
        let mut collator = Collator::new(true);
        let jan = record("M1", date(2023, 1, 1), date(2023, 1, 31), 20.0, "jan");
        let mid = record("M1", date(2023, 1, 15), date(2023, 2, 14), 22.0, "mid");
        collator.add(mid.clone());
        collator.add(jan.clone());
        let collation = collator.finalize();
        assert_eq!(collation.conflicts.len(), 1);
        assert_eq!(collation.conflicts[0].first, jan);
        assert_eq!(collation.conflicts[0].second, mid);
        assert!(collation.is_conflicted(&jan));
        assert_eq!(collation.groups[&AccountKey::new("A1", "M1")].len(), 2);
    }

    #[test]
    fn nested_periods_conflict_with_the_enclosing_bill() {
        let mut collator = Collator::new(true);
        let quarter = record("M1", date(2023, 1, 1), date(2023, 3, 31), 60.0, "quarter");
        let early = record("M1", date(2023, 2, 1), date(2023, 2, 10), 5.0, "early");
        let late = record("M1", date(2023, 2, 15), date(2023, 2, 20), 4.0, "late");
        let april = record("M1", date(2023, 4, 1), date(2023, 4, 30), 20.0, "april");
        for r in [late.clone(), april.clone(), early.clone(), quarter.clone()] {
            collator.add(r);
        }
        let collation = collator.finalize();
        let pairs: Vec<(&str, &str)> = collation
            .conflicts
            .iter()
            .map(|c| (c.first.source_file(), c.second.source_file()))
            .collect();
        assert_eq!(pairs, vec![("quarter", "early"), ("quarter", "late")]);
        assert!(collation.is_conflicted(&late));
        assert!(!collation.is_conflicted(&april));
    }

    #[test]
    fn touching_boundary_policy() {
        let build = |touching| {
            let mut collator = Collator::new(touching);
            collator.add(record("M1", date(2023, 1, 1), date(2023, 2, 1), 1.0, "a"));
            collator.add(record("M1", date(2023, 2, 1), date(2023, 3, 1), 2.0, "b"));
            collator.finalize().conflicts.len()
        };
        assert_eq!(build(true), 1);
        assert_eq!(build(false), 0);
    }
}
