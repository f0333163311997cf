use crate::grid::CellGrid;
use crate::settings::{Field, FieldPatterns, ValueRule};
use std::collections::HashMap;

/// 单元格坐标（从 0 开始的行、列）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self { Self { row, col } }

    pub fn offset(self, rule: ValueRule) -> Coord {
        match rule {
            ValueRule::Right(n) => Coord::new(self.row, self.col + n),
            ValueRule::Below(n) => Coord::new(self.row + n, self.col),
        }
    }
}

/// 定位结果：标签所在单元格与取值单元格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub label: Coord,
    pub value: Coord,
}

fn normalize(s: &str) -> String { s.trim().to_lowercase() }

/// 文本是否包含任一标签（忽略大小写与首尾空白）
pub fn label_matches(text: &str, labels: &[String]) -> bool {
    let text = normalize(text);
    !text.is_empty()
        && labels
            .iter()
            .map(|l| normalize(l))
            .any(|l| !l.is_empty() && text.contains(&l))
}

fn normalize_whole(s: &str) -> String {
    let s = s.trim().trim_end_matches(':');
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// 文本整体是否等于任一标签（忽略大小写、多余空白与末尾冒号）。
/// 用于结束标记等不能按子串匹配的场合："Energy Subtotal" 不等于 "total"。
pub fn label_equals(text: &str, labels: &[String]) -> bool {
    let text = normalize_whole(text);
    !text.is_empty() && labels.iter().any(|l| normalize_whole(l) == text)
}

/// 按行优先顺序查找第一个包含任一标签的文本单元格
pub fn find_label(grid: &dyn CellGrid, labels: &[String]) -> Option<Coord> {
    (0..grid.height()).find_map(|row| find_in_row(grid, row, labels).map(|col| Coord::new(row, col)))
}

/// 在指定行中从左到右查找标签，返回列号
pub fn find_in_row(grid: &dyn CellGrid, row: usize, labels: &[String]) -> Option<usize> {
    (0..grid.width()).find(|&col| {
        grid.cell(row, col)
            .as_text()
            .map(|text| label_matches(text, labels))
            .unwrap_or(false)
    })
}

/// 依据规则表定位各字段。未找到的字段不出现在结果中，由调用方决定是否致命。
/// 多处匹配时取第一处（先上后下、先左后右）。
pub fn locate(grid: &dyn CellGrid, patterns: &FieldPatterns) -> HashMap<Field, Located> {
    let mut found = HashMap::new();
    for (field, pattern) in &patterns.fields {
        match find_label(grid, &pattern.labels) {
            Some(label) => {
                let value = label.offset(pattern.rule);
                log::debug!("字段 {} 标签位于 {:?}，取值位于 {:?}", field.name(), label, value);
                found.insert(*field, Located { label, value });
            }
            None => log::debug!("未找到字段 {} 的标签", field.name()),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::settings::FieldPattern;
    use std::collections::BTreeMap;

    fn patterns(entries: Vec<(Field, FieldPattern)>) -> FieldPatterns {
        let fields: BTreeMap<Field, FieldPattern> = entries.into_iter().collect();
        FieldPatterns { fields, ..FieldPatterns::default() }
    }

    #[test]
    fn finds_labels_case_insensitively_with_offsets() {
        let grid = Grid::from_strs(&[
            &["Hydro Bill", "", ""],
            &["", "ACCOUNT NUMBER:", "123456"],
            &["Meter", "", ""],
            &["M-77", "", ""],
        ]);
        let p = patterns(vec![
            (Field::AccountId, FieldPattern::new(&["account number"], ValueRule::Right(1))),
            (Field::MeterId, FieldPattern::new(&["meter"], ValueRule::Below(1))),
        ]);
        let found = locate(&grid, &p);
        assert_eq!(found[&Field::AccountId].label, Coord::new(1, 1));
        assert_eq!(found[&Field::AccountId].value, Coord::new(1, 2));
        assert_eq!(found[&Field::MeterId].value, Coord::new(3, 0));
    }

    #[test]
    fn first_match_wins_row_major() {
        let grid = Grid::from_strs(&[
            &["", "", "Account No", "first"],
            &["Account No", "second", "", ""],
        ]);
        let p = patterns(vec![(Field::AccountId, FieldPattern::new(&["account no"], ValueRule::Right(1)))]);
        let found = locate(&grid, &p);
        assert_eq!(found[&Field::AccountId].label, Coord::new(0, 2));
    }

    #[test]
    fn any_alternative_label_counts_and_missing_fields_are_absent() {
        let grid = Grid::from_strs(&[&["Meter #", "M1"]]);
        let p = patterns(vec![
            (Field::MeterId, FieldPattern::new(&["meter number", "meter #"], ValueRule::Right(1))),
            (Field::AccountId, FieldPattern::new(&["account"], ValueRule::Right(1))),
        ]);
        let found = locate(&grid, &p);
        assert!(found.contains_key(&Field::MeterId));
        assert!(!found.contains_key(&Field::AccountId));
    }

    #[test]
    fn numeric_cells_never_match_labels() {
        let grid = Grid::from_strs(&[&["2023", "x"]]);
        assert_eq!(find_label(&grid, &["2023".to_string()]), None);
    }

    #[test]
    fn whole_label_comparison_ignores_case_spacing_and_colon() {
        let markers = vec!["total".to_string(), "amount due".to_string()];
        assert!(label_equals("  TOTAL: ", &markers));
        assert!(label_equals("Amount   Due", &markers));
        assert!(!label_equals("Energy Subtotal", &markers));
        assert!(!label_equals("Total Delivery Charges", &markers));
        assert!(!label_equals("", &markers));
    }
}
