//! 将多份月度水电账单表格合并为一本工作簿：每个账户/电表一个工作表，按计费周期排序。
//!
//! 处理流程：[`grid::load_sheet`] 读取账单 → [`extractor::extract`] 按标签定位字段并提取记录
//! → [`collator::Collator`] 分组、排序、去重并检测周期冲突 → [`writer::write_workbook`] 写出。
//! [`pipeline::run`] 串起整个流程。

pub mod coerce;
pub mod collator;
pub mod error;
pub mod extractor;
pub mod grid;
pub mod locator;
pub mod model;
pub mod pipeline;
pub mod settings;
pub mod writer;

pub use collator::{Collation, Collator, Conflict};
pub use error::{BillError, WriteError};
pub use extractor::{extract, Extraction};
pub use grid::{load_sheet, CellGrid, CellValue, Grid};
pub use locator::{locate, Coord, Located};
pub use model::{AccountKey, BillRecord, LineItem, ParseWarning};
pub use pipeline::{collect_inputs, run, RunSummary, SkippedFile};
pub use settings::{Field, FieldPattern, FieldPatterns, RowFilter, Settings, SheetNaming, ValueRule};
pub use writer::write_workbook;
