use crate::collator::{Collator, Conflict};
use crate::error::{BillError, WriteError};
use crate::extractor::extract;
use crate::grid::load_sheet;
use crate::model::ParseWarning;
use crate::settings::Settings;
use crate::writer::write_workbook;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// 被跳过的输入文件及原因
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub source_file: String,
    /// 错误类别，例如 "IdentityMissing"
    pub kind: &'static str,
    pub reason: String,
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_processed: usize,
    pub skipped: Vec<SkippedFile>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<ParseWarning>,
    pub duplicates_removed: usize,
    pub worksheets: Vec<String>,
    /// 没有任何可用账单时不生成输出文件
    pub output: Option<PathBuf>,
}

impl RunSummary {
    pub fn files_skipped(&self) -> usize { self.skipped.len() }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "处理文件: {}，跳过: {}", self.files_processed, self.files_skipped())?;
        writeln!(f, "周期冲突: {}，重复账单: {}，警告: {}", self.conflicts.len(), self.duplicates_removed, self.warnings.len())?;
        match &self.output {
            Some(path) => writeln!(f, "输出: {}（{} 个工作表）", path.display(), self.worksheets.len())?,
            None => writeln!(f, "没有可写出的账单，未生成输出文件")?,
        }
        for skipped in &self.skipped {
            writeln!(f, "  跳过 {} [{}]: {}", skipped.source_file, skipped.kind, skipped.reason)?;
        }
        for conflict in &self.conflicts {
            writeln!(f, "  冲突 {}", conflict)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  警告 {}", warning)?;
        }
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// 展开输入路径：目录按文件名排序取其中的 .xls/.xlsx 文件，普通文件原样保留
pub fn collect_inputs(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .and_then(|e| e.to_str())
                            .map(|e| matches!(e.to_lowercase().as_str(), "xls" | "xlsx"))
                            .unwrap_or(false)
                })
                .collect();
            found.sort();
            inputs.extend(found);
        } else {
            inputs.push(path.clone());
        }
    }
    Ok(inputs)
}

/// 逐个读取账单、提取、汇总后写出。单个文件失败只会被跳过，
/// 只有写出失败才会终止整个运行。
pub fn run(inputs: &[PathBuf], destination: &Path, settings: &Settings) -> Result<RunSummary, WriteError> {
    let mut summary = RunSummary::default();
    let mut collator = Collator::new(settings.touching_periods_overlap);

    for path in inputs {
        let source = display_name(path);
        log::info!("读取 {}", path.display());

        let outcome = load_sheet(path, settings.preferred_sheet.as_deref()).and_then(|grid| {
            let extraction = extract(&grid, &source, settings);
            summary.warnings.extend(extraction.warnings);
            extraction.outcome
        });

        match outcome {
            Ok(record) => {
                summary.files_processed += 1;
                collator.add(record);
            }
            Err(err) => {
                log::warn!("跳过 {}: {}", source, err);
                if matches!(err, BillError::Load(_)) {
                    summary.warnings.push(ParseWarning::new(&source, err.to_string()));
                }
                summary.skipped.push(SkippedFile { source_file: source, kind: err.kind(), reason: err.to_string() });
            }
        }
    }

    let collation = collator.finalize();
    summary.duplicates_removed = collation.duplicates_removed;
    summary.conflicts = collation.conflicts.clone();

    if collation.is_empty() {
        log::warn!("没有成功提取的账单，不生成 {}", destination.display());
        return Ok(summary);
    }
    summary.worksheets = write_workbook(&collation, destination, settings)?;
    summary.output = Some(destination.to_path_buf());
    log::info!("已写出 {}（{} 个工作表）", destination.display(), summary.worksheets.len());
    Ok(summary)
}
