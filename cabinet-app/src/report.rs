use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use cabinet_core::catalog::ProcessingResult;
use cabinet_engine::{BatchProcessor, CancellationToken};

/// 命令行输入：压缩包按字节处理，单张图纸按文本处理。
#[derive(Debug)]
pub enum Input {
    Archive { name: String, bytes: Vec<u8> },
    Drawing { name: String, text: String },
}

pub fn read_inputs(paths: &[PathBuf]) -> Result<Vec<Input>> {
    paths.iter().map(|path| read_input(path)).collect()
}

fn read_input(path: &Path) -> Result<Input> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let bytes = fs::read(path).with_context(|| format!("无法读取 {}", path.display()))?;
    match extension.as_str() {
        "zip" => Ok(Input::Archive { name, bytes }),
        "dxf" => Ok(Input::Drawing {
            name,
            text: String::from_utf8_lossy(&bytes).into_owned(),
        }),
        _ => bail!("不支持的输入类型: {}（需要 .zip 或 .dxf）", path.display()),
    }
}

/// 压缩包走多包处理（错误带包名前缀），单张图纸逐个处理，最后合并。
pub fn process_inputs(
    processor: &BatchProcessor,
    inputs: &[Input],
    cancel: &CancellationToken,
) -> ProcessingResult {
    let archives = inputs.iter().filter_map(|input| match input {
        Input::Archive { name, bytes } => Some((name.as_str(), bytes.as_slice())),
        Input::Drawing { .. } => None,
    });
    let archive_result = processor.process_archives(archives, cancel);

    inputs
        .iter()
        .filter_map(|input| match input {
            Input::Drawing { name, text } => Some(processor.process_dxf(name, text)),
            Input::Archive { .. } => None,
        })
        .fold(archive_result, ProcessingResult::combine)
}

pub fn render_summary(result: &ProcessingResult) -> String {
    let mut out = String::new();
    for cabinet in &result.cabinets {
        let _ = writeln!(
            out,
            "{} [{} / {}] {}x{}x{} mm, doors {}, drawers {}",
            cabinet.name,
            cabinet.category,
            cabinet.cabinet_type,
            cabinet.width,
            cabinet.height,
            cabinet.depth,
            cabinet.door_count,
            cabinet.drawer_count,
        );
    }
    for error in &result.errors {
        let _ = writeln!(out, "error: {error}");
    }
    let _ = writeln!(
        out,
        "{} cabinet(s) from {}/{} file(s)",
        result.cabinets.len(),
        result.processed_files,
        result.total_files,
    );
    out
}
