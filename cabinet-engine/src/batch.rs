//! 压缩包批处理。
//!
//! 每个成员文件独立解析、提取，结果折叠为一个 [`ProcessingResult`]。
//! 单个文件失败只记录一条带文件名的错误，不会中断整批。

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cabinet_config::{AppConfig, ArchiveConfig, ExtractionConfig};
use cabinet_core::catalog::{ExtractedCabinetData, ProcessingResult};
use cabinet_io::{ParseFailure, parse_dxf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::errors::BatchError;
use crate::extraction::ExtractionPipeline;

/// 取消信号，可跨线程克隆；只在文件之间检查。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 单个文件的处理结果。
#[derive(Debug)]
pub enum FileOutcome {
    Extracted(Vec<ExtractedCabinetData>),
    NoCabinets,
    ParseFailed(ParseFailure),
    Failed(BatchError),
}

impl FileOutcome {
    /// 转为只含一个文件的结果，供折叠使用。
    pub fn into_result(self, filename: &str) -> ProcessingResult {
        match self {
            FileOutcome::Extracted(cabinets) => ProcessingResult::new(cabinets, Vec::new(), 1, 1),
            FileOutcome::NoCabinets => {
                ProcessingResult::new(Vec::new(), vec![format!("{filename}: No cabinets found")], 1, 1)
            }
            FileOutcome::ParseFailed(_) => {
                ProcessingResult::new(Vec::new(), vec![format!("Failed to parse: {filename}")], 1, 0)
            }
            FileOutcome::Failed(error) => ProcessingResult::new(
                Vec::new(),
                vec![format!("Error processing {filename}: {error}")],
                1,
                0,
            ),
        }
    }
}

pub struct BatchProcessor {
    pipeline: ExtractionPipeline,
    archive: ArchiveConfig,
}

impl BatchProcessor {
    pub fn new(extraction: &ExtractionConfig, archive: &ArchiveConfig) -> Self {
        Self {
            pipeline: ExtractionPipeline::new(extraction),
            archive: archive.clone(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.extraction, &config.archive)
    }

    /// 使用自定义层级链。
    pub fn with_pipeline(pipeline: ExtractionPipeline, archive: &ArchiveConfig) -> Self {
        Self {
            pipeline,
            archive: archive.clone(),
        }
    }

    /// 处理单个 DXF 文本。
    pub fn process_dxf(&self, filename: &str, text: &str) -> ProcessingResult {
        self.extract_text(filename, text).into_result(filename)
    }

    fn extract_text(&self, filename: &str, text: &str) -> FileOutcome {
        let drawing = match parse_dxf(text) {
            Ok(drawing) => drawing,
            Err(failure) => {
                warn!(file = %filename, error = %failure, "failed to parse drawing");
                return FileOutcome::ParseFailed(failure);
            }
        };
        let cabinets = self.pipeline.extract(filename, &drawing);
        if cabinets.is_empty() {
            debug!(file = %filename, "no cabinets found");
            FileOutcome::NoCabinets
        } else {
            FileOutcome::Extracted(cabinets)
        }
    }

    /// 处理一个压缩包。成员按中央目录顺序尝试，目录项与非图纸文件忽略。
    pub fn process_archive(
        &self,
        archive_name: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> ProcessingResult {
        let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(archive) => archive,
            Err(source) => {
                let error = BatchError::Archive(source);
                warn!(archive = %archive_name, %error, "failed to open archive");
                return ProcessingResult::failed(format!("Error processing {archive_name}: {error}"));
            }
        };

        let members: Vec<(usize, String)> = (0..archive.len())
            .filter_map(|index| {
                let name = archive.name_for_index(index)?;
                (!name.ends_with('/') && self.archive.accepts(name))
                    .then(|| (index, name.to_string()))
            })
            .collect();
        debug!(archive = %archive_name, members = members.len(), "scanning archive");

        let mut result = ProcessingResult::empty();
        for (position, (index, name)) in members.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = members.len() - position;
                warn!(archive = %archive_name, remaining, "batch cancelled");
                result = result.combine(ProcessingResult::new(
                    Vec::new(),
                    vec![format!("Cancelled: {remaining} file(s) not processed")],
                    remaining,
                    0,
                ));
                break;
            }
            let outcome = match read_member(&mut archive, *index, name) {
                Ok(text) => self.extract_text(name, &text),
                Err(error) => {
                    warn!(file = %name, %error, "failed to read archive member");
                    FileOutcome::Failed(error)
                }
            };
            result = result.combine(outcome.into_result(name));
        }

        info!(
            archive = %archive_name,
            total = result.total_files,
            processed = result.processed_files,
            cabinets = result.cabinets.len(),
            "archive processed"
        );
        result
    }

    /// 依次处理多个压缩包，错误再以压缩包名作前缀。
    pub fn process_archives<'a, I>(&self, archives: I, cancel: &CancellationToken) -> ProcessingResult
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        archives
            .into_iter()
            .map(|(name, bytes)| {
                self.process_archive(name, bytes, cancel)
                    .with_error_prefix(name)
            })
            .fold(ProcessingResult::empty(), ProcessingResult::combine)
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

fn read_member(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    index: usize,
    name: &str,
) -> Result<String, BatchError> {
    let mut file = archive.by_index(index).map_err(|source| BatchError::Member {
        name: name.to_string(),
        source,
    })?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}
