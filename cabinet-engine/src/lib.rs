pub mod batch;
pub mod extraction;
pub mod geometry;
pub mod heuristics;

pub mod errors {
    use thiserror::Error;
    use zip::result::ZipError;

    /// 批处理中单个文件或压缩包的异常，最终转为带文件名的错误文本。
    #[derive(Debug, Error)]
    pub enum BatchError {
        #[error("cannot open archive: {0}")]
        Archive(#[from] ZipError),
        #[error("cannot decompress {name}: {source}")]
        Member {
            name: String,
            #[source]
            source: ZipError,
        },
        #[error("read failed: {0}")]
        Io(#[from] std::io::Error),
    }
}

pub use batch::{BatchProcessor, CancellationToken, FileOutcome};
pub use errors::BatchError;
pub use extraction::{
    BlockStrategy, CabinetBuilder, ExtractionPipeline, ExtractionStrategy, InsertStrategy,
    LayerStrategy, WholeDrawingStrategy,
};
pub use geometry::{Dimensions, GeometryAnalyzer};
