//! Parquet I/O for result tables.
//!
//! [`TableWriter`] streams batches into `<name>.parquet.tmp` and renames the
//! file into place on [`TableWriter::finish`], so a finished file is never
//! observed half-written. Files are Zstd-compressed.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::Result;

/// Streaming writer for one table file.
pub struct TableWriter {
    path: PathBuf,
    tmp: PathBuf,
    writer: ArrowWriter<File>,
    rows: usize,
}

impl std::fmt::Debug for TableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableWriter")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl TableWriter {
    /// Open `path` for writing batches with `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or temp file cannot be created.
    pub fn create(path: &Path, schema: SchemaRef) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("parquet.tmp");
        let file = File::create(&tmp)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
            .build();
        let writer = ArrowWriter::try_new(file, schema, Some(props))?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp,
            writer,
            rows: 0,
        })
    }

    /// Append a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch does not match the file schema or the
    /// write fails.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.writer.write(batch)?;
        self.rows += batch.num_rows();
        Ok(())
    }

    /// Flush, close and move the file into place. Returns the final path and
    /// row count.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or renaming fails.
    pub fn finish(self) -> Result<(PathBuf, usize)> {
        self.writer.close()?;
        std::fs::rename(&self.tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), rows = self.rows, "parquet written");
        Ok((self.path, self.rows))
    }
}

/// Write `batches` to `path` in one go.
///
/// # Errors
///
/// Returns an error on I/O failure or if the Parquet writer rejects the data.
pub fn write(path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<usize> {
    let mut writer = TableWriter::create(path, schema)?;
    for batch in batches {
        writer.write(batch)?;
    }
    let (_, rows) = writer.finish()?;
    Ok(rows)
}

/// Read all record batches from a Parquet file.
///
/// Returns an empty vec if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read(path: &Path) -> Result<Vec<RecordBatch>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let batches = ParquetRecordBatchReaderBuilder::try_new(file)?
        .build()?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(batches)
}
