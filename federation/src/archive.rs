//! Zip packaging for model artifacts: the submission bundle contents and
//! the three-snapshot download archive for approved models.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;

/// Error type for archive operations
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive is missing required file '{0}'")]
    MissingFile(String),
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Build the downloadable archive for an approved model: the three
/// aggregate snapshots under `{model_name}_{role}_model.json`.
pub fn package_artifacts(
    model_name: &str,
    teacher: &[u8],
    student: &[u8],
    global: &[u8],
) -> ArchiveResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (role, bytes) in [("student", student), ("teacher", teacher), ("global", global)] {
            writer.start_file(format!("{model_name}_{role}_model.json"), options)?;
            writer.write_all(bytes)?;
        }
        writer.finish()?;
    }
    Ok(cursor.into_inner())
}

/// Names of all files in an archive.
pub fn list_files(bytes: &[u8]) -> ArchiveResult<Vec<String>> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    Ok(archive.file_names().map(String::from).collect())
}

/// Extract one required file from an archive.
pub fn extract_file(bytes: &[u8], name: &str) -> ArchiveResult<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive
        .by_name(name)
        .map_err(|_| ArchiveError::MissingFile(name.to_string()))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Build a single-file archive (test/client helper for submissions).
pub fn package_single(name: &str, bytes: &[u8]) -> ArchiveResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer.start_file(name, options)?;
        writer.write_all(bytes)?;
        writer.finish()?;
    }
    Ok(cursor.into_inner())
}
