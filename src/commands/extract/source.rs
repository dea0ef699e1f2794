use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

const PAGE_BREAK: char = '\u{000C}';

/// Failures while obtaining page text. Any of these aborts the run before
/// an output file is touched.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("input document not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("failed to execute pdftotext for {}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("pdftotext returned non-zero exit status for {}: {}", .path.display(), .stderr)]
    Pdftotext { path: PathBuf, stderr: String },

    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Provides a document's text, one entry per page in reading order. Pages
/// without any text come back as `None`.
pub trait PageSource {
    fn backend(&self) -> &'static str;

    fn read_pages(&self) -> Result<Vec<Option<String>>, SourceError>;
}

#[derive(Debug)]
pub struct PdftotextSource {
    path: PathBuf,
    max_pages: Option<usize>,
}

impl PageSource for PdftotextSource {
    fn backend(&self) -> &'static str {
        "pdftotext"
    }

    fn read_pages(&self) -> Result<Vec<Option<String>>, SourceError> {
        let mut command = Command::new("pdftotext");
        command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
        if let Some(max_pages) = self.max_pages {
            command.arg("-l").arg(max_pages.to_string());
        }
        command.arg(&self.path).arg("-");

        let output = command.output().map_err(|source| SourceError::Spawn {
            path: self.path.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(SourceError::Pdftotext {
                path: self.path.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(split_pages(&String::from_utf8_lossy(&output.stdout), None))
    }
}

/// Text already extracted to disk, using the same form-feed page breaks
/// pdftotext emits.
#[derive(Debug)]
pub struct TextDumpSource {
    path: PathBuf,
    max_pages: Option<usize>,
}

impl PageSource for TextDumpSource {
    fn backend(&self) -> &'static str {
        "text_dump"
    }

    fn read_pages(&self) -> Result<Vec<Option<String>>, SourceError> {
        let raw = fs::read(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;

        Ok(split_pages(&String::from_utf8_lossy(&raw), self.max_pages))
    }
}

pub fn open_page_source(
    path: &Path,
    max_pages: Option<usize>,
) -> Result<Box<dyn PageSource>, SourceError> {
    if !path.exists() {
        return Err(SourceError::MissingInput(path.to_path_buf()));
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        Ok(Box::new(PdftotextSource {
            path: path.to_path_buf(),
            max_pages,
        }))
    } else {
        Ok(Box::new(TextDumpSource {
            path: path.to_path_buf(),
            max_pages,
        }))
    }
}

pub fn split_pages(raw: &str, max_pages: Option<usize>) -> Vec<Option<String>> {
    let mut pages: Vec<Option<String>> = raw
        .split(PAGE_BREAK)
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .map(|text| (!text.trim().is_empty()).then_some(text))
        .collect();

    // pdftotext terminates the last page with a form feed too.
    while matches!(pages.last(), Some(None)) {
        pages.pop();
    }

    if let Some(max_pages) = max_pages {
        pages.truncate(max_pages);
    }

    pages
}
