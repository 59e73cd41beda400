//! Report archiving and upload.
//!
//! A [`ReportSession`] is opened once per run. It owns the results directory
//! and resolves the archive name a single time, so every later step (writing
//! the zip, uploading it) sees the same name.

use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const FALLBACK_ARCHIVE: &str = "report.zip";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("report not found: {0}")]
    ReportNotFound(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("upload to {url} failed: {message}")]
    Transport { url: String, message: String },
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> UploadError {
    let context = context.into();
    move |source| UploadError::Io { context, source }
}

#[derive(Debug, Clone)]
pub struct ReportSession {
    results_dir: PathBuf,
    archive_name: String,
}

impl ReportSession {
    pub fn open(results_dir: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let results_dir = results_dir.into();
        if !results_dir.is_dir() {
            return Err(UploadError::ReportNotFound(results_dir));
        }
        let archive_name = resolve_archive_name(&results_dir);
        debug!(dir = %results_dir.display(), archive = %archive_name, "report session opened");
        Ok(Self {
            results_dir,
            archive_name,
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// Zip the results directory into `dest_dir/<archive name>`.
    pub fn write_archive(&self, dest_dir: &Path) -> Result<PathBuf, UploadError> {
        let archive = dest_dir.join(&self.archive_name);
        let file = File::create(&archive).map_err(io_err(format!("failed to create {}", archive.display())))?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entries = 0usize;
        for entry in WalkDir::new(&self.results_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| UploadError::Io {
                context: format!("failed to walk {}", self.results_dir.display()),
                source: e.into(),
            })?;
            if entry.depth() == 0 || entry.path() == archive {
                continue;
            }
            let name = archive_path(&self.results_dir, entry.path());
            if entry.file_type().is_dir() {
                zip.add_directory(format!("{}/", name), options)?;
            } else if entry.file_type().is_file() {
                let data = fs::read(entry.path())
                    .map_err(io_err(format!("failed to read {}", entry.path().display())))?;
                zip.start_file(name, options)?;
                zip.write_all(&data)
                    .map_err(io_err(format!("failed to write {}", archive.display())))?;
                entries += 1;
            }
        }
        zip.finish()?;

        info!(archive = %archive.display(), files = entries, "report archived");
        Ok(archive)
    }

    /// POST the archive to `server_url`. Not retried.
    pub fn upload(&self, archive: &Path, server_url: &str, timeout: Duration) -> Result<(), UploadError> {
        let body = fs::read(archive).map_err(io_err(format!("failed to read {}", archive.display())))?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        let response = agent
            .post(server_url)
            .set("Content-Type", "application/zip")
            .set(
                "Content-Disposition",
                &format!("attachment; filename=\"{}\"", self.archive_name),
            )
            .send_bytes(&body);

        match response {
            Ok(resp) => {
                info!(url = server_url, status = resp.status(), bytes = body.len(), "report uploaded");
                Ok(())
            }
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                warn!(url = server_url, status = code, "upload rejected");
                Err(UploadError::Transport {
                    url: server_url.to_string(),
                    message: format!("server answered {}: {}", code, text.trim()),
                })
            }
            Err(e) => Err(UploadError::Transport {
                url: server_url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

fn archive_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `<project_id>.zip` from the first test-case result carrying a
/// `project_id` label, else [`FALLBACK_ARCHIVE`].
fn resolve_archive_name(results_dir: &Path) -> String {
    let cases_dir = results_dir.join("data").join("test-cases");
    let Ok(read) = fs::read_dir(&cases_dir) else {
        return FALLBACK_ARCHIVE.to_string();
    };
    let mut files: Vec<PathBuf> = read
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    for file in files {
        let Ok(text) = fs::read_to_string(&file) else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            debug!(file = %file.display(), "unparseable test-case result skipped");
            continue;
        };
        if let Some(project_id) = project_label(&data) {
            return format!("{}.zip", project_id);
        }
    }
    FALLBACK_ARCHIVE.to_string()
}

fn project_label(data: &Value) -> Option<&str> {
    data.get("labels")?
        .as_array()?
        .iter()
        .find(|label| label.get("name").and_then(Value::as_str) == Some("project_id"))?
        .get("value")?
        .as_str()
        .filter(|v| !v.is_empty())
}
