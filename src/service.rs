use thiserror::Error;

use crate::config::FormatterConfig;
use crate::format::report::FormatReport;
use crate::format::Formatter;
use crate::progress::ConsoleProgress;

pub const DOCX_EXTENSION: &str = ".docx";

/// One uploaded file.
pub struct FormatRequest<'a> {
    pub file_name: &'a str,
    pub data: &'a [u8],
}

/// The rewritten package, ready to be sent back as an attachment.
pub struct FormatResponse {
    pub file_name: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub report: FormatReport,
}

impl FormatResponse {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.file_name)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("File is empty.")]
    EmptyUpload,

    #[error("Upload .docx only.")]
    WrongExtension { file_name: String },

    #[error("Error: {0:#}")]
    Processing(anyhow::Error),
}

impl ServiceError {
    /// HTTP-style status: 400 for rejected uploads, 500 for failed processing.
    pub fn status(&self) -> u16 {
        match self {
            Self::EmptyUpload | Self::WrongExtension { .. } => 400,
            Self::Processing(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status() < 500
    }
}

fn has_docx_extension(file_name: &str) -> bool {
    let n = file_name.len();
    n >= DOCX_EXTENSION.len()
        && file_name
            .get(n - DOCX_EXTENSION.len()..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCX_EXTENSION))
}

/// Validates an upload, runs the formatter on it and shapes the response.
/// Nothing is processed when validation fails; a processing failure is logged
/// and returned whole, never as a partial document.
pub fn handle_format_request(
    req: &FormatRequest<'_>,
    cfg: &FormatterConfig,
    progress: &ConsoleProgress,
) -> Result<FormatResponse, ServiceError> {
    if req.data.is_empty() {
        return Err(ServiceError::EmptyUpload);
    }
    if !has_docx_extension(req.file_name) {
        return Err(ServiceError::WrongExtension {
            file_name: req.file_name.to_string(),
        });
    }

    progress.info(format!(
        "formatting {} ({} bytes)",
        req.file_name,
        req.data.len()
    ));
    let formatted = Formatter::new(cfg, progress)
        .format_bytes(req.data)
        .map_err(|e| {
            progress.warn(format!("format failed for {}: {e:#}", req.file_name));
            ServiceError::Processing(e)
        })?;

    Ok(FormatResponse {
        file_name: cfg.output.file_name.clone(),
        content_type: cfg.output.content_type.clone(),
        body: formatted.bytes,
        report: formatted.report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::parts::tests::docx_with_paragraphs;

    fn call(file_name: &str, data: &[u8]) -> Result<FormatResponse, ServiceError> {
        handle_format_request(
            &FormatRequest { file_name, data },
            &FormatterConfig::default(),
            &ConsoleProgress::quiet(),
        )
    }

    #[test]
    fn empty_upload_is_client_error() {
        let err = call("thesis.docx", b"").err().expect("rejected");
        assert!(matches!(err, ServiceError::EmptyUpload));
        assert_eq!(err.status(), 400);
        assert_eq!(err.to_string(), "File is empty.");
    }

    #[test]
    fn wrong_extension_is_client_error() {
        let input = docx_with_paragraphs(&["Hello"]);
        for name in ["thesis.doc", "thesis.pdf", "docx", "thesis.docx.zip"] {
            let err = call(name, &input).err().expect("rejected");
            assert_eq!(err.status(), 400);
            assert_eq!(err.to_string(), "Upload .docx only.");
        }
        assert!(call("THESIS.DOCX", &input).is_ok());
    }

    #[test]
    fn broken_package_is_server_error() {
        let err = call("thesis.docx", b"definitely not a zip")
            .err()
            .expect("failed");
        assert_eq!(err.status(), 500);
        assert!(!err.is_client_error());
        assert!(err.to_string().starts_with("Error: "));
        assert!(err.to_string().contains("read zip"));
    }

    #[test]
    fn success_shapes_attachment() {
        let input = docx_with_paragraphs(&["CHAPTER 1", "Intro"]);
        let resp = call("my thesis.docx", &input).expect("ok");
        assert_eq!(resp.file_name, "Formatted_Project.docx");
        assert_eq!(resp.content_type, "application/octet-stream");
        assert_eq!(
            resp.content_disposition(),
            "attachment; filename=\"Formatted_Project.docx\""
        );
        assert!(!resp.body.is_empty());
        assert_eq!(resp.report.headings(), 1);
    }
}
