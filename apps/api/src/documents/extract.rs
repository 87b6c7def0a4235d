use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};

use super::{DocumentError, DocumentKind};

/// Extracts raw text from document bytes. CPU bound; run it on the blocking pool.
pub fn extract_text(kind: DocumentKind, data: &[u8]) -> Result<String, DocumentError> {
    let text = match kind {
        DocumentKind::Pdf => extract_pdf(data)?,
        DocumentKind::Docx => extract_docx(data)?,
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text)
}

/// Async wrapper that keeps parsing off the runtime threads.
pub async fn extract_text_blocking(
    kind: DocumentKind,
    data: bytes::Bytes,
) -> Result<String, DocumentError> {
    tokio::task::spawn_blocking(move || extract_text(kind, &data))
        .await
        .map_err(|e| match kind {
            DocumentKind::Pdf => DocumentError::Pdf(format!("extraction task failed: {e}")),
            DocumentKind::Docx => DocumentError::Docx(format!("extraction task failed: {e}")),
        })?
}

fn extract_pdf(data: &[u8]) -> Result<String, DocumentError> {
    pdf_extract::extract_text_from_mem(data).map_err(|e| DocumentError::Pdf(e.to_string()))
}

fn extract_docx(data: &[u8]) -> Result<String, DocumentError> {
    let docx = read_docx(data).map_err(|e| DocumentError::Docx(format!("{e:?}")))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(para) = child {
            let mut line = String::new();
            for p_child in &para.children {
                if let ParagraphChild::Run(run) = p_child {
                    for r_child in &run.children {
                        if let RunChild::Text(t) = r_child {
                            line.push_str(&t.text);
                        }
                    }
                }
            }
            if !line.trim().is_empty() {
                paragraphs.push(line);
            }
        }
    }
    Ok(paragraphs.join("\n"))
}
