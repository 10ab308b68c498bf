use crate::error::QaError;
use crate::models::PageText;
use lopdf::Document;
use std::path::Path;

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, QaError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, QaError> {
        if !path.is_file() {
            return Err(QaError::Load(format!("no such file: {}", path.display())));
        }

        let document = Document::load(path)
            .map_err(|error| QaError::Load(format!("{}: {error}", path.display())))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| QaError::Load(format!("page {page_no}: {error}")))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(QaError::Load(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, QaError> {
    LopdfExtractor.extract_pages(path)
}
