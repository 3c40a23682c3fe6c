use crate::config::DEFAULT_PAGE_TIMEOUT;
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressSink};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Page-level access to an opened PDF. Page numbers are 1-based.
pub trait PageSource: Send + Sync + 'static {
    fn page_numbers(&self) -> Vec<u32>;

    /// True when the page object is missing or null; such pages are skipped
    /// without attempting extraction.
    fn is_null_page(&self, page: u32) -> bool;

    fn extract_page(&self, page: u32) -> Result<String, IngestError>;
}

pub struct LopdfSource {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl LopdfSource {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;
        let pages = document.get_pages();
        Ok(Self { document, pages })
    }
}

impl PageSource for LopdfSource {
    fn page_numbers(&self) -> Vec<u32> {
        self.pages.keys().copied().collect()
    }

    fn is_null_page(&self, page: u32) -> bool {
        match self.pages.get(&page) {
            Some(object_id) => matches!(
                self.document.get_object(*object_id),
                Err(_) | Ok(Object::Null)
            ),
            None => true,
        }
    }

    fn extract_page(&self, page: u32) -> Result<String, IngestError> {
        self.document
            .extract_text(&[page])
            .map_err(|error| IngestError::PdfParse(error.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSkipReason {
    NullPage,
    Failed(String),
    TimedOut,
}

impl fmt::Display for PageSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullPage => f.write_str("null page"),
            Self::Failed(error) => write!(f, "extraction failed: {error}"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPage {
    pub page: u32,
    pub reason: PageSkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub pages_total: u32,
    pub pages_with_text: u32,
    pub skipped: Vec<SkippedPage>,
}

/// Page progress is always reported for the first and last page, every
/// fifth page on documents of 20 pages or more, and every page otherwise.
pub fn should_report_page(page: u32, total: u32) -> bool {
    total < 20 || page % 5 == 0 || page == 1 || page == total
}

#[derive(Debug, Clone, Copy)]
pub struct PageExtractor {
    page_timeout: Duration,
}

impl Default for PageExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_TIMEOUT)
    }
}

impl PageExtractor {
    pub fn new(page_timeout: Duration) -> Self {
        Self { page_timeout }
    }

    /// Extracts every page in order and joins the page texts with newlines.
    ///
    /// Each page runs on the blocking pool and is raced against the page
    /// timeout. A page that times out is abandoned: its worker keeps running
    /// until the parser returns and the late result is dropped.
    pub async fn extract<S>(
        &self,
        source: Arc<S>,
        filename: &str,
        progress: &dyn ProgressSink,
    ) -> Result<ExtractedText, IngestError>
    where
        S: PageSource + ?Sized,
    {
        let page_numbers = source.page_numbers();
        let total = u32::try_from(page_numbers.len()).unwrap_or(u32::MAX);
        if total == 0 {
            return Err(IngestError::NoPages);
        }

        info!(filename, total_pages = total, "reading pdf");

        let mut extracted = ExtractedText {
            pages_total: total,
            ..ExtractedText::default()
        };
        let mut parts = Vec::with_capacity(page_numbers.len());

        for (ordinal, page) in (1..=total).zip(page_numbers) {
            if should_report_page(ordinal, total) {
                progress.report(ProgressEvent::ReadingPage {
                    page: ordinal,
                    total,
                });
            }

            if source.is_null_page(page) {
                warn!(filename, page, total, reason = "null page", "skipping pdf page");
                extracted.skipped.push(SkippedPage {
                    page,
                    reason: PageSkipReason::NullPage,
                });
                continue;
            }

            match self.extract_one(Arc::clone(&source), page).await {
                Ok(text) => {
                    extracted.pages_with_text += 1;
                    parts.push(text);
                }
                Err(reason) => {
                    warn!(filename, page, total, %reason, "skipping pdf page");
                    if reason == PageSkipReason::TimedOut {
                        progress.report(ProgressEvent::PageTimedOut { page });
                    }
                    extracted.skipped.push(SkippedPage { page, reason });
                }
            }
        }

        extracted.text = parts.join("\n");
        info!(
            filename,
            pages_processed = total,
            pages_with_text = extracted.pages_with_text,
            bytes = extracted.text.len(),
            "pdf reading complete"
        );

        Ok(extracted)
    }

    async fn extract_one<S>(&self, source: Arc<S>, page: u32) -> Result<String, PageSkipReason>
    where
        S: PageSource + ?Sized,
    {
        let (sender, receiver) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let _ = sender.send(source.extract_page(page));
        });

        match tokio::time::timeout(self.page_timeout, receiver).await {
            Ok(Ok(Ok(text))) => Ok(text),
            Ok(Ok(Err(error))) => Err(PageSkipReason::Failed(error.to_string())),
            Ok(Err(_)) => Err(PageSkipReason::Failed(
                "extraction worker ended without a result".to_string(),
            )),
            Err(_) => Err(PageSkipReason::TimedOut),
        }
    }
}
