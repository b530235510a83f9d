use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use scraper::{Html, Node, Selector};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Where a document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Local PDF file, loaded one document per page
    Pdf(PathBuf),
    /// Local plain text file
    Text(PathBuf),
    /// Local file whose format is detected from its extension
    File(PathBuf),
    /// Remote web page
    Web(Url),
}

impl Source {
    /// Human readable location, also used as the document id
    pub fn location(&self) -> String {
        match self {
            Source::Pdf(path) | Source::Text(path) | Source::File(path) => {
                path.display().to_string()
            }
            Source::Web(url) => url.to_string(),
        }
    }
}

/// Metadata describing where a document's text came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// File path or URL the document was loaded from
    pub source: String,
    /// Zero-based page index for paginated sources
    pub page: Option<usize>,
    /// Page title, when the source has one
    pub title: Option<String>,
    /// Declared content language, when the source has one
    pub language: Option<String>,
    /// The document's MIME type
    pub mime_type: String,
}

/// Represents a document with its content and metadata
#[derive(Debug, Clone)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Load all documents from a source; web pages are fetched with `http`
    pub async fn load(source: &Source, http: &reqwest::Client) -> Result<Vec<Self>> {
        match source {
            Source::Pdf(path) => load_pdf(path),
            Source::Text(path) => load_text(path).map(|doc| vec![doc]),
            Source::File(path) => Self::from_file(path),
            Source::Web(url) => load_web_page(http, url).await.map(|doc| vec![doc]),
        }
    }

    /// Load documents from a file path, choosing the reader by MIME type
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Vec<Self>> {
        let path = file_path.as_ref();
        ensure_readable(path)?;

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        match mime_type.as_str() {
            mime if mime.starts_with("application/pdf") => load_pdf(path),
            mime if mime.starts_with("text/") => load_text(path).map(|doc| vec![doc]),
            _ => Err(anyhow::anyhow!(
                "Unsupported document format: {}. Only text and PDF files are supported.",
                mime_type
            )),
        }
    }
}

fn ensure_readable(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(anyhow::anyhow!("File not found: {}", path.display()));
    }
    Ok(())
}

/// Load a PDF file as one document per page
fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    ensure_readable(path)?;
    info!("Processing PDF document: {}", path.display());

    let pages = pdf_extract::extract_text_by_pages(path)
        .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

    let source = path.display().to_string();
    let documents: Vec<Document> = pages
        .iter()
        .enumerate()
        .filter_map(|(page, text)| {
            // PDF extraction can sometimes include excessive whitespace
            let content = normalize_whitespace(text);
            if content.is_empty() {
                warn!("Page {} of {} has no extractable text", page, source);
                return None;
            }
            Some(Document {
                content,
                metadata: DocumentMetadata {
                    source: source.clone(),
                    page: Some(page),
                    title: None,
                    language: None,
                    mime_type: "application/pdf".to_string(),
                },
            })
        })
        .collect();

    if documents.is_empty() {
        warn!("Extracted PDF content is empty or contains only whitespace");
    }

    Ok(documents)
}

/// Load a plain text file as a single document
fn load_text(path: &Path) -> Result<Document> {
    ensure_readable(path)?;
    info!("Processing text document: {}", path.display());

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read text file: {}", path.display()))?;

    Ok(Document {
        content,
        metadata: DocumentMetadata {
            source: path.display().to_string(),
            mime_type: from_path(path).first_or_text_plain().to_string(),
            ..Default::default()
        },
    })
}

/// Fetch a web page and keep the readable text of its body
async fn load_web_page(http: &reqwest::Client, url: &Url) -> Result<Document> {
    info!("Fetching web page: {}", url);

    let response = http
        .get(url.clone())
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Request to {} failed with status {}",
            url,
            response.status()
        ));
    }

    let html = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from {}", url))?;

    let mut document = parse_html(&html)?;
    document.metadata.source = url.to_string();
    if document.content.is_empty() {
        warn!("No readable text found at {}", url);
    }

    Ok(document)
}

/// Extract text, title and language from an HTML page
fn parse_html(html: &str) -> Result<Document> {
    let page = Html::parse_document(html);

    let body = parse_selector("body")?;
    let title = parse_selector("title")?;
    let root = parse_selector("html")?;

    let mut lines = Vec::new();
    for element in page.select(&body) {
        for node in element.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().map_or(false, |el| {
                    matches!(el.name(), "script" | "style" | "noscript" | "template")
                })
            });
            if hidden {
                continue;
            }
            let line = text.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
    }

    let title = page
        .select(&title)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());
    let language = page
        .select(&root)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(str::to_string);

    Ok(Document {
        content: lines.join("\n"),
        metadata: DocumentMetadata {
            title,
            language,
            mime_type: "text/html".to_string(),
            ..Default::default()
        },
    })
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow::anyhow!("Invalid selector {}: {:?}", selector, e))
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // Add at most two newlines (paragraph break)
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            // Don't add consecutive spaces
            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}
