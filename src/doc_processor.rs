use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

/// Extensions the upload form accepts.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown", "docx", "doc"];

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("Unsupported file type: .{0}")]
    Unsupported(String),
    #[error("Legacy .doc files are not supported, save the file as .docx and upload again")]
    LegacyDoc,
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Pdf(String),
    #[error("DOCX parse error: {0}")]
    Docx(String),
}

/// Parsed document content
pub struct ParsedDocument {
    pub content: String,
    pub file_type: String,
}

pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Parse a document file into plain text
pub fn parse_file(path: &Path) -> Result<ParsedDocument, DocError> {
    let ext = file_extension(path);

    match ext.as_str() {
        "txt" => {
            let content = read_text(path)?;
            Ok(ParsedDocument {
                content,
                file_type: "txt".into(),
            })
        }
        "md" | "markdown" => {
            let content = read_text(path)?;
            Ok(ParsedDocument {
                content,
                file_type: "md".into(),
            })
        }
        "pdf" => {
            let bytes = fs::read(path)?;
            let content = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| DocError::Pdf(e.to_string()))?;
            Ok(ParsedDocument {
                content,
                file_type: "pdf".into(),
            })
        }
        "docx" => {
            let bytes = fs::read(path)?;
            Ok(ParsedDocument {
                content: docx_text(&bytes)?,
                file_type: "docx".into(),
            })
        }
        "doc" => Err(DocError::LegacyDoc),
        _ => Err(DocError::Unsupported(ext)),
    }
}

/// Plain text files are not always UTF-8; fall back to a lossy decode.
fn read_text(path: &Path) -> Result<String, DocError> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn docx_markup() -> &'static Regex {
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    MARKUP.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|</w:p>|<w:tab/>|<w:br/>")
            .expect("static regex")
    })
}

/// Pull the body text out of `word/document.xml`, one line per paragraph.
pub fn docx_text(bytes: &[u8]) -> Result<String, DocError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| DocError::Docx(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| DocError::Docx(e.to_string()))?
        .read_to_string(&mut xml)?;

    Ok(docx_xml_to_text(&xml))
}

fn docx_xml_to_text(xml: &str) -> String {
    let mut out = String::new();
    for caps in docx_markup().captures_iter(xml) {
        match caps.get(1) {
            Some(text) => out.push_str(&unescape_xml(text.as_str())),
            None => match &caps[0] {
                "</w:p>" | "<w:br/>" => out.push('\n'),
                _ => out.push('\t'),
            },
        }
    }
    out.trim().to_string()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Split text into overlapping chunks for embedding. Sizes are in characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size - overlap.min(chunk_size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        if end >= chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
