//! Plain-text extraction for uploaded documents.
//!
//! PDFs are extracted page by page so chunks can carry a page number.
//! DOCX text is read from `word/document.xml`; RTF is reduced to its text
//! runs by dropping control words and non-text destinations.

use encoding_rs::Encoding;
use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Destinations whose content is never document text.
const RTF_SKIP_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
    "headerl",
    "headerr",
    "footerl",
    "footerr",
    "object",
    "generator",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "xmlnstbl",
    "themedata",
    "colorschememapping",
    "latentstyles",
    "datastore",
    "filetbl",
    "revtbl",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Rtf,
    Txt,
}

impl FileKind {
    /// Resolve the kind from a filename's extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "docx" => Some(FileKind::Docx),
            "rtf" => Some(FileKind::Rtf),
            "txt" => Some(FileKind::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Rtf => "rtf",
            FileKind::Txt => "txt",
        }
    }
}

/// A run of extracted text; `page` is 1-based and set for PDFs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub page: Option<u32>,
    pub text: String,
}

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFileType(String),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFileType(name) => {
                write!(f, "unsupported file type: {}", name)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract text sections from file bytes, dispatching on the filename's extension.
pub fn extract_sections(bytes: &[u8], filename: &str) -> Result<Vec<Section>, ExtractError> {
    let kind = FileKind::from_filename(filename)
        .ok_or_else(|| ExtractError::UnsupportedFileType(filename.to_string()))?;

    match kind {
        FileKind::Pdf => extract_pdf_pages(bytes),
        FileKind::Docx => Ok(vec![Section {
            page: None,
            text: extract_docx(bytes)?,
        }]),
        FileKind::Rtf => Ok(vec![Section {
            page: None,
            text: strip_rtf(&String::from_utf8_lossy(bytes)),
        }]),
        FileKind::Txt => Ok(vec![Section {
            page: None,
            text: String::from_utf8_lossy(bytes).into_owned(),
        }]),
    }
}

/// Pages with no text are dropped; page numbers of the rest are preserved.
fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<Section>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| Section {
            page: Some(i as u32 + 1),
            text,
        })
        .collect())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraph_text(&doc_xml)
}

/// Collect `<w:t>` runs, one line per `<w:p>` paragraph.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) if e.local_name().as_ref() == b"tab" => {
                out.push('\t');
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

struct RtfGroup {
    skip: bool,
    uc: usize,
}

/// Plain text accumulated from an RTF body.
///
/// `\'hh` escapes are buffered as raw bytes and decoded with the document's
/// `\ansicpg` code page when a regular character follows.
struct RtfText {
    out: String,
    bytes: Vec<u8>,
    encoding: &'static Encoding,
}

impl RtfText {
    fn new() -> Self {
        Self {
            out: String::new(),
            bytes: Vec::new(),
            encoding: encoding_rs::WINDOWS_1252,
        }
    }

    fn push(&mut self, c: char) {
        self.flush();
        self.out.push(c);
    }

    fn push_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    fn set_codepage(&mut self, codepage: i32) {
        self.flush();
        match codepage_encoding(codepage) {
            Some(encoding) => self.encoding = encoding,
            None => tracing::debug!(
                codepage,
                encoding = self.encoding.name(),
                "unsupported RTF code page, keeping current encoding"
            ),
        }
    }

    fn flush(&mut self) {
        if self.bytes.is_empty() {
            return;
        }
        let (decoded, _) = self.encoding.decode_without_bom_handling(&self.bytes);
        self.out.push_str(&decoded);
        self.bytes.clear();
    }

    fn finish(mut self) -> String {
        self.flush();
        self.out
    }
}

/// Windows code page number to decoder.
fn codepage_encoding(codepage: i32) -> Option<&'static Encoding> {
    let encoding = match codepage {
        1252 | 28591 => encoding_rs::WINDOWS_1252,
        866 => encoding_rs::IBM866,
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 | 54936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        10000 => encoding_rs::MACINTOSH,
        20866 => encoding_rs::KOI8_R,
        65001 => encoding_rs::UTF_8,
        _ => return None,
    };
    Some(encoding)
}

/// Reduce RTF markup to plain text.
///
/// Paragraph and line breaks become newlines; horizontal whitespace is
/// collapsed and blank-line runs are limited to one.
pub fn strip_rtf(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut text = RtfText::new();
    let mut stack: Vec<RtfGroup> = Vec::new();
    let mut skip = false;
    let mut uc = 1usize;
    let mut fallback_to_skip = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                stack.push(RtfGroup { skip, uc });
                fallback_to_skip = 0;
                i += 1;
            }
            '}' => {
                if let Some(group) = stack.pop() {
                    skip = group.skip;
                    uc = group.uc;
                }
                fallback_to_skip = 0;
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                match next {
                    '\\' | '{' | '}' => {
                        emit(&mut text, skip, &mut fallback_to_skip, next);
                        i += 1;
                    }
                    '\'' => {
                        let hex: String = chars.iter().skip(i + 1).take(2).collect();
                        i += 1 + hex.len();
                        if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                            if fallback_to_skip > 0 {
                                fallback_to_skip -= 1;
                            } else if !skip {
                                text.push_byte(byte);
                            }
                        }
                    }
                    '*' => {
                        skip = true;
                        i += 1;
                    }
                    '~' => {
                        emit(&mut text, skip, &mut fallback_to_skip, ' ');
                        i += 1;
                    }
                    '_' => {
                        emit(&mut text, skip, &mut fallback_to_skip, '-');
                        i += 1;
                    }
                    '\n' | '\r' => {
                        if !skip {
                            text.push('\n');
                        }
                        i += 1;
                    }
                    c if c.is_ascii_alphabetic() => {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_alphabetic() {
                            i += 1;
                        }
                        let word: String = chars[start..i].iter().collect();

                        let param_start = i;
                        if i < chars.len() && chars[i] == '-' {
                            i += 1;
                        }
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        let param: Option<i32> = chars[param_start..i]
                            .iter()
                            .collect::<String>()
                            .parse()
                            .ok();

                        if i < chars.len() && chars[i] == ' ' {
                            i += 1;
                        }

                        match word.as_str() {
                            "par" | "line" | "sect" | "page" | "row" => {
                                if !skip {
                                    text.push('\n');
                                }
                            }
                            "tab" | "cell" => {
                                if !skip {
                                    text.push('\t');
                                }
                            }
                            "ansicpg" => {
                                if let Some(codepage) = param {
                                    text.set_codepage(codepage);
                                }
                            }
                            "uc" => uc = param.unwrap_or(1).max(0) as usize,
                            "u" => {
                                if let Some(code) = param {
                                    let code = if code < 0 { code + 65536 } else { code };
                                    if let Some(ch) = char::from_u32(code as u32) {
                                        if !skip {
                                            text.push(ch);
                                        }
                                    }
                                }
                                fallback_to_skip = uc;
                            }
                            w if RTF_SKIP_DESTINATIONS.contains(&w) => skip = true,
                            _ => {}
                        }
                    }
                    _ => {
                        // Unknown control symbol.
                        i += 1;
                    }
                }
            }
            '\r' | '\n' => i += 1,
            _ => {
                emit(&mut text, skip, &mut fallback_to_skip, c);
                i += 1;
            }
        }
    }

    normalize_whitespace(&text.finish())
}

/// Push a text character unless it is a `\\u` fallback or inside a skipped group.
fn emit(text: &mut RtfText, skip: bool, pending: &mut usize, c: char) {
    if *pending > 0 {
        *pending -= 1;
    } else if !skip {
        text.push(c);
    }
}

fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(collapsed);
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_filename("a.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_filename("b.rtf"), Some(FileKind::Rtf));
        assert_eq!(FileKind::from_filename("c.docx"), Some(FileKind::Docx));
        assert_eq!(FileKind::from_filename("d.txt"), Some(FileKind::Txt));
        assert_eq!(FileKind::from_filename("e.png"), None);
        assert_eq!(FileKind::from_filename("noext"), None);
    }

    #[test]
    fn unsupported_file_type_returns_error() {
        let err = extract_sections(b"foo", "image.png").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFileType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_sections(b"not a pdf", "broken.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_sections(b"not a zip", "broken.docx").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn txt_is_passed_through() {
        let sections = extract_sections("Plain notes.\n".as_bytes(), "notes.txt").unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].page, None);
        assert_eq!(sections[0].text, "Plain notes.\n");
    }

    #[test]
    fn rtf_control_words_are_removed() {
        let rtf = r"{\rtf1\ansi\deff0{\fonttbl{\f0 Times New Roman;}}{\colortbl;\red0\green0\blue0;}
\f0\fs24 Our \b pricing\b0  starts at 299.\par
Classes run weekly.\par}";
        let text = strip_rtf(rtf);
        assert_eq!(text, "Our pricing starts at 299.\nClasses run weekly.");
    }

    #[test]
    fn rtf_escapes_and_unicode() {
        let rtf = r"{\rtf1 Caf\'e9 \{braces\} \\ slash \u20320?\u22909? ok}";
        let text = strip_rtf(rtf);
        assert_eq!(text, "Café {braces} \\ slash 你好 ok");
    }

    #[test]
    fn rtf_hex_escapes_follow_ansi_code_page() {
        let rtf = r"{\rtf1\ansi\ansicpg936 \'c4\'e3\'ba\'c3 ok}";
        assert_eq!(strip_rtf(rtf), "你好 ok");

        let rtf = r"{\rtf1\ansi\ansicpg1251 \'cf\'f0\'e8\'e2\'e5\'f2}";
        assert_eq!(strip_rtf(rtf), "Привет");

        let rtf = r"{\rtf1\ansi\ansicpg936\uc2 \u20320\'c4\'e3 done}";
        assert_eq!(strip_rtf(rtf), "你 done");
    }

    #[test]
    fn rtf_ignorable_destinations_are_skipped() {
        let rtf = r"{\rtf1{\*\generator Riched20;}{\info{\title Secret}}Visible text}";
        assert_eq!(strip_rtf(rtf), "Visible text");
    }
}
