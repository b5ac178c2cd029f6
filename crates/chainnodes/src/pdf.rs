//! Minimal PDF writer for plain text documents.
//!
//! Produces US Letter pages set in the base-14 Helvetica font with
//! WinAnsiEncoding, so no font data is embedded. Text is limited to what
//! that encoding can carry (Latin-1 plus typographic quotes, dashes and a
//! few symbols); anything else is rejected rather than substituted.

use chaincore::NodeError;

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 72;
const FONT_SIZE: u32 = 11;
const LEADING: u32 = 14;
const TITLE_SIZE: u32 = 16;
const MAX_LINE_CHARS: usize = 90;

#[derive(Debug)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

pub fn render(title: Option<&str>, text: &str) -> Result<PdfDocument, NodeError> {
    let lines = wrap(text, MAX_LINE_CHARS);
    let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
    // the title takes two lines off the first page
    let title_lines = if title.is_some() { 2 } else { 0 };

    let mut pages: Vec<&[String]> = Vec::new();
    let first = (lines_per_page - title_lines).min(lines.len());
    pages.push(&lines[..first]);
    pages.extend(lines[first..].chunks(lines_per_page));

    let mut writer = ObjectWriter::new();
    // 1: catalog, 2: page tree, 3: body font, 4: title font, then a page and
    // a content stream per page
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 5 + 2 * i).collect();

    writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    writer.object(2, &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()));
    writer.object(
        3,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );
    writer.object(
        4,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );

    for (i, page_lines) in pages.iter().enumerate() {
        let page_id = page_ids[i];
        let content_id = page_id + 1;
        writer.object(
            page_id,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH, PAGE_HEIGHT, content_id
            ),
        );

        let heading = if i == 0 { title } else { None };
        writer.stream(content_id, &page_content(heading, page_lines)?);
    }

    Ok(PdfDocument {
        bytes: writer.finish(),
        pages: pages.len(),
    })
}

fn page_content(title: Option<&str>, lines: &[String]) -> Result<String, NodeError> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut ops = String::from("BT\n");
    ops.push_str(&format!("{} {} Td\n", MARGIN, top));
    if let Some(title) = title {
        ops.push_str(&format!("/F2 {} Tf\n({}) Tj\n", TITLE_SIZE, escape(title)?));
        ops.push_str(&format!("0 -{} Td\n", 2 * LEADING));
    }
    ops.push_str(&format!("/F1 {} Tf\n{} TL\n", FONT_SIZE, LEADING));
    for line in lines {
        ops.push_str(&format!("({}) Tj T*\n", escape(line)?));
    }
    ops.push_str("ET");
    Ok(ops)
}

/// Break text into lines of at most `width` characters, on word boundaries
/// where possible. Blank input lines are kept.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !line.is_empty() {
                    out.push(std::mem::take(&mut line));
                }
                out.push(word.drain(..width).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }

            let word_chars = word.chars().count();
            let needed = match line.chars().count() {
                0 => word_chars,
                used => used + 1 + word_chars,
            };
            if needed > width {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        out.push(line);
    }
    out
}

/// Encode text as the body of a PDF literal string. Bytes above ASCII are
/// written as octal escapes so the content stream stays 7-bit.
fn escape(text: &str) -> Result<String, NodeError> {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                escaped.push('\\');
                escaped.push(c);
            }
            ' '..='~' => escaped.push(c),
            '\t' => escaped.push_str("    "),
            '\r' => {}
            _ => match win_ansi(c) {
                Some(byte) => escaped.push_str(&format!("\\{:03o}", byte)),
                None => {
                    return Err(NodeError::ExecutionFailed(format!(
                        "PDF text contains '{}' (U+{:04X}), which the built-in font cannot encode",
                        c, c as u32
                    )))
                }
            },
        }
    }
    Ok(escaped)
}

/// WinAnsiEncoding code for a non-ASCII character
fn win_ansi(c: char) -> Option<u8> {
    let byte = match c {
        '\u{A0}'..='\u{FF}' => c as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '•' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Appends numbered objects and tracks their byte offsets for the xref table
struct ObjectWriter {
    buf: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl ObjectWriter {
    fn new() -> Self {
        Self {
            buf: b"%PDF-1.4\n".to_vec(),
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &str) {
        self.offsets.push((id, self.buf.len()));
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }

    fn stream(&mut self, id: usize, content: &str) {
        self.object(
            id,
            &format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        );
    }

    fn finish(mut self) -> Vec<u8> {
        self.offsets.sort_unstable();
        let xref_start = self.buf.len();
        let size = self.offsets.len() + 1;

        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for (_, offset) in &self.offsets {
            xref.push_str(&format!("{:010} 00000 n \n", offset));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref_start
        ));
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}
