//! CSV preview normalization for bulk student invitation uploads
//!
//! Institutions upload student lists exported from a mix of tools (Excel,
//! LibreOffice, legacy information systems), so the raw bytes arrive with
//! unknown encoding and unknown column delimiter. This module produces a
//! best-effort preview of up to [`PREVIEW_ROW_LIMIT`] rows for human
//! confirmation before the import is committed.
//!
//! The whole pipeline is pure and never fails: every recognized error path
//! (undecodable bytes, malformed row, empty input) degrades to a partial or
//! empty result. Authoritative validation happens later, per row, in the
//! upload commit path.

use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1252;
use oem_cp::code_table::DECODING_TABLE_CP850;
use oem_cp::decode_string_complete_table;

/// Maximum number of rows returned by a preview
pub const PREVIEW_ROW_LIMIT: usize = 6;

/// Bytes with no assigned character in Windows-1252.
///
/// A strict 1252 decode fails on these; their presence sends detection to
/// the Latin-1 fallback instead.
const WINDOWS_1252_UNMAPPED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// Produce a preview of the uploaded bytes: detect encoding and delimiter,
/// parse up to [`PREVIEW_ROW_LIMIT`] rows, and repair mis-split rows.
///
/// Empty input yields an empty list. Never fails.
pub fn preview_rows(raw: &[u8]) -> Vec<Vec<String>> {
    let text = detect_encoding(raw);
    if text.is_empty() {
        return Vec::new();
    }
    let delimiter = detect_delimiter(&text);
    let rows = parse_rows(&text, delimiter);
    repair_rows(rows, delimiter)
}

/// Decode raw upload bytes into text, trying encodings in order:
///
/// 1. Strict UTF-8.
/// 2. Strict Windows-1252. If the decoded text contains U+201A, U+2026 or
///    U+2021 (glyphs typical of French accented bytes mis-read through a
///    Windows code page), the source is most likely CP850 (DOS Western
///    Europe), so decode as CP850 instead.
/// 3. Latin-1, mapping every byte to its code point. This step is total,
///    so the function always returns some text.
///
/// The CP850-vs-1252 heuristic is tuned to French samples and deliberately
/// kept narrow.
pub fn detect_encoding(raw: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(raw) {
        return text.to_string();
    }

    if let Some(text) = decode_windows_1252_strict(raw) {
        if text.contains('\u{201a}') || text.contains('\u{2026}') || text.contains('\u{2021}') {
            return decode_string_complete_table(raw, &DECODING_TABLE_CP850);
        }
        return text;
    }

    raw.iter().map(|&b| b as char).collect()
}

/// Strict Windows-1252 decode: fails when the input uses any of the five
/// code points the encoding leaves unassigned.
fn decode_windows_1252_strict(raw: &[u8]) -> Option<String> {
    if raw.iter().any(|b| WINDOWS_1252_UNMAPPED.contains(b)) {
        return None;
    }
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(raw);
    Some(text.into_owned())
}

/// Detect the column delimiter by counting candidates on the first line.
///
/// Semicolon or tab wins only with a strictly greater count than both
/// others; ties and empty input default to comma.
pub fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.is_empty() {
        return b',';
    }

    let semi = first_line.matches(';').count();
    let comma = first_line.matches(',').count();
    let tab = first_line.matches('\t').count();

    if semi > comma && semi > tab {
        b';'
    } else if tab > comma && tab > semi {
        b'\t'
    } else {
        b','
    }
}

/// Parse up to [`PREVIEW_ROW_LIMIT`] rows using the given delimiter.
///
/// A leading U+FEFF artifact (Excel UTF-8 exports) is stripped from the
/// first cell of the first row. A reader error aborts parsing and returns
/// whatever rows were already collected.
pub fn parse_rows(text: &str, delimiter: u8) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    if text.is_empty() {
        return rows;
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    for result in reader.records() {
        // The cap counts kept rows, not reader iterations; the reader
        // never yields fully blank records, so the two cannot diverge
        if rows.len() >= PREVIEW_ROW_LIMIT {
            break;
        }
        let record = match result {
            Ok(record) => record,
            Err(_) => break,
        };
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.is_empty() {
            continue;
        }
        if rows.is_empty() {
            if let Some(first) = row.first_mut() {
                if first.starts_with('\u{feff}') {
                    *first = first.replace('\u{feff}', "");
                }
            }
        }
        rows.push(row);
    }

    rows
}

/// Repair rows that collapsed into a single cell.
///
/// When a double-quoted full line was treated as one field, every row shows
/// up as a single cell whose content still contains the delimiter. In that
/// case strip one layer of surrounding double quotes from each such cell
/// and re-parse it; rows that already have multiple cells pass through
/// unchanged.
pub fn repair_rows(rows: Vec<Vec<String>>, delimiter: u8) -> Vec<Vec<String>> {
    let delim_char = delimiter as char;
    let collapsed = rows
        .first()
        .map(|first| first.len() == 1 && first[0].contains(delim_char))
        .unwrap_or(false);
    if !collapsed {
        return rows;
    }

    rows.into_iter()
        .map(|row| {
            if row.len() != 1 {
                return row;
            }
            match reparse_cell(&row[0], delimiter) {
                Some(cells) => cells,
                None => row,
            }
        })
        .collect()
}

/// Strip one layer of surrounding double quotes and parse the cell content
/// as a single CSV record. Returns `None` when no record comes out.
fn reparse_cell(cell: &str, delimiter: u8) -> Option<Vec<String>> {
    let content = if cell.len() >= 2 && cell.starts_with('"') && cell.ends_with('"') {
        &cell[1..cell.len() - 1]
    } else {
        cell
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => Some(record.iter().map(str::to_string).collect()),
        _ => None,
    }
}
