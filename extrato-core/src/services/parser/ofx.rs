//! OFX/QFX statements (SGML or XML flavoured)

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{ParseReport, StatementKind};
use crate::domain::{RawStatementRecord, TypeHint};

/// Description used when a block has neither MEMO nor NAME
pub const OFX_PLACEHOLDER: &str = "Transação Desconhecida";

const OPEN: &str = "<STMTTRN>";
const CLOSE: &str = "</STMTTRN>";

pub(super) fn looks_like_ofx(content: &str) -> bool {
    let upper = content.to_ascii_uppercase();
    upper.contains(OPEN) || upper.contains("<OFX>")
}

pub(super) fn parse(content: &str) -> ParseReport {
    let mut report = ParseReport::new(StatementKind::Ofx);
    // ASCII uppercasing keeps byte offsets identical to `content`
    let upper = content.to_ascii_uppercase();

    let mut cursor = 0;
    while let Some(found) = upper[cursor..].find(OPEN) {
        let start = cursor + found + OPEN.len();
        let Some(len) = upper[start..].find(CLOSE) else {
            tracing::debug!(offset = start, "unterminated STMTTRN block");
            report.skipped += 1;
            break;
        };
        let end = start + len;

        match read_block(&content[start..end], &upper[start..end]) {
            Some(record) => report.records.push(record),
            None => {
                tracing::debug!(offset = start, "skipping unreadable STMTTRN block");
                report.skipped += 1;
            }
        }
        cursor = end + CLOSE.len();
    }

    report
}

fn read_block(block: &str, upper: &str) -> Option<RawStatementRecord> {
    let tag = |name: &str| tag_value(block, upper, name);

    let date = parse_posted(&tag("DTPOSTED")?)?;
    let amount = parse_amount(&tag("TRNAMT")?)?;
    let type_hint = tag("TRNTYPE").and_then(|t| TypeHint::from_label(&t));
    let description = tag("MEMO")
        .or_else(|| tag("NAME"))
        .map(|d| decode_entities(&d))
        .unwrap_or_else(|| OFX_PLACEHOLDER.to_string());
    let external_id = tag("FITID").filter(|id| !id.is_empty());

    Some(RawStatementRecord {
        date,
        description,
        amount,
        type_hint,
        external_id,
    })
}

/// Value after `<NAME>`, up to the next `<` or line break
fn tag_value(block: &str, upper: &str, name: &str) -> Option<String> {
    let open = format!("<{}>", name);
    let start = upper.find(&open)? + open.len();
    let rest = &block[start..];
    let end = rest.find(['<', '\n', '\r']).unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// `YYYYMMDD[HHMMSS][.XXX][TZ]`; only the date components are used
fn parse_posted(raw: &str) -> Option<NaiveDate> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).take(8).collect();
    if digits.len() < 8 {
        return None;
    }
    NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim().trim_start_matches('+');
    let normalized = if s.contains(',') && !s.contains('.') {
        s.replace(',', ".")
    } else {
        s.replace(',', "")
    };
    Decimal::from_str(&normalized).ok()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
