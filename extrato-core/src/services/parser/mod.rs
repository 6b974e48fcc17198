//! Statement parser - CSV bank exports and OFX/QFX into raw records
//!
//! Parsing is lenient: a line or block that cannot be read is counted and
//! skipped, never raised. An empty result is the caller's problem.

mod delimited;
mod ofx;

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::RawStatementRecord;

/// Supported CSV layouts. OFX needs no selector: it is detected from its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankFormat {
    /// Banco Inter and the generic six-column layout
    #[default]
    Inter,
    Nubank,
    BancoDoBrasil,
}

impl BankFormat {
    pub const ALL: [BankFormat; 3] = [BankFormat::Inter, BankFormat::Nubank, BankFormat::BancoDoBrasil];

    pub fn as_str(&self) -> &'static str {
        match self {
            BankFormat::Inter => "inter",
            BankFormat::Nubank => "nubank",
            BankFormat::BancoDoBrasil => "bb",
        }
    }

    /// Column mapping for this format
    pub fn profile(&self) -> BankProfile {
        match self {
            BankFormat::Inter => BankProfile {
                date: 0,
                description: 1,
                detail: Some(2),
                amount: AmountColumn::PreferSecond { first: 3, second: 4 },
                type_label: Some(5),
                labels_decide_type: false,
                number_format: NumberFormat::Brazilian,
            },
            BankFormat::Nubank => BankProfile {
                date: 0,
                description: 3,
                detail: None,
                amount: AmountColumn::Single(1),
                type_label: None,
                labels_decide_type: false,
                number_format: NumberFormat::Plain,
            },
            BankFormat::BancoDoBrasil => BankProfile {
                date: 0,
                description: 1,
                detail: Some(2),
                amount: AmountColumn::Single(4),
                type_label: Some(5),
                labels_decide_type: true,
                number_format: NumberFormat::Brazilian,
            },
        }
    }
}

impl std::fmt::Display for BankFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BankFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "inter" | "generic" | "banco_inter" => Ok(BankFormat::Inter),
            "nubank" | "nu" => Ok(BankFormat::Nubank),
            "bb" | "banco_do_brasil" | "bancodobrasil" => Ok(BankFormat::BancoDoBrasil),
            other => Err(format!(
                "unknown bank format '{}' (expected one of: inter, nubank, bb)",
                other
            )),
        }
    }
}

/// Where the amount lives in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountColumn {
    Single(usize),
    /// Use `second` when it is non-empty, otherwise `first`
    PreferSecond { first: usize, second: usize },
}

/// Decimal notation used by a bank export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// `1.234,56`
    Brazilian,
    /// `1234.56`
    Plain,
}

impl NumberFormat {
    /// Parse an amount, tolerating currency symbols, spaces and `(x)` negatives.
    /// Returns None when nothing numeric is left.
    pub fn parse(&self, raw: &str) -> Option<Decimal> {
        let s = raw.trim();
        let (negated, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            Some(inner) => (true, inner),
            None => (false, s),
        };

        let kept: String = s
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
            .collect();

        let normalized = match self {
            NumberFormat::Brazilian => kept.replace('.', "").replace(',', "."),
            NumberFormat::Plain => kept.replace(',', ""),
        };
        if normalized.is_empty() || normalized == "-" {
            return None;
        }

        let amount = Decimal::from_str(&normalized).ok()?;
        Some(if negated { -amount.abs() } else { amount })
    }
}

/// Column layout of one bank's CSV export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankProfile {
    pub date: usize,
    pub description: usize,
    /// Richer description column, preferred when long enough
    pub detail: Option<usize>,
    pub amount: AmountColumn,
    pub type_label: Option<usize>,
    /// Whether the type label decides direction instead of the amount's sign
    pub labels_decide_type: bool,
    pub number_format: NumberFormat,
}

/// Tunables for the CSV heuristics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserOptions {
    /// A description starting with a balance marker is a balance row only below this length
    pub balance_marker_max_len: usize,
    /// The detail column must be longer than this to replace the main description
    pub min_detail_len: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            balance_marker_max_len: 30,
            min_detail_len: 3,
        }
    }
}

/// How the statement was read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Csv,
    Ofx,
}

/// Parser output: the records plus how much was thrown away
#[derive(Debug, Clone, PartialEq)]
pub struct ParseReport {
    pub kind: StatementKind,
    pub records: Vec<RawStatementRecord>,
    /// Lines/blocks that could not be read
    pub skipped: usize,
    /// Balance and summary rows filtered out on purpose
    pub balance_rows: usize,
}

impl ParseReport {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
            skipped: 0,
            balance_rows: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a statement. OFX/QFX content is detected from its tags and ignores `format`.
pub fn parse_statement(content: &str, format: BankFormat, options: &ParserOptions) -> ParseReport {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if ofx::looks_like_ofx(content) {
        ofx::parse(content)
    } else {
        delimited::parse(content, &format.profile(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TypeHint;
    use chrono::NaiveDate;

    #[test]
    fn test_bank_format_from_str() {
        assert_eq!("INTER".parse::<BankFormat>().unwrap(), BankFormat::Inter);
        assert_eq!("generic".parse::<BankFormat>().unwrap(), BankFormat::Inter);
        assert_eq!("Nubank".parse::<BankFormat>().unwrap(), BankFormat::Nubank);
        assert_eq!("bb".parse::<BankFormat>().unwrap(), BankFormat::BancoDoBrasil);
        assert_eq!("banco-do-brasil".parse::<BankFormat>().unwrap(), BankFormat::BancoDoBrasil);
        assert!("itau".parse::<BankFormat>().is_err());
    }

    #[test]
    fn test_brazilian_amounts() {
        let f = NumberFormat::Brazilian;
        assert_eq!(f.parse("5000,00"), Some(Decimal::new(500000, 2)));
        assert_eq!(f.parse("-1.200,50"), Some(Decimal::new(-120050, 2)));
        assert_eq!(f.parse("R$ 45,90"), Some(Decimal::new(4590, 2)));
        assert_eq!(f.parse("(10,00)"), Some(Decimal::new(-1000, 2)));
        assert_eq!(f.parse(""), None);
        assert_eq!(f.parse("abc"), None);
    }

    #[test]
    fn test_plain_amounts() {
        let f = NumberFormat::Plain;
        assert_eq!(f.parse("-45.90"), Some(Decimal::new(-4590, 2)));
        assert_eq!(f.parse("1,234.56"), Some(Decimal::new(123456, 2)));
        assert_eq!(f.parse("-"), None);
    }

    #[test]
    fn test_ofx_detected_regardless_of_format() {
        let ofx = "OFXHEADER:100\n<OFX><BANKTRANLIST>\n<STMTTRN>\n<TRNTYPE>DEBIT\n<DTPOSTED>20260218\n<TRNAMT>-10.00\n<FITID>A1\n<MEMO>CAFE\n</STMTTRN>\n</BANKTRANLIST></OFX>";
        let report = parse_statement(ofx, BankFormat::Nubank, &ParserOptions::default());
        assert_eq!(report.kind, StatementKind::Ofx);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].external_id.as_deref(), Some("A1"));
    }

    #[test]
    fn test_bom_is_ignored() {
        let csv = "\u{feff}Data,Lançamento,Detalhes,Valor,Saldo,Tipo\n\"05/02/2026\",\"Salário\",\"\",\"5000,00\",\"5000,00\",\"Entrada\"\n";
        let report = parse_statement(csv, BankFormat::Inter, &ParserOptions::default());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].date, NaiveDate::from_ymd_opt(2026, 2, 5).unwrap());
        assert_eq!(report.records[0].type_hint, None::<TypeHint>);
    }
}
