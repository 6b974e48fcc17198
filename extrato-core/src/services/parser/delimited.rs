//! Bank CSV exports (comma or semicolon separated)

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};

use super::{AmountColumn, BankProfile, ParseReport, ParserOptions, StatementKind};
use crate::domain::{RawStatementRecord, TypeHint};

/// Description used when a row has neither description column filled
pub const CSV_PLACEHOLDER: &str = "Transação CSV";

/// Phrases banks use for balance and summary lines
const BALANCE_MARKERS: &[&str] = &[
    "saldo anterior",
    "saldo do dia",
    "saldo final",
    "saldo atual",
    "saldo disponivel",
    "saldo disponível",
    "saldo bloqueado",
    "saldo em conta",
    "s a l d o",
];

/// Fewest columns a split must produce to count as the row's layout
const MIN_COLUMNS: usize = 5;

pub(super) fn parse(content: &str, profile: &BankProfile, options: &ParserOptions) -> ParseReport {
    let mut report = ParseReport::new(StatementKind::Csv);

    // First line is always the header
    for (index, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_fields(line);
        match read_row(&fields, profile, options) {
            Row::Record(record) => report.records.push(record),
            Row::Balance => report.balance_rows += 1,
            Row::Unreadable(reason) => {
                tracing::debug!(line = index + 1, reason, "skipping statement line");
                report.skipped += 1;
            }
        }
    }

    report
}

enum Row {
    Record(RawStatementRecord),
    Balance,
    Unreadable(&'static str),
}

fn read_row(fields: &[String], profile: &BankProfile, options: &ParserOptions) -> Row {
    let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");

    let desc1 = field(profile.description);
    let desc2 = profile.detail.map(field).unwrap_or("");
    if is_balance_row(desc1, desc2, options.balance_marker_max_len) {
        return Row::Balance;
    }

    let Some(date) = fields.get(profile.date).and_then(|d| parse_date(d)) else {
        return Row::Unreadable("invalid date");
    };

    let raw_amount = match profile.amount {
        AmountColumn::Single(i) => field(i),
        AmountColumn::PreferSecond { first, second } => {
            let preferred = field(second);
            if preferred.is_empty() {
                field(first)
            } else {
                preferred
            }
        }
    };
    let Some(amount) = profile.number_format.parse(raw_amount) else {
        return Row::Unreadable("invalid amount");
    };

    let type_hint = if profile.labels_decide_type {
        profile
            .type_label
            .map(field)
            .and_then(TypeHint::from_label)
    } else {
        None
    };

    Row::Record(RawStatementRecord {
        date,
        description: pick_description(desc1, desc2, options.min_detail_len),
        amount,
        type_hint,
        external_id: None,
    })
}

/// Split a line into fields.
///
/// A quoted comma record (`"a","b"`) is read with commas. Anything else is
/// tried with semicolons first, since decimal commas and free text make a
/// bare comma split of a semicolon row look wide enough.
fn split_fields(line: &str) -> Vec<String> {
    if line.contains("\",\"") {
        return read_record(line, b',');
    }
    let semicolon = read_record(line, b';');
    if semicolon.len() >= MIN_COLUMNS {
        return semicolon;
    }
    let comma = read_record(line, b',');
    if comma.len() > semicolon.len() {
        comma
    } else {
        semicolon
    }
}

fn read_record(line: &str, delimiter: u8) -> Vec<String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record
            .iter()
            .map(|f| f.trim().trim_matches('"').trim().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether the row is an opening/closing balance or daily summary
fn is_balance_row(desc1: &str, desc2: &str, max_len: usize) -> bool {
    let combined = format!("{} {}", desc1, desc2).trim().to_lowercase();
    if combined.is_empty() {
        return false;
    }
    BALANCE_MARKERS.iter().any(|marker| {
        combined == *marker
            || (combined.starts_with(marker) && combined.chars().count() < max_len)
    })
}

fn pick_description(desc1: &str, desc2: &str, min_detail_len: usize) -> String {
    if desc2.chars().count() > min_detail_len {
        desc2.to_string()
    } else if !desc1.is_empty() {
        desc1.to_string()
    } else {
        CSV_PLACEHOLDER.to_string()
    }
}

/// `DD/MM/YYYY` or ISO `YYYY-MM-DD`, either optionally followed by a time
pub(super) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let read = |text: &str| {
        NaiveDate::parse_from_str(text, "%d/%m/%Y")
            .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
            .ok()
    };
    read(s).or_else(|| s.get(..10).and_then(read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::BankFormat;
    use rust_decimal::Decimal;

    fn parse_with(content: &str, format: BankFormat) -> ParseReport {
        parse(content, &format.profile(), &ParserOptions::default())
    }

    #[test]
    fn test_inter_salary_row() {
        let csv = "Data,Lançamento,Detalhes,Valor,Saldo,Tipo\n\
                   \"05/02/2026\",\"Salário\",\"\",\"5000,00\",\"5000,00\",\"Entrada\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 2, 5).unwrap());
        assert_eq!(record.description, "Salário");
        assert_eq!(record.amount, Decimal::new(500000, 2));
    }

    #[test]
    fn test_inter_prefers_second_value_and_detail() {
        let csv = "header\n\"10/02/2026\",\"Aluguel\",\"Pagamento boleto\",\"1200,00\",\"-1200,00\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        let record = &report.records[0];
        assert_eq!(record.description, "Pagamento boleto");
        assert_eq!(record.amount, Decimal::new(-120000, 2));
    }

    #[test]
    fn test_semicolon_fallback() {
        let csv = "Data;Historico;Detalhe;Valor;Saldo\n12/02/2026;Padaria;;-75,00;\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].description, "Padaria");
        assert_eq!(report.records[0].amount, Decimal::new(-7500, 2));
    }

    #[test]
    fn test_balance_rows_dropped() {
        let csv = "header\n\
                   \"01/02/2026\",\"SALDO ANTERIOR\",\"\",\"\",\"1000,00\"\n\
                   \"03/02/2026\",\"Saldo do dia\",\"\",\"\",\"900,00\"\n\
                   \"04/02/2026\",\"PAGAMENTO SALDO CARTAO XPTO\",\"\",\"-100,00\",\"\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.balance_rows, 2);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].description, "PAGAMENTO SALDO CARTAO XPTO");
    }

    #[test]
    fn test_long_description_starting_with_marker_is_kept() {
        assert!(is_balance_row("Saldo anterior", "", 30));
        assert!(is_balance_row("saldo final 28/02", "", 30));
        assert!(!is_balance_row(
            "saldo anterior transferido para conta investimento",
            "",
            30
        ));
        assert!(!is_balance_row("Transferência", "saldo", 30));
    }

    #[test]
    fn test_bb_labels_decide_type() {
        let csv = "Data;Lançamento;Detalhes;N° documento;Valor;Tipo Lançamento\n\
                   15/02/2026;Pix - Recebido;Maria Silva;123;150,00;Entrada\n\
                   16/02/2026;Pagamento de Boleto;Energia;124;89,90;Saída\n";
        let report = parse_with(csv, BankFormat::BancoDoBrasil);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].type_hint, Some(TypeHint::Entrada));
        assert_eq!(report.records[0].description, "Maria Silva");
        assert_eq!(report.records[1].type_hint, Some(TypeHint::Saida));
        assert_eq!(report.records[1].amount, Decimal::new(8990, 2));
    }

    #[test]
    fn test_bb_credit_debit_letters() {
        let csv = "Data;Lançamento;Detalhes;N° documento;Valor;Tipo Lançamento\n\
                   20/02/2026;Pix - Recebido;Joana;201;300,00;C\n\
                   21/02/2026;Tarifa;Pacote de serviços;202;35,00;D\n";
        let report = parse_with(csv, BankFormat::BancoDoBrasil);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].type_hint, Some(TypeHint::Credit));
        assert_eq!(report.records[1].type_hint, Some(TypeHint::Debit));
    }

    #[test]
    fn test_nubank_layout() {
        let csv = "Data,Valor,Identificador,Descrição\n\
                   18/02/2026,-45.90,67a1b2c3-0000,Uber Trip\n\
                   19/02/2026,1500.00,67a1b2c3-0001,Transferência recebida\n";
        let report = parse_with(csv, BankFormat::Nubank);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].amount, Decimal::new(-4590, 2));
        assert_eq!(report.records[0].description, "Uber Trip");
        assert_eq!(report.records[1].amount, Decimal::new(150000, 2));
    }

    #[test]
    fn test_bad_lines_are_skipped_not_raised() {
        let csv = "header\n\
                   \"99/99/2026\",\"Bad date\",\"\",\"10,00\",\"\"\n\
                   \"20/02/2026\",\"Bad amount\",\"\",\"abc\",\"\"\n\
                   \n\
                   \"21/02/2026\",\"Mercado\",\"\",\"-32,10\",\"\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn test_placeholder_description() {
        let csv = "header\n\"22/02/2026\",\"\",\"\",\"-5,00\",\"\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.records[0].description, CSV_PLACEHOLDER);
    }

    #[test]
    fn test_iso_dates_pass_through() {
        assert_eq!(parse_date("2026-02-05"), NaiveDate::from_ymd_opt(2026, 2, 5));
        assert_eq!(parse_date("2026-02-05T10:00:00"), NaiveDate::from_ymd_opt(2026, 2, 5));
        assert_eq!(parse_date("05/02/2026"), NaiveDate::from_ymd_opt(2026, 2, 5));
        assert_eq!(parse_date("garbage"), None);
    }

    #[test]
    fn test_brazilian_date_with_time() {
        assert_eq!(parse_date("05/02/2026 14:32"), NaiveDate::from_ymd_opt(2026, 2, 5));
        assert_eq!(parse_date("05/02/2026 14:32:10"), NaiveDate::from_ymd_opt(2026, 2, 5));
        assert_eq!(parse_date("05/02/20"), None);

        let csv = "header\n\"05/02/2026 09:15\",\"Padaria\",\"\",\"-12,00\",\"\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_semicolon_row_with_commas_in_detail() {
        let csv = "Data;Lançamento;Detalhes;N° documento;Valor;Tipo Lançamento\n\
                   16/02/2026;Compra com Cartão;LOJA X, SAO PAULO, SP, BR, 01/02;124;89,90;Saída\n";
        let report = parse_with(csv, BankFormat::BancoDoBrasil);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.records.len(), 1);
        let record = &report.records[0];
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 2, 16).unwrap());
        assert_eq!(record.description, "LOJA X, SAO PAULO, SP, BR, 01/02");
        assert_eq!(record.amount, Decimal::new(8990, 2));
        assert_eq!(record.type_hint, Some(TypeHint::Saida));
    }

    #[test]
    fn test_quoted_comma_row_with_semicolons_in_text() {
        let csv = "header\n\"07/02/2026\",\"Pix; enviado\",\"Joao; Maria; Jose\",\"-20,00\",\"\"\n";
        let report = parse_with(csv, BankFormat::Inter);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].description, "Joao; Maria; Jose");
        assert_eq!(report.records[0].amount, Decimal::new(-2000, 2));
    }

    #[test]
    fn test_header_only_is_empty() {
        let report = parse_with("Data,Descricao,Valor\n", BankFormat::Inter);
        assert!(report.is_empty());
        assert_eq!(report.skipped, 0);
    }
}
