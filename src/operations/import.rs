//! File imports: headerless CSV and ISO 20022 camt.053 bank statements.
//!
//! A file is imported in one database transaction, so a bad line leaves the
//! store untouched. Rows already present (same date, description, amount and
//! type) are skipped rather than duplicated.

use super::add::{MAX_DESCRIPTION_LEN, TransactionForm, create_transaction};
use crate::db::{category_repository, repository, rule_repository};
use crate::error::{AppError, AppResult};
use crate::models::rule::CategoryRule;
use crate::models::transaction::{Transaction, TransactionType};
use crate::money::parse_cents;
use crate::operations::categories::{find_category, get_or_create_category};
use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use regex::{Regex, RegexBuilder};
use rusqlite::Connection;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

pub const UNCATEGORISED: &str = "Uncategorised";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    Camt053,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// One booked entry of a bank statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementEntry {
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub credit: bool,
    pub description: String,
}

pub(crate) fn compile(pattern: &str) -> AppResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| AppError::validation(format!("Invalid pattern '{}': {}", pattern, e)))
}

/// Description patterns in rule id order; the first match wins.
pub struct CategoryMatcher {
    rules: Vec<(Regex, String)>,
}

impl CategoryMatcher {
    pub fn load(conn: &Connection) -> AppResult<Self> {
        let rules = rule_repository::get_all_rules(conn)?
            .into_iter()
            .map(|rule| Ok((compile(&rule.pattern)?, rule.category_id)))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(CategoryMatcher { rules })
    }

    pub fn category_for(&self, description: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(description))
            .map(|(_, category_id)| category_id.as_str())
    }
}

pub fn add_category_rule(conn: &Connection, pattern: &str, category: &str) -> AppResult<CategoryRule> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(AppError::validation("Pattern cannot be empty"));
    }
    compile(pattern)?;
    let category = find_category(conn, category)?;
    let id = rule_repository::add_rule(conn, pattern, &category.id)?;
    info!(id, pattern, category = %category.name, "category rule added");
    Ok(CategoryRule {
        id,
        pattern: pattern.to_string(),
        category_id: category.id,
    })
}

pub fn list_category_rules(conn: &Connection) -> AppResult<Vec<CategoryRule>> {
    rule_repository::get_all_rules(conn)
}

pub fn remove_category_rule(conn: &Connection, id: i64) -> AppResult<()> {
    rule_repository::remove_rule(conn, id)
}

pub fn import_transactions_to_db(
    conn: &Connection,
    format: ImportFormat,
    path: &Path,
    today: NaiveDate,
) -> AppResult<ImportSummary> {
    let summary = match format {
        ImportFormat::Csv => import_csv(conn, path, today)?,
        ImportFormat::Camt053 => import_camt053(conn, path, today)?,
    };
    info!(
        path = %path.display(),
        imported = summary.imported,
        skipped = summary.skipped,
        "import finished"
    );
    Ok(summary)
}

fn open_failed(path: &Path, e: std::io::Error) -> AppError {
    AppError::validation(format!("Failed to open file '{}': {}", path.display(), e))
}

/// Writes parsed transactions, skipping the ones already stored.
fn store_all(conn: &Connection, transactions: &[Transaction]) -> AppResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    for transaction in transactions {
        if repository::is_duplicate(conn, transaction)? {
            debug!(date = %transaction.date, description = %transaction.description, "duplicate skipped");
            summary.skipped += 1;
            continue;
        }
        repository::add_transaction(conn, transaction)?;
        summary.imported += 1;
    }
    Ok(summary)
}

/// Columns: `date, description, amount, type, category[, notes]`. An empty
/// category is filled from the category rules; a named one is created when
/// missing.
pub fn import_csv(conn: &Connection, path: &Path, today: NaiveDate) -> AppResult<ImportSummary> {
    let file = File::open(path).map_err(|e| open_failed(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let tx = conn.unchecked_transaction()?;
    let matcher = CategoryMatcher::load(&tx)?;
    let mut transactions = Vec::new();

    for (line_index, result) in reader.records().enumerate() {
        let fallback_line = line_index as u64 + 1;
        let record = result.map_err(|e| {
            AppError::validation(format!("CSV parse error on line {}: {}", fallback_line, e))
        })?;
        let line = record.position().map_or(fallback_line, |p| p.line());

        if record.len() != 5 && record.len() != 6 {
            return Err(AppError::validation(format!(
                "Invalid number of columns on line {}: expected 5 or 6, got {}",
                line,
                record.len()
            )));
        }

        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let description = field(1);
        let category = match field(4) {
            name if name.is_empty() => matcher.category_for(&description).map(str::to_string),
            name => Some(
                get_or_create_category(&tx, &name)
                    .map_err(|e| AppError::validation(format!("Line {}: {}", line, e)))?
                    .id,
            ),
        };
        let form = TransactionForm {
            date: field(0),
            description,
            amount: field(2),
            transaction_type: field(3),
            category,
            notes: record.get(5).map(str::to_string),
            ..Default::default()
        };

        let transaction = create_transaction(&tx, &form, today)
            .map_err(|e| AppError::validation(format!("Line {}: {}", line, e)))?;
        transactions.push(transaction);
    }

    let summary = store_all(&tx, &transactions)?;
    tx.commit()?;
    Ok(summary)
}

fn truncate_description(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return "Bank transaction".to_string();
    }
    text.chars().take(MAX_DESCRIPTION_LEN).collect()
}

#[derive(Default)]
struct EntryBuilder {
    amount: Option<String>,
    indicator: Option<String>,
    booking_date: Option<String>,
    additional_info: Option<String>,
    remittance: Vec<String>,
}

impl EntryBuilder {
    fn finish(self, index: usize) -> AppResult<StatementEntry> {
        let missing = |what: &str| AppError::validation(format!("Entry {}: missing {}", index, what));

        let amount = self.amount.ok_or_else(|| missing("Amt"))?;
        let amount_cents = parse_cents(&amount)
            .map_err(|e| AppError::validation(format!("Entry {}: {}", index, e)))?
            .abs();
        let credit = match self.indicator.as_deref().map(str::trim) {
            Some("CRDT") => true,
            Some("DBIT") => false,
            Some(other) => {
                return Err(AppError::validation(format!(
                    "Entry {}: unknown credit/debit indicator '{}'",
                    index, other
                )));
            }
            None => return Err(missing("CdtDbtInd")),
        };
        let raw_date = self.booking_date.ok_or_else(|| missing("BookgDt"))?;
        let date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(&raw_date), "%Y-%m-%d")
            .map_err(|_| AppError::validation(format!("Entry {}: invalid booking date '{}'", index, raw_date)))?;
        let description = self
            .additional_info
            .unwrap_or_else(|| self.remittance.join(" "));

        Ok(StatementEntry {
            date,
            amount_cents,
            credit,
            description: truncate_description(&description),
        })
    }
}

/// Reads the booked entries (`Ntry`) of a camt.053 statement.
pub fn parse_camt053(xml: &str) -> AppResult<Vec<StatementEntry>> {
    let mut reader = Reader::from_str(xml);

    let mut path: Vec<String> = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut entries = Vec::new();
    // Text of the innermost open element. quick-xml reports entity references
    // as separate events, so the pieces are joined here before use.
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "Ntry" {
                    current = Some(EntryBuilder::default());
                }
                path.push(name);
                text.clear();
            }
            Event::End(e) => {
                if let Some(builder) = current.as_mut() {
                    assign_field(builder, &path, text.trim());
                }
                text.clear();
                path.pop();
                if e.local_name().as_ref() == b"Ntry" {
                    if let Some(builder) = current.take() {
                        entries.push(builder.finish(entries.len() + 1)?);
                    }
                }
            }
            Event::Text(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
            Event::CData(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
            Event::GeneralRef(reference) => {
                if let Some(ch) = reference.resolve_char_ref()? {
                    text.push(ch);
                } else {
                    let name = String::from_utf8_lossy(&reference).into_owned();
                    match resolve_predefined_entity(&name) {
                        Some(value) => text.push_str(value),
                        None => {
                            text.push('&');
                            text.push_str(&name);
                            text.push(';');
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}

fn assign_field(builder: &mut EntryBuilder, path: &[String], value: &str) {
    let element = path.last().map(String::as_str);
    let parent = path.len().checked_sub(2).and_then(|i| path.get(i)).map(String::as_str);
    let value = value.to_string();
    match (parent, element) {
        (Some("Ntry"), Some("Amt")) => builder.amount = Some(value),
        (Some("Ntry"), Some("CdtDbtInd")) => builder.indicator = Some(value),
        (Some("BookgDt"), Some("Dt" | "DtTm")) => builder.booking_date = Some(value),
        (Some("Ntry"), Some("AddtlNtryInf")) => builder.additional_info = Some(value),
        (_, Some("Ustrd")) if !value.is_empty() => builder.remittance.push(value),
        _ => {}
    }
}

/// Credits become income, debits expenses. Categories come from the rules;
/// unmatched debits land in the `Uncategorised` category.
pub fn import_camt053(conn: &Connection, path: &Path, today: NaiveDate) -> AppResult<ImportSummary> {
    let xml = fs::read_to_string(path).map_err(|e| open_failed(path, e))?;
    let entries = parse_camt053(&xml)?;

    let tx = conn.unchecked_transaction()?;
    let matcher = CategoryMatcher::load(&tx)?;
    let mut transactions = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        if entry.date > today {
            return Err(AppError::validation(format!(
                "Entry {}: booking date {} is in the future",
                index + 1,
                entry.date
            )));
        }
        if entry.amount_cents == 0 {
            continue;
        }
        let transaction_type = if entry.credit {
            TransactionType::Income
        } else {
            TransactionType::Expense
        };
        let matched = match matcher.category_for(&entry.description) {
            Some(id) => category_repository::get_category(&tx, id)?
                .filter(|c| !c.is_archived)
                .map(|c| c.id),
            None => None,
        };
        let category_id = match (matched, transaction_type) {
            (None, TransactionType::Expense) => Some(get_or_create_category(&tx, UNCATEGORISED)?.id),
            (id, _) => id,
        };

        let mut transaction = Transaction::new(
            Uuid::new_v4().to_string(),
            entry.date,
            entry.description,
            entry.amount_cents,
            transaction_type,
        );
        transaction.category_id = category_id;
        transactions.push(transaction);
    }

    let summary = store_all(&tx, &transactions)?;
    tx.commit()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::operations::categories::create_category;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
    }

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().expect("Failed to create temp file");
        write!(tmp, "{}", contents).expect("Failed to write test file");
        tmp
    }

    const STATEMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrStmt>
    <Stmt>
      <Ntry>
        <Amt Ccy="EUR">2500.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <BookgDt><Dt>2025-11-01</Dt></BookgDt>
        <AddtlNtryInf>ACME PAYROLL</AddtlNtryInf>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">42.10</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <BookgDt><Dt>2025-11-03</Dt></BookgDt>
        <NtryDtls><TxDtls>
          <AmtDtls><TxAmt><Amt Ccy="EUR">42.10</Amt></TxAmt></AmtDtls>
          <RmtInf><Ustrd>TESCO STORE 123</Ustrd></RmtInf>
        </TxDtls></NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">9.99</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <BookgDt><DtTm>2025-11-04T10:00:00</DtTm></BookgDt>
        <AddtlNtryInf>Streaming</AddtlNtryInf>
      </Ntry>
    </Stmt>
  </BkToCstmrStmt>
</Document>"#;

    #[test]
    fn test_import_csv_to_db_success() {
        let conn = establish_test_connection().unwrap();
        let csv_data = "\
2025-11-10,Salary,1500.00,income,Job
2025-11-11,Coffee,3.50,expense,Food,oat latte
";
        let tmp = write_temp(csv_data);
        let summary = import_transactions_to_db(&conn, ImportFormat::Csv, tmp.path(), today()).unwrap();
        assert_eq!(summary, ImportSummary { imported: 2, skipped: 0 });

        let all = repository::get_all_transactions(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].notes.as_deref(), Some("oat latte"));
        // categories named in the file are created
        assert!(category_repository::find_by_name(&conn, "Food").unwrap().is_some());
    }

    #[test]
    fn test_import_csv_skips_duplicates() {
        let conn = establish_test_connection().unwrap();
        let tmp = write_temp("2025-11-11,Coffee,3.50,expense,Food\n");
        import_csv(&conn, tmp.path(), today()).unwrap();

        let tmp = write_temp("2025-11-11,Coffee,3.50,expense,Food\n2025-11-12,Tea,2.00,expense,Food\n");
        let summary = import_csv(&conn, tmp.path(), today()).unwrap();
        assert_eq!(summary, ImportSummary { imported: 1, skipped: 1 });
    }

    #[test]
    fn test_import_csv_invalid_data_rolls_back() {
        let conn = establish_test_connection().unwrap();
        let csv_data = "\
2025-11-10,Salary,1500.00,income,Job
bad-date,Salary,1500.00,income,Job
";
        let tmp = write_temp(csv_data);
        let error = import_csv(&conn, tmp.path(), today()).unwrap_err().to_string();
        assert!(error.contains("Line 2"));
        assert!(error.contains("Invalid date"));

        assert!(repository::get_all_transactions(&conn).unwrap().is_empty());
        assert!(category_repository::find_by_name(&conn, "Job").unwrap().is_none());
    }

    #[test]
    fn test_import_csv_wrong_column_count() {
        let conn = establish_test_connection().unwrap();
        let tmp = write_temp("2025-11-10,Salary,1500.00\n");
        let error = import_csv(&conn, tmp.path(), today()).unwrap_err().to_string();
        assert!(error.contains("line 1"));
    }

    #[test]
    fn test_import_csv_empty_category_uses_rules() {
        let conn = establish_test_connection().unwrap();
        let groceries = create_category(&conn, "Groceries").unwrap();
        add_category_rule(&conn, "tesco|aldi", "Groceries").unwrap();

        let tmp = write_temp("2025-11-11,TESCO METRO,12.00,expense,\n");
        import_csv(&conn, tmp.path(), today()).unwrap();
        let all = repository::get_all_transactions(&conn).unwrap();
        assert_eq!(all[0].category_id.as_deref(), Some(groceries.id.as_str()));

        let tmp = write_temp("2025-11-12,Unknown shop,1.00,expense,\n");
        let error = import_csv(&conn, tmp.path(), today()).unwrap_err().to_string();
        assert!(error.contains("Line 1"));
    }

    #[test]
    fn test_import_nonexistent_file() {
        let conn = establish_test_connection().unwrap();
        let result = import_transactions_to_db(&conn, ImportFormat::Csv, Path::new("nonexistent.csv"), today());
        assert!(result.unwrap_err().to_string().contains("Failed to open file"));
    }

    #[test]
    fn test_parse_camt053_entries() {
        let entries = parse_camt053(STATEMENT).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            StatementEntry {
                date: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
                amount_cents: 250000,
                credit: true,
                description: "ACME PAYROLL".to_string(),
            }
        );
        assert_eq!(entries[1].amount_cents, 4210);
        assert_eq!(entries[1].description, "TESCO STORE 123");
        assert!(!entries[1].credit);
        assert_eq!(entries[2].date, NaiveDate::from_ymd_opt(2025, 11, 4).unwrap());
    }

    #[test]
    fn test_parse_camt053_resolves_references() {
        let xml = r#"<Document><Stmt>
  <Ntry>
    <Amt>12.00</Amt><CdtDbtInd>DBIT</CdtDbtInd>
    <BookgDt><Dt>2025-11-05</Dt></BookgDt>
    <AddtlNtryInf>M&amp;S FOODHALL</AddtlNtryInf>
  </Ntry>
  <Ntry>
    <Amt>30.00</Amt><CdtDbtInd>DBIT</CdtDbtInd>
    <BookgDt><Dt>2025-11-06</Dt></BookgDt>
    <RmtInf><Ustrd>AT &amp; T &#39;mobile&#x27;</Ustrd><Ustrd>ref &lt;42&gt;</Ustrd></RmtInf>
  </Ntry>
</Stmt></Document>"#;
        let entries = parse_camt053(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "M&S FOODHALL");
        assert_eq!(entries[1].description, "AT & T 'mobile' ref <42>");
    }

    #[test]
    fn test_import_camt053_rule_matches_ampersand() {
        let conn = establish_test_connection().unwrap();
        let groceries = create_category(&conn, "Groceries").unwrap();
        add_category_rule(&conn, "^m&s", "Groceries").unwrap();
        let xml = "<Document><Ntry><Amt>8.50</Amt><CdtDbtInd>DBIT</CdtDbtInd>\
<BookgDt><Dt>2025-11-07</Dt></BookgDt><AddtlNtryInf>M&amp;S SIMPLY FOOD</AddtlNtryInf></Ntry></Document>";
        let tmp = write_temp(xml);

        let summary = import_camt053(&conn, tmp.path(), today()).unwrap();
        assert_eq!(summary.imported, 1);
        let all = repository::get_all_transactions(&conn).unwrap();
        assert_eq!(all[0].description, "M&S SIMPLY FOOD");
        assert_eq!(all[0].category_id.as_deref(), Some(groceries.id.as_str()));

        let again = import_camt053(&conn, tmp.path(), today()).unwrap();
        assert_eq!(again.imported, 0);
    }

    #[test]
    fn test_parse_camt053_missing_indicator() {
        let xml = "<Document><Ntry><Amt>1.00</Amt><BookgDt><Dt>2025-01-01</Dt></BookgDt></Ntry></Document>";
        let error = parse_camt053(xml).unwrap_err().to_string();
        assert!(error.contains("CdtDbtInd"));
    }

    #[test]
    fn test_import_camt053_categorises() {
        let conn = establish_test_connection().unwrap();
        let groceries = create_category(&conn, "Groceries").unwrap();
        add_category_rule(&conn, "^tesco", "Groceries").unwrap();

        let tmp = write_temp(STATEMENT);
        let summary = import_transactions_to_db(&conn, ImportFormat::Camt053, tmp.path(), today()).unwrap();
        assert_eq!(summary.imported, 3);

        let all = repository::get_all_transactions(&conn).unwrap();
        let by_desc = |d: &str| all.iter().find(|t| t.description == d).unwrap();
        assert_eq!(by_desc("ACME PAYROLL").transaction_type, TransactionType::Income);
        assert_eq!(by_desc("ACME PAYROLL").category_id, None);
        assert_eq!(by_desc("TESCO STORE 123").category_id.as_deref(), Some(groceries.id.as_str()));
        let uncategorised = category_repository::find_by_name(&conn, UNCATEGORISED).unwrap().unwrap();
        assert_eq!(by_desc("Streaming").category_id.as_deref(), Some(uncategorised.id.as_str()));

        let again = import_camt053(&conn, tmp.path(), today()).unwrap();
        assert_eq!(again, ImportSummary { imported: 0, skipped: 3 });
    }

    #[test]
    fn test_category_rules_crud() {
        let conn = establish_test_connection().unwrap();
        create_category(&conn, "Fun").unwrap();
        assert!(add_category_rule(&conn, "([unclosed", "Fun").is_err());
        assert!(add_category_rule(&conn, "cinema", "Missing").is_err());

        let rule = add_category_rule(&conn, "cinema", "fun").unwrap();
        assert_eq!(list_category_rules(&conn).unwrap(), vec![rule.clone()]);
        remove_category_rule(&conn, rule.id).unwrap();
        assert!(list_category_rules(&conn).unwrap().is_empty());
        assert!(remove_category_rule(&conn, rule.id).is_err());
    }
}
