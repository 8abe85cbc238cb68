//! CSV import parsers for the supported bank formats
//!
//! Each [`Dialect`] knows how to recognise its files (filename convention,
//! then header signature), where its account number lives and how to turn
//! one CSV row into a [`Transaction`]. Rows that cannot be parsed are skipped
//! and reported as [`RowParseWarning`]s; problems with the file as a whole
//! (unknown format, unknown account) fail the file.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Account, Dialect, Transaction};

/// Purpose texts that say nothing about the merchant
const UNHELPFUL_PURPOSES: &[&str] = &["VISA Debitkartenumsatz"];

/// Description used when a row carries no text at all
const UNKNOWN_DESCRIPTION: &str = "Unknown Transaction";

/// A skipped row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowParseWarning {
    /// 1-based line in the source file
    pub line: usize,
    pub reason: String,
}

/// Result of ingesting one file
#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub file_name: String,
    pub dialect: Dialect,
    pub transactions: Vec<Transaction>,
    pub warnings: Vec<RowParseWarning>,
}

impl ImportedFile {
    /// Distinct accounts referenced by this file, in first-appearance order
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        let mut seen: Vec<Arc<Account>> = Vec::new();
        for tx in &self.transactions {
            if !seen.iter().any(|a| Arc::ptr_eq(a, &tx.account)) {
                seen.push(Arc::clone(&tx.account));
            }
        }
        seen
    }
}

/// One CSV row paired with its header record
struct RawRow<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
}

impl<'a> RawRow<'a> {
    /// Value of the named column, empty if the column or value is absent
    fn get(&self, column: &str) -> &'a str {
        self.headers
            .iter()
            .position(|h| h.trim() == column)
            .and_then(|i| self.record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }

    fn is_blank(&self) -> bool {
        self.record.iter().all(|f| f.trim().is_empty())
    }
}

/// Fields extracted from a single row before account assignment
#[derive(Debug, Clone, PartialEq)]
struct ParsedRow {
    date: NaiveDate,
    amount: Decimal,
    description: String,
    /// Only set by dialects that carry the account per row
    account_number: Option<String>,
}

impl Dialect {
    fn delimiter(&self) -> u8 {
        match self {
            Self::Dkb | Self::Migrosbank => b';',
            Self::CapitalOne => b',',
        }
    }

    fn file_name_marker(&self) -> Option<&'static str> {
        match self {
            Self::Dkb => Some("Umsatzliste"),
            Self::Migrosbank => Some("bookings-export"),
            Self::CapitalOne => None,
        }
    }

    /// Start of the transaction header row, with quotes removed
    fn header_signature(&self) -> &'static str {
        match self {
            Self::Dkb => "Buchungsdatum;Wertstellung;Status",
            Self::Migrosbank => "Datum;Buchungstext;Mitteilung",
            Self::CapitalOne => "Transaction Date,Posted Date,Card No.",
        }
    }

    /// Whether `line` is this dialect's transaction header row
    pub fn matches_header(&self, line: &str) -> bool {
        line.trim_start_matches('\u{feff}')
            .trim()
            .replace('"', "")
            .starts_with(self.header_signature())
    }

    /// Detect the dialect of a file from its name and content
    ///
    /// Filename conventions are consulted for every dialect before any
    /// header inspection. A filename match still requires the dialect's
    /// header row to be present.
    pub fn detect(file_name: &str, content: &str) -> Option<Dialect> {
        let has_header = |d: &Dialect| content.lines().any(|l| d.matches_header(l));

        Self::ALL
            .into_iter()
            .find(|d| {
                d.file_name_marker()
                    .is_some_and(|m| file_name.contains(m))
                    && has_header(d)
            })
            .or_else(|| Self::ALL.into_iter().find(|d| has_header(d)))
    }

    /// Label of the preamble line that carries the account number
    fn preamble_label(&self) -> Option<&'static str> {
        match self {
            Self::Dkb => Some("Girokonto"),
            Self::Migrosbank => Some("Kontonummer / IBAN:"),
            Self::CapitalOne => None,
        }
    }

    /// Account numbers printed in the preamble above the header row
    ///
    /// Migros Bank prints `<number> / <IBAN>`; both parts are returned.
    fn preamble_account_numbers(&self, preamble: &[&str]) -> Vec<String> {
        let Some(label) = self.preamble_label() else {
            return Vec::new();
        };
        preamble
            .iter()
            .find_map(|&line| {
                let mut fields = line.split(';').map(|f| f.trim().trim_matches('"').trim());
                (fields.next() == Some(label)).then(|| fields.next().unwrap_or_default())
            })
            .map(|value| {
                value
                    .split('/')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse_row(&self, row: &RawRow) -> std::result::Result<ParsedRow, String> {
        match self {
            Self::Dkb => {
                let date = parse_date(row.get("Buchungsdatum"), &["%d.%m.%y", "%d.%m.%Y"])?;
                let amount = parse_german_amount(row.get("Betrag (€)"))?;
                let description =
                    dkb_description(row.get("Zahlungsempfänger*in"), row.get("Verwendungszweck"));
                Ok(ParsedRow {
                    date,
                    amount,
                    description,
                    account_number: None,
                })
            }
            Self::Migrosbank => {
                let date = parse_date(row.get("Datum"), &["%d.%m.%Y"])?;
                let amount = parse_comma_amount(row.get("Betrag"))?;
                let description = format!("{} {}", row.get("Buchungstext"), row.get("Mitteilung"))
                    .trim()
                    .to_string();
                Ok(ParsedRow {
                    date,
                    amount,
                    description: non_empty_description(description),
                    account_number: None,
                })
            }
            Self::CapitalOne => {
                let date = parse_date(row.get("Transaction Date"), &["%Y-%m-%d", "%m/%d/%Y"])?;
                let debit = row.get("Debit");
                let credit = row.get("Credit");
                // Debits are expenses (negative), credits income (positive)
                let amount = if !debit.is_empty() {
                    -parse_plain_amount(debit)?
                } else if !credit.is_empty() {
                    parse_plain_amount(credit)?
                } else {
                    return Err("Missing amount (neither Debit nor Credit set)".to_string());
                };
                let card = row.get("Card No.");
                if card.is_empty() {
                    return Err("Missing card number".to_string());
                }
                Ok(ParsedRow {
                    date,
                    amount,
                    description: non_empty_description(row.get("Description").to_string()),
                    account_number: Some(card.to_string()),
                })
            }
        }
    }
}

/// Ingest one file
///
/// Fails with [`Error::DialectDetection`] if no dialect matches and with
/// [`Error::UnresolvedAccount`] if the file's account number cannot be mapped
/// to a configured account. Unparsable rows become warnings.
pub fn import_file(
    file_name: &str,
    bytes: &[u8],
    accounts: &[Arc<Account>],
) -> Result<ImportedFile> {
    let content = std::str::from_utf8(bytes)
        .map_err(|e| Error::Import(format!("{} is not valid UTF-8: {}", file_name, e)))?;

    let dialect = Dialect::detect(file_name, content).ok_or_else(|| Error::DialectDetection {
        file: file_name.to_string(),
    })?;
    debug!("Detected {} format for {}", dialect, file_name);

    // Split into preamble and CSV body at the header row, tracking the byte offset
    let mut offset = 0;
    let mut header_index = None;
    let mut preamble = Vec::new();
    for (i, line) in content.split_inclusive('\n').enumerate() {
        if dialect.matches_header(line) {
            header_index = Some(i);
            break;
        }
        preamble.push(line.trim());
        offset += line.len();
    }
    let header_index = header_index.ok_or_else(|| Error::DialectDetection {
        file: file_name.to_string(),
    })?;
    let body = content[offset..].trim_start_matches('\u{feff}');

    let preamble_numbers = dialect.preamble_account_numbers(&preamble);
    let file_account = if !preamble_numbers.is_empty() {
        Some(resolve_account_or_err(file_name, &preamble_numbers, accounts)?)
    } else if dialect == Dialect::CapitalOne {
        None
    } else {
        return Err(Error::UnresolvedAccount {
            file: file_name.to_string(),
            found: "<none>".to_string(),
            candidates: candidate_names(accounts),
        });
    };

    let mut rdr = ReaderBuilder::new()
        .delimiter(dialect.delimiter())
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = rdr.headers()?.clone();

    let mut card_accounts: HashMap<String, Arc<Account>> = HashMap::new();
    let mut transactions = Vec::new();
    let mut warnings = Vec::new();

    for result in rdr.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| header_index + p.line() as usize)
                    .unwrap_or(0);
                warnings.push(RowParseWarning {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| header_index + p.line() as usize)
            .unwrap_or(0);
        let row = RawRow {
            headers: &headers,
            record: &record,
        };
        if row.is_blank() {
            continue;
        }

        let parsed = match dialect.parse_row(&row) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!("{}:{}: skipping row: {}", file_name, line, reason);
                warnings.push(RowParseWarning { line, reason });
                continue;
            }
        };

        let account = match (&file_account, &parsed.account_number) {
            (Some(account), _) => Arc::clone(account),
            (None, Some(number)) => match card_accounts.get(number) {
                Some(account) => Arc::clone(account),
                None => {
                    let account =
                        resolve_account_or_err(file_name, std::slice::from_ref(number), accounts)?;
                    card_accounts.insert(number.clone(), Arc::clone(&account));
                    account
                }
            },
            (None, None) => {
                return Err(Error::UnresolvedAccount {
                    file: file_name.to_string(),
                    found: "<none>".to_string(),
                    candidates: candidate_names(accounts),
                })
            }
        };

        transactions.push(Transaction::new(
            parsed.date,
            parsed.amount,
            parsed.description,
            account,
            line,
        ));
    }

    debug!(
        "Parsed {} {} transactions from {} ({} skipped)",
        transactions.len(),
        dialect,
        file_name,
        warnings.len()
    );

    Ok(ImportedFile {
        file_name: file_name.to_string(),
        dialect,
        transactions,
        warnings,
    })
}

/// Keep alphanumerics, lowercased
pub fn normalize_account_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// How well a number found in a file matches a configured number
///
/// 2 = equal after normalization, 1 = one ends with the other, 0 = no match.
pub fn match_strength(found: &str, configured: &str) -> u8 {
    let found = normalize_account_number(found);
    let configured = normalize_account_number(configured);
    if found.is_empty() || configured.is_empty() {
        0
    } else if found == configured {
        2
    } else if found.ends_with(&configured) || configured.ends_with(&found) {
        1
    } else {
        0
    }
}

/// Pick the best configured account for `number`
///
/// Highest strength wins, then higher weight, then configuration order.
pub fn resolve_account(number: &str, accounts: &[Arc<Account>]) -> Option<Arc<Account>> {
    resolve_any_account(&[number.to_string()], accounts)
}

fn resolve_account_or_err(
    file_name: &str,
    numbers: &[String],
    accounts: &[Arc<Account>],
) -> Result<Arc<Account>> {
    match resolve_any_account(numbers, accounts) {
        Some(account) => {
            debug!(
                "Account number {} resolved to '{}'",
                numbers.join(" / "),
                account.name
            );
            Ok(account)
        }
        None => Err(Error::UnresolvedAccount {
            file: file_name.to_string(),
            found: numbers.join(" / "),
            candidates: candidate_names(accounts),
        }),
    }
}

/// Best account over several numbers printed for the same account
///
/// Strength is compared across all numbers; ties fall back to weight, then
/// configuration order, as in [`resolve_account`].
pub fn resolve_any_account(numbers: &[String], accounts: &[Arc<Account>]) -> Option<Arc<Account>> {
    let mut best: Option<(u8, &Arc<Account>)> = None;
    for account in accounts {
        let strength = numbers
            .iter()
            .map(|n| match_strength(n, &account.number))
            .max()
            .unwrap_or(0);
        if strength == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((s, current)) => {
                strength > s || (strength == s && account.weight > current.weight)
            }
        };
        if better {
            best = Some((strength, account));
        }
    }
    best.map(|(_, account)| Arc::clone(account))
}

fn candidate_names(accounts: &[Arc<Account>]) -> Vec<String> {
    accounts
        .iter()
        .map(|a| format!("{} ({})", a.name, a.number))
        .collect()
}

fn dkb_description(payee: &str, purpose: &str) -> String {
    let payee = payee.replace('.', " ").trim().to_string();
    let purpose = purpose.trim();

    let description = if payee.contains("PayPal") {
        purpose.to_string()
    } else if UNHELPFUL_PURPOSES.iter().any(|k| purpose.contains(k)) {
        payee
    } else if purpose.is_empty() {
        payee
    } else if payee.is_empty() {
        purpose.to_string()
    } else {
        format!("{} - {}", payee, purpose)
    };
    non_empty_description(description)
}

fn non_empty_description(description: String) -> String {
    if description.trim().is_empty() {
        UNKNOWN_DESCRIPTION.to_string()
    } else {
        description
    }
}

fn parse_date(s: &str, formats: &[&str]) -> std::result::Result<NaiveDate, String> {
    let s = s.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| format!("Unable to parse date: '{}'", s))
}

/// German format: `1.234,56 €`
fn parse_german_amount(s: &str) -> std::result::Result<Decimal, String> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '€' | '.' | ' ' | '\u{a0}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&cleaned).map_err(|_| format!("Unable to parse amount: '{}'", s))
}

/// Decimal comma without thousands dots: `-120,00`
fn parse_comma_amount(s: &str) -> std::result::Result<Decimal, String> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '\'' | ' '))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&cleaned).map_err(|_| format!("Unable to parse amount: '{}'", s))
}

/// US format: `$1,234.56`
fn parse_plain_amount(s: &str) -> std::result::Result<Decimal, String> {
    let cleaned = s.trim().replace(['$', ',', ' '], "");
    Decimal::from_str(&cleaned).map_err(|_| format!("Unable to parse amount: '{}'", s))
}
