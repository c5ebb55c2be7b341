use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref IDENT_INFO: Selector = Selector::parse("p.identInfo").unwrap();
    static ref MAILER: Selector = Selector::parse("div.mailer").unwrap();

    // `SIC: 3571 - ELECTRONIC COMPUTERSState location: CA | State of Inc.: CA | ...`
    static ref SIC_CODE: Regex = Regex::new(r"[0-9]{4}").unwrap();
    static ref SIC_DESCRIPTION: Regex = Regex::new(r" - (.+?)State location").unwrap();
    static ref STATE_OF_INC: Regex = Regex::new(r"State of Inc\.: ([A-Z0-9]{2})").unwrap();
    static ref STATE_LOCATION: Regex = Regex::new(r"State location: ([A-Z0-9]{2})").unwrap();

    // `IRS No.: 942404110 | State of Incorp.: CA | Fiscal Year End: 0930`
    static ref IRS_NUMBER: Regex = Regex::new(r"IRS No\.: ([0-9]+)").unwrap();

    static ref SPACES: Regex = Regex::new(r" {2,}").unwrap();
}

/// The classification fields of a filer, read from its EDGAR company page and filing index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub sic: String,
    pub sic_description: String,
    pub irs_number: String,
    pub state_of_incorporation: String,
    pub state_of_location: String,
    pub business_address: String,
    pub mailing_address: String,
}

/// Which of the two pages an extraction step reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Profile,
    Filing,
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Page::Profile => f.write_str("company profile"),
            Page::Filing => f.write_str("filing index"),
        }
    }
}

/// The first extraction step that failed for a row.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no `{selector}` element on the {page} page")]
    MissingElement {
        page: Page,
        selector: &'static str,
    },

    #[error("no {field} found on the {page} page")]
    NoMatch { page: Page, field: &'static str },

    #[error("no {0} address block on the company profile page")]
    MissingAddress(&'static str),

    #[error("no filing document url in the index row")]
    NoFilingUrl,
}

/// Extract every [`Classification`] field from the company profile & filing index pages.
///
/// All or nothing: the first missing element or unmatched pattern is returned as the error,
/// and nothing extracted before it is kept.
pub fn extract(profile_html: &str, filing_html: &str) -> Result<Classification, ExtractError> {
    let profile = Html::parse_document(profile_html);
    let filing = Html::parse_document(filing_html);

    let profile_text = ident_info(&profile, Page::Profile)?;
    let filing_text = ident_info(&filing, Page::Filing)?;

    let sic = SIC_CODE
        .find(&profile_text)
        .map(|m| m.as_str().to_string())
        .ok_or(ExtractError::NoMatch {
            page: Page::Profile,
            field: "SIC code",
        })?;
    let sic_description = capture(
        &SIC_DESCRIPTION,
        &profile_text,
        Page::Profile,
        "SIC description",
    )?
    .trim()
    .to_string();
    let irs_number = capture(&IRS_NUMBER, &filing_text, Page::Filing, "IRS number")?;
    let state_of_incorporation = capture(
        &STATE_OF_INC,
        &profile_text,
        Page::Profile,
        "state of incorporation",
    )?;
    let state_of_location = capture(
        &STATE_LOCATION,
        &profile_text,
        Page::Profile,
        "state location",
    )?;

    let mailers = mailer_blocks(&profile);
    let business_address = address(&mailers, "usiness", "Business Address ")
        .ok_or(ExtractError::MissingAddress("business"))?;
    let mailing_address = address(&mailers, "ailing", "Mailing Address ")
        .ok_or(ExtractError::MissingAddress("mailing"))?;

    Ok(Classification {
        sic,
        sic_description,
        irs_number,
        state_of_incorporation,
        state_of_location,
        business_address,
        mailing_address,
    })
}

fn ident_info(document: &Html, page: Page) -> Result<String, ExtractError> {
    document
        .select(&IDENT_INFO)
        .next()
        .map(|element| element.text().collect::<String>())
        .ok_or(ExtractError::MissingElement {
            page,
            selector: "p.identInfo",
        })
}

fn capture(
    pattern: &Regex,
    text: &str,
    page: Page,
    field: &'static str,
) -> Result<String, ExtractError> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ExtractError::NoMatch { page, field })
}

/// Text of every `div.mailer` block, with the whitespace flattened.
fn mailer_blocks(document: &Html) -> Vec<String> {
    document
        .select(&MAILER)
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .collect()
}

/// NFKD-normalize (turning `&nbsp;` into plain spaces), flatten newlines and squeeze runs of
/// spaces.
pub fn collapse_whitespace(text: &str) -> String {
    let text: String = text.nfkd().collect::<String>().replace('\n', " ");
    SPACES.replace_all(&text, " ").into_owned()
}

// the first block mentioning `marker`, without its label
fn address(blocks: &[String], marker: &str, label: &str) -> Option<String> {
    blocks
        .iter()
        .find(|block| block.contains(marker))
        .map(|block| block.trim().replace(label, ""))
}
