//! Intake boundary.
//!
//! External workflows (a form, a chat command, a language-model parser)
//! hand the engine an [`OrderDraft`]. Nothing is persisted until the draft
//! passes [`validate_draft`], which returns a [`ValidDraft`] token; order
//! creation only accepts that token.
//!
//! Free text is turned into a draft by a [`DraftParser`]. The parser is an
//! external capability; [`LineDraftParser`] is the built-in deterministic
//! implementation for a simple line format:
//!
//! ```text
//! title: Laptop stands
//! team: Platform
//! requested_by: alice
//! date: 2025-06-01
//! - 3 pcs Laptop stand
//! - 1 box Cable ties
//! ```

use chrono::NaiveDate;
use podesk_schemas::{DraftArticle, OrderDraft};
use serde::{Deserialize, Serialize};

/// Upper bound on a single line-item quantity.
pub const MAX_QUANTITY: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// IntakeError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeError {
    MissingField(&'static str),
    NoArticles,
    PastDate { requested: NaiveDate, today: NaiveDate },
    /// `line` is 1-based.
    NonPositiveQuantity { line: usize, quantity: i64 },
    QuantityTooLarge { line: usize, quantity: i64 },
    EmptyDescription { line: usize },
}

impl std::fmt::Display for IntakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntakeError::MissingField(name) => write!(f, "missing required field: {name}"),
            IntakeError::NoArticles => write!(f, "at least one line item is required"),
            IntakeError::PastDate { requested, today } => {
                write!(f, "requested date {requested} is before today ({today})")
            }
            IntakeError::NonPositiveQuantity { line, quantity } => {
                write!(f, "line {line}: quantity must be a positive integer, got {quantity}")
            }
            IntakeError::QuantityTooLarge { line, quantity } => {
                write!(f, "line {line}: quantity {quantity} exceeds {MAX_QUANTITY}")
            }
            IntakeError::EmptyDescription { line } => {
                write!(f, "line {line}: description is empty")
            }
        }
    }
}

impl std::error::Error for IntakeError {}

/// Join a batch of intake errors into one human-readable message.
pub fn describe(errors: &[IntakeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// ValidDraft
// ---------------------------------------------------------------------------

/// Proof that a draft passed [`validate_draft`].
///
/// The inner draft is private, so the only way to obtain a `ValidDraft`
/// outside this module is through validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft(OrderDraft);

impl ValidDraft {
    pub fn draft(&self) -> &OrderDraft {
        &self.0
    }

    pub fn into_inner(self) -> OrderDraft {
        self.0
    }
}

/// Validate a draft against `today` (in the desk's calendar timezone).
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_draft(draft: OrderDraft, today: NaiveDate) -> Result<ValidDraft, Vec<IntakeError>> {
    let mut errors = Vec::new();

    if draft.title.trim().is_empty() {
        errors.push(IntakeError::MissingField("title"));
    }
    if draft.team.trim().is_empty() {
        errors.push(IntakeError::MissingField("team"));
    }
    if draft.requested_by.trim().is_empty() {
        errors.push(IntakeError::MissingField("requested_by"));
    }
    if draft.requested_date < today {
        errors.push(IntakeError::PastDate {
            requested: draft.requested_date,
            today,
        });
    }
    if draft.articles.is_empty() {
        errors.push(IntakeError::NoArticles);
    }
    for (i, a) in draft.articles.iter().enumerate() {
        let line = i + 1;
        if a.quantity <= 0 {
            errors.push(IntakeError::NonPositiveQuantity {
                line,
                quantity: a.quantity,
            });
        } else if a.quantity > MAX_QUANTITY {
            errors.push(IntakeError::QuantityTooLarge {
                line,
                quantity: a.quantity,
            });
        }
        if a.description.trim().is_empty() {
            errors.push(IntakeError::EmptyDescription { line });
        }
    }

    if errors.is_empty() {
        Ok(ValidDraft(draft))
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// DraftParser
// ---------------------------------------------------------------------------

/// Result of turning free text into a draft.
///
/// `valid` reports structural validity only; the engine still runs
/// [`validate_draft`] before accepting the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDraft {
    pub valid: bool,
    pub draft: Option<OrderDraft>,
    pub errors: Vec<String>,
}

/// Free text → draft capability (form parser, language model, …).
#[async_trait::async_trait]
pub trait DraftParser: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn parse_draft(&self, text: &str) -> ParsedDraft;
}

/// Deterministic parser for the `key: value` / `- qty unit description`
/// format documented at module level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDraftParser;

impl LineDraftParser {
    pub fn parse(&self, text: &str) -> ParsedDraft {
        let mut title = None;
        let mut team = None;
        let mut requested_by = None;
        let mut date = None;
        let mut articles = Vec::new();
        let mut errors = Vec::new();

        for (i, raw) in text.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(item) = line.strip_prefix('-') {
                match parse_item(item) {
                    Ok(a) => articles.push(a),
                    Err(e) => errors.push(format!("line {lineno}: {e}")),
                }
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                errors.push(format!(
                    "line {lineno}: expected 'key: value' or '- qty unit description'"
                ));
                continue;
            };
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "title" => title = Some(value),
                "team" => team = Some(value),
                "requested_by" | "requester" => requested_by = Some(value),
                "date" | "requested_date" => match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
                    Ok(d) => date = Some(d),
                    Err(_) => {
                        errors.push(format!("line {lineno}: invalid date '{value}' (YYYY-MM-DD)"))
                    }
                },
                other => errors.push(format!("line {lineno}: unknown key '{other}'")),
            }
        }

        for (name, present) in [
            ("title", title.is_some()),
            ("team", team.is_some()),
            ("requested_by", requested_by.is_some()),
            ("date", date.is_some()),
        ] {
            if !present {
                errors.push(format!("missing required field: {name}"));
            }
        }
        if articles.is_empty() {
            errors.push("at least one line item is required".to_string());
        }

        let draft = match (title, team, requested_by, date) {
            (Some(title), Some(team), Some(by), Some(date)) => Some(OrderDraft {
                title,
                team,
                requested_by: by,
                requested_date: date,
                articles,
            }),
            _ => None,
        };

        ParsedDraft {
            valid: errors.is_empty() && draft.is_some(),
            draft,
            errors,
        }
    }
}

#[async_trait::async_trait]
impl DraftParser for LineDraftParser {
    fn source_name(&self) -> &'static str {
        "line"
    }

    async fn parse_draft(&self, text: &str) -> ParsedDraft {
        self.parse(text)
    }
}

/// `qty unit description...`
fn parse_item(item: &str) -> Result<DraftArticle, String> {
    let mut parts = item.split_whitespace();
    let qty = parts.next().ok_or("empty line item")?;
    let quantity: i64 = qty
        .parse()
        .map_err(|_| format!("quantity '{qty}' is not an integer"))?;
    let unit = parts.next().ok_or("missing unit")?.to_string();
    let description = parts.collect::<Vec<_>>().join(" ");
    if description.is_empty() {
        return Err("missing description".to_string());
    }
    Ok(DraftArticle {
        quantity,
        unit,
        description,
    })
}
