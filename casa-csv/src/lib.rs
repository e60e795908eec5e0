//! CSV import/export pipelines layered on the policy-checked store.
//!
//! The dialect is deliberately not RFC 4180: a field may be quoted to carry
//! literal commas, quote state is toggled per character, and there is no
//! escaped-quote-within-quoted-field support. Export mirrors the same
//! dialect (fields are quote-wrapped only when they contain a comma;
//! embedded quotes and newlines are not escaped).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use casa_schema::{NewLead, EXPORT_COLUMNS};
use casa_store::{LeadFilter, LeadOrder, LeadStore, OrderField, Page, StoreError};
use casa_types::{LeadSource, LeadStatus};

const REQUIRED_COLUMNS: [&str; 3] = ["first_name", "last_name", "email"];
const AREA_DELIMITER: char = ';';

#[derive(Debug, Error)]
pub enum CsvError {
    /// Whole-operation failure before any row is processed.
    #[error("malformed csv: {0}")]
    Malformed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowError {
    /// 1-based line number in the original file (header is line 1).
    pub row: usize,
    pub message: String,
}

/// Per-row tally; partial success is a normal outcome, not an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub success_count: usize,
    pub total_rows: usize,
    pub errors: Vec<RowError>,
}

/// Import leads from raw CSV text, attributed to `caller`.
///
/// Rows are processed strictly sequentially so error line numbers are
/// deterministic; each valid row is inserted and committed independently
/// (no transactional envelope around the batch). No row failure aborts the
/// batch; policy denials land in the tally like any other row failure.
pub async fn import_leads(
    store: &dyn LeadStore,
    caller: Uuid,
    text: &str,
) -> Result<ImportReport, CsvError> {
    let mut lines: Vec<(usize, &str)> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if !line.trim().is_empty() {
            lines.push((idx + 1, line));
        }
    }
    if lines.len() < 2 {
        return Err(CsvError::Malformed(
            "expected a header row and at least one data row".into(),
        ));
    }

    let (_, header_line) = lines[0];
    let headers: Vec<String> = split_record(header_line)
        .iter()
        .map(|h| normalize_header(h))
        .collect();
    for required in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == required) {
            return Err(CsvError::Malformed(format!(
                "missing required column: {required}"
            )));
        }
    }

    let mut report = ImportReport::default();
    for &(line_no, line) in &lines[1..] {
        report.total_rows += 1;
        let fields = split_record(line);
        let draft = match row_to_draft(&headers, &fields) {
            Ok(draft) => draft,
            Err(message) => {
                report.errors.push(RowError {
                    row: line_no,
                    message,
                });
                continue;
            }
        };
        match store.insert_lead(caller, draft).await {
            Ok(_) => report.success_count += 1,
            Err(err) => report.errors.push(RowError {
                row: line_no,
                message: err.to_string(),
            }),
        }
    }
    Ok(report)
}

/// Serialize every lead visible to the caller; the entire visible set is
/// materialized in memory. Zero visible leads yields the header line only.
pub async fn export_leads(store: &dyn LeadStore, caller: Uuid) -> Result<String, CsvError> {
    let leads = store
        .list_leads(
            caller,
            &LeadFilter::default(),
            LeadOrder {
                field: OrderField::CreatedAt,
                descending: false,
            },
            Page::all(),
        )
        .await?;

    let mut out = String::new();
    out.push_str(&EXPORT_COLUMNS.join(","));
    out.push('\n');
    for lead in &leads {
        let row = [
            csv_field(&lead.first_name),
            csv_field(&lead.last_name),
            csv_field(&lead.email),
            csv_field(lead.phone.as_deref().unwrap_or("")),
            opt_num(lead.budget_min),
            opt_num(lead.budget_max),
            csv_field(&lead.preferred_areas.join(&AREA_DELIMITER.to_string())),
            csv_field(lead.property_type.as_deref().unwrap_or("")),
            opt_num(lead.bedrooms),
            opt_num(lead.bathrooms),
            lead.status.to_string(),
            lead.source.to_string(),
            lead.priority.to_string(),
            csv_field(lead.notes.as_deref().unwrap_or("")),
            lead.created_at.to_rfc3339(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    Ok(out)
}

/// Quote-aware comma splitter. Quote characters toggle state and are not
/// emitted; fields are trimmed.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Case-fold and collapse internal whitespace to underscores.
fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Map field values to header names positionally and coerce them into a
/// lead draft. Unknown headers are ignored; empty values keep defaults.
fn row_to_draft(headers: &[String], fields: &[String]) -> Result<NewLead, String> {
    let mut draft = NewLead::new("", "", "");
    for (idx, name) in headers.iter().enumerate() {
        let value = fields.get(idx).map(String::as_str).unwrap_or("").trim();
        if value.is_empty() {
            continue;
        }
        match name.as_str() {
            "first_name" => draft.first_name = value.to_string(),
            "last_name" => draft.last_name = value.to_string(),
            "email" => draft.email = value.to_string(),
            "phone" => draft.phone = Some(value.to_string()),
            "budget_min" => {
                draft.budget_min =
                    Some(value.parse().map_err(|_| format!("invalid budget_min: {value}"))?)
            }
            "budget_max" => {
                draft.budget_max =
                    Some(value.parse().map_err(|_| format!("invalid budget_max: {value}"))?)
            }
            "preferred_areas" => {
                draft.preferred_areas = value
                    .split(AREA_DELIMITER)
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "property_type" => draft.property_type = Some(value.to_string()),
            "bedrooms" => {
                draft.bedrooms =
                    Some(value.parse().map_err(|_| format!("invalid bedrooms: {value}"))?)
            }
            "bathrooms" => {
                draft.bathrooms =
                    Some(value.parse().map_err(|_| format!("invalid bathrooms: {value}"))?)
            }
            "status" => {
                draft.status = value.parse::<LeadStatus>().map_err(|e| e.to_string())?
            }
            "source" => {
                draft.source = value.parse::<LeadSource>().map_err(|e| e.to_string())?
            }
            "priority" => {
                draft.priority =
                    value.parse().map_err(|_| format!("invalid priority: {value}"))?
            }
            "notes" => draft.notes = Some(value.to_string()),
            _ => {}
        }
    }
    Ok(draft)
}

/// Known limitation: only commas trigger quoting; embedded quotes and
/// newlines pass through unescaped.
fn csv_field(value: &str) -> String {
    if value.contains(',') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

fn opt_num<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use casa_store::InMemoryStore;
    use casa_types::Role;

    async fn agent_store() -> (InMemoryStore, Uuid, Uuid) {
        let admin = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let store = InMemoryStore::with_admin(admin, "Admin");
        store.register_identity(agent, Some("Agent")).await.unwrap();
        store.register_identity(viewer, Some("Viewer")).await.unwrap();
        store.set_role(admin, viewer, Role::Viewer).await.unwrap();
        (store, agent, viewer)
    }

    #[tokio::test]
    async fn import_tallies_partial_failure() {
        let (store, agent, _) = agent_store().await;
        let text = "first_name,last_name,email\nJohn,Doe,john@x.com\n,Smith,jane@x.com\n";
        let report = import_leads(&store, agent, text).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row, 3);
        assert!(report.errors[0].message.contains("first_name"));
    }

    #[tokio::test]
    async fn missing_required_column_fails_whole_operation() {
        let (store, agent, _) = agent_store().await;
        let text = "first_name,last_name\nJohn,Doe\n";
        let err = import_leads(&store, agent, text).await.unwrap_err();
        assert!(matches!(err, CsvError::Malformed(ref m) if m.contains("email")));
        // Nothing was inserted.
        let leads = store
            .list_leads(agent, &LeadFilter::default(), LeadOrder::default(), Page::all())
            .await
            .unwrap();
        assert!(leads.is_empty());
    }

    #[tokio::test]
    async fn too_few_lines_rejected() {
        let (store, agent, _) = agent_store().await;
        let err = import_leads(&store, agent, "first_name,last_name,email\n\n")
            .await
            .unwrap_err();
        assert!(matches!(err, CsvError::Malformed(_)));
    }

    #[tokio::test]
    async fn quoted_fields_carry_commas() {
        let (store, agent, _) = agent_store().await;
        let text = "first_name,last_name,email,notes,preferred_areas\n\
                    John,\"Doe, Jr.\",john@x.com,\"likes quiet, leafy streets\",Soho; Tribeca\n";
        let report = import_leads(&store, agent, text).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert!(report.errors.is_empty());

        let lead = &store
            .list_leads(agent, &LeadFilter::default(), LeadOrder::default(), Page::all())
            .await
            .unwrap()[0];
        assert_eq!(lead.last_name, "Doe, Jr.");
        assert_eq!(lead.notes.as_deref(), Some("likes quiet, leafy streets"));
        assert_eq!(lead.preferred_areas, vec!["Soho", "Tribeca"]);
    }

    #[tokio::test]
    async fn header_names_are_normalized() {
        let (store, agent, _) = agent_store().await;
        let text = " First Name , LAST NAME ,Email\nJane,Smith,jane@x.com\n";
        let report = import_leads(&store, agent, text).await.unwrap();
        assert_eq!(report.success_count, 1);
    }

    #[tokio::test]
    async fn bad_enum_and_priority_are_row_errors() {
        let (store, agent, _) = agent_store().await;
        let text = "first_name,last_name,email,status,priority\n\
                    A,One,a@x.com,hot,3\n\
                    B,Two,b@x.com,new,9\n\
                    C,Three,c@x.com,contacted,2\n";
        let report = import_leads(&store, agent, text).await.unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.success_count, 1);
        let rows: Vec<usize> = report.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3]);
        assert!(report.errors[0].message.contains("status"));
        assert!(report.errors[1].message.contains("priority"));
    }

    #[tokio::test]
    async fn viewer_import_yields_per_row_denials() {
        let (store, _, viewer) = agent_store().await;
        let text = "first_name,last_name,email\nJohn,Doe,john@x.com\nJane,Roe,jane@x.com\n";
        let report = import_leads(&store, viewer, text).await.unwrap();
        assert_eq!(report.success_count, 0);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].message.contains("access denied"));
    }

    #[tokio::test]
    async fn blank_lines_keep_original_numbering() {
        let (store, agent, _) = agent_store().await;
        let text = "first_name,last_name,email\n\n,Smith,x@x.com\n";
        let report = import_leads(&store, agent, text).await.unwrap();
        assert_eq!(report.total_rows, 1);
        assert_eq!(report.errors[0].row, 3);
    }

    #[tokio::test]
    async fn export_zero_leads_is_header_only() {
        let (store, agent, _) = agent_store().await;
        let out = export_leads(&store, agent).await.unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("first_name,last_name,email,"));
    }

    #[tokio::test]
    async fn export_quotes_commas_and_joins_areas() {
        let (store, agent, _) = agent_store().await;
        let mut draft = NewLead::new("John", "Doe, Jr.", "john@x.com");
        draft.preferred_areas = vec!["Soho".into(), "Tribeca".into()];
        draft.budget_min = Some(250000.0);
        store.insert_lead(agent, draft).await.unwrap();

        let out = export_leads(&store, agent).await.unwrap();
        let data = out.lines().nth(1).unwrap();
        assert!(data.contains("\"Doe, Jr.\""));
        assert!(data.contains("Soho;Tribeca"));
        assert!(data.contains("250000"));
        assert!(data.contains(",new,website,3,"));
    }

    #[test]
    fn splitter_toggles_quotes_per_character() {
        assert_eq!(split_record("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_record("\"a,b\",c"), vec!["a,b", "c"]);
        assert_eq!(split_record("a,,c"), vec!["a", "", "c"]);
        // No escaped-quote support: an unbalanced quote swallows the rest.
        assert_eq!(split_record("\"a,b"), vec!["a,b"]);
    }
}
