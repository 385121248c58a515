use serde::{Deserialize, Serialize};

use super::{LogEntry, LoggerError};

const CSV_HEADER: &str = "timestamp,level,component,item_id,item_type,message,data";

/// Output formats for [`super::SchedulerLogger::export`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// A pretty-printed JSON array of entries.
    Json,
    /// One row per entry with a header row. Structured data is embedded as JSON.
    Csv,
}

impl ExportFormat {
    pub(super) fn render<'a>(
        &self,
        entries: impl Iterator<Item = &'a LogEntry>,
    ) -> Result<String, LoggerError> {
        match self {
            Self::Json => Ok(serde_json::to_string_pretty(&entries.collect::<Vec<_>>())?),
            Self::Csv => {
                let mut out = String::from(CSV_HEADER);
                out.push('\n');
                for entry in entries {
                    let data = match &entry.data {
                        Some(data) => serde_json::to_string(data)?,
                        None => String::new(),
                    };
                    let row = [
                        entry.timestamp.to_rfc3339(),
                        entry.level.to_string(),
                        entry.component.clone().unwrap_or_default(),
                        entry.item_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                        entry.item_kind.map(|kind| kind.to_string()).unwrap_or_default(),
                        entry.message.clone(),
                        data,
                    ];
                    let row: Vec<_> = row.iter().map(|field| escape(field)).collect();
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
