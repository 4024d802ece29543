use crate::error::Result;
use crate::schema::GuidanceEntry;
use log::{debug, info};
use std::io::Read;

/// The IFS Food v8 guidance checklist, in file order.
#[derive(Debug, Clone, Default)]
pub struct GuidanceTable {
    entries: Vec<GuidanceEntry>,
}

impl GuidanceTable {
    pub fn new(entries: Vec<GuidanceEntry>) -> Self {
        Self { entries }
    }

    /// Parses the checklist CSV (`NUM_REQ`, `Good practice`, `Elements to check`,
    /// `Example questions`). Extra columns are ignored.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let mut entries = Vec::new();
        for record in csv_reader.deserialize() {
            let entry: GuidanceEntry = record?;
            entries.push(entry);
        }
        info!("Loaded {} guidance entries", entries.len());
        Ok(Self { entries })
    }

    #[cfg(feature = "providers")]
    pub async fn fetch(url: &str) -> Result<Self> {
        info!("Fetching guidance checklist from {}", url);
        let response = reqwest::get(url).await?.error_for_status()?;
        let body = response.bytes().await?;
        Self::from_csv_reader(body.as_ref())
    }

    /// First entry whose identifier contains `requirement_no`.
    ///
    /// The match is a case-sensitive substring test so that "1.2" in the action
    /// plan still finds a checklist row labelled "1.2.1" or "KO N°1.2". `None`
    /// means the prompt is built without guidance.
    pub fn lookup(&self, requirement_no: &str) -> Option<&GuidanceEntry> {
        let needle = requirement_no.trim();
        if needle.is_empty() {
            return None;
        }
        let found = self
            .entries
            .iter()
            .find(|entry| entry.requirement_id.contains(needle));
        if found.is_none() {
            debug!("No guidance entry matches requirement {}", needle);
        }
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GuidanceEntry] {
        &self.entries
    }
}
