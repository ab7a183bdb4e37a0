use crate::error::{Result, TrackerError};
use crate::models::{
    parse_capacity, parse_flag, parse_rate, AdmissionCategory, AdmissionRow, Snapshot, Table, TableLayout,
    TableSchema, Track,
};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header positions resolved once per file
struct ColumnIndex {
    university: usize,
    category: usize,
    department: usize,
    track: Option<usize>,
    admission_key: Option<usize>,
    admission_name: Option<usize>,
    capacity: Option<usize>,
    recommended: Option<usize>,
    rates: Vec<usize>,
    references: Vec<Option<usize>>,
}

pub struct TableLoader<'a> {
    layout: &'a TableLayout,
    rate_pattern: Regex,
}

impl<'a> TableLoader<'a> {
    pub fn new(layout: &'a TableLayout) -> Result<Self> {
        let pattern = format!("^{}(.+)$", regex::escape(&layout.rate_column_prefix));
        let rate_pattern = Regex::new(&pattern)
            .map_err(|e| TrackerError::Schema(format!("invalid rate column prefix: {}", e)))?;
        Ok(Self { layout, rate_pattern })
    }

    pub fn load_file(&self, path: &Path) -> Result<Table> {
        let file = File::open(path).map_err(|source| TrackerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_reader(file, &path.display().to_string())
    }

    pub fn load_reader<R: Read>(&self, reader: R, source: &str) -> Result<Table> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| TrackerError::Csv {
                path: source.to_string(),
                source: e,
            })?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                // Spreadsheet exports often carry a UTF-8 BOM on the first header
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        let (index, schema) = self.resolve_columns(&headers)?;
        debug!(
            "resolved {} snapshot columns in {}: {:?}",
            schema.snapshots.len(),
            source,
            schema.snapshots.iter().map(|s| &s.label).collect::<Vec<_>>()
        );

        let mut rows = Vec::new();
        let mut seen_keys: HashSet<(String, AdmissionCategory, String, String)> = HashSet::new();
        let mut skipped = 0usize;
        let mut duplicates = 0usize;

        for (position, record) in csv_reader.records().enumerate() {
            // Header is line 1
            let line = position + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => {
                    return Err(TrackerError::Csv {
                        path: source.to_string(),
                        source: e,
                    })
                }
                Err(e) => {
                    warn!("skipping unreadable row at line {} of {}: {}", line, source, e);
                    skipped += 1;
                    continue;
                }
            };

            if record.len() != headers.len() {
                warn!(
                    "skipping row at line {} of {}: expected {} fields, found {}",
                    line,
                    source,
                    headers.len(),
                    record.len()
                );
                skipped += 1;
                continue;
            }

            let row = match self.parse_row(&record, &index, position) {
                Some(row) => row,
                None => {
                    warn!("skipping malformed row at line {} of {}", line, source);
                    skipped += 1;
                    continue;
                }
            };

            let key = (
                row.university.clone(),
                row.admission_category,
                row.department.clone(),
                row.admission_name_key.clone(),
            );
            if !seen_keys.insert(key) {
                debug!(
                    "duplicate row at line {}: {} / {} / {}",
                    line, row.university, row.department, row.admission_name_key
                );
                duplicates += 1;
                continue;
            }

            rows.push(row);
        }

        info!(
            "loaded {} rows with {} rate snapshots from {}",
            rows.len(),
            schema.snapshots.len(),
            source
        );
        if skipped > 0 {
            warn!("skipped {} malformed rows in {}", skipped, source);
        }
        if duplicates > 0 {
            warn!("removed {} duplicate rows in {}", duplicates, source);
        }

        Ok(Table::new(Arc::new(schema), rows))
    }

    fn resolve_columns(&self, headers: &[String]) -> Result<(ColumnIndex, TableSchema)> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| TrackerError::Schema(format!("required column '{}' is missing", name)))
        };

        let university = require(&self.layout.university_column)?;
        let category = require(&self.layout.category_column)?;
        let department = require(&self.layout.department_column)?;

        let mut rates = Vec::new();
        let mut snapshots = Vec::new();
        for (i, header) in headers.iter().enumerate() {
            if let Some(caps) = self.rate_pattern.captures(header) {
                rates.push(i);
                snapshots.push(Snapshot {
                    column: header.clone(),
                    label: caps[1].to_string(),
                });
            }
        }
        if snapshots.is_empty() {
            return Err(TrackerError::Schema(format!(
                "no competition rate columns with prefix '{}'",
                self.layout.rate_column_prefix
            )));
        }

        let mut reference_names: Vec<String> = self.layout.reference_columns.clone();
        for name in &self.layout.listing_reference_columns {
            if !reference_names.contains(name) {
                reference_names.push(name.clone());
            }
        }
        let references: Vec<Option<usize>> = reference_names.iter().map(|n| find(n)).collect();
        for (name, idx) in reference_names.iter().zip(&references) {
            if idx.is_none() {
                debug!("reference column '{}' not present", name);
            }
        }

        let index = ColumnIndex {
            university,
            category,
            department,
            track: find(&self.layout.track_column),
            admission_key: find(&self.layout.admission_key_column),
            admission_name: find(&self.layout.admission_name_column),
            capacity: find(&self.layout.capacity_column),
            recommended: find(&self.layout.recommended_column),
            rates,
            references,
        };
        let schema = TableSchema {
            snapshots,
            reference_names,
        };
        Ok((index, schema))
    }

    fn parse_row(&self, record: &csv::StringRecord, index: &ColumnIndex, position: usize) -> Option<AdmissionRow> {
        let cell = |i: usize| record.get(i).map(str::trim).unwrap_or("");
        let optional = |i: Option<usize>| i.map(cell).unwrap_or("");

        let university = cell(index.university);
        let department = cell(index.department);
        if university.is_empty() || department.is_empty() {
            return None;
        }
        let admission_category = AdmissionCategory::parse(cell(index.category))?;

        let admission_name = optional(index.admission_name).to_string();
        let admission_name_key = match index.admission_key.map(cell) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => admission_name.clone(),
        };

        Some(AdmissionRow {
            position,
            university: university.to_string(),
            admission_category,
            track: Track::parse(optional(index.track)),
            department: department.to_string(),
            admission_name_key,
            admission_name,
            capacity: index.capacity.and_then(|i| parse_capacity(cell(i))),
            is_recommended_track: parse_flag(optional(index.recommended)),
            rates: index.rates.iter().map(|&i| parse_rate(cell(i))).collect(),
            references: index
                .references
                .iter()
                .map(|i| i.and_then(|i| parse_rate(cell(i))))
                .collect(),
        })
    }
}

/// Load the admission table from a CSV file
pub fn load(path: &Path, layout: &TableLayout) -> Result<Table> {
    TableLoader::new(layout)?.load_file(path)
}
