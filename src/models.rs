use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_file: String,
    pub output_directory: Option<String>,
    pub top_n: usize,
    // Horizontal guide line drawn on every detail chart
    pub baseline_rate: f64,
    // Search threshold used when --max-rate is not given
    pub default_max_rate: f64,
    pub layout: TableLayout,
    pub university_groups: Vec<UniversityGroup>,
}

/// Column names of the input CSV, resolved once at load time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    pub university_column: String,
    pub category_column: String,
    pub track_column: String,
    pub department_column: String,
    pub admission_key_column: String,
    pub admission_name_column: String,
    pub capacity_column: String,
    pub recommended_column: String,
    pub rate_column_prefix: String,
    pub reference_columns: Vec<String>,
    pub listing_reference_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniversityGroup {
    pub name: String,
    pub universities: Vec<String>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            university_column: "대학명".to_string(),
            category_column: "전형구분".to_string(),
            track_column: "계열".to_string(),
            department_column: "모집단위".to_string(),
            admission_key_column: "전형명_key".to_string(),
            admission_name_column: "전형명".to_string(),
            capacity_column: "모집인원".to_string(),
            recommended_column: "추천전형".to_string(),
            rate_column_prefix: "경쟁률_".to_string(),
            reference_columns: vec![
                "D-2(2024)".to_string(),
                "D-1(2024)".to_string(),
                "D-0오전(2024)".to_string(),
                "D-0오후(2024)".to_string(),
                "최종(2024)".to_string(),
                "3개년평균".to_string(),
            ],
            listing_reference_columns: vec!["최종(2024)".to_string(), "3개년평균".to_string()],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let group = |name: &str, universities: &[&str]| UniversityGroup {
            name: name.to_string(),
            universities: universities.iter().map(|u| u.to_string()).collect(),
        };

        Self {
            data_file: "integrated_data.csv".to_string(),
            output_directory: Some("output".to_string()),
            top_n: 5,
            baseline_rate: 6.0,
            default_max_rate: 6.0,
            layout: TableLayout::default(),
            university_groups: vec![
                group("서연고", &["서울대학교", "연세대학교", "고려대학교"]),
                group("서성한", &["서강대학교", "성균관대학교", "한양대학교"]),
                group(
                    "중경외시이",
                    &["중앙대학교", "경희대학교", "한국외국어대학교", "서울시립대학교", "이화여자대학교"],
                ),
                group(
                    "경건동홍숙",
                    &["경희대학교", "건국대학교", "동국대학교", "홍익대학교", "숙명여자대학교"],
                ),
                group(
                    "국숭세단/과기/인하/아주",
                    &[
                        "국민대학교",
                        "숭실대학교",
                        "세종대학교",
                        "단국대학교(죽전)",
                        "서울과학기술대학교",
                        "인하대학교",
                        "아주대학교",
                    ],
                ),
                group(
                    "성신/광운/가천/가톨릭/에리카",
                    &["성신여자대학교", "광운대학교", "가천대학교", "가톨릭대학교", "한양대학교(에리카)"],
                ),
                group(
                    "명지/상명/항공/경기/글로벌/인천",
                    &[
                        "명지대학교",
                        "상명대학교",
                        "경기대학교",
                        "한국외국어대학교(글로벌)",
                        "인천대학교",
                        "한국항공대학교",
                    ],
                ),
                group("동덕/덕성/서울여대", &["동덕여자대학교", "덕성여자대학교", "서울여자대학교"]),
            ],
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionCategory {
    #[serde(rename = "교과")]
    AcademicRecord,
    #[serde(rename = "종합")]
    Comprehensive,
}

impl AdmissionCategory {
    pub const ALL: [AdmissionCategory; 2] = [AdmissionCategory::AcademicRecord, AdmissionCategory::Comprehensive];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "교과" => Some(Self::AcademicRecord),
            "종합" => Some(Self::Comprehensive),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AcademicRecord => "교과",
            Self::Comprehensive => "종합",
        }
    }
}

/// Applicant pool of a row. Rows with no recognised pool apply to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Track {
    #[serde(rename = "인문")]
    Humanities,
    #[serde(rename = "자연")]
    NaturalScience,
    #[serde(rename = "전체")]
    All,
}

impl Track {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "인문" => Self::Humanities,
            "자연" => Self::NaturalScience,
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeriesFilter {
    #[default]
    #[serde(rename = "모두")]
    All,
    #[serde(rename = "인문")]
    Humanities,
    #[serde(rename = "자연")]
    NaturalScience,
}

impl SeriesFilter {
    pub fn matches(&self, track: Track) -> bool {
        match self {
            Self::All => true,
            Self::Humanities => track == Track::Humanities,
            Self::NaturalScience => track == Track::NaturalScience,
        }
    }
}

impl FromStr for SeriesFilter {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" | "모두" => Ok(Self::All),
            "humanities" | "인문" => Ok(Self::Humanities),
            "natural" | "natural-science" | "자연" => Ok(Self::NaturalScience),
            other => Err(TrackerError::Validation(format!(
                "unknown series '{}', expected one of: all, 인문, 자연",
                other
            ))),
        }
    }
}

/// One rate snapshot column, e.g. `경쟁률_0910` with label `0910`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub column: String,
    pub label: String,
}

/// Column vocabulary shared by a table and everything derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub snapshots: Vec<Snapshot>,
    pub reference_names: Vec<String>,
}

impl TableSchema {
    pub fn reference_index(&self, name: &str) -> Option<usize> {
        self.reference_names.iter().position(|n| n == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionRow {
    // Index of the data row in the source file
    pub position: usize,
    pub university: String,
    pub admission_category: AdmissionCategory,
    pub track: Track,
    pub department: String,
    pub admission_name_key: String,
    pub admission_name: String,
    pub capacity: Option<u32>,
    pub is_recommended_track: bool,
    // Aligned with TableSchema::snapshots
    pub rates: Vec<Option<f64>>,
    // Aligned with TableSchema::reference_names
    pub references: Vec<Option<f64>>,
}

impl AdmissionRow {
    pub fn latest_rate(&self) -> Option<f64> {
        self.rates.last().copied().flatten()
    }

    pub fn previous_rate(&self) -> Option<f64> {
        if self.rates.len() < 2 {
            return None;
        }
        self.rates[self.rates.len() - 2]
    }

    pub fn rate_at(&self, snapshot_index: usize) -> Option<f64> {
        self.rates.get(snapshot_index).copied().flatten()
    }

    pub fn reference_at(&self, reference_index: usize) -> Option<f64> {
        self.references.get(reference_index).copied().flatten()
    }
}

/// Immutable admission table. Derived tables share the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: Arc<TableSchema>,
    pub rows: Vec<AdmissionRow>,
}

impl Table {
    pub fn new(schema: Arc<TableSchema>, rows: Vec<AdmissionRow>) -> Self {
        Self { schema, rows }
    }

    pub fn derive(&self, rows: Vec<AdmissionRow>) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            rows,
        }
    }

    pub fn latest_rate_column(&self) -> Result<&Snapshot> {
        self.schema
            .snapshots
            .last()
            .ok_or_else(|| TrackerError::Schema("no competition rate columns in table".to_string()))
    }

    /// Second-to-last snapshot; `None` when only one snapshot exists
    pub fn previous_rate_column(&self) -> Option<&Snapshot> {
        let snapshots = &self.schema.snapshots;
        if snapshots.len() < 2 {
            return None;
        }
        snapshots.get(snapshots.len() - 2)
    }

    /// Sorted distinct university names
    pub fn universities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rows.iter().map(|r| r.university.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn contains_university(&self, name: &str) -> bool {
        self.rows.iter().any(|r| r.university == name)
    }

    /// Distinct values in first-appearance order
    pub fn distinct_in_order<'a, F>(rows: &'a [AdmissionRow], key: F) -> Vec<&'a str>
    where
        F: Fn(&'a AdmissionRow) -> &'a str,
    {
        let mut seen: Vec<&str> = Vec::new();
        for row in rows {
            let value = key(row);
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        seen
    }
}

/// Interpret a recommendation flag cell
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "1.0" | "true" | "y" | "yes" | "o"
    )
}

/// Parse a rate cell; blanks, non-numbers, and negatives are absent
pub fn parse_rate(value: &str) -> Option<f64> {
    let cleaned = value.trim().replace(',', ".");
    let rate = cleaned.parse::<f64>().ok()?;
    if rate.is_finite() && rate >= 0.0 {
        Some(rate)
    } else {
        None
    }
}

pub fn parse_capacity(value: &str) -> Option<u32> {
    let cleaned = value.trim();
    cleaned
        .parse::<u32>()
        .ok()
        .or_else(|| {
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64 && v.fract() == 0.0)
                .map(|v| v as u32)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_rejects_negative_and_blank() {
        assert_eq!(parse_rate("5.25"), Some(5.25));
        assert_eq!(parse_rate("3,5"), Some(3.5));
        assert_eq!(parse_rate(""), None);
        assert_eq!(parse_rate("-"), None);
        assert_eq!(parse_rate("-1.0"), None);
        assert_eq!(parse_rate("NaN"), None);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("1.0"));
        assert!(parse_flag("True"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_parse_capacity() {
        assert_eq!(parse_capacity("12"), Some(12));
        assert_eq!(parse_capacity("12.0"), Some(12));
        assert_eq!(parse_capacity("12.5"), None);
        assert_eq!(parse_capacity(""), None);
        // Out-of-range cells are absent rather than clamped
        assert_eq!(parse_capacity("1e10"), None);
        assert_eq!(parse_capacity("4294967295"), Some(u32::MAX));
    }

    #[test]
    fn test_series_filter_from_str() {
        assert_eq!("모두".parse::<SeriesFilter>().unwrap(), SeriesFilter::All);
        assert_eq!("인문".parse::<SeriesFilter>().unwrap(), SeriesFilter::Humanities);
        assert_eq!("natural".parse::<SeriesFilter>().unwrap(), SeriesFilter::NaturalScience);
        assert!("예체능".parse::<SeriesFilter>().is_err());
    }

    #[test]
    fn test_series_filter_all_matches_every_track() {
        for track in [Track::Humanities, Track::NaturalScience, Track::All] {
            assert!(SeriesFilter::All.matches(track));
        }
        assert!(!SeriesFilter::Humanities.matches(Track::All));
        assert!(SeriesFilter::NaturalScience.matches(Track::NaturalScience));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let config = Config::default();
        config.save_to_file(path).unwrap();
        let loaded = Config::load_from_file(path).unwrap();

        assert_eq!(loaded.top_n, 5);
        assert_eq!(loaded.layout.rate_column_prefix, "경쟁률_");
        assert_eq!(loaded.university_groups, config.university_groups);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("data_file = \"rates.csv\"\ntop_n = 3\n").unwrap();
        assert_eq!(config.data_file, "rates.csv");
        assert_eq!(config.top_n, 3);
        assert_eq!(config.layout.university_column, "대학명");
        assert_eq!(config.baseline_rate, 6.0);
    }
}
