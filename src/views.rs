use crate::analyzer::{
    group_mean, mean_series, percent_change, rank_bottom_n, rank_top_n, round2, time_series_for, SeriesPoint,
};
use crate::error::{Result, TrackerError};
use crate::filter::{apply_filters, FilterConfig};
use crate::models::{AdmissionCategory, AdmissionRow, Table, UniversityGroup};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

// Last-year snapshots are gray, the final rate red and the 3-year average orange
const REFERENCE_COLORS: [&str; 6] = ["gray", "gray", "gray", "gray", "red", "orange"];
const BASELINE_COLOR: &str = "green";
const CURRENT_COLOR: &str = "blue";

/// Colour for the n-th series of a chart
pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

fn reference_color(index: usize) -> &'static str {
    REFERENCE_COLORS.get(index).copied().unwrap_or("gray")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedValue {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub color: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendChart {
    pub title: String,
    pub series: Vec<LineSeries>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrend {
    pub category: AdmissionCategory,
    pub chart: TrendChart,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTrend {
    pub group: String,
    pub charts: Vec<CategoryTrend>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub latest_column: String,
    pub university_ranking: Vec<RankedValue>,
    pub group_trends: Vec<GroupTrend>,
    pub recommendation_trend: TrendChart,
    pub recommendation_top: Vec<RankedValue>,
    pub recommendation_bottom: Vec<RankedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub department: String,
    pub capacity: Option<u32>,
    pub current_rate: f64,
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissionSection {
    pub admission_key: String,
    pub chart: TrendChart,
    pub top: Vec<RankingRow>,
    pub bottom: Vec<RankingRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniversityAnalysisView {
    pub university: String,
    pub latest_column: String,
    pub previous_column: Option<String>,
    pub sections: Vec<AdmissionSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceLine {
    pub name: String,
    pub value: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentDetail {
    pub department: String,
    pub title: String,
    pub current: LineSeries,
    pub reference_lines: Vec<ReferenceLine>,
    pub baseline: ReferenceLine,
    pub x_span: Option<(String, String)>,
    pub y_range: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailSection {
    pub admission_key: String,
    pub departments: Vec<DepartmentDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniversityDetailView {
    pub university: String,
    pub sections: Vec<DetailSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedValue {
    pub name: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRow {
    pub department: String,
    pub admission_name: String,
    pub capacity: Option<u32>,
    pub latest_rate: Option<f64>,
    pub references: Vec<NamedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryListing {
    pub category: AdmissionCategory,
    pub rows: Vec<ListingRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniversityListing {
    pub university: String,
    pub categories: Vec<CategoryListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchView {
    pub latest_column: String,
    pub filter: FilterConfig,
    pub matched_rows: usize,
    pub universities: Vec<UniversityListing>,
}

fn to_ranked(pairs: Vec<(String, f64)>) -> Vec<RankedValue> {
    pairs
        .into_iter()
        .map(|(label, value)| RankedValue { label, value })
        .collect()
}

fn rows_where<'a, F>(table: &'a Table, predicate: F) -> Vec<&'a AdmissionRow>
where
    F: Fn(&AdmissionRow) -> bool,
{
    table.rows.iter().filter(|row| predicate(row)).collect()
}

/// Per-university mean trend lines, skipping universities without rows
fn university_mean_series(table: &Table, universities: &[&str], rows: &[&AdmissionRow]) -> Vec<LineSeries> {
    universities
        .iter()
        .filter_map(|university| {
            let subset: Vec<&AdmissionRow> = rows.iter().copied().filter(|r| r.university == *university).collect();
            let points = mean_series(&subset, &table.schema.snapshots);
            if points.is_empty() {
                None
            } else {
                Some((university.to_string(), points))
            }
        })
        .enumerate()
        .map(|(i, (name, points))| LineSeries {
            name,
            color: palette_color(i).to_string(),
            points,
        })
        .collect()
}

pub fn dashboard_view(table: &Table, groups: &[UniversityGroup], top_n: usize) -> Result<DashboardView> {
    let latest = table.latest_rate_column()?;

    let by_university = group_mean(&table.rows, |r| r.university.as_str(), |r| r.latest_rate());
    let university_ranking = to_ranked(rank_top_n(&by_university.pairs(), by_university.entries.len()));

    let mut group_trends = Vec::new();
    for group in groups {
        let universities: Vec<&str> = group.universities.iter().map(String::as_str).collect();
        let charts = AdmissionCategory::ALL
            .iter()
            .map(|&category| {
                let rows = rows_where(table, |r| r.admission_category == category);
                CategoryTrend {
                    category,
                    chart: TrendChart {
                        title: format!("{}전형 평균 경쟁률", category.label()),
                        series: university_mean_series(table, &universities, &rows),
                        annotations: Vec::new(),
                    },
                }
            })
            .collect();
        group_trends.push(GroupTrend {
            group: group.name.clone(),
            charts,
        });
    }

    let recommended_rows: Vec<AdmissionRow> = table.rows.iter().filter(|r| r.is_recommended_track).cloned().collect();
    let recommended_means = group_mean(&recommended_rows, |r| r.university.as_str(), |r| r.latest_rate());
    let recommendation_top = to_ranked(rank_top_n(&recommended_means.pairs(), top_n));
    let recommendation_bottom = to_ranked(rank_bottom_n(&recommended_means.pairs(), top_n));

    let recommended_refs: Vec<&AdmissionRow> = recommended_rows.iter().collect();
    let all_universities = Table::distinct_in_order(&table.rows, |r| r.university.as_str());
    let recommendation_series = university_mean_series(table, &all_universities, &recommended_refs);
    let annotations = recommendation_top
        .iter()
        .map(|ranked| Annotation {
            name: ranked.label.clone(),
            value: ranked.value,
        })
        .collect();

    debug!(
        "dashboard: {} universities ranked, {} groups, {} recommendation series",
        university_ranking.len(),
        group_trends.len(),
        recommendation_series.len()
    );

    Ok(DashboardView {
        latest_column: latest.column.clone(),
        university_ranking,
        group_trends,
        recommendation_trend: TrendChart {
            title: "학교장 추천전형 평균 경쟁률".to_string(),
            series: recommendation_series,
            annotations,
        },
        recommendation_top,
        recommendation_bottom,
    })
}

fn university_rows<'a>(table: &'a Table, university: &str) -> Result<Vec<&'a AdmissionRow>> {
    let rows = rows_where(table, |r| r.university == university);
    if rows.is_empty() {
        return Err(TrackerError::Validation(format!("unknown university '{}'", university)));
    }
    Ok(rows)
}

fn admission_keys<'a>(rows: &[&'a AdmissionRow]) -> Vec<&'a str> {
    let mut keys: Vec<&str> = Vec::new();
    for &row in rows {
        if !keys.contains(&row.admission_name_key.as_str()) {
            keys.push(row.admission_name_key.as_str());
        }
    }
    keys
}

/// First row of every department, in first-appearance order
fn first_row_per_department<'a>(rows: &[&'a AdmissionRow]) -> Vec<&'a AdmissionRow> {
    let mut firsts: Vec<&AdmissionRow> = Vec::new();
    for &row in rows {
        if !firsts.iter().any(|r| r.department == row.department) {
            firsts.push(row);
        }
    }
    firsts
}

fn ranking_row(row: &AdmissionRow, current: f64) -> RankingRow {
    RankingRow {
        department: row.department.clone(),
        capacity: row.capacity,
        current_rate: round2(current),
        change_percent: percent_change(Some(current), row.previous_rate()),
    }
}

pub fn university_analysis_view(table: &Table, university: &str, top_n: usize) -> Result<UniversityAnalysisView> {
    let latest = table.latest_rate_column()?;
    let rows = university_rows(table, university)?;

    let mut sections = Vec::new();
    for key in admission_keys(&rows) {
        let admission_rows: Vec<&AdmissionRow> = rows.iter().copied().filter(|r| r.admission_name_key == key).collect();

        let rated: Vec<(usize, f64)> = admission_rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.latest_rate().map(|rate| (i, rate)))
            .collect();
        let top = rank_top_n(&rated, top_n);
        let bottom = rank_bottom_n(&rated, top_n);
        let top_departments: Vec<&str> = top.iter().map(|(i, _)| admission_rows[*i].department.as_str()).collect();

        let mut series = Vec::new();
        let mut annotations = Vec::new();
        for (i, row) in first_row_per_department(&admission_rows).into_iter().enumerate() {
            let points = time_series_for(row, &table.schema.snapshots);
            if top_departments.contains(&row.department.as_str()) {
                if let Some(last) = points.last() {
                    annotations.push(Annotation {
                        name: row.department.clone(),
                        value: last.value,
                    });
                }
            }
            series.push(LineSeries {
                name: row.department.clone(),
                color: palette_color(i).to_string(),
                points,
            });
        }

        sections.push(AdmissionSection {
            admission_key: key.to_string(),
            chart: TrendChart {
                title: format!("{} 전형 경쟁률 추이", key),
                series,
                annotations,
            },
            top: top.iter().map(|(i, rate)| ranking_row(admission_rows[*i], *rate)).collect(),
            bottom: bottom.iter().map(|(i, rate)| ranking_row(admission_rows[*i], *rate)).collect(),
        });
    }

    Ok(UniversityAnalysisView {
        university: university.to_string(),
        latest_column: latest.column.clone(),
        previous_column: table.previous_rate_column().map(|s| s.column.clone()),
        sections,
    })
}

fn department_detail(table: &Table, row: &AdmissionRow, baseline_rate: f64) -> DepartmentDetail {
    let snapshots = &table.schema.snapshots;
    let points = time_series_for(row, snapshots);

    let reference_lines: Vec<ReferenceLine> = table
        .schema
        .reference_names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            row.reference_at(i).map(|value| ReferenceLine {
                name: name.clone(),
                value,
                color: reference_color(i).to_string(),
            })
        })
        .collect();

    let plotted = points
        .iter()
        .map(|p| p.value)
        .chain(reference_lines.iter().map(|l| l.value))
        .chain(std::iter::once(baseline_rate));
    let (min, max) = plotted.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    DepartmentDetail {
        department: row.department.clone(),
        title: format!("{} - {} 전형 경쟁률 추이", row.department, row.admission_name_key),
        current: LineSeries {
            name: "현재 경쟁률".to_string(),
            color: CURRENT_COLOR.to_string(),
            points,
        },
        reference_lines,
        baseline: ReferenceLine {
            name: format!("경쟁률 {:.2}", baseline_rate),
            value: baseline_rate,
            color: BASELINE_COLOR.to_string(),
        },
        x_span: match (snapshots.first(), snapshots.last()) {
            (Some(first), Some(last)) => Some((first.label.clone(), last.label.clone())),
            _ => None,
        },
        y_range: ((min - 0.5).max(0.0), max + 0.5),
    }
}

pub fn university_detail_view(table: &Table, university: &str, baseline_rate: f64) -> Result<UniversityDetailView> {
    table.latest_rate_column()?;
    let rows = university_rows(table, university)?;

    let sections = admission_keys(&rows)
        .into_iter()
        .map(|key| {
            let admission_rows: Vec<&AdmissionRow> =
                rows.iter().copied().filter(|r| r.admission_name_key == key).collect();
            DetailSection {
                admission_key: key.to_string(),
                departments: first_row_per_department(&admission_rows)
                    .into_iter()
                    .map(|row| department_detail(table, row, baseline_rate))
                    .collect(),
            }
        })
        .collect();

    Ok(UniversityDetailView {
        university: university.to_string(),
        sections,
    })
}

// Highest latest rate first, rows without one last
fn by_latest_desc(a: &AdmissionRow, b: &AdmissionRow) -> Ordering {
    match (a.latest_rate(), b.latest_rate()) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn search_view(table: &Table, config: &FilterConfig, listing_columns: &[String]) -> Result<SearchView> {
    let latest = table.latest_rate_column()?;
    let filtered = apply_filters(table, config)?;

    let reference_indices: Vec<(String, Option<usize>)> = listing_columns
        .iter()
        .map(|name| (name.clone(), table.schema.reference_index(name)))
        .collect();

    let mut selected: Vec<&str> = Vec::new();
    for university in &config.universities {
        if !selected.contains(&university.as_str()) {
            selected.push(university.as_str());
        }
    }

    let universities = selected
        .into_iter()
        .map(|university| {
            let categories = AdmissionCategory::ALL
                .iter()
                .map(|&category| {
                    let mut rows: Vec<&AdmissionRow> = filtered
                        .rows
                        .iter()
                        .filter(|r| r.university == university && r.admission_category == category)
                        .collect();
                    rows.sort_by(|a, b| by_latest_desc(a, b));
                    CategoryListing {
                        category,
                        rows: rows
                            .into_iter()
                            .map(|row| ListingRow {
                                department: row.department.clone(),
                                admission_name: row.admission_name.clone(),
                                capacity: row.capacity,
                                latest_rate: row.latest_rate(),
                                references: reference_indices
                                    .iter()
                                    .map(|(name, idx)| NamedValue {
                                        name: name.clone(),
                                        value: idx.and_then(|i| row.reference_at(i)),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    }
                })
                .collect();
            UniversityListing {
                university: university.to_string(),
                categories,
            }
        })
        .collect();

    Ok(SearchView {
        latest_column: latest.column.clone(),
        filter: config.clone(),
        matched_rows: filtered.rows.len(),
        universities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::sample_table;
    use crate::loader::TableLoader;
    use crate::models::{SeriesFilter, TableLayout};

    fn groups() -> Vec<UniversityGroup> {
        vec![
            UniversityGroup {
                name: "AB".to_string(),
                universities: vec!["B대학교".to_string(), "A대학교".to_string(), "Z대학교".to_string()],
            },
        ]
    }

    #[test]
    fn test_palette_is_deterministic_and_cycles() {
        assert_eq!(palette_color(0), palette_color(0));
        assert_eq!(palette_color(0), palette_color(PALETTE.len()));
        assert_ne!(palette_color(0), palette_color(1));
    }

    #[test]
    fn test_dashboard_ranking_and_group_trends() {
        let table = sample_table();
        let view = dashboard_view(&table, &groups(), 5).unwrap();

        assert_eq!(view.latest_column, "경쟁률_0911");
        assert_eq!(
            view.university_ranking,
            vec![
                RankedValue { label: "B대학교".to_string(), value: 7.0 },
                RankedValue { label: "A대학교".to_string(), value: 6.0 },
            ]
        );

        let trend = &view.group_trends[0];
        assert_eq!(trend.charts.len(), 2);
        let academic = &trend.charts[0];
        assert_eq!(academic.category, AdmissionCategory::AcademicRecord);
        // Z대학교 has no rows and gets no line; order follows the group definition
        let names: Vec<&str> = academic.chart.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B대학교", "A대학교"]);
        assert_eq!(academic.chart.series[1].points.last().unwrap().value, 6.0);
    }

    #[test]
    fn test_dashboard_recommendation_tables() {
        let table = sample_table();
        let view = dashboard_view(&table, &[], 1).unwrap();

        assert_eq!(view.recommendation_top.len(), 1);
        assert_eq!(view.recommendation_top[0].label, "B대학교");
        assert_eq!(view.recommendation_bottom[0].label, "A대학교");
        assert_eq!(view.recommendation_bottom[0].value, 6.0);
        assert_eq!(view.recommendation_trend.series.len(), 2);
        assert_eq!(view.recommendation_trend.annotations.len(), 1);
    }

    #[test]
    fn test_dashboard_tie_keeps_table_order() {
        let layout = TableLayout::default();
        let csv = "\
대학명,전형구분,모집단위,추천전형,경쟁률_0910
X,교과,a,1,4.5
Y,교과,a,1,9.0
W,교과,a,1,4.5
V,교과,a,1,1.0
";
        let table = TableLoader::new(&layout).unwrap().load_reader(csv.as_bytes(), "t").unwrap();
        let view = dashboard_view(&table, &[], 5).unwrap();
        let labels: Vec<&str> = view.recommendation_top.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Y", "X", "W", "V"]);
    }

    #[test]
    fn test_university_analysis_sections() {
        let table = sample_table();
        let view = university_analysis_view(&table, "A대학교", 5).unwrap();

        assert_eq!(view.previous_column.as_deref(), Some("경쟁률_0910"));
        let keys: Vec<&str> = view.sections.iter().map(|s| s.admission_key.as_str()).collect();
        assert_eq!(keys, vec!["학생부교과", "학생부종합"]);

        let section = &view.sections[0];
        assert_eq!(section.chart.series.len(), 2);
        assert_eq!(section.chart.series[1].points.len(), 2);
        assert_ne!(section.chart.series[0].color, section.chart.series[1].color);

        assert_eq!(section.top[0].department, "수학과");
        assert_eq!(section.top[0].current_rate, 7.0);
        // 수학과 has no previous snapshot value
        assert_eq!(section.top[0].change_percent, None);
        assert_eq!(section.top[1].change_percent, Some(25.0));
        assert_eq!(section.bottom[0].department, "국어국문학과");
        assert_eq!(section.chart.annotations.len(), 2);
    }

    #[test]
    fn test_unknown_university_is_validation_error() {
        let table = sample_table();
        let err = university_analysis_view(&table, "C대학교", 5).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        assert!(university_detail_view(&table, "C대학교", 6.0).is_err());
    }

    #[test]
    fn test_university_detail_reference_lines_and_range() {
        let table = sample_table();
        let view = university_detail_view(&table, "B대학교", 6.0).unwrap();
        assert_eq!(view.sections.len(), 2);

        let physics = &view.sections[0].departments[0];
        assert_eq!(physics.department, "물리학과");
        let names: Vec<&str> = physics.reference_lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["최종(2024)", "3개년평균"]);
        assert_eq!(physics.reference_lines[0].color, "red");
        assert_eq!(physics.reference_lines[1].color, "orange");
        assert_eq!(physics.baseline.value, 6.0);
        assert_eq!(physics.y_range, (2.5, 8.5));
        assert_eq!(physics.x_span, Some(("0909".to_string(), "0911".to_string())));

        let chemistry = &view.sections[1].departments[0];
        assert_eq!(chemistry.current.points.len(), 2);
        assert_eq!(chemistry.y_range, (0.5, 6.5));
    }

    #[test]
    fn test_search_view_groups_by_university_then_category() {
        let table = sample_table();
        let config = FilterConfig {
            universities: vec!["B대학교".to_string(), "A대학교".to_string(), "B대학교".to_string()],
            max_latest_rate: Some(7.0),
            series_filter: SeriesFilter::All,
            only_recommended: false,
        };
        let listing = vec!["최종(2024)".to_string(), "3개년평균".to_string()];
        let view = search_view(&table, &config, &listing).unwrap();

        assert_eq!(view.matched_rows, 4);
        assert_eq!(view.universities.len(), 2);
        assert_eq!(view.universities[0].university, "B대학교");

        let b = &view.universities[0];
        assert_eq!(b.categories[0].rows.len(), 1);
        // 화학과 has no latest rate and is filtered out
        assert!(b.categories[1].rows.is_empty());

        let a_academic = &view.universities[1].categories[0];
        let departments: Vec<&str> = a_academic.rows.iter().map(|r| r.department.as_str()).collect();
        assert_eq!(departments, vec!["수학과", "국어국문학과"]);
        assert_eq!(a_academic.rows[1].references[0].value, Some(6.5));
        assert_eq!(a_academic.rows[0].references[1].value, None);
    }

    #[test]
    fn test_search_view_requires_selection() {
        let table = sample_table();
        let config = FilterConfig {
            universities: Vec::new(),
            max_latest_rate: Some(6.0),
            series_filter: SeriesFilter::All,
            only_recommended: false,
        };
        assert!(matches!(search_view(&table, &config, &[]), Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_views_are_reproducible() {
        let table = sample_table();
        let first = serde_json::to_string(&dashboard_view(&table, &groups(), 5).unwrap()).unwrap();
        let second = serde_json::to_string(&dashboard_view(&table, &groups(), 5).unwrap()).unwrap();
        assert_eq!(first, second);

        let first = serde_json::to_string(&university_analysis_view(&table, "A대학교", 5).unwrap()).unwrap();
        let second = serde_json::to_string(&university_analysis_view(&table, "A대학교", 5).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
