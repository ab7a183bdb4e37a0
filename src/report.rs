use crate::analyzer::format_change;
use crate::models::AdmissionCategory;
use crate::views::{DashboardView, RankingRow, SearchView, UniversityAnalysisView, UniversityDetailView};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

fn format_rate(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

fn format_capacity(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn admission_emoji(admission_key: &str) -> &'static str {
    match admission_key {
        "학생부교과" => "📚",
        "학생부종합" => "🎓",
        "논술" => "✍️",
        "실기/실적" => "🎭",
        "수능" => "📝",
        "학생부교과(지역인재)" => "🏠",
        "학생부종합(지역인재)" => "🌄",
        _ => "📊",
    }
}

fn university_emoji(university: &str) -> &'static str {
    match university {
        "서울대학교" => "🏛️",
        "연세대학교" => "🎓",
        "고려대학교" => "🦅",
        "성균관대학교" => "📚",
        "서강대학교" => "🌟",
        "한양대학교" => "🔬",
        "중앙대학교" => "🏫",
        "경희대학교" => "🌸",
        "한국외국어대학교" => "🌎",
        "서울시립대학교" => "🏙️",
        _ => "🏫",
    }
}

/// Write a view as pretty JSON to `<output_dir>/<name>.json`
pub fn write_json<T: Serialize>(view: &T, output_dir: &str, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).with_context(|| format!("Failed to create output directory: {}", output_dir))?;
    let path = Path::new(output_dir).join(format!("{}.json", name));
    let content = serde_json::to_string_pretty(view)?;
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}

pub fn generate_analysis_rankings_csv(view: &UniversityAnalysisView, output_dir: &str) -> Result<PathBuf> {
    use csv::Writer;

    fs::create_dir_all(output_dir)?;
    let csv_path = Path::new(output_dir).join("analysis_rankings.csv");
    let mut writer = Writer::from_path(&csv_path)?;

    writer.write_record(["대학명", "전형", "구분", "모집단위", "모집인원", "현재 경쟁률", "변화율(%)"])?;

    for section in &view.sections {
        for (label, rows) in [("TOP", &section.top), ("LOW", &section.bottom)] {
            for row in rows {
                let capacity = format_capacity(row.capacity);
                let current = format!("{:.2}", row.current_rate);
                let change = format_change(row.change_percent);
                writer.write_record([
                    view.university.as_str(),
                    section.admission_key.as_str(),
                    label,
                    row.department.as_str(),
                    capacity.as_str(),
                    current.as_str(),
                    change.as_str(),
                ])?;
            }
        }
    }

    writer.flush()?;
    info!("wrote {}", csv_path.display());
    Ok(csv_path)
}

pub fn generate_search_csv(view: &SearchView, output_dir: &str) -> Result<PathBuf> {
    use csv::Writer;

    fs::create_dir_all(output_dir)?;
    let csv_path = Path::new(output_dir).join("search.csv");
    let mut writer = Writer::from_path(&csv_path)?;

    let reference_names: Vec<String> = view
        .universities
        .iter()
        .flat_map(|u| u.categories.iter())
        .flat_map(|c| c.rows.iter())
        .next()
        .map(|row| row.references.iter().map(|r| r.name.clone()).collect())
        .unwrap_or_default();

    let mut headers: Vec<String> = ["대학명", "전형구분", "모집단위", "전형명", "모집인원", "최신경쟁률"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    headers.extend(reference_names);
    writer.write_record(&headers)?;

    for university in &view.universities {
        for category in &university.categories {
            for row in &category.rows {
                let mut record = vec![
                    university.university.clone(),
                    category.category.label().to_string(),
                    row.department.clone(),
                    row.admission_name.clone(),
                    format_capacity(row.capacity),
                    format_rate(row.latest_rate),
                ];
                record.extend(row.references.iter().map(|r| format_rate(r.value)));
                writer.write_record(&record)?;
            }
        }
    }

    writer.flush()?;
    info!("wrote {}", csv_path.display());
    Ok(csv_path)
}

pub fn print_dashboard_summary(view: &DashboardView) {
    println!("\n📊 학교별 평균 경쟁률 ({})", view.latest_column);
    println!("==========================\n");
    for (i, ranked) in view.university_ranking.iter().enumerate() {
        println!("   {}. {} - {:.2}", i + 1, ranked.label, ranked.value);
    }

    println!("\n🏫 그룹별 평균 경쟁률 (교과/종합)");
    for group in &view.group_trends {
        let lines: usize = group.charts.iter().map(|c| c.chart.series.len()).sum();
        println!("   🔹 {} ({} series)", group.group, lines);
    }

    println!("\n🎓 학교장 추천전형 경쟁률");
    println!("   TOP:");
    for ranked in &view.recommendation_top {
        println!("      {} - {:.2}", ranked.label, ranked.value);
    }
    println!("   LOW:");
    for ranked in &view.recommendation_bottom {
        println!("      {} - {:.2}", ranked.label, ranked.value);
    }
}

fn print_ranking_rows(title: &str, rows: &[RankingRow]) {
    println!("   {}:", title);
    for row in rows {
        println!(
            "      {} (모집 {}) - {:.2} ({}%)",
            row.department,
            format_capacity(row.capacity),
            row.current_rate,
            format_change(row.change_percent)
        );
    }
}

pub fn print_analysis_summary(view: &UniversityAnalysisView) {
    println!("\n{} {} 학교별 분석", university_emoji(&view.university), view.university);
    println!("==========================");
    if view.previous_column.is_none() {
        println!("⚠️  Only one snapshot available, change rates are N/A");
    }
    for section in &view.sections {
        println!(
            "\n{} {} 전형 ({} 모집단위)",
            admission_emoji(&section.admission_key),
            section.admission_key,
            section.chart.series.len()
        );
        print_ranking_rows("TOP", &section.top);
        print_ranking_rows("LOW", &section.bottom);
    }
}

pub fn print_detail_summary(view: &UniversityDetailView) {
    println!("\n📊 {} 학교별 세부분석", view.university);
    println!("==========================");
    for section in &view.sections {
        println!("\n{} {} 전형", admission_emoji(&section.admission_key), section.admission_key);
        for detail in &section.departments {
            let latest = detail.current.points.last().map(|p| p.value);
            let references: Vec<String> = detail
                .reference_lines
                .iter()
                .map(|l| format!("{}: {:.2}", l.name, l.value))
                .collect();
            println!(
                "   {} - 현재 {} | {}",
                detail.department,
                format_rate(latest),
                if references.is_empty() { "-".to_string() } else { references.join(", ") }
            );
        }
    }
}

pub fn print_search_summary(view: &SearchView) {
    println!("\n🔍 필터링 검색 ({} rows)", view.matched_rows);
    if view.matched_rows == 0 {
        println!("ℹ️  조건에 맞는 결과가 없습니다.");
        return;
    }
    for university in &view.universities {
        println!("---");
        println!("{} {}", university_emoji(&university.university), university.university);
        for category in &university.categories {
            let symbol = match category.category {
                AdmissionCategory::AcademicRecord => "📌",
                AdmissionCategory::Comprehensive => "🔍",
            };
            if category.rows.is_empty() {
                println!("{} {} 전형: 해당 없음", symbol, category.category.label());
                continue;
            }
            println!("{} {} 전형", symbol, category.category.label());
            for row in &category.rows {
                println!(
                    "   {} | {} | {} | {}",
                    row.department,
                    row.admission_name,
                    format_capacity(row.capacity),
                    format_rate(row.latest_rate)
                );
            }
        }
    }
}
