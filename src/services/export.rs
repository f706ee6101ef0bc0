use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use chrono::NaiveDateTime;
use serde::Serialize;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AppError;
use crate::models::{ClassroomRecord, User};

pub const SUMMARY_ENTRY: &str = "summary.csv";
pub const DETAIL_ENTRY: &str = "detail.csv";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    classroom: &'a str,
    assignment: &'a str,
    deadline: String,
    students: usize,
    submitted: usize,
    passed: usize,
}

#[derive(Debug, Serialize)]
struct DetailRow<'a> {
    classroom: &'a str,
    assignment: &'a str,
    deadline: String,
    student: &'a str,
    login: &'a str,
    repository: &'a str,
    submitted: &'static str,
    passed: &'static str,
    grade: &'a str,
    commits: String,
    fetched_at: String,
}

#[derive(Debug, Serialize)]
struct UserRow<'a> {
    chat_id: i64,
    name: String,
    username: &'a str,
    role: &'static str,
    github_username: &'a str,
    has_token: &'static str,
    created_at: String,
}

fn timestamp(value: Option<NaiveDateTime>) -> String {
    value
        .map(|v| v.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "",
    }
}

fn write_csv<T: Serialize>(rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::Export(format!("failed to write csv row: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Export(format!("failed to finish csv: {}", e)))
}

/// Per-assignment counts; assignment-only rows (no student) count as zero students.
fn summary_csv(records: &[ClassroomRecord]) -> Result<Vec<u8>, AppError> {
    let mut groups: BTreeMap<(&str, &str), SummaryRow<'_>> = BTreeMap::new();
    for record in records {
        let classroom = record.classroom_name.as_deref().unwrap_or_default();
        let assignment = record.assignment_title.as_deref().unwrap_or_default();
        let row = groups.entry((classroom, assignment)).or_insert_with(|| SummaryRow {
            classroom,
            assignment,
            deadline: timestamp(record.deadline),
            students: 0,
            submitted: 0,
            passed: 0,
        });
        if record.student_login.is_some() || record.student_display_login.is_some() {
            row.students += 1;
            row.submitted += usize::from(record.submitted == Some(true));
            row.passed += usize::from(record.passed == Some(true));
        }
    }
    write_csv(groups.into_values())
}

fn detail_csv(records: &[ClassroomRecord]) -> Result<Vec<u8>, AppError> {
    write_csv(records.iter().map(|record| DetailRow {
        classroom: record.classroom_name.as_deref().unwrap_or_default(),
        assignment: record.assignment_title.as_deref().unwrap_or_default(),
        deadline: timestamp(record.deadline),
        student: record.student_display_login.as_deref().unwrap_or_default(),
        login: record.student_login.as_deref().unwrap_or_default(),
        repository: record.student_repo_url.as_deref().unwrap_or_default(),
        submitted: yes_no(record.submitted),
        passed: yes_no(record.passed),
        grade: record.grade.as_deref().unwrap_or_default(),
        commits: record.commit_count.map(|c| c.to_string()).unwrap_or_default(),
        fetched_at: timestamp(Some(record.fetched_at)),
    }))
}

/// Zip bundle holding a summary sheet and a per-student detail sheet.
pub fn classroom_workbook(records: &[ClassroomRecord]) -> Result<Vec<u8>, AppError> {
    let summary = summary_csv(records)?;
    let detail = detail_csv(records)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (entry, bytes) in [(SUMMARY_ENTRY, &summary), (DETAIL_ENTRY, &detail)] {
        zip.start_file(entry, opts)
            .map_err(|e| AppError::Export(format!("failed to start {}: {}", entry, e)))?;
        zip.write_all(bytes)
            .map_err(|e| AppError::Export(format!("failed to write {}: {}", entry, e)))?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| AppError::Export(format!("failed to finalize zip bundle: {}", e)))?;
    Ok(cursor.into_inner())
}

/// `users.csv`: one row per registered chat user.
pub fn user_roster(users: &[User]) -> Result<Vec<u8>, AppError> {
    write_csv(users.iter().map(|user| UserRow {
        chat_id: user.chat_id,
        name: user.display_name(),
        username: user.username.as_deref().unwrap_or_default(),
        role: user.role.as_str(),
        github_username: user.github_username.as_deref().unwrap_or_default(),
        has_token: if user.token().is_some() { "yes" } else { "no" },
        created_at: timestamp(Some(user.created_at)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn record(assignment: &str, student: Option<&str>, submitted: Option<bool>) -> ClassroomRecord {
        ClassroomRecord {
            id: format!("{}-{:?}", assignment, student),
            teacher_user_id: "t".to_string(),
            classroom_id: Some("1".to_string()),
            classroom_name: Some("CS101".to_string()),
            assignment_id: Some(assignment.to_string()),
            assignment_title: Some(assignment.to_string()),
            assignment_url: None,
            deadline: None,
            student_login: student.map(str::to_string),
            student_display_login: student.map(str::to_string),
            student_repo_url: None,
            submitted,
            passed: None,
            grade: None,
            commit_count: Some(3),
            raw_json: "{}".to_string(),
            fetched_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_workbook_contains_both_sheets() {
        let records = vec![
            record("HW1", Some("alice"), Some(true)),
            record("HW1", Some("bob"), Some(false)),
            record("HW2", None, None),
        ];
        let bytes = classroom_workbook(&records).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut summary = String::new();
        archive
            .by_name(SUMMARY_ENTRY)
            .unwrap()
            .read_to_string(&mut summary)
            .unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "classroom,assignment,deadline,students,submitted,passed");
        assert_eq!(lines[1], "CS101,HW1,,2,1,0");
        assert_eq!(lines[2], "CS101,HW2,,0,0,0");

        let mut detail = String::new();
        archive
            .by_name(DETAIL_ENTRY)
            .unwrap()
            .read_to_string(&mut detail)
            .unwrap();
        assert_eq!(detail.lines().count(), 4);
        assert!(detail.contains("CS101,HW1,,alice,alice,,yes,,,3,"));
    }
}
