use crate::scheme::{
    coerce_or_default, coerce_seat_or_default, Column, Gender, MarkScheme, PassFail, StudentRecord,
};
use serde::Serialize;

pub const TEMPLATE_HINT: &str = "Please download and use the correct template";

/// Result of validating one pasted/uploaded CSV text. Accepted records and
/// row errors travel together so a preview can show both at once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub accepted: Vec<StudentRecord>,
    pub errors: Vec<String>,
}

/// Validates raw CSV text against the active scheme. Pure text-in,
/// outcome-out: no I/O and no persistence, so the same text always produces
/// the same outcome.
pub fn validate(raw_text: &str, scheme: MarkScheme) -> ImportOutcome {
    let lines: Vec<&str> = raw_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return ImportOutcome {
            accepted: Vec::new(),
            errors: vec!["file must contain at least one data row".to_string()],
        };
    }

    // Header check is set membership only. Column order inside data rows is
    // fixed by the scheme layout, not by the header arrangement.
    let header_cells: Vec<String> = lines[0].split(',').map(|c| c.trim().to_string()).collect();
    let mut errors: Vec<String> = Vec::new();
    for name in scheme.expected_headers() {
        if !header_cells.iter().any(|h| *h == name) {
            errors.push(format!("Missing header: {}", name));
        }
    }
    if !errors.is_empty() {
        errors.push(TEMPLATE_HINT.to_string());
        return ImportOutcome {
            accepted: Vec::new(),
            errors,
        };
    }

    let mut accepted: Vec<StudentRecord> = Vec::new();
    for (idx, line) in lines[1..].iter().enumerate() {
        let row_no = idx + 2;
        let cells: Vec<String> = line.split(',').map(|c| c.trim().to_string()).collect();
        let record = record_from_cells(scheme, &cells);
        let row_errors = validate_record(scheme, &record);
        if row_errors.is_empty() {
            accepted.push(record);
        } else {
            errors.extend(
                row_errors
                    .into_iter()
                    .map(|reason| format!("Row {}: {}", row_no, reason)),
            );
        }
    }

    ImportOutcome { accepted, errors }
}

fn record_from_cells(scheme: MarkScheme, cells: &[String]) -> StudentRecord {
    let mut record = StudentRecord::empty(scheme);
    for (i, col) in scheme.columns().into_iter().enumerate() {
        let raw = cells.get(i).map(|c| c.as_str()).unwrap_or("");
        match col {
            Column::SeatNumber => record.seat_number = coerce_seat_or_default(raw),
            Column::RollNo => {
                let trimmed = raw.trim();
                record.roll_no = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                };
            }
            Column::Name => record.student_name = raw.trim().to_string(),
            Column::Gender => record.gender = Gender::coerce_or_default(raw),
            Column::Mark { subject, field } => record.marks[subject][field] = coerce_or_default(raw),
            Column::Result => record.result = PassFail::from_letter(raw),
            Column::Summary => record.total_cgpa = coerce_or_default(raw),
        }
    }
    record
}

/// Runs every field validator in fixed order and returns all failures.
/// Shared by the bulk import and the manual entry path so both reject the
/// same records for the same reasons.
pub fn validate_record(scheme: MarkScheme, record: &StudentRecord) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    // Length check runs on the string form of the parsed integer, so a
    // non-numeric seat collapses to 0 and fails here.
    if record.seat_number.to_string().len() != 6 {
        errors.push("Seat number must be exactly 6 digits".to_string());
    }

    if let Some(roll) = record.roll_no.as_deref() {
        let numeric_ok = roll.parse::<i64>().map(|v| v < 200).unwrap_or(false);
        if !(numeric_ok && roll.len() <= 2) {
            errors.push("Roll number must be under 200 and maximum 2 digits".to_string());
        }
    }

    if record.student_name.trim().is_empty() {
        errors.push("Student name is required".to_string());
    }

    for (si, subject) in scheme.subjects().iter().enumerate() {
        for (fi, field) in subject.fields.iter().enumerate() {
            let value = record.mark(si, fi);
            if value < 0.0 || value > field.max {
                errors.push(format!(
                    "{} {} must be between 0-{}",
                    subject.name, field.label, field.max as i64
                ));
            }
        }
    }

    if scheme.has_result_column() && record.result.is_none() {
        errors.push("Result must be P or F".to_string());
    }

    if record.total_cgpa < 0.0 || record.total_cgpa > 10.0 {
        errors.push(format!("{} must be between 0-10", scheme.summary_label()));
    }

    errors
}

/// Header line plus one passing sample row, matching what the validator
/// expects back.
pub fn template_csv(scheme: MarkScheme) -> String {
    let headers = scheme.expected_headers().join(",");
    let sample: Vec<String> = scheme
        .columns()
        .into_iter()
        .map(|col| sample_value(scheme, col))
        .collect();
    format!("{}\n{}\n", headers, sample.join(","))
}

fn sample_value(scheme: MarkScheme, col: Column) -> String {
    match col {
        Column::SeatNumber => "123456".to_string(),
        Column::RollNo => "01".to_string(),
        Column::Name => "John Doe".to_string(),
        Column::Gender => match scheme {
            MarkScheme::SeIaTw => "M".to_string(),
            _ => "Male".to_string(),
        },
        Column::Mark { subject, field } => {
            let max = scheme.subjects()[subject].fields[field].max;
            format!("{}", (max * 3.0 / 4.0) as i64)
        }
        Column::Result => "P".to_string(),
        Column::Summary => "8.75".to_string(),
    }
}

/// One CSV row in scheme column order. Inverse of the positional read the
/// validator performs.
pub fn record_to_row(scheme: MarkScheme, record: &StudentRecord) -> Vec<String> {
    scheme
        .columns()
        .into_iter()
        .map(|col| match col {
            Column::SeatNumber => record.seat_number.to_string(),
            Column::RollNo => record.roll_no.clone().unwrap_or_default(),
            Column::Name => record.student_name.clone(),
            Column::Gender => match (scheme, record.gender) {
                (_, None) => String::new(),
                (MarkScheme::SeIaTw, Some(Gender::Male)) => "M".to_string(),
                (MarkScheme::SeIaTw, Some(Gender::Female)) => "F".to_string(),
                (_, Some(g)) => g.as_str().to_string(),
            },
            Column::Mark { subject, field } => record.mark(subject, field).to_string(),
            Column::Result => record
                .result
                .map(|r| r.letter().to_string())
                .unwrap_or_default(),
            Column::Summary => record.total_cgpa.to_string(),
        })
        .collect()
}
