use crate::scheme::{Gender, MarkScheme, StudentRecord};
use serde::Serialize;

pub const DEFAULT_PASS_THRESHOLD_PERCENT: f64 = 40.0;
pub const DEFAULT_TOPPER_LIMIT: usize = 3;

/// Half-up 2-decimal rounding used for display percentages.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Sum of the fields that count toward the total for one subject. Fields
/// that are components of a derived total (SE and IA) stay out of it.
pub fn subject_total(scheme: MarkScheme, record: &StudentRecord, subject_idx: usize) -> f64 {
    let subject = &scheme.subjects()[subject_idx];
    subject
        .fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.counts_in_total)
        .map(|(fi, _)| record.mark(subject_idx, fi))
        .sum()
}

pub fn overall_total(scheme: MarkScheme, record: &StudentRecord) -> f64 {
    (0..scheme.subjects().len())
        .map(|si| subject_total(scheme, record, si))
        .sum()
}

/// Unrounded percentage of the scheme maximum. Callers round for display.
pub fn overall_percentage(scheme: MarkScheme, record: &StudentRecord) -> f64 {
    let max = scheme.max_possible_total();
    if max > 0.0 {
        overall_total(scheme, record) * 100.0 / max
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenderCount {
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenderSplit {
    pub male: GenderCount,
    pub female: GenderCount,
    pub other: GenderCount,
    pub unset: GenderCount,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopperEntry {
    pub seat_number: i64,
    pub student_name: String,
    pub total_cgpa: f64,
    pub overall_total: f64,
    pub overall_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtremeEntry {
    pub seat_number: i64,
    pub student_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub total_students: usize,
    pub gender_split: GenderSplit,
    pub passed_students: usize,
    pub failed_students: usize,
    pub pass_rate_percent: f64,
    pub average_cgpa: f64,
    pub toppers: Vec<TopperEntry>,
    pub highest_by_cgpa: Option<ExtremeEntry>,
    pub lowest_by_cgpa: Option<ExtremeEntry>,
    pub highest_by_total: Option<ExtremeEntry>,
    pub lowest_by_total: Option<ExtremeEntry>,
    pub pass_threshold_percent: f64,
    pub max_possible_total: f64,
}

fn extreme_entry(record: &StudentRecord, value: f64) -> ExtremeEntry {
    ExtremeEntry {
        seat_number: record.seat_number,
        student_name: record.student_name.clone(),
        value,
    }
}

/// Aggregates one database's records. Pure: records in, report out, no
/// store access. An empty slice produces an all-zero report.
pub fn compute_aggregate(
    scheme: MarkScheme,
    records: &[StudentRecord],
    pass_threshold_percent: f64,
    topper_limit: usize,
) -> AggregateReport {
    let total = records.len();
    let percent_of_total = |count: usize| -> f64 {
        if total == 0 {
            0.0
        } else {
            round_off_2_decimals(count as f64 * 100.0 / total as f64)
        }
    };

    let mut male = 0usize;
    let mut female = 0usize;
    let mut other = 0usize;
    let mut unset = 0usize;
    for record in records {
        match record.gender {
            Some(Gender::Male) => male += 1,
            Some(Gender::Female) => female += 1,
            Some(Gender::Other) => other += 1,
            None => unset += 1,
        }
    }

    // Pass/fail splits on the unrounded percentage so a record sitting
    // exactly on the threshold counts as passed.
    let mut passed = 0usize;
    for record in records {
        if overall_percentage(scheme, record) >= pass_threshold_percent {
            passed += 1;
        }
    }
    let failed = total - passed;

    let average_cgpa = if total == 0 {
        0.0
    } else {
        records.iter().map(|r| r.total_cgpa).sum::<f64>() / total as f64
    };

    let mut toppers: Vec<TopperEntry> = Vec::new();
    if total > 0 && topper_limit > 0 {
        let max_cgpa = records
            .iter()
            .map(|r| r.total_cgpa)
            .fold(f64::NEG_INFINITY, f64::max);
        for record in records {
            if toppers.len() >= topper_limit {
                break;
            }
            if record.total_cgpa == max_cgpa {
                toppers.push(TopperEntry {
                    seat_number: record.seat_number,
                    student_name: record.student_name.clone(),
                    total_cgpa: record.total_cgpa,
                    overall_total: overall_total(scheme, record),
                    overall_percentage: round_off_2_decimals(overall_percentage(scheme, record)),
                });
            }
        }
    }

    let mut highest_by_cgpa: Option<&StudentRecord> = None;
    let mut lowest_by_cgpa: Option<&StudentRecord> = None;
    let mut highest_by_total: Option<(&StudentRecord, f64)> = None;
    let mut lowest_by_total: Option<(&StudentRecord, f64)> = None;
    for record in records {
        let total_marks = overall_total(scheme, record);
        // First record seen keeps an extreme on ties.
        if highest_by_cgpa.map_or(true, |b| record.total_cgpa > b.total_cgpa) {
            highest_by_cgpa = Some(record);
        }
        if lowest_by_cgpa.map_or(true, |b| record.total_cgpa < b.total_cgpa) {
            lowest_by_cgpa = Some(record);
        }
        if highest_by_total.map_or(true, |(_, v)| total_marks > v) {
            highest_by_total = Some((record, total_marks));
        }
        if lowest_by_total.map_or(true, |(_, v)| total_marks < v) {
            lowest_by_total = Some((record, total_marks));
        }
    }

    AggregateReport {
        total_students: total,
        gender_split: GenderSplit {
            male: GenderCount {
                count: male,
                percent: percent_of_total(male),
            },
            female: GenderCount {
                count: female,
                percent: percent_of_total(female),
            },
            other: GenderCount {
                count: other,
                percent: percent_of_total(other),
            },
            unset: GenderCount {
                count: unset,
                percent: percent_of_total(unset),
            },
        },
        passed_students: passed,
        failed_students: failed,
        pass_rate_percent: percent_of_total(passed),
        average_cgpa,
        toppers,
        highest_by_cgpa: highest_by_cgpa.map(|r| extreme_entry(r, r.total_cgpa)),
        lowest_by_cgpa: lowest_by_cgpa.map(|r| extreme_entry(r, r.total_cgpa)),
        highest_by_total: highest_by_total.map(|(r, v)| extreme_entry(r, v)),
        lowest_by_total: lowest_by_total.map(|(r, v)| extreme_entry(r, v)),
        pass_threshold_percent,
        max_possible_total: scheme.max_possible_total(),
    }
}
