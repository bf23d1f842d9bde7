use crate::grading::{
    points_of, round_off_2_decimals, Division, DivisionScheme, Grade, GradingScheme,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How equal ranking keys are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankPolicy {
    /// 1,2,3,4: ties keep input order and still get distinct ranks.
    #[default]
    Sequential,
    /// 1,2,2,3
    Dense,
    /// 1,2,2,4
    #[serde(alias = "standard")]
    Competition,
}

impl RankPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Some(RankPolicy::Sequential),
            "dense" => Some(RankPolicy::Dense),
            "competition" | "standard" => Some(RankPolicy::Competition),
            _ => None,
        }
    }
}

/// Which figure orders a cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankKey {
    /// Representative mark, highest first.
    Marks,
    /// Total points of the best subjects, lowest first.
    Points,
    /// GPA, lowest first.
    Gpa,
}

impl RankKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "marks" => Some(RankKey::Marks),
            "points" => Some(RankKey::Points),
            "gpa" => Some(RankKey::Gpa),
            _ => None,
        }
    }

    /// Sort value, larger is better. `None` sorts after every keyed student;
    /// a student without a division has no points or GPA key.
    pub fn value(self, record: &StudentRecord) -> Option<f64> {
        let classified = record.division != Division::Unclassified;
        match self {
            RankKey::Marks => record.marks_obtained,
            RankKey::Points => classified.then(|| -(record.total_points as f64)),
            RankKey::Gpa => classified.then(|| -record.gpa),
        }
    }
}

/// One subject mark with its derived grade and points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject_id: Option<String>,
    pub marks_obtained: Option<f64>,
    pub grade: Grade,
    pub points: Option<u8>,
}

impl SubjectResult {
    pub fn new(
        subject_id: Option<String>,
        marks_obtained: Option<f64>,
        scheme: &GradingScheme,
    ) -> Self {
        let grade = scheme.grade_of(marks_obtained);
        Self {
            subject_id,
            marks_obtained,
            grade,
            points: (grade != Grade::Absent).then(|| points_of(grade)),
        }
    }

    /// Sat the subject with a mark above zero.
    fn counts_toward_points(&self) -> bool {
        self.points.is_some() && self.marks_obtained.map(|m| m > 0.0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub best_subjects: Vec<SubjectResult>,
    pub total_points: u32,
    pub gpa: f64,
    pub division: Division,
}

impl Classification {
    pub fn unclassified() -> Self {
        Self {
            best_subjects: Vec::new(),
            total_points: 0,
            gpa: 0.0,
            division: Division::Unclassified,
        }
    }
}

/// Best-N selection, points total, GPA and division for one student.
///
/// Subjects without a mark or with a mark of zero or less are ignored. The rest
/// are ordered by points (ties keep input order) and the first
/// `best_subject_count` are kept. Never fails: anything outside the division
/// bands comes back as `Division::Unclassified`.
pub fn classify(
    subjects: &[SubjectResult],
    best_subject_count: usize,
    divisions: &DivisionScheme,
) -> Classification {
    let mut valid: Vec<&SubjectResult> = subjects
        .iter()
        .filter(|s| s.counts_toward_points())
        .collect();
    if valid.is_empty() {
        return Classification::unclassified();
    }
    valid.sort_by_key(|s| s.points.unwrap_or(0));

    let best_subjects: Vec<SubjectResult> = valid
        .into_iter()
        .take(best_subject_count)
        .cloned()
        .collect();
    let total_points: u32 = best_subjects
        .iter()
        .map(|s| u32::from(s.points.unwrap_or(0)))
        .sum();
    let gpa = if best_subjects.is_empty() {
        0.0
    } else {
        round_off_2_decimals(total_points as f64 / best_subjects.len() as f64)
    };
    let division = if best_subjects.is_empty() {
        Division::Unclassified
    } else {
        divisions.division_for(total_points)
    };

    Classification {
        best_subjects,
        total_points,
        gpa,
        division,
    }
}

fn compare_keys(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders `items` by `key` (largest first, missing keys last) and pairs each
/// with its rank. The sort is stable so equal keys keep their input order.
pub fn rank_by<T, K>(items: Vec<T>, policy: RankPolicy, key: K) -> Vec<(usize, T)>
where
    K: Fn(&T) -> Option<f64>,
{
    let mut keyed: Vec<(Option<f64>, T)> = items.into_iter().map(|t| (key(&t), t)).collect();
    keyed.sort_by(|a, b| compare_keys(a.0, b.0));

    let mut out = Vec::with_capacity(keyed.len());
    let mut prev: Option<(Option<f64>, usize)> = None;
    for (i, (k, item)) in keyed.into_iter().enumerate() {
        let rank = match (policy, prev) {
            (RankPolicy::Sequential, _) | (_, None) => i + 1,
            (RankPolicy::Competition, Some((pk, pr))) => {
                if compare_keys(pk, k) == Ordering::Equal {
                    pr
                } else {
                    i + 1
                }
            }
            (RankPolicy::Dense, Some((pk, pr))) => {
                if compare_keys(pk, k) == Ordering::Equal {
                    pr
                } else {
                    pr + 1
                }
            }
        };
        prev = Some((k, rank));
        out.push((rank, item));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub student_id: String,
    pub display_name: String,
    pub sex: String,
    pub roll_number: Option<String>,
    pub subject_results: Vec<SubjectResult>,
    /// The subject's mark in single-subject reports, the mean of present
    /// marks otherwise. `None` when absent.
    pub marks_obtained: Option<f64>,
    pub grade: Grade,
    pub points: Option<u8>,
    pub best_subjects: Vec<SubjectResult>,
    pub total_points: u32,
    pub gpa: f64,
    pub division: Division,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeDistribution {
    #[serde(rename = "A")]
    pub a: usize,
    #[serde(rename = "B")]
    pub b: usize,
    #[serde(rename = "C")]
    pub c: usize,
    #[serde(rename = "D")]
    pub d: usize,
    #[serde(rename = "F")]
    pub f: usize,
}

impl GradeDistribution {
    fn record(&mut self, grade: Grade) {
        match grade {
            Grade::A => self.a += 1,
            Grade::B => self.b += 1,
            Grade::C => self.c += 1,
            Grade::D => self.d += 1,
            Grade::F => self.f += 1,
            Grade::Absent => {}
        }
    }

    #[cfg(test)]
    pub fn count(&self, grade: Grade) -> usize {
        match grade {
            Grade::A => self.a,
            Grade::B => self.b,
            Grade::C => self.c,
            Grade::D => self.d,
            Grade::F => self.f,
            Grade::Absent => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DivisionDistribution {
    #[serde(rename = "I")]
    pub one: usize,
    #[serde(rename = "II")]
    pub two: usize,
    #[serde(rename = "III")]
    pub three: usize,
    #[serde(rename = "IV")]
    pub four: usize,
    #[serde(rename = "0")]
    pub zero: usize,
    /// Students that could not be classified; callers may hide this bucket.
    #[serde(rename = "-")]
    pub unclassified: usize,
}

impl DivisionDistribution {
    fn record(&mut self, division: Division) {
        match division {
            Division::I => self.one += 1,
            Division::II => self.two += 1,
            Division::III => self.three += 1,
            Division::IV => self.four += 1,
            Division::Zero => self.zero += 1,
            Division::Unclassified => self.unclassified += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortSummary {
    pub total_students: usize,
    pub present_students: usize,
    pub absent_students: usize,
    pub average_marks: f64,
    pub highest_marks: f64,
    pub lowest_marks: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortAggregate {
    pub grade_distribution: GradeDistribution,
    pub division_distribution: DivisionDistribution,
    pub summary: CohortSummary,
}

/// Distributions and mark summary. Absent students count toward
/// `total_students` only.
pub fn aggregate(students: &[StudentRecord]) -> CohortAggregate {
    let mut grade_distribution = GradeDistribution::default();
    let mut division_distribution = DivisionDistribution::default();
    let mut present: Vec<f64> = Vec::new();

    for s in students {
        grade_distribution.record(s.grade);
        division_distribution.record(s.division);
        if let Some(m) = s.marks_obtained {
            present.push(m);
        }
    }

    let (average_marks, highest_marks, lowest_marks) = if present.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = present.iter().sum();
        let highest = present.iter().copied().fold(f64::MIN, f64::max);
        let lowest = present.iter().copied().fold(f64::MAX, f64::min);
        (
            round_off_2_decimals(sum / present.len() as f64),
            highest,
            lowest,
        )
    };

    CohortAggregate {
        grade_distribution,
        division_distribution,
        summary: CohortSummary {
            total_students: students.len(),
            present_students: present.len(),
            absent_students: students.len() - present.len(),
            average_marks,
            highest_marks,
            lowest_marks,
        },
    }
}
