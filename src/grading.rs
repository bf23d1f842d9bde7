use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Letter grade for one mark. `Absent` (`-`) means the student did not sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    #[serde(rename = "-")]
    Absent,
}

impl Grade {
    #[cfg(test)]
    pub const LETTERS: [Grade; 5] = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];

    pub fn label(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Absent => "-",
        }
    }
}

/// Division from the points total of the best subjects. `Zero` is the
/// failing division (`0`), `Unclassified` (`-`) is "could not classify".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Division {
    I,
    II,
    III,
    IV,
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "-")]
    Unclassified,
}

impl Division {
    pub fn label(self) -> &'static str {
        match self {
            Division::I => "I",
            Division::II => "II",
            Division::III => "III",
            Division::IV => "IV",
            Division::Zero => "0",
            Division::Unclassified => "-",
        }
    }
}

/// Points for a grade: A=1 .. F=5. Absent maps to 0 and must not be summed.
pub fn points_of(grade: Grade) -> u8 {
    match grade {
        Grade::A => 1,
        Grade::B => 2,
        Grade::C => 3,
        Grade::D => 4,
        Grade::F => 5,
        Grade::Absent => 0,
    }
}

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    #[serde(rename = "minMarks", alias = "min_marks")]
    pub min_marks: f64,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingScheme {
    pub name: String,
    pub bands: Vec<GradeBand>,
}

impl GradingScheme {
    /// A>=75, B>=65, C>=45, D>=30, else F.
    pub fn standard() -> Self {
        Self::from_thresholds("standard", 45.0)
    }

    /// Same as `standard` with the C boundary raised to 50.
    pub fn raised_c() -> Self {
        Self::from_thresholds("raisedC", 50.0)
    }

    fn from_thresholds(name: &str, c_min: f64) -> Self {
        let band = |min_marks, grade| GradeBand { min_marks, grade };
        Self {
            name: name.to_string(),
            bands: vec![
                band(75.0, Grade::A),
                band(65.0, Grade::B),
                band(c_min, Grade::C),
                band(30.0, Grade::D),
            ],
        }
    }

    pub fn builtin() -> Vec<GradingScheme> {
        vec![Self::standard(), Self::raised_c()]
    }

    /// Checks the band table and returns it with bands ordered highest first.
    pub fn validated(mut self) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidScheme("scheme name is empty".into()));
        }
        if self.bands.is_empty() {
            return Err(EngineError::InvalidScheme(format!(
                "scheme {} has no bands",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for b in &self.bands {
            if !b.min_marks.is_finite() {
                return Err(EngineError::InvalidScheme(format!(
                    "scheme {}: minMarks must be finite",
                    self.name
                )));
            }
            if b.grade == Grade::Absent {
                return Err(EngineError::InvalidScheme(format!(
                    "scheme {}: '-' cannot be a band grade",
                    self.name
                )));
            }
            if !seen.insert(b.grade) {
                return Err(EngineError::InvalidScheme(format!(
                    "scheme {}: grade {} appears twice",
                    self.name,
                    b.grade.label()
                )));
            }
        }
        self.bands.sort_by(|a, b| b.min_marks.total_cmp(&a.min_marks));
        if self
            .bands
            .windows(2)
            .any(|w| w[0].min_marks == w[1].min_marks)
        {
            return Err(EngineError::InvalidScheme(format!(
                "scheme {}: two bands share the same minMarks",
                self.name
            )));
        }
        Ok(self)
    }

    /// Letter grade for a mark; `None` means absent.
    pub fn grade_of(&self, marks: Option<f64>) -> Grade {
        let Some(m) = marks else {
            return Grade::Absent;
        };
        self.bands
            .iter()
            .find(|b| m >= b.min_marks)
            .map(|b| b.grade)
            .unwrap_or(Grade::F)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionBand {
    #[serde(rename = "minPoints", alias = "min_points")]
    pub min_points: u32,
    #[serde(rename = "maxPoints", alias = "max_points")]
    pub max_points: u32,
    pub division: Division,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionScheme {
    pub bands: Vec<DivisionBand>,
}

impl Default for DivisionScheme {
    fn default() -> Self {
        let band = |min_points, max_points, division| DivisionBand {
            min_points,
            max_points,
            division,
        };
        Self {
            bands: vec![
                band(7, 14, Division::I),
                band(15, 21, Division::II),
                band(22, 25, Division::III),
                band(26, 32, Division::IV),
                band(33, 36, Division::Zero),
            ],
        }
    }
}

impl DivisionScheme {
    pub fn validated(mut self) -> Result<Self> {
        for b in &self.bands {
            if b.min_points == 0 || b.min_points > b.max_points {
                return Err(EngineError::InvalidConfig(format!(
                    "division band {}..{} is empty or starts at 0",
                    b.min_points, b.max_points
                )));
            }
            if b.division == Division::Unclassified {
                return Err(EngineError::InvalidConfig(
                    "'-' cannot be a division band".into(),
                ));
            }
        }
        self.bands.sort_by_key(|b| b.min_points);
        if let Some(w) = self
            .bands
            .windows(2)
            .find(|w| w[1].min_points <= w[0].max_points)
        {
            return Err(EngineError::InvalidConfig(format!(
                "division bands {}..{} and {}..{} overlap",
                w[0].min_points, w[0].max_points, w[1].min_points, w[1].max_points
            )));
        }
        Ok(self)
    }

    /// First band containing `total_points`, else `Unclassified`.
    pub fn division_for(&self, total_points: u32) -> Division {
        self.bands
            .iter()
            .find(|b| (b.min_points..=b.max_points).contains(&total_points))
            .map(|b| b.division)
            .unwrap_or(Division::Unclassified)
    }
}
