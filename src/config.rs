use crate::calc::{RankKey, RankPolicy};
use crate::error::{EngineError, Result};
use crate::grading::{DivisionBand, DivisionScheme, GradeBand, GradingScheme};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_BEST_SUBJECT_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_students: usize,
    pub max_subjects_per_student: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_students: 5000,
            max_subjects_per_student: 64,
        }
    }
}

/// On-disk shape of `resultsd.toml`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub default_scheme: Option<String>,
    pub best_subject_count: Option<usize>,
    pub rank_policy: Option<RankPolicy>,
    pub absent_sex_fallback: Option<String>,
    pub limits: Option<Limits>,
    pub schemes: Vec<GradingScheme>,
    pub division_bands: Vec<DivisionBand>,
}

/// Validated engine settings shared by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub default_scheme: String,
    pub best_subject_count: usize,
    pub rank_policy: RankPolicy,
    pub sex_fallback: String,
    pub limits: Limits,
    pub schemes: Vec<GradingScheme>,
    pub divisions: DivisionScheme,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_scheme: "standard".to_string(),
            best_subject_count: DEFAULT_BEST_SUBJECT_COUNT,
            rank_policy: RankPolicy::Sequential,
            sex_fallback: "-".to_string(),
            limits: Limits::default(),
            schemes: GradingScheme::builtin(),
            divisions: DivisionScheme::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let mut cfg = EngineConfig::default();

        for scheme in file.schemes {
            let scheme = scheme.validated()?;
            match cfg.schemes.iter_mut().find(|s| s.name == scheme.name) {
                Some(existing) => *existing = scheme,
                None => cfg.schemes.push(scheme),
            }
        }
        if let Some(name) = file.default_scheme {
            cfg.default_scheme = name;
        }
        if cfg.scheme(&cfg.default_scheme).is_none() {
            return Err(EngineError::InvalidConfig(format!(
                "default_scheme {} is not defined",
                cfg.default_scheme
            )));
        }

        if let Some(n) = file.best_subject_count {
            if n == 0 {
                return Err(EngineError::InvalidConfig(
                    "best_subject_count must be at least 1".into(),
                ));
            }
            cfg.best_subject_count = n;
        }
        if let Some(p) = file.rank_policy {
            cfg.rank_policy = p;
        }
        if let Some(s) = file.absent_sex_fallback {
            cfg.sex_fallback = s;
        }
        if let Some(limits) = file.limits {
            if limits.max_students == 0 || limits.max_subjects_per_student == 0 {
                return Err(EngineError::InvalidConfig("limits must be at least 1".into()));
            }
            cfg.limits = limits;
        }
        if !file.division_bands.is_empty() {
            cfg.divisions = DivisionScheme {
                bands: file.division_bands,
            }
            .validated()?;
        }
        Ok(cfg)
    }

    pub fn scheme(&self, name: &str) -> Option<&GradingScheme> {
        self.schemes.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Per-request settings: the config defaults with `options` applied on top.
    pub fn calc_options(&self, raw: Option<&serde_json::Value>) -> Result<CalcOptions> {
        let default_scheme = self
            .scheme(&self.default_scheme)
            .cloned()
            .unwrap_or_else(GradingScheme::standard);
        let mut out = CalcOptions {
            scheme: default_scheme,
            divisions: self.divisions.clone(),
            best_subject_count: self.best_subject_count,
            rank_policy: self.rank_policy,
            rank_key: None,
        };

        let Some(raw) = raw else {
            return Ok(out);
        };
        if raw.is_null() {
            return Ok(out);
        }
        let Some(obj) = raw.as_object() else {
            return Err(EngineError::bad_params("options must be an object"));
        };

        match (obj.get("scheme"), obj.get("bands")) {
            (Some(s), Some(b)) if !s.is_null() && !b.is_null() => {
                return Err(EngineError::bad_params(
                    "options.scheme and options.bands are mutually exclusive",
                ));
            }
            (Some(v), _) if !v.is_null() => {
                let Some(name) = v.as_str() else {
                    return Err(EngineError::bad_params("options.scheme must be a string"));
                };
                let Some(scheme) = self.scheme(name) else {
                    return Err(EngineError::InvalidScheme(format!("unknown scheme {name}")));
                };
                out.scheme = scheme.clone();
            }
            (_, Some(b)) if !b.is_null() => {
                let bands: Vec<GradeBand> = serde_json::from_value(b.clone()).map_err(|e| {
                    EngineError::bad_params(format!("options.bands: {e}"))
                })?;
                out.scheme = GradingScheme {
                    name: "custom".to_string(),
                    bands,
                }
                .validated()?;
            }
            _ => {}
        }

        match obj.get("bestSubjectCount") {
            None => {}
            Some(v) if v.is_null() => {}
            Some(v) => {
                let Some(n) = v.as_u64().filter(|n| *n >= 1) else {
                    return Err(EngineError::bad_params(
                        "options.bestSubjectCount must be a positive integer",
                    ));
                };
                out.best_subject_count = usize::try_from(n).unwrap_or(usize::MAX);
            }
        }

        match obj.get("rankPolicy") {
            None => {}
            Some(v) if v.is_null() => {}
            Some(v) => {
                let Some(p) = v.as_str().and_then(RankPolicy::parse) else {
                    return Err(EngineError::bad_params(
                        "options.rankPolicy must be one of: sequential, dense, competition",
                    ));
                };
                out.rank_policy = p;
            }
        }

        match obj.get("rankBy") {
            None => {}
            Some(v) if v.is_null() => {}
            Some(v) => {
                let Some(k) = v.as_str().and_then(RankKey::parse) else {
                    return Err(EngineError::bad_params(
                        "options.rankBy must be one of: marks, points, gpa",
                    ));
                };
                out.rank_key = Some(k);
            }
        }

        Ok(out)
    }
}

/// Everything one computation needs, resolved before the pipeline runs.
#[derive(Debug, Clone)]
pub struct CalcOptions {
    pub scheme: GradingScheme,
    pub divisions: DivisionScheme,
    pub best_subject_count: usize,
    pub rank_policy: RankPolicy,
    pub rank_key: Option<RankKey>,
}

impl Default for CalcOptions {
    fn default() -> Self {
        let cfg = EngineConfig::default();
        Self {
            scheme: GradingScheme::standard(),
            divisions: cfg.divisions,
            best_subject_count: cfg.best_subject_count,
            rank_policy: cfg.rank_policy,
            rank_key: None,
        }
    }
}

pub fn parse_config(contents: &str) -> Result<EngineConfig> {
    let file: ConfigFile = toml::from_str(contents)
        .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
    EngineConfig::from_file(file)
}

/// Reads the config file if one was given; no path means built-in defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        tracing::info!("no config file given, using built-in defaults");
        return Ok(EngineConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg = parse_config(&contents).with_context(|| format!("in {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        schemes = cfg.schemes.len(),
        default_scheme = %cfg.default_scheme,
        "loaded config"
    );
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::{Division, Grade};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn empty_file_is_defaults() {
        let cfg = parse_config("").expect("parse");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.best_subject_count, 7);
        assert!(cfg.scheme("standard").is_some());
        assert!(cfg.scheme("raisedc").is_some());
    }

    #[test]
    fn file_overrides_and_adds_schemes() {
        let cfg = parse_config(
            r#"
default_scheme = "lenient"
best_subject_count = 8
rank_policy = "competition"

[limits]
max_students = 10

[[schemes]]
name = "lenient"
bands = [
  { min_marks = 70, grade = "A" },
  { min_marks = 40, grade = "C" },
]

[[division_bands]]
min_points = 8
max_points = 16
division = "I"
"#,
        )
        .expect("parse");
        assert_eq!(cfg.default_scheme, "lenient");
        assert_eq!(cfg.best_subject_count, 8);
        assert_eq!(cfg.rank_policy, RankPolicy::Competition);
        assert_eq!(cfg.limits.max_students, 10);
        assert_eq!(cfg.limits.max_subjects_per_student, 64);
        assert_eq!(cfg.schemes.len(), 3);
        assert_eq!(cfg.divisions.division_for(16), Division::I);
        assert_eq!(cfg.divisions.division_for(17), Division::Unclassified);
    }

    #[test]
    fn invalid_files_are_rejected() {
        assert!(parse_config("best_subject_count = 0").is_err());
        assert!(parse_config("default_scheme = \"missing\"").is_err());
        assert!(parse_config("unknown_key = 1").is_err());
        let err = parse_config(
            r#"
[[schemes]]
name = "broken"
bands = [{ min_marks = 50, grade = "-" }]
"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "bad_scheme");
    }

    #[test]
    fn load_config_reads_file() {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(f, "default_scheme = \"raisedC\"").expect("write");
        let cfg = load_config(Some(f.path())).expect("load");
        let opts = cfg.calc_options(None).expect("options");
        assert_eq!(opts.scheme.name, "raisedC");
    }

    #[test]
    fn load_config_missing_file_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(load_config(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn options_override_defaults_without_touching_config() {
        let cfg = EngineConfig::default();
        let opts = cfg
            .calc_options(Some(&json!({
                "scheme": "raisedC",
                "bestSubjectCount": 3,
                "rankPolicy": "dense",
                "rankBy": "points"
            })))
            .expect("options");
        assert_eq!(opts.scheme.name, "raisedC");
        assert_eq!(opts.best_subject_count, 3);
        assert_eq!(opts.rank_policy, RankPolicy::Dense);
        assert_eq!(opts.rank_key, Some(RankKey::Points));
        assert_eq!(cfg.best_subject_count, 7);
    }

    #[test]
    fn inline_bands_become_custom_scheme() {
        let cfg = EngineConfig::default();
        let opts = cfg
            .calc_options(Some(&json!({
                "bands": [
                    { "minMarks": 50, "grade": "C" },
                    { "minMarks": 80, "grade": "A" }
                ]
            })))
            .expect("options");
        assert_eq!(opts.scheme.name, "custom");
        assert_eq!(opts.scheme.grade_of(Some(85.0)), Grade::A);
        assert_eq!(opts.scheme.grade_of(Some(60.0)), Grade::C);
    }

    #[test]
    fn null_scheme_does_not_block_inline_bands() {
        let cfg = EngineConfig::default();
        let opts = cfg
            .calc_options(Some(&json!({
                "scheme": null,
                "bands": [{ "minMarks": 40, "grade": "A" }]
            })))
            .expect("options");
        assert_eq!(opts.scheme.name, "custom");
        assert_eq!(opts.scheme.grade_of(Some(41.0)), Grade::A);

        let opts = cfg
            .calc_options(Some(&json!({ "scheme": "raisedC", "bands": null })))
            .expect("options");
        assert_eq!(opts.scheme.name, "raisedC");
    }

    #[test]
    fn standard_rank_policy_reads_as_competition_in_files_and_options() {
        let cfg = parse_config("rank_policy = \"standard\"").expect("parse");
        assert_eq!(cfg.rank_policy, RankPolicy::Competition);
        let opts = EngineConfig::default()
            .calc_options(Some(&json!({ "rankPolicy": "standard" })))
            .expect("options");
        assert_eq!(opts.rank_policy, RankPolicy::Competition);
    }

    #[test]
    fn bad_options_are_bad_params() {
        let cfg = EngineConfig::default();
        for raw in [
            json!([]),
            json!({ "bestSubjectCount": 0 }),
            json!({ "rankPolicy": "random" }),
            json!({ "rankBy": "height" }),
            json!({ "scheme": 5 }),
            json!({ "scheme": "standard", "bands": [] }),
        ] {
            let err = cfg.calc_options(Some(&raw)).unwrap_err();
            assert_eq!(err.code(), "bad_params", "{raw}");
        }
        let err = cfg.calc_options(Some(&json!({ "scheme": "nope" }))).unwrap_err();
        assert_eq!(err.code(), "bad_scheme");
    }
}
