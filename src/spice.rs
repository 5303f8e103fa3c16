//! Boundary to the external SPICE scorer (a Java program).
//!
//! Each call writes a JSON payload to a temporary file, runs
//! `java -jar spice-1.0.jar`, and reads the per-item scores and extracted
//! tuples back from the output file. Nothing is retried.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::SpiceConfig;
use crate::error::{EvalError, Result};
use crate::matcher::{match_tuples, MatchResult};
use crate::score::ScoreRecord;
use crate::synonym::SynonymOracle;
use crate::tuple::{Category, Tuple};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiceInput {
    pub image_id: String,
    pub test: String,
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiceItem {
    pub image_id: String,
    pub scores: BTreeMap<Category, ScoreRecord>,
    pub test_tuples: Vec<Tuple>,
    pub ref_tuples: Vec<Tuple>,
}

impl SpiceItem {
    /// The headline SPICE score: F1 of the `All` category.
    pub fn spice_score(&self) -> f64 {
        self.scores.get(&Category::All).map(|s| s.f1).unwrap_or(0.0)
    }
}

#[derive(Deserialize)]
struct RawSpiceItem {
    image_id: serde_json::Value,
    scores: BTreeMap<String, ScoreRecord>,
    #[serde(default)]
    test_tuples: Vec<Tuple>,
    #[serde(default)]
    ref_tuples: Vec<Tuple>,
}

impl From<RawSpiceItem> for SpiceItem {
    fn from(raw: RawSpiceItem) -> Self {
        let image_id = match raw.image_id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let mut scores = BTreeMap::new();
        for (key, record) in raw.scores {
            match key.parse::<Category>() {
                Ok(category) => {
                    scores.insert(category, record);
                }
                Err(_) => debug!(image_id = %image_id, key = %key, "Ignoring unknown SPICE category"),
            }
        }
        SpiceItem {
            image_id,
            scores,
            test_tuples: raw.test_tuples,
            ref_tuples: raw.ref_tuples,
        }
    }
}

/// Parse the scorer's output file. The number of items must equal the number
/// of inputs that were submitted.
pub fn parse_output(content: &str, expected: usize) -> Result<Vec<SpiceItem>> {
    let raw: Vec<RawSpiceItem> = serde_json::from_str(content)
        .map_err(|e| EvalError::MalformedOutput(format!("invalid SPICE JSON: {}", e)))?;
    if raw.len() != expected {
        return Err(EvalError::MalformedOutput(format!(
            "expected {} items, got {}",
            expected,
            raw.len()
        )));
    }
    Ok(raw.into_iter().map(SpiceItem::from).collect())
}

/// SPICE scores for one caption plus the tuple-level match computed locally
/// over the tuples SPICE extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpiceEvaluation {
    pub spice: BTreeMap<Category, ScoreRecord>,
    pub tuple_match: MatchResult,
    pub test_tuples: Vec<Tuple>,
    pub ref_tuples: Vec<Tuple>,
}

#[derive(Debug, Clone)]
pub struct SpiceRunner {
    config: SpiceConfig,
}

impl SpiceRunner {
    pub fn new(config: SpiceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpiceConfig {
        &self.config
    }

    fn command_args(&self, jar: &Path, cache: &Path, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            format!("-Xmx{}", self.config.max_heap).into(),
            "-jar".into(),
            jar.into(),
            input.into(),
            "-cache".into(),
            cache.into(),
            "-out".into(),
            output.into(),
        ];
        if self.config.detailed {
            args.push("-detailed".into());
        }
        if self.config.subset {
            args.push("-subset".into());
        }
        args.push("-silent".into());
        args
    }

    async fn absolute_dir(dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| EvalError::io(dir, e))?;
        tokio::fs::canonicalize(dir)
            .await
            .map_err(|e| EvalError::io(dir, e))
    }

    /// Score a batch of captions with one scorer invocation.
    pub async fn run(&self, inputs: &[SpiceInput]) -> Result<Vec<SpiceItem>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }
        let jar = tokio::fs::canonicalize(&self.config.jar_path)
            .await
            .map_err(|e| {
                EvalError::DependencyUnavailable(format!(
                    "SPICE jar not found at {}: {}",
                    self.config.jar_path.display(),
                    e
                ))
            })?;
        let work_dir = Self::absolute_dir(&self.config.work_dir).await?;
        let cache_dir = Self::absolute_dir(&self.config.cache_dir).await?;

        // Both files are removed when dropped.
        let input_file = tempfile::Builder::new()
            .prefix("spice_in_")
            .suffix(".json")
            .tempfile_in(&work_dir)
            .map_err(|e| EvalError::io(&work_dir, e))?;
        let output_file = tempfile::Builder::new()
            .prefix("spice_out_")
            .suffix(".json")
            .tempfile_in(&work_dir)
            .map_err(|e| EvalError::io(&work_dir, e))?;

        let payload = serde_json::to_vec_pretty(inputs)?;
        tokio::fs::write(input_file.path(), payload)
            .await
            .map_err(|e| EvalError::io(input_file.path(), e))?;

        let mut cmd = Command::new(&self.config.java_bin);
        cmd.args(self.command_args(&jar, &cache_dir, input_file.path(), output_file.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = jar.parent() {
            cmd.current_dir(dir);
        }

        info!(items = inputs.len(), jar = %jar.display(), "Running SPICE");
        let output = cmd.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => EvalError::DependencyUnavailable(
                format!("cannot run '{}': {}", self.config.java_bin, e),
            ),
            _ => EvalError::io(&self.config.java_bin, e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines().chain(stderr.lines()) {
            debug!(target: "captionscore::spice::java", "{}", line);
        }

        if !output.status.success() {
            warn!(code = ?output.status.code(), "SPICE exited unsuccessfully");
            return Err(EvalError::ProcessFailed {
                code: output.status.code(),
                output: format!("{}{}", stdout, stderr),
            });
        }

        let content = tokio::fs::read_to_string(output_file.path())
            .await
            .map_err(|e| {
                EvalError::MalformedOutput(format!(
                    "cannot read {}: {}",
                    output_file.path().display(),
                    e
                ))
            })?;
        parse_output(&content, inputs.len())
    }

    /// Run SPICE on a single caption and match the extracted tuples locally.
    pub async fn evaluate<O: SynonymOracle + ?Sized>(
        &self,
        candidate: &str,
        references: &[String],
        oracle: &O,
    ) -> Result<SpiceEvaluation> {
        let input = SpiceInput {
            image_id: "0".to_string(),
            test: candidate.to_string(),
            refs: references.to_vec(),
        };
        let item = self
            .run(std::slice::from_ref(&input))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EvalError::MalformedOutput("no items returned".into()))?;

        let tuple_match = match_tuples(&item.test_tuples, &item.ref_tuples, oracle);
        Ok(SpiceEvaluation {
            spice: item.scores,
            tuple_match,
            test_tuples: item.test_tuples,
            ref_tuples: item.ref_tuples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synonym::SynonymTable;

    const OUTPUT: &str = r#"[
      {
        "image_id": 0,
        "scores": {
          "All": {"pr": 0.5, "re": 1.0, "f": 0.6667, "tp": 1, "fp": 1, "fn": 0},
          "Object": {"pr": 1.0, "re": 1.0, "f": 1.0},
          "Attribute": {"pr": 0.0, "re": 0.0, "f": 0.0},
          "Bogus": {"pr": 1.0}
        },
        "test_tuples": [
          {"tuple": ["dog"], "truth_value": true},
          {"tuple": ["dog", "big"], "truth_value": false}
        ],
        "ref_tuples": [
          {"tuple": ["dog"], "truth_value": true},
          {"tuple": ["dog", "large"], "truth_value": false}
        ]
      }
    ]"#;

    fn config_in(dir: &Path) -> SpiceConfig {
        SpiceConfig {
            jar_path: dir.join("spice-1.0.jar"),
            cache_dir: dir.join("cache"),
            work_dir: dir.join("tmp"),
            ..SpiceConfig::default()
        }
    }

    #[test]
    fn test_parse_output() {
        let items = parse_output(OUTPUT, 1).unwrap();
        let item = &items[0];
        assert_eq!(item.image_id, "0");
        assert_eq!(item.scores.len(), 3);
        assert!(!item.scores.keys().any(|c| c.as_str() == "Bogus"));
        assert_eq!(item.scores[&Category::All].precision, 0.5);
        assert_eq!(item.spice_score(), 0.6667);
        assert_eq!(item.test_tuples[1].tokens(), ["dog", "big"]);
        assert_eq!(item.ref_tuples.len(), 2);
    }

    #[test]
    fn test_parse_output_count_mismatch() {
        let err = parse_output(OUTPUT, 2).unwrap_err();
        assert!(matches!(err, EvalError::MalformedOutput(_)));
        let err = parse_output("not json", 1).unwrap_err();
        assert!(matches!(err, EvalError::MalformedOutput(_)));
    }

    #[test]
    fn test_parse_output_without_tuples() {
        let items =
            parse_output(r#"[{"image_id": "a", "scores": {"All": {"f": 0.2}}}]"#, 1).unwrap();
        assert_eq!(items[0].image_id, "a");
        assert!(items[0].test_tuples.is_empty());
        assert_eq!(items[0].scores[&Category::All].recall, 0.0);
    }

    #[test]
    fn test_parse_output_null_scores() {
        let items = parse_output(
            r#"[{"image_id": 7, "scores": {"All": {"pr": null, "re": 0.0, "f": null}}}]"#,
            1,
        )
        .unwrap();
        assert_eq!(items[0].image_id, "7");
        assert_eq!(items[0].scores[&Category::All], ScoreRecord::zero());
    }

    #[test]
    fn test_command_args() {
        let runner = SpiceRunner::new(SpiceConfig {
            max_heap: "2G".into(),
            detailed: false,
            ..SpiceConfig::default()
        });
        let args = runner.command_args(
            Path::new("/s/spice.jar"),
            Path::new("/s/cache"),
            Path::new("/t/in.json"),
            Path::new("/t/out.json"),
        );
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-Xmx2G", "-jar", "/s/spice.jar", "/t/in.json", "-cache", "/s/cache", "-out",
                "/t/out.json", "-subset", "-silent"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_jar() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SpiceRunner::new(config_in(dir.path()));
        let input = SpiceInput {
            image_id: "0".into(),
            test: "a dog".into(),
            refs: vec!["a dog".into()],
        };
        let err = runner.run(&[input]).await.unwrap_err();
        assert!(matches!(err, EvalError::DependencyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_java() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        std::fs::write(&config.jar_path, b"").unwrap();
        config.java_bin = dir.path().join("no-such-java").display().to_string();

        let err = SpiceRunner::new(config)
            .evaluate("a dog", &["a dog".to_string()], &SynonymTable::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::DependencyUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_process() {
        let runner = SpiceRunner::new(SpiceConfig::default());
        assert!(runner.run(&[]).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    fn fake_java(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-java");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_evaluate_with_fake_scorer() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        std::fs::write(&config.jar_path, b"").unwrap();
        std::fs::write(dir.path().join("out.json"), OUTPUT).unwrap();
        let script = format!(
            "while [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-out\" ]; then out=\"$2\"; fi\n  shift\ndone\ncp '{}' \"$out\"",
            dir.path().join("out.json").display()
        );
        config.java_bin = fake_java(dir.path(), &script);

        let oracle = SynonymTable::new().with_group(["big", "large"]);
        let eval = SpiceRunner::new(config)
            .evaluate("a big dog", &["a large dog".to_string()], &oracle)
            .await
            .unwrap();
        assert_eq!(eval.spice[&Category::Object].f1, 1.0);
        assert_eq!(eval.tuple_match.matched, 2);
        assert_eq!(eval.tuple_match.f1, 1.0);

        // Payload files are cleaned up.
        let leftover = std::fs::read_dir(dir.path().join("tmp")).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        std::fs::write(&config.jar_path, b"").unwrap();
        config.java_bin = fake_java(dir.path(), "echo 'Exception in thread main' >&2\nexit 3");

        let input = SpiceInput {
            image_id: "0".into(),
            test: "a dog".into(),
            refs: vec!["a dog".into()],
        };
        match SpiceRunner::new(config).run(&[input]).await.unwrap_err() {
            EvalError::ProcessFailed { code, output } => {
                assert_eq!(code, Some(3));
                assert!(output.contains("Exception"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
