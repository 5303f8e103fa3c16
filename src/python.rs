//! Python bindings. Heavy calls release the GIL; structured results cross the
//! boundary as JSON strings.

use numpy::{PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::EvalConfig;
use crate::error::EvalError;
use crate::similarity::mean_reference_similarity;
use crate::spice::SpiceRunner;
use crate::synonym::global_oracle;
use crate::tuple::{Category, Tuple};

impl From<EvalError> for PyErr {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::MalformedTuple { .. }
            | EvalError::UnknownCategory(_)
            | EvalError::Config(_)
            | EvalError::Json(_) => PyValueError::new_err(e.to_string()),
            _ => PyRuntimeError::new_err(e.to_string()),
        }
    }
}

fn to_tuples(raw: Vec<Vec<String>>) -> Result<Vec<Tuple>, EvalError> {
    raw.into_iter().map(Tuple::new).collect()
}

fn parse_categories(names: Option<Vec<String>>) -> Result<Vec<Category>, EvalError> {
    match names {
        Some(names) => names.iter().map(|n| n.parse()).collect(),
        None => Ok(Category::CORE.to_vec()),
    }
}

#[pyfunction]
fn are_synonyms(py: Python, a: String, b: String) -> bool {
    py.allow_threads(|| crate::synonym::are_synonyms(&a, &b))
}

/// Returns `(precision, recall, f1, matched_count)`.
#[pyfunction]
fn match_tuples(
    py: Python,
    hypothesis: Vec<Vec<String>>,
    references: Vec<Vec<String>>,
) -> PyResult<(f64, f64, f64, usize)> {
    let hyp = to_tuples(hypothesis)?;
    let refs = to_tuples(references)?;
    let res = py.allow_threads(|| crate::matcher::match_tuples(&hyp, &refs, &*global_oracle()));
    Ok(res.summary())
}

/// `items_json` is a list of `{image_id, hypothesis, references}` objects.
/// Returns the batch report as JSON.
#[pyfunction]
#[pyo3(signature = (items_json, categories=None))]
fn score_batch(py: Python, items_json: &str, categories: Option<Vec<String>>) -> PyResult<String> {
    let items: Vec<crate::score::EvalItem> =
        serde_json::from_str(items_json).map_err(EvalError::from)?;
    let categories = parse_categories(categories)?;
    let report =
        py.allow_threads(|| crate::score::score_batch(&items, &categories, &*global_oracle()));
    Ok(serde_json::to_string(&report).map_err(EvalError::from)?)
}

/// Returns `(precision, recall, f1, matched_words)`.
#[pyfunction]
fn compare_captions(
    py: Python,
    candidate: String,
    reference: String,
) -> (f64, f64, f64, Vec<String>) {
    let report = py.allow_threads(|| {
        crate::wordmatch::compare_captions(&candidate, &reference, &*global_oracle())
    });
    (report.precision, report.recall, report.f1, report.matched_words)
}

/// Returns `[(tokens, category)]`.
#[pyfunction]
fn extract_tuples(caption: &str) -> Vec<(Vec<String>, String)> {
    crate::extract::extract_tuples(caption)
        .into_iter()
        .map(|t| (t.tokens().to_vec(), t.category().to_string()))
        .collect()
}

#[pyfunction]
fn pos_tag(word: &str) -> &'static str {
    crate::extract::pos_tag(word).as_str()
}

/// `references` is a `[n_refs, dim]` array.
#[pyfunction]
fn semantic_similarity(
    generated: PyReadonlyArray1<'_, f32>,
    references: PyReadonlyArray2<'_, f32>,
) -> f64 {
    let generated = generated.as_array().to_vec();
    let references: Vec<Vec<f32>> = references
        .as_array()
        .rows()
        .into_iter()
        .map(|row| row.to_vec())
        .collect();
    mean_reference_similarity(&generated, &references)
}

/// Runs the SPICE jar on one caption. Returns the evaluation as JSON.
#[pyfunction]
fn run_spice(py: Python, candidate: String, references: Vec<String>) -> PyResult<String> {
    let config = EvalConfig::from_env()?;
    let evaluation = py.allow_threads(|| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PyRuntimeError::new_err(format!("Failed to create async runtime: {}", e)))?;
        let runner = SpiceRunner::new(config.spice);
        rt.block_on(runner.evaluate(&candidate, &references, &*global_oracle()))
            .map_err(PyErr::from)
    })?;
    Ok(serde_json::to_string(&evaluation).map_err(EvalError::from)?)
}

#[pymodule]
fn captionscore(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let log_filter = EvalConfig::from_env().ok().and_then(|c| c.log_filter);
    crate::init_logging(log_filter.as_deref());
    m.add_function(wrap_pyfunction!(are_synonyms, m)?)?;
    m.add_function(wrap_pyfunction!(match_tuples, m)?)?;
    m.add_function(wrap_pyfunction!(score_batch, m)?)?;
    m.add_function(wrap_pyfunction!(compare_captions, m)?)?;
    m.add_function(wrap_pyfunction!(extract_tuples, m)?)?;
    m.add_function(wrap_pyfunction!(pos_tag, m)?)?;
    m.add_function(wrap_pyfunction!(semantic_similarity, m)?)?;
    m.add_function(wrap_pyfunction!(run_spice, m)?)?;
    Ok(())
}
