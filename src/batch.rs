//! Converting many documents at once.
//!
//! Each job is independent: a failing or panicking document yields an error
//! for that job only. With the `parallel` feature jobs run on the rayon pool.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::Config;
use crate::error::Result;
use crate::kfx::generate::{CancelFlag, Output, generate_output};
use crate::model::Document;

/// One document and the stylesheets that apply to it.
#[derive(Debug, Clone)]
pub struct Job {
    pub doc: Document,
    pub stylesheets: Vec<String>,
}

impl Job {
    pub fn new(doc: Document) -> Self {
        Self {
            doc,
            stylesheets: Vec::new(),
        }
    }

    pub fn with_stylesheet(mut self, css: impl Into<String>) -> Self {
        self.stylesheets.push(css.into());
        self
    }
}

fn run(job: &Job, config: &Config, cancel: &CancelFlag) -> (String, Result<Output>) {
    let sheets: Vec<&str> = job.stylesheets.iter().map(String::as_str).collect();
    let result = generate_output(&job.doc, &sheets, config, cancel);
    if let Err(e) = &result {
        log::error!("{}: {e}", job.doc.id);
    }
    (job.doc.id.clone(), result)
}

/// Convert every job, keeping input order, stopping before any job once
/// `cancel` is set. Results carry the debug dump when `Settings::debug_dump`
/// is set.
pub fn convert_batch_output(jobs: &[Job], config: &Config, cancel: &CancelFlag) -> Vec<(String, Result<Output>)> {
    log::info!("converting {} documents", jobs.len());

    #[cfg(feature = "parallel")]
    let results = jobs.par_iter().map(|job| run(job, config, cancel)).collect();

    #[cfg(not(feature = "parallel"))]
    let results = jobs.iter().map(|job| run(job, config, cancel)).collect();

    results
}

/// Convert every job to container bytes, keeping input order.
pub fn convert_batch(jobs: &[Job], config: &Config) -> Vec<(String, Result<Vec<u8>>)> {
    convert_batch_output(jobs, config, &CancelFlag::new())
        .into_iter()
        .map(|(id, result)| (id, result.map(|output| output.bytes)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{Block, Inline, Metadata, Section};

    fn job(id: &str) -> Job {
        Job::new(
            Document::new(id)
                .with_metadata(Metadata::new(id))
                .with_section(Section::new().with_block(Block::paragraph(vec![Inline::text("text")]))),
        )
        .with_stylesheet("p { margin-top: 1em }")
    }

    #[test]
    fn test_results_keep_input_order() {
        let jobs: Vec<Job> = (0..6).map(|i| job(&format!("doc-{i}"))).collect();
        let results = convert_batch(&jobs, &Config::default());
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["doc-0", "doc-1", "doc-2", "doc-3", "doc-4", "doc-5"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[test]
    fn test_batch_matches_single() {
        let jobs = vec![job("same")];
        let config = Config::default();
        let cancel = CancelFlag::new();
        let batch = convert_batch(&jobs, &config).remove(0).1.unwrap();
        let single = crate::kfx::generate::generate(&jobs[0].doc, &["p { margin-top: 1em }"], &config, &cancel).unwrap();
        assert_eq!(batch, single);
    }

    #[test]
    fn test_cancelled_batch() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let results = convert_batch_output(&[job("a"), job("b")], &Config::default(), &cancel);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| matches!(r, Err(Error::Cancelled))));
    }
}
