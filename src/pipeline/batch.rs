use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use super::cache::{content_key, ResultCache};
use super::{run, PipelineConfig, PipelineOutput};
use crate::data::model::ChannelSeries;
use crate::error::{Result, TrackError};

pub type OutputCache = ResultCache<Arc<PipelineOutput>>;

/// One channel of one section to process.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineJob {
    pub id: String,
    pub input: ChannelSeries,
    pub config: PipelineConfig,
}

impl PipelineJob {
    /// Content hash of input and configuration; the id is not part of it.
    pub fn cache_key(&self) -> Result<String> {
        content_key("pipeline", &(&self.input, &self.config))
            .map_err(|e| TrackError::InvalidParameter(format!("job {} not hashable: {e}", self.id)))
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: String,
    pub result: Result<Arc<PipelineOutput>>,
}

fn run_job(job: &PipelineJob, cache: Option<&OutputCache>) -> Result<Arc<PipelineOutput>> {
    match cache {
        Some(cache) => {
            let key = job.cache_key()?;
            cache.get_or_try_insert_with(&key, || run(&job.input, &job.config).map(Arc::new))
        }
        None => run(&job.input, &job.config).map(Arc::new),
    }
}

/// Run independent jobs on the rayon pool. Outcomes come back in job order;
/// a failing job does not affect the others.
pub fn run_batch(jobs: &[PipelineJob], cache: Option<&OutputCache>) -> Vec<JobOutcome> {
    let started = Instant::now();
    let outcomes: Vec<JobOutcome> = jobs
        .par_iter()
        .map(|job| JobOutcome {
            id: job.id.clone(),
            result: run_job(job, cache),
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    for o in &outcomes {
        if let Err(e) = &o.result {
            warn!("job {} failed: {e}", o.id);
        }
    }
    info!(
        "batch of {} jobs finished in {:.2?} ({failed} failed)",
        jobs.len(),
        started.elapsed()
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Channel, Series};

    fn job(id: &str, amplitude: f64) -> PipelineJob {
        let values: Vec<f64> = (0..200)
            .map(|i| amplitude * (i as f64 * 0.5 / 12.0 * std::f64::consts::TAU).sin())
            .collect();
        PipelineJob {
            id: id.to_string(),
            input: ChannelSeries {
                channel: Channel::Level,
                series: Series::from_values(0.0, 0.5, &values).unwrap(),
            },
            config: PipelineConfig::default(),
        }
    }

    #[test]
    fn outcomes_keep_job_order() {
        let jobs: Vec<PipelineJob> = (0..6).map(|i| job(&format!("j{i}"), 1.0 + i as f64)).collect();
        let outcomes = run_batch(&jobs, None);
        let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["j0", "j1", "j2", "j3", "j4", "j5"]);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[test]
    fn failing_job_is_isolated() {
        let mut bad = job("bad", 1.0);
        bad.input.series = Series::default();
        let outcomes = run_batch(&[job("ok", 2.0), bad], None);
        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[1].result.as_ref().err(), Some(&TrackError::EmptySeries));
    }

    #[test]
    fn identical_jobs_share_cached_output() {
        let cache = OutputCache::default();
        let first = run_batch(&[job("a", 3.0)], Some(&cache));
        let second = run_batch(&[job("b", 3.0)], Some(&cache));
        assert_eq!(cache.len(), 1);
        let (a, b) = (
            first[0].result.as_ref().unwrap(),
            second[0].result.as_ref().unwrap(),
        );
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn cache_key_ignores_id() {
        assert_eq!(job("x", 1.0).cache_key(), job("y", 1.0).cache_key());
        assert_ne!(job("x", 1.0).cache_key(), job("x", 2.0).cache_key());
    }
}
