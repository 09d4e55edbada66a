//! Fan-out/fan-in over a feed's channels.
//!
//! Each upload list is fetched by its own future, at most
//! [`AggregateSettings::max_concurrent`] at a time. Results flow back through a
//! single stream that only the orchestrating future consumes, so the merge
//! accumulators never see concurrent writers. A per-fetch timeout bounds each
//! call and an overall deadline bounds the whole aggregation; anything still
//! pending when the deadline fires is recorded as a failure.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, timeout_at, Instant};

use crate::error::{AppError, FetchFailure, Result};
use crate::models::VideoRecord;
use crate::source::VideoSource;

/// How the caller's limit bounds the merged list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitMode {
    /// Each channel contributes up to `limit` videos; the merged list holds
    /// up to `channels * limit`.
    #[default]
    PerSource,
    /// The merged list is truncated to the `limit` most recent videos.
    Overall,
}

#[derive(Debug, Clone)]
pub struct AggregateSettings {
    pub max_concurrent: usize,
    pub fetch_timeout: Duration,
    pub deadline: Duration,
    pub limit_mode: LimitMode,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            fetch_timeout: Duration::from_secs(15),
            deadline: Duration::from_secs(30),
            limit_mode: LimitMode::PerSource,
        }
    }
}

/// Merged videos, newest first, plus the channels that could not be fetched.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub videos: Vec<VideoRecord>,
    pub partial_errors: Vec<FetchFailure>,
}

pub struct Aggregator {
    source: Arc<dyn VideoSource>,
    settings: AggregateSettings,
}

impl Aggregator {
    pub fn new(source: Arc<dyn VideoSource>, settings: AggregateSettings) -> Self {
        Self { source, settings }
    }

    /// Fetches every upload list and merges the results by publish time,
    /// descending. Fails only when no channel could be fetched.
    pub async fn aggregate(&self, limit: usize, upload_list_ids: &[String]) -> Result<Aggregation> {
        if upload_list_ids.is_empty() {
            return Ok(Aggregation::default());
        }

        let deadline = Instant::now() + self.settings.deadline;
        let fetch_timeout = self.settings.fetch_timeout;
        let source = &self.source;

        let mut fetches = stream::iter(upload_list_ids.iter().enumerate())
            .map(|(index, upload_list_id)| async move {
                let outcome =
                    match timeout(fetch_timeout, source.fetch_recent_videos(upload_list_id, limit))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(AppError::Timeout(fetch_timeout)),
                    };
                (index, outcome)
            })
            .buffer_unordered(self.settings.max_concurrent.max(1));

        let mut finished = vec![false; upload_list_ids.len()];
        let mut videos = Vec::new();
        let mut failures = Vec::new();

        loop {
            match timeout_at(deadline, fetches.next()).await {
                Ok(Some((index, Ok(batch)))) => {
                    finished[index] = true;
                    tracing::debug!(
                        "Fetched {} videos from {}",
                        batch.len(),
                        upload_list_ids[index]
                    );
                    videos.extend(batch);
                }
                Ok(Some((index, Err(error)))) => {
                    finished[index] = true;
                    tracing::warn!(
                        upload_list_id = %upload_list_ids[index],
                        "Failed to fetch uploads: {}",
                        error
                    );
                    failures.push(FetchFailure {
                        upload_list_id: upload_list_ids[index].clone(),
                        error,
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Aggregation deadline of {:?} reached with fetches still pending",
                        self.settings.deadline
                    );
                    break;
                }
            }
        }
        // Dropping the stream cancels whatever is still in flight.
        drop(fetches);

        for (index, upload_list_id) in upload_list_ids.iter().enumerate() {
            if !finished[index] {
                failures.push(FetchFailure {
                    upload_list_id: upload_list_id.clone(),
                    error: AppError::Timeout(self.settings.deadline),
                });
            }
        }

        if failures.len() == upload_list_ids.len() {
            tracing::error!("All {} channel fetches failed", failures.len());
            return Err(AppError::AllSourcesFailed(failures));
        }

        sort_newest_first(&mut videos);
        if self.settings.limit_mode == LimitMode::Overall {
            videos.truncate(limit);
        }

        Ok(Aggregation {
            videos,
            partial_errors: failures,
        })
    }
}

/// Stable sort, so equal timestamps keep the order their fetches completed in.
fn sort_newest_first(videos: &mut [VideoRecord]) {
    videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}
