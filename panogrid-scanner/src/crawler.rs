use crate::cache::FetchCache;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::result::PanoResult;
use crate::store::DocumentStore;
use crate::vendor::Adapter;
use futures::future::ready;
use futures::stream::{self, StreamExt};
use panogrid_core::{Geofence, LatLng, PanoMap, PanoNode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decimal places kept for accepted coordinates.
const COORD_DIGITS: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Seeding,
    Expanding,
    Drained,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    State(CrawlState),
    Seeded { resolved: usize, seeds: usize },
    Level { depth: usize, frontier: usize },
    Accepted { id: String, total: usize },
}

pub type ProgressCallback = Arc<dyn Fn(CrawlEvent) + Send + Sync>;

/// Breadth-first crawl of the panorama link graph inside a geofence.
///
/// Each BFS level is fetched with up to `workers` requests in flight; results
/// are collected before the next frontier is built, so the discovered set
/// does not depend on completion order.
pub struct RegionCrawler<'a, F, S> {
    adapter: &'a Adapter,
    cache: &'a FetchCache<F, S>,
    workers: usize,
    progress_callback: Option<ProgressCallback>,
}

impl<'a, F: Fetcher, S: DocumentStore> RegionCrawler<'a, F, S> {
    pub fn new(adapter: &'a Adapter, cache: &'a FetchCache<F, S>) -> Self {
        Self {
            adapter,
            cache,
            workers: 1,
            progress_callback: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }

    fn enter(&self, state: CrawlState) {
        debug!("Crawl state -> {:?}", state);
        self.emit(CrawlEvent::State(state));
    }

    /// Resolve each seed coordinate to its nearest panorama ID.
    async fn seed_frontier(&self, seeds: &[LatLng]) -> HashSet<String> {
        let frontier: HashSet<String> = stream::iter(seeds.iter().copied())
            .map(|p| self.adapter.get_pano_by_latlng(self.cache, p))
            .buffer_unordered(self.workers)
            .filter_map(ready)
            .collect()
            .await;
        info!(
            "{} seeds resolved to {} starting panoramas",
            seeds.len(),
            frontier.len()
        );
        self.emit(CrawlEvent::Seeded {
            resolved: frontier.len(),
            seeds: seeds.len(),
        });
        frontier
    }

    async fn fetch_level(&self, ids: &[String], fence: Option<&Geofence>) -> Vec<PanoResult> {
        stream::iter(ids)
            .map(|id| self.adapter.get_pano(self.cache, id, fence))
            .buffer_unordered(self.workers)
            .filter_map(ready)
            .collect()
            .await
    }

    /// Crawl every panorama reachable from `seeds` and keep those inside
    /// `fence`.
    ///
    /// Nodes outside the fence are not kept, but their links still feed the
    /// next frontier, so the crawl may wander past the fence before it
    /// drains.
    pub async fn grab_region(&self, seeds: &[LatLng], fence: &Geofence) -> Result<PanoMap> {
        self.enter(CrawlState::Seeding);
        let mut frontier = self.seed_frontier(seeds).await;

        self.enter(CrawlState::Expanding);
        let mut done = PanoMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut depth = 0;
        loop {
            let fresh: Vec<String> = frontier
                .drain()
                .filter(|id| visited.insert(id.clone()))
                .collect();
            if fresh.is_empty() {
                break;
            }
            depth += 1;
            info!("Level {}: visiting {} panoramas", depth, fresh.len());
            self.emit(CrawlEvent::Level {
                depth,
                frontier: fresh.len(),
            });

            let mut next = HashSet::new();
            for result in self.fetch_level(&fresh, Some(fence)).await {
                if let Some(node) = result.node {
                    // a node may answer under an ID that was never queued
                    visited.insert(node.id.clone());
                    if fence.contains(node.latlng) {
                        let node = PanoNode {
                            latlng: node.latlng.round_to(COORD_DIGITS),
                            ..node
                        };
                        debug!("Accepted {} at {}", node.id, node.latlng);
                        done.insert(node.id.clone(), node.clone());
                        self.emit(CrawlEvent::Accepted {
                            id: node.id,
                            total: done.len(),
                        });
                    } else {
                        debug!("{} lies outside the region", node.id);
                    }
                }
                next.extend(result.links);
            }
            frontier = next
                .into_iter()
                .filter(|id| !done.contains_key(id))
                .collect();

            if let Err(e) = self.cache.persist_failures() {
                warn!("Could not save failure set: {}", e);
            }
        }

        self.enter(CrawlState::Drained);
        self.cache.persist_failures()?;
        info!(
            "Region drained after {} levels: {} panoramas kept, {} visited, {} requests",
            depth,
            done.len(),
            visited.len(),
            self.cache.request_count()
        );
        Ok(done)
    }

    /// Fetch a fixed list of panoramas, no link following and no fence.
    pub async fn grab_panos(&self, ids: &[String]) -> Result<PanoMap> {
        let mut panos = PanoMap::new();
        for result in self.fetch_level(ids, None).await {
            if let Some(node) = result.node {
                panos.insert(node.id.clone(), node);
            }
        }
        self.cache.persist_failures()?;
        info!("Fetched {} of {} panoramas", panos.len(), ids.len());
        Ok(panos)
    }
}
