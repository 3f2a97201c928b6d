//! Per-day menu cache and the aggregation service built on it.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    blocks::{Block, MenuRenderer},
    calendar::{date_key, Clock, DateOffset},
    domain::Restaurant,
    menu::{sort_by_key, MenuEntry, MenuError, MenuErrorKind},
    router::SourceRouter,
    weather::WeatherProvider,
};

/// What is remembered for one `date_key`. `data` never holds error entries.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub date_key: String,
    pub data: Vec<MenuEntry>,
    pub weather: Option<String>,
    pub rendered: Vec<Block>,
}

impl CacheEntry {
    pub fn contains(&self, restaurant: Restaurant) -> bool {
        self.data.iter().any(|e| e.restaurant == restaurant)
    }
}

/// Process-local cache map. Only ever cleared as a whole.
#[derive(Debug, Default)]
pub struct MenuCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MenuCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, date_key: &str) -> Option<CacheEntry> {
        self.entries.lock().await.get(date_key).cloned()
    }

    /// Store `entry` under its key, dropping error entries first. Replaces
    /// whatever was there.
    pub async fn put(&self, mut entry: CacheEntry) {
        entry.data.retain(|e| !e.is_error());
        self.entries
            .lock()
            .await
            .insert(entry.date_key.clone(), entry);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Result of one aggregation call, errors included.
#[derive(Clone, Debug, PartialEq)]
pub struct MenuSnapshot {
    pub date_key: String,
    pub offset: DateOffset,
    pub data: Vec<MenuEntry>,
    pub weather: Option<String>,
    pub blocks: Vec<Block>,
}

impl MenuSnapshot {
    pub fn header(&self) -> String {
        MenuRenderer::header_text(&self.data, self.weather.as_deref())
    }
}

pub struct AggregationService {
    router: Arc<SourceRouter>,
    cache: Arc<MenuCache>,
    clock: Arc<dyn Clock>,
    renderer: MenuRenderer,
    weather: Option<Arc<dyn WeatherProvider>>,
}

impl AggregationService {
    pub fn new(
        router: Arc<SourceRouter>,
        cache: Arc<MenuCache>,
        clock: Arc<dyn Clock>,
        renderer: MenuRenderer,
    ) -> Self {
        Self {
            router,
            cache,
            clock,
            renderer,
            weather: None,
        }
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherProvider>) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn renderer(&self) -> &MenuRenderer {
        &self.renderer
    }

    /// Menus for `ids` on the day selected by `offset`.
    ///
    /// Only ids missing from today's cache entry are fetched. The merged set
    /// minus its errors is written back; the caller gets everything.
    pub async fn get_menus(&self, ids: &[Restaurant], offset: DateOffset) -> MenuSnapshot {
        let key = date_key(self.clock.today(), offset);
        let cached = self.cache.get(&key).await;

        let mut merged: Vec<MenuEntry> = Vec::new();
        if let Some(hit) = cached {
            if ids.iter().all(|id| hit.contains(*id)) {
                debug!("Cache hit for {key}");
                return MenuSnapshot {
                    date_key: key,
                    offset,
                    data: hit.data,
                    weather: hit.weather,
                    blocks: hit.rendered,
                };
            }
            merged = hit.data;
        }

        let missing: Vec<Restaurant> = ids
            .iter()
            .copied()
            .filter(|id| !merged.iter().any(|e| e.restaurant == *id))
            .collect();
        info!(
            "Fetching {} restaurant(s) for {key}: {}",
            missing.len(),
            missing
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        for entry in self.router.fetch(&missing, offset).await {
            if !merged.iter().any(|e| e.restaurant == entry.restaurant) {
                merged.push(entry);
            }
        }
        sort_by_key(&mut merged);

        let weather = match &self.weather {
            Some(w) => w.forecast(offset).await,
            None => None,
        };

        let cacheable: Vec<MenuEntry> = merged.iter().filter(|e| !e.is_error()).cloned().collect();
        let cached_blocks = self.renderer.render(&cacheable, offset, weather.as_deref());
        self.cache
            .put(CacheEntry {
                date_key: key.clone(),
                data: cacheable,
                weather: weather.clone(),
                rendered: cached_blocks,
            })
            .await;

        let blocks = self.renderer.render(&merged, offset, weather.as_deref());
        MenuSnapshot {
            date_key: key,
            offset,
            data: merged,
            weather,
            blocks,
        }
    }

    /// One on-demand restaurant. Never read from or written to the cache.
    pub async fn get_additional(&self, restaurant: Restaurant, offset: DateOffset) -> MenuEntry {
        let mut entries = self.router.fetch(&[restaurant], offset).await;
        let mut entry = match entries.iter().position(|e| e.restaurant == restaurant) {
            Some(pos) => entries.swap_remove(pos),
            None => MenuEntry::with_error(
                restaurant,
                MenuError::new(MenuErrorKind::Fetch, "Source returned no result"),
            ),
        };
        entry.is_additional = true;
        entry
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Menu cache cleared");
    }
}
