//! Restaurant to source routing with per-restaurant fallback chains.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{task::JoinSet, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    calendar::DateOffset,
    config::{DataProvider, Settings},
    domain::Restaurant,
    menu::{sort_by_key, MenuEntry, MenuError, MenuErrorKind},
    sources::{MenuSource, MockSource, RuokapaikkaSource, SourceDeps, TalliSource, VaihaSource},
};

pub type SourceRef = Arc<dyn MenuSource>;

/// Dispatches restaurant ids to sources.
///
/// Ids sharing a primary source are fetched in one call; distinct sources run
/// concurrently, each under its own deadline. An id whose primary result is an
/// error or an empty list is retried against its fallbacks in order and the
/// first non-empty result wins. If every fallback also fails, the primary's
/// result is kept.
pub struct SourceRouter {
    default_chain: Vec<SourceRef>,
    routes: HashMap<Restaurant, Vec<SourceRef>>,
    deadline: Duration,
}

impl SourceRouter {
    pub fn new(default_source: SourceRef, deadline: Duration) -> Self {
        Self {
            default_chain: vec![default_source],
            routes: HashMap::new(),
            deadline,
        }
    }

    /// Replace the chain for one restaurant. The first element is the primary.
    pub fn route(mut self, restaurant: Restaurant, chain: Vec<SourceRef>) -> Self {
        if !chain.is_empty() {
            self.routes.insert(restaurant, chain);
        }
        self
    }

    /// Default production routing: everything from the configured provider,
    /// with `talli` and `savo` falling back to their own sites.
    pub fn from_settings(settings: &Settings, deps: SourceDeps, deadline: Duration) -> Self {
        match settings.data_provider {
            DataProvider::Mock => {
                info!("Using mock data provider");
                Self::new(Arc::new(MockSource::new(deps.clock.clone())), deadline)
            }
            DataProvider::RuokapaikkaFi => {
                let primary: SourceRef =
                    Arc::new(RuokapaikkaSource::new(deps.clone(), settings.lat_lon));
                let talli: SourceRef = Arc::new(TalliSource::new(deps.clone()));
                let vaiha: SourceRef = Arc::new(VaihaSource::new(deps));
                Self::new(primary.clone(), deadline)
                    .route(Restaurant::Talli, vec![primary.clone(), talli])
                    .route(Restaurant::Savo, vec![primary, vaiha])
            }
        }
    }

    fn chain(&self, restaurant: Restaurant) -> &[SourceRef] {
        self.routes
            .get(&restaurant)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_chain)
    }

    /// One entry per distinct requested id, sorted by restaurant key.
    pub async fn fetch(&self, ids: &[Restaurant], offset: DateOffset) -> Vec<MenuEntry> {
        let mut wanted: Vec<Restaurant> = Vec::with_capacity(ids.len());
        for id in ids {
            if !wanted.contains(id) {
                wanted.push(*id);
            }
        }
        if wanted.is_empty() {
            return Vec::new();
        }

        let mut groups: Vec<(SourceRef, Vec<Restaurant>)> = Vec::new();
        for id in &wanted {
            let Some(primary) = self.chain(*id).first() else {
                continue;
            };
            match groups.iter_mut().find(|(s, _)| Arc::ptr_eq(s, primary)) {
                Some((_, members)) => members.push(*id),
                None => groups.push((primary.clone(), vec![*id])),
            }
        }

        let mut tasks = JoinSet::new();
        for (source, members) in groups {
            let deadline = self.deadline;
            tasks.spawn(async move { fetch_with_deadline(source, members, offset, deadline).await });
        }

        let mut results: HashMap<Restaurant, MenuEntry> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entries) => {
                    for e in entries {
                        results.insert(e.restaurant, e);
                    }
                }
                Err(e) => warn!("Source task failed: {e}"),
            }
        }

        let mut out = Vec::with_capacity(wanted.len());
        for id in wanted {
            let primary = results.remove(&id).unwrap_or_else(|| {
                MenuEntry::with_error(
                    id,
                    MenuError::new(MenuErrorKind::Fetch, "Source returned no result"),
                )
            });
            out.push(self.with_fallbacks(id, primary, offset).await);
        }
        sort_by_key(&mut out);
        out
    }

    async fn with_fallbacks(
        &self,
        id: Restaurant,
        primary: MenuEntry,
        offset: DateOffset,
    ) -> MenuEntry {
        if primary.has_items() {
            return primary;
        }
        for fallback in self.chain(id).iter().skip(1) {
            debug!("{id}: primary gave no menu, trying {}", fallback.id());
            let mut entries =
                fetch_with_deadline(fallback.clone(), vec![id], offset, self.deadline).await;
            if let Some(pos) = entries.iter().position(|e| e.restaurant == id) {
                let candidate = entries.swap_remove(pos);
                if candidate.has_items() {
                    info!("{id}: served by fallback {}", fallback.id());
                    return candidate;
                }
            }
        }
        primary
    }
}

async fn fetch_with_deadline(
    source: SourceRef,
    ids: Vec<Restaurant>,
    offset: DateOffset,
    deadline: Duration,
) -> Vec<MenuEntry> {
    match timeout(deadline, source.fetch(&ids, offset)).await {
        Ok(entries) => {
            let mut out = Vec::with_capacity(ids.len());
            for id in &ids {
                match entries.iter().find(|e| e.restaurant == *id) {
                    Some(e) => out.push(e.clone()),
                    None => out.push(MenuEntry::with_error(
                        *id,
                        MenuError::new(
                            MenuErrorKind::Fetch,
                            format!("{} returned nothing for {id}", source.id()),
                        ),
                    )),
                }
            }
            out
        }
        Err(_) => {
            warn!("{} did not answer within {:?}", source.id(), deadline);
            ids.iter()
                .map(|id| {
                    MenuEntry::with_error(
                        *id,
                        MenuError::new(
                            MenuErrorKind::Timeout,
                            format!("{} timed out", source.id()),
                        ),
                    )
                })
                .collect()
        }
    }
}
