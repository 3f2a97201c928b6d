//! Offline source for development (`dataProvider: "mock"`).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    calendar::{Clock, DateOffset},
    domain::Restaurant,
    menu::{MenuEntry, MenuError, MenuErrorKind},
    sources::DayContext,
};

use super::MenuSource;

const MOCK_ITEMS: &[&str] = &[
    "Päärynä-puolukkavihersalaattia (M,G)",
    "Savoijkaali-porkkanasalaattia (M,G) *luomuhunaja",
    "Kanaa carrykastikkeessa",
    "Jotakin aivan muuta ja kanaa",
    "Rapeaa crispykanaa ja  tuoretomaattisalsaa",
    "Pekoni-perunasalaattia (M,G)",
    "Kahden kalan keittoa",
    "Lohta bearnaisekastikkeella",
    "Broilerin paistikkeita",
    "Seitipyörykät",
];

/// First restaurant errors, last gets the full list, the rest are empty.
pub struct MockSource {
    clock: Arc<dyn Clock>,
    latency: Duration,
}

impl MockSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            latency: Duration::from_millis(100),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl MenuSource for MockSource {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn fetch(&self, restaurants: &[Restaurant], offset: DateOffset) -> Vec<MenuEntry> {
        tokio::time::sleep(self.latency).await;
        let weekday = DayContext::for_offset(self.clock.as_ref(), offset).weekday;
        let last = restaurants.len().saturating_sub(1);

        restaurants
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let date = Some(weekday.to_string());
                if i == 0 {
                    let mut e = MenuEntry::with_error(
                        *r,
                        MenuError::new(MenuErrorKind::Fetch, "Mock error"),
                    );
                    e.date = date;
                    e
                } else if i == last {
                    let items = MOCK_ITEMS.iter().map(|s| s.to_string()).collect();
                    MenuEntry::with_items(*r, items, date)
                } else {
                    MenuEntry::with_items(*r, Vec::new(), date)
                }
            })
            .collect()
    }
}
