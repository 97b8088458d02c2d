//! Debounced, incrementally loaded pick lists over the paginated entity
//! endpoints.
//!
//! Typing supersedes in-flight work through a generation counter instead of
//! task cancellation: every keystroke bumps the generation, and a fetch only
//! installs its results if the generation it started under is still current.
//! A stale response therefore can never clobber a newer query's results.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::model::Entity;
use crate::resolve::{Directory, DirectoryEntry};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Distance from the bottom (in scroll units) at which the next page loads.
pub const NEAR_BOTTOM_THRESHOLD: f64 = 10.0;

/// One page of a collection, fetched by search term. Implemented by
/// `api::EntityPager` against the live backend and by scripted fetchers in
/// tests.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, search: &str, page: u32, limit: u32) -> Result<Vec<T>>;
}

/// Scroll geometry of the list viewport, as reported by the embedder.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl Viewport {
    pub fn near_bottom(&self) -> bool {
        self.scroll_height - self.scroll_top <= self.client_height + NEAR_BOTTOM_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Added,
    AlreadySelected,
}

struct ListState<T> {
    query: String,
    generation: u64,
    items: Vec<T>,
    selected: Vec<String>,
    next_page: u32,
    has_next: bool,
    in_flight: bool,
    /// Scroll position captured before appending a page, restored by the
    /// embedder afterwards so the viewport does not jump.
    saved_scroll: Option<f64>,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        ListState {
            query: String::new(),
            generation: 0,
            items: Vec::new(),
            selected: Vec::new(),
            next_page: 1,
            has_next: true,
            in_flight: false,
            saved_scroll: None,
        }
    }
}

/// A searchable, infinitely scrolling, multi-select entity list.
///
/// The lock is internal and never held across an await, so concurrent
/// keystrokes and scroll loads from separate tasks stay consistent.
pub struct SearchList<T> {
    state: Mutex<ListState<T>>,
    page_size: u32,
    debounce: Duration,
}

impl<T> SearchList<T>
where
    T: Entity + DirectoryEntry + Clone + Send + 'static,
{
    pub fn new(page_size: u32, debounce: Duration) -> Self {
        SearchList {
            state: Mutex::new(ListState::default()),
            page_size,
            debounce,
        }
    }

    /// Records a keystroke and returns the generation tag the caller must
    /// pass to `search`. Any earlier tag is superseded immediately.
    pub fn input(&self, text: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.query = text.to_string();
        state.generation += 1;
        state.generation
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ListState<T>> {
        self.state.lock().unwrap()
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.lock().selected.clone()
    }

    pub fn has_next_page(&self) -> bool {
        self.lock().has_next
    }

    pub fn is_fetching(&self) -> bool {
        self.lock().in_flight
    }

    /// Scroll position to restore after a page append, if any. Consumed on
    /// read.
    pub fn take_saved_scroll(&self) -> Option<f64> {
        self.lock().saved_scroll.take()
    }

    /// Runs the debounced first-page search for the keystroke identified by
    /// `tag`. Returns `Ok(false)` without touching the list when a newer
    /// keystroke superseded this one, either during the debounce window or
    /// while the request was in flight.
    #[instrument(skip(self, fetcher, dir))]
    pub async fn search(&self, tag: u64, fetcher: &dyn PageFetcher<T>, dir: &Mutex<Directory>) -> Result<bool> {
        sleep(self.debounce).await;

        let query = {
            let state = self.lock();
            if state.generation != tag {
                debug!(tag, "search superseded during debounce");
                return Ok(false);
            }
            state.query.clone()
        };

        let page = fetcher.fetch_page(&query, 1, self.page_size).await?;

        let mut state = self.lock();
        if state.generation != tag {
            debug!(tag, "stale search response dropped");
            return Ok(false);
        }
        state.has_next = page.len() == self.page_size as usize;
        state.next_page = 2;
        absorb(dir, &page);
        state.items = page;
        state.saved_scroll = None;
        debug!(items = state.items.len(), has_next = state.has_next, "search results installed");
        Ok(true)
    }

    /// Loads the next page when the viewport is near the bottom. Re-entrant
    /// calls while a fetch is in flight, or when the collection is already
    /// exhausted, are no-ops.
    pub async fn fetch_more(
        &self,
        viewport: Viewport,
        fetcher: &dyn PageFetcher<T>,
        dir: &Mutex<Directory>,
    ) -> Result<bool> {
        let (query, page_no, tag) = {
            let mut state = self.lock();
            if !viewport.near_bottom() || !state.has_next || state.in_flight {
                return Ok(false);
            }
            state.in_flight = true;
            state.saved_scroll = Some(viewport.scroll_top);
            (state.query.clone(), state.next_page, state.generation)
        };

        let result = fetcher.fetch_page(&query, page_no, self.page_size).await;

        let mut state = self.lock();
        state.in_flight = false;
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                state.saved_scroll = None;
                return Err(e);
            }
        };
        if state.generation != tag {
            debug!(tag, "stale page dropped after query change");
            state.saved_scroll = None;
            return Ok(false);
        }
        state.has_next = page.len() == self.page_size as usize;
        state.next_page = page_no + 1;
        absorb(dir, &page);
        state.items.extend(page);
        debug!(page = page_no, total = state.items.len(), "page appended");
        Ok(true)
    }

    /// Toggleless multi-select: a repeated pick is reported, not toggled.
    pub fn select(&self, id: &str) -> Selection {
        let mut state = self.lock();
        if state.selected.iter().any(|s| s == id) {
            warn!(id, "entity already selected");
            return Selection::AlreadySelected;
        }
        state.selected.push(id.to_string());
        Selection::Added
    }

    pub fn deselect(&self, id: &str) -> bool {
        let mut state = self.lock();
        let before = state.selected.len();
        state.selected.retain(|s| s != id);
        state.selected.len() != before
    }
}

/// Everything shown in a list also lands in the resolution directory, so a
/// later pick renders by name without another fetch.
fn absorb<T: DirectoryEntry>(dir: &Mutex<Directory>, page: &[T]) {
    let mut dir = dir.lock().unwrap();
    for item in page {
        item.store(&mut dir);
    }
}
