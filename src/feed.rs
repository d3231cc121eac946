use chrono::{DateTime, Utc};

use crate::backend::FeedItem;

/// Vertical displacement below this is treated as a tap, not a swipe.
pub const SWIPE_THRESHOLD_PX: f32 = 50.0;
/// Approximate pixel height of one terminal cell row, used to scale mouse
/// drag rows into the same units as the swipe threshold.
pub const CELL_PIXEL_HEIGHT: f32 = 16.0;
pub const FIRST_PAGE_SIZE: usize = 20;
pub const PAGE_SIZE: usize = 10;
/// Prefetch kicks in when the cursor is within this many items of the end.
pub const PREFETCH_MARGIN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEvent {
    Advance,
    Retreat,
}

/// Converts a press/drag/release sequence into at most one navigation
/// event. Dragging up (start below end) advances; dragging down retreats.
#[derive(Debug, Default)]
pub struct SwipeTracker {
    start_y: Option<f32>,
    last_y: Option<f32>,
}

impl SwipeTracker {
    pub fn begin(&mut self, y: f32) {
        self.start_y = Some(y);
        self.last_y = None;
    }

    pub fn drag(&mut self, y: f32) {
        if self.start_y.is_some() {
            self.last_y = Some(y);
        }
    }

    pub fn release(&mut self) -> Option<NavEvent> {
        let start = self.start_y.take();
        let end = self.last_y.take();
        let (start, end) = (start?, end?);
        let distance = start - end;
        if distance.abs() <= SWIPE_THRESHOLD_PX {
            return None;
        }
        if distance > 0.0 {
            Some(NavEvent::Advance)
        } else {
            Some(NavEvent::Retreat)
        }
    }

    pub fn cancel(&mut self) {
        self.start_y = None;
        self.last_y = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FetchState {
    #[default]
    Idle,
    Fetching,
}

/// The in-memory feed: an ordered sequence of items (descending by
/// creation time, server return order) plus the navigation index and the
/// single-fetch pagination state. Scoped to one feed-viewing session.
#[derive(Debug, Default)]
pub struct FeedView {
    items: Vec<FeedItem>,
    index: usize,
    state: FetchState,
    exhausted: bool,
    queued_advance: bool,
}

impl FeedView {
    pub fn new(initial: Vec<FeedItem>) -> Self {
        let exhausted = initial.is_empty();
        Self {
            items: initial,
            index: 0,
            state: FetchState::Idle,
            exhausted,
            queued_advance: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn current(&self) -> Option<&FeedItem> {
        self.items.get(self.index)
    }

    pub fn is_fetching(&self) -> bool {
        self.state == FetchState::Fetching
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Move to the next item. At the last element this is a no-op, except
    /// while a fetch is in flight: then the advance is queued and applied
    /// when the appended page arrives.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 < self.items.len() {
            self.index += 1;
            true
        } else {
            if self.state == FetchState::Fetching {
                self.queued_advance = true;
            }
            false
        }
    }

    /// Move to the previous item; no-op at the first element.
    pub fn retreat(&mut self) -> bool {
        if self.index > 0 {
            self.index -= 1;
            true
        } else {
            false
        }
    }

    /// Exclusive upper bound for the next page: the creation timestamp of
    /// the last loaded item.
    pub fn next_cursor(&self) -> Option<DateTime<Utc>> {
        self.items.last().map(|item| item.created_at)
    }

    fn within_prefetch_margin(&self) -> bool {
        !self.items.is_empty() && self.items.len() - 1 - self.index < PREFETCH_MARGIN
    }

    /// Start a fetch if the index is close enough to the end, nothing is
    /// already in flight, and the feed end has not been reached. Returns
    /// the cursor to fetch with; the caller owns the actual request.
    pub fn begin_prefetch(&mut self) -> Option<DateTime<Utc>> {
        if self.state == FetchState::Fetching || self.exhausted || !self.within_prefetch_margin() {
            return None;
        }
        let cursor = self.next_cursor()?;
        self.state = FetchState::Fetching;
        Some(cursor)
    }

    /// Append a fetched page. An empty page marks the end of the feed.
    /// Pages are strictly older than everything present, so this is a
    /// plain extend with no merge or dedup. A page landing while no fetch
    /// is in flight belongs to a sequence that `reset` has since replaced
    /// and is discarded.
    pub fn apply_page(&mut self, page: Vec<FeedItem>) {
        if self.state != FetchState::Fetching {
            return;
        }
        self.state = FetchState::Idle;
        if page.is_empty() {
            self.exhausted = true;
            self.queued_advance = false;
            return;
        }
        self.items.extend(page);
        if self.queued_advance {
            self.queued_advance = false;
            self.advance();
        }
    }

    /// A failed fetch leaves the sequence untouched; the trigger does not
    /// retry on its own.
    pub fn fetch_failed(&mut self) {
        self.state = FetchState::Idle;
        self.queued_advance = false;
    }

    /// Replace the whole sequence (feed refresh); navigation restarts at
    /// the top.
    pub fn reset(&mut self, initial: Vec<FeedItem>) {
        self.exhausted = initial.is_empty();
        self.items = initial;
        self.index = 0;
        self.state = FetchState::Idle;
        self.queued_advance = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(ts_secs: i64) -> FeedItem {
        FeedItem {
            id: format!("answer-{}", ts_secs),
            created_at: Utc.timestamp_opt(ts_secs, 0).single().unwrap(),
            ..FeedItem::default()
        }
    }

    fn view_with(timestamps: &[i64]) -> FeedView {
        FeedView::new(timestamps.iter().copied().map(item).collect())
    }

    #[test]
    fn index_stays_in_bounds() {
        let mut view = view_with(&[30, 20, 10]);
        for _ in 0..10 {
            view.retreat();
        }
        assert_eq!(view.index(), 0);
        for _ in 0..10 {
            view.advance();
        }
        assert_eq!(view.index(), 2);
        view.retreat();
        assert_eq!(view.index(), 1);
    }

    #[test]
    fn empty_feed_has_no_current() {
        let mut view = FeedView::new(Vec::new());
        assert!(view.current().is_none());
        assert!(!view.advance());
        assert!(!view.retreat());
        assert!(view.is_exhausted());
        assert!(view.begin_prefetch().is_none());
    }

    #[test]
    fn small_swipe_is_noise() {
        let mut tracker = SwipeTracker::default();
        tracker.begin(200.0);
        tracker.drag(160.0);
        assert_eq!(tracker.release(), None);

        tracker.begin(200.0);
        tracker.drag(150.0);
        assert_eq!(tracker.release(), None);
    }

    #[test]
    fn swipe_up_advances_swipe_down_retreats() {
        let mut tracker = SwipeTracker::default();
        tracker.begin(200.0);
        tracker.drag(140.0);
        assert_eq!(tracker.release(), Some(NavEvent::Advance));

        tracker.begin(100.0);
        tracker.drag(180.0);
        assert_eq!(tracker.release(), Some(NavEvent::Retreat));
    }

    #[test]
    fn release_without_drag_is_a_tap() {
        let mut tracker = SwipeTracker::default();
        tracker.begin(120.0);
        assert_eq!(tracker.release(), None);
        // State is consumed; a stray release stays quiet.
        assert_eq!(tracker.release(), None);
    }

    #[test]
    fn swipe_at_last_item_does_not_move() {
        let mut view = view_with(&[30, 20, 10]);
        view.advance();
        view.advance();
        assert_eq!(view.index(), 2);
        assert!(!view.advance());
        assert_eq!(view.index(), 2);
    }

    #[test]
    fn prefetch_triggers_within_three_of_end() {
        let mut view = view_with(&[60, 50, 40, 30, 20, 10]);
        assert!(view.begin_prefetch().is_none(), "index 0 of 6 is not near the end");

        view.advance();
        view.advance();
        view.advance();
        assert_eq!(view.index(), 3);
        let cursor = view.begin_prefetch().expect("index 3 of 6 is within margin");
        assert_eq!(cursor, Utc.timestamp_opt(10, 0).single().unwrap());

        // Second trigger while the first is outstanding is ignored.
        assert!(view.begin_prefetch().is_none());
        assert!(view.is_fetching());
    }

    #[test]
    fn pages_append_in_order_without_dedup() {
        let mut view = view_with(&[10, 9, 8]);
        view.advance();
        let cursor = view.begin_prefetch().unwrap();
        assert_eq!(cursor, Utc.timestamp_opt(8, 0).single().unwrap());

        view.apply_page(vec![item(7), item(6), item(5)]);
        let order: Vec<i64> = view
            .items()
            .iter()
            .map(|it| it.created_at.timestamp())
            .collect();
        assert_eq!(order, vec![10, 9, 8, 7, 6, 5]);
        assert!(!view.is_fetching());
    }

    #[test]
    fn empty_page_marks_feed_exhausted() {
        let mut view = view_with(&[3, 2, 1]);
        view.advance();
        assert!(view.begin_prefetch().is_some());
        view.apply_page(Vec::new());
        assert!(view.is_exhausted());
        assert!(view.begin_prefetch().is_none(), "no retry after the end");
    }

    #[test]
    fn failed_fetch_leaves_sequence_unchanged() {
        let mut view = view_with(&[3, 2, 1]);
        view.advance();
        assert!(view.begin_prefetch().is_some());
        view.fetch_failed();
        assert_eq!(view.len(), 3);
        assert!(!view.is_fetching());
        // A later trigger may fetch again.
        assert!(view.begin_prefetch().is_some());
    }

    #[test]
    fn advance_racing_a_fetch_is_queued_not_dropped() {
        let mut view = view_with(&[3, 2, 1]);
        view.advance();
        view.advance();
        assert!(view.begin_prefetch().is_some());

        // At the last element while fetching: the advance queues.
        assert!(!view.advance());
        assert_eq!(view.index(), 2);

        view.apply_page(vec![item(0)]);
        assert_eq!(view.index(), 3, "queued advance applies after append");
    }

    #[test]
    fn refresh_discards_page_from_an_earlier_fetch() {
        let mut view = view_with(&[10, 9, 8]);
        view.advance();
        assert!(view.begin_prefetch().is_some());

        // A refresh lands while the page is still in flight; upstream
        // gained items, so the new first page overlaps the old pagination.
        view.reset(vec![
            item(12),
            item(11),
            item(10),
            item(9),
            item(8),
            item(7),
            item(6),
        ]);

        view.apply_page(vec![item(7), item(6)]);
        let order: Vec<i64> = view
            .items()
            .iter()
            .map(|it| it.created_at.timestamp())
            .collect();
        assert_eq!(order, vec![12, 11, 10, 9, 8, 7, 6]);
        assert!(!view.is_fetching());

        // The replaced sequence still pages normally.
        for _ in 0..6 {
            view.advance();
        }
        let cursor = view.begin_prefetch().expect("new sequence can fetch");
        assert_eq!(cursor, Utc.timestamp_opt(6, 0).single().unwrap());
    }

    #[test]
    fn reset_restarts_navigation() {
        let mut view = view_with(&[3, 2, 1]);
        view.advance();
        view.reset(vec![item(9), item(8)]);
        assert_eq!(view.index(), 0);
        assert_eq!(view.len(), 2);
        assert!(!view.is_exhausted());
    }
}
