use std::ops::Range;

/// Visible window over an ordered list.
///
/// After `ensure_visible`, `start <= selection < start + page_size` holds for
/// any non-empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    start: usize,
    page_size: usize,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Viewport {
    pub fn new(page_size: usize) -> Self {
        Self {
            start: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Slide the window by the minimal amount that brings `selection` into
    /// view. A selection that wrapped to either end of the list lands on
    /// the matching edge of the window.
    pub fn ensure_visible(&mut self, selection: usize, item_count: usize) {
        if item_count == 0 {
            self.start = 0;
            return;
        }
        let selection = selection.min(item_count - 1);
        if selection < self.start {
            self.start = selection;
        } else if selection >= self.start + self.page_size {
            self.start = selection + 1 - self.page_size;
        }
        // Keep the window full when the list allows it.
        let max_start = item_count.saturating_sub(self.page_size);
        if self.start > max_start {
            self.start = max_start;
        }
    }

    /// Change the page size (layout toggle or terminal resize) and restore
    /// the visibility invariant.
    pub fn set_page_size(&mut self, page_size: usize, selection: usize, item_count: usize) {
        self.page_size = page_size.max(1);
        self.ensure_visible(selection, item_count);
    }

    /// Index range of rows to draw.
    pub fn visible_range(&self, item_count: usize) -> Range<usize> {
        let start = self.start.min(item_count);
        let end = (self.start + self.page_size).min(item_count);
        start..end
    }

    pub fn has_more_above(&self) -> bool {
        self.start > 0
    }

    pub fn has_more_below(&self, item_count: usize) -> bool {
        self.start + self.page_size < item_count
    }
}

/// Move `selection` by `delta` modulo `item_count`. `None` for an empty list.
pub fn wrap(selection: usize, delta: isize, item_count: usize) -> Option<usize> {
    if item_count == 0 {
        return None;
    }
    let n = item_count as isize;
    let cur = (selection.min(item_count - 1)) as isize;
    Some((cur + delta).rem_euclid(n) as usize)
}
