//! Download ordering.
//!
//! A [`PlanContext`] is a snapshot of everything that influences which chunk
//! should be fetched next. Planning is pure so the ordering rules can be
//! tested without a network.

use std::ops::Range;

/// Priority tier of a planned fetch, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Tier {
    SeekTarget,
    SeekWindow,
    Prefetch,
    Lookahead,
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub(crate) index: usize,
    pub(crate) tier: Tier,
}

/// Chunk a seek is heading to. It jumps ahead of every other tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SeekTarget {
    pub(crate) chunk: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PlanContext {
    pub(crate) num_chunks: usize,
    pub(crate) cursor_chunk: usize,
    pub(crate) target: Option<SeekTarget>,
    /// Temporary prefetch windows in registration order.
    pub(crate) windows: Vec<Range<usize>>,
    pub(crate) lookahead: usize,
    pub(crate) behind: usize,
    pub(crate) boost_window: usize,
    /// Final chunks, set once playback or a seek nears the end.
    pub(crate) tail: Option<Range<usize>>,
    pub(crate) background: bool,
}

impl PlanContext {
    /// Up to `limit` chunks to fetch next, in priority order, restricted to
    /// those `eligible` accepts. Each chunk appears once.
    pub(crate) fn plan(&self, mut eligible: impl FnMut(usize) -> bool, limit: usize) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = Vec::with_capacity(limit);
        if limit == 0 {
            return out;
        }
        for (index, tier) in self.ordered() {
            if index >= self.num_chunks || out.iter().any(|c| c.index == index) || !eligible(index) {
                continue;
            }
            out.push(Candidate { index, tier });
            if out.len() >= limit {
                break;
            }
        }
        out
    }

    /// True when evicting `index` would undo work the plan still wants.
    pub(crate) fn protects(&self, index: usize) -> bool {
        if let Some(target) = self.target
            && (target.chunk..=target.chunk.saturating_add(self.boost_window)).contains(&index)
        {
            return true;
        }
        if self.windows.iter().any(|w| w.contains(&index)) {
            return true;
        }
        if self.tail.as_ref().is_some_and(|t| t.contains(&index)) {
            return true;
        }
        let low = self.cursor_chunk.saturating_sub(self.behind);
        let high = self.cursor_chunk.saturating_add(self.lookahead);
        (low..=high).contains(&index)
    }

    fn ordered(&self) -> impl Iterator<Item = (usize, Tier)> + '_ {
        let end = self.num_chunks;
        let clip = move |r: Range<usize>| r.start.min(end)..r.end.min(end);

        let seek_chunk = self.target.map(|t| (t.chunk, Tier::SeekTarget));

        let seek_window = self.target.into_iter().flat_map(move |t| {
            let start = t.chunk.saturating_add(1);
            let stop = t.chunk.saturating_add(self.boost_window).saturating_add(1);
            clip(start..stop).map(|i| (i, Tier::SeekWindow))
        });

        let prefetch = self
            .windows
            .iter()
            .flat_map(move |w| clip(w.clone()).map(|i| (i, Tier::Prefetch)));

        let ahead_stop = self
            .cursor_chunk
            .saturating_add(self.lookahead)
            .saturating_add(1);
        let ahead = clip(self.cursor_chunk..ahead_stop).map(|i| (i, Tier::Lookahead));

        let behind = clip(self.cursor_chunk.saturating_sub(self.behind)..self.cursor_chunk)
            .rev()
            .map(|i| (i, Tier::Lookahead));

        let tail = self
            .tail
            .clone()
            .into_iter()
            .flat_map(move |t| clip(t).map(|i| (i, Tier::Lookahead)));

        let background_end = if self.background { end } else { 0 };
        let background = (0..background_end).map(|i| (i, Tier::Background));

        seek_chunk
            .into_iter()
            .chain(seek_window)
            .chain(prefetch)
            .chain(ahead)
            .chain(behind)
            .chain(tail)
            .chain(background)
    }
}
