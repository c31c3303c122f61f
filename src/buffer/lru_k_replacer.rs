use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{AccessType, FrameId, Timestamp};

/// Tracks access history for a single frame
#[derive(Debug)]
struct LruKNode {
    /// History of access timestamps (most recent at back)
    history: VecDeque<Timestamp>,
    /// Whether this frame is currently evictable
    is_evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            is_evictable: false,
        }
    }

    /// Records an access, keeping only the last k timestamps
    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Returns the backward k-distance from the current timestamp,
    /// or None if the frame has fewer than k accesses (+inf distance)
    fn k_distance(&self, current_timestamp: Timestamp, k: usize) -> Option<Timestamp> {
        if self.history.len() < k {
            None
        } else {
            Some(current_timestamp - self.history[self.history.len() - k])
        }
    }

    /// Returns the earliest timestamp in the history
    fn earliest_timestamp(&self) -> Option<Timestamp> {
        self.history.front().copied()
    }
}

/// State shared by every replacer operation, serialized under one mutex
struct ReplacerState {
    node_store: HashMap<FrameId, LruKNode>,
    /// Logical clock, incremented on every recorded access
    current_timestamp: Timestamp,
    /// Number of evictable frames
    curr_size: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the frame whose backward k-distance is the maximum over all
/// evictable frames, where backward k-distance is the difference between the
/// current timestamp and the timestamp of the kth previous access.
///
/// A frame with fewer than k recorded accesses has +inf backward k-distance.
/// Among +inf frames the one with the earliest recorded timestamp is evicted
/// first (classic LRU over history-poor frames).
pub struct LruKReplacer {
    /// K value for the LRU-K algorithm
    k: usize,
    /// Maximum number of frames the replacer can track
    num_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given k value and frame count.
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            num_frames,
            state: Mutex::new(ReplacerState {
                node_store: HashMap::new(),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance.
    /// Returns None if there are no evictable frames.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();

        if state.curr_size == 0 {
            return None;
        }

        let current_ts = state.current_timestamp;

        let mut victim: Option<FrameId> = None;
        let mut victim_k_dist: Option<Timestamp> = None;
        let mut victim_earliest_ts: Option<Timestamp> = None;

        for (frame_id, node) in state.node_store.iter() {
            if !node.is_evictable {
                continue;
            }

            let k_dist = node.k_distance(current_ts, self.k);
            let earliest_ts = node.earliest_timestamp();

            let should_replace = match (victim_k_dist, k_dist) {
                // Current victim has +inf, candidate has finite -> keep victim
                (None, Some(_)) => false,
                // Current victim has finite, candidate has +inf -> replace
                (Some(_), None) => true,
                // Both +inf -> earlier first access wins; a node with no
                // history at all counts as oldest
                (None, None) => match (victim_earliest_ts, earliest_ts) {
                    (Some(v_ts), Some(c_ts)) => c_ts < v_ts,
                    (Some(_), None) => true,
                    _ => false,
                },
                // Both finite -> larger k-distance wins
                (Some(v_dist), Some(c_dist)) => c_dist > v_dist,
            };

            if victim.is_none() || should_replace {
                victim = Some(*frame_id);
                victim_k_dist = k_dist;
                victim_earliest_ts = earliest_ts;
            }
        }

        if let Some(frame_id) = victim {
            state.node_store.remove(&frame_id);
            state.curr_size -= 1;
        }

        victim
    }

    /// Records that the given frame was accessed now, creating its node on
    /// first touch. The access type is advisory and currently unused.
    ///
    /// Panics if `frame_id` is out of the replacer's range.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) {
        assert!(
            frame_id.as_usize() < self.num_frames,
            "frame {} out of replacer range {}",
            frame_id,
            self.num_frames
        );

        let mut state = self.state.lock();
        let timestamp = state.current_timestamp;
        state.current_timestamp += 1;

        state
            .node_store
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record_access(timestamp, self.k);
    }

    /// Sets whether a frame is evictable. Idempotent when the flag is
    /// unchanged. Creates an untracked frame's node on demand.
    ///
    /// Panics if `frame_id` is out of the replacer's range.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        assert!(
            frame_id.as_usize() < self.num_frames,
            "frame {} out of replacer range {}",
            frame_id,
            self.num_frames
        );

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let node = state.node_store.entry(frame_id).or_insert_with(LruKNode::new);

        if node.is_evictable != is_evictable {
            node.is_evictable = is_evictable;
            if is_evictable {
                state.curr_size += 1;
            } else {
                state.curr_size -= 1;
            }
        }
    }

    /// Removes a frame from the replacer entirely. No-op when untracked.
    ///
    /// Panics if the frame is tracked but not evictable; callers must only
    /// remove frames whose pages have been unpinned.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();

        if let Some(node) = state.node_store.remove(&frame_id) {
            assert!(
                node.is_evictable,
                "frame {} removed while not evictable",
                frame_id
            );
            state.curr_size -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().curr_size
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
