//! Transform Frame (TF) Engine.
//!
//! Maintains a graph of named reference frames and the 3-D rigid-body
//! transforms (translation + quaternion rotation) that relate them.  Edges
//! are stored parent → child but can be walked in either direction, so any
//! two connected frames can be related by composing (and inverting) the
//! transforms along the BFS path between them.
//!
//! Edges are either *static* (mount offsets that never change) or *dynamic*
//! (stamped, and considered stale once they fall outside the lookup
//! tolerance or the cache window).
//!
//! # Example
//!
//! ```rust
//! use fiducia_perception::transform::{FrameQuery, LookupTime, TfEngine};
//! use fiducia_types::{Quaternion, Transform3D, Vec3};
//!
//! let mut tf = TfEngine::new();
//!
//! // footprint is 1 m forward of odom, same orientation.
//! tf.set_transform("odom", "footprint",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! // camera is 0.5 m forward of footprint, same orientation.
//! tf.set_transform("footprint", "camera_link",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("odom", "camera_link", LookupTime::Latest).unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//!
//! // Walking the chain backwards inverts it.
//! let back = tf.lookup("camera_link", "odom", LookupTime::Latest).unwrap();
//! assert!((back.translation.x + 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use fiducia_types::{OdomError, Transform3D};
use tracing::debug;

/// Default maximum distance between a requested time and a dynamic edge's
/// stamp for [`LookupTime::At`] queries.
const DEFAULT_TOLERANCE_MS: i64 = 100;

/// Default age after which [`TfEngine::prune`] discards dynamic edges.
const DEFAULT_CACHE_SECS: i64 = 10;

// ────────────────────────────────────────────────────────────────────────────
// FrameQuery
// ────────────────────────────────────────────────────────────────────────────

/// When a transform should be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTime {
    /// Most recent data for every edge, regardless of stamp.
    Latest,
    /// Data close to the given instant.
    At(DateTime<Utc>),
}

/// Anything that can answer "what is the transform between these frames?".
pub trait FrameQuery {
    /// Return `T_target_source`: the transform that maps data expressed in
    /// `source_frame` into `target_frame`.
    ///
    /// # Errors
    ///
    /// [`OdomError::TransformUnavailable`] when either frame is unknown, the
    /// frames are not connected, or the connecting data is stale.
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<Transform3D, OdomError>;
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Edge {
    transform: Transform3D,
    /// `None` for static edges.
    stamp: Option<DateTime<Utc>>,
}

impl Edge {
    fn valid_at(&self, time: LookupTime, tolerance: TimeDelta) -> bool {
        match (self.stamp, time) {
            (None, _) | (_, LookupTime::Latest) => true,
            (Some(stamp), LookupTime::At(t)) => (stamp - t).abs() <= tolerance,
        }
    }
}

/// A graph of named reference frames and the [`Transform3D`]s that relate
/// them.
///
/// `edges[parent][child]` holds `T_parent_child`.  `parents[child]` indexes
/// the same edges from the other end so lookups can walk up the tree.
#[derive(Debug)]
pub struct TfEngine {
    edges: HashMap<String, HashMap<String, Edge>>,
    parents: HashMap<String, HashSet<String>>,
    tolerance: TimeDelta,
    cache_duration: TimeDelta,
}

impl Default for TfEngine {
    fn default() -> Self {
        Self {
            edges: HashMap::new(),
            parents: HashMap::new(),
            tolerance: TimeDelta::milliseconds(DEFAULT_TOLERANCE_MS),
            cache_duration: TimeDelta::seconds(DEFAULT_CACHE_SECS),
        }
    }
}

impl TfEngine {
    /// Create an empty TF engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tolerance applied to [`LookupTime::At`] queries.
    pub fn with_tolerance(mut self, tolerance: TimeDelta) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Override how long dynamic edges survive [`TfEngine::prune`].
    pub fn with_cache_duration(mut self, cache_duration: TimeDelta) -> Self {
        self.cache_duration = cache_duration;
        self
    }

    /// Register or update a static transform from `parent_frame` to
    /// `child_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.insert(parent_frame, child_frame, Edge { transform, stamp: None });
    }

    /// Register or update a dynamic transform observed at `stamp`.
    pub fn set_transform_at(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: DateTime<Utc>,
    ) {
        self.insert(
            parent_frame,
            child_frame,
            Edge {
                transform,
                stamp: Some(stamp),
            },
        );
    }

    /// Drop dynamic edges stamped more than the cache duration before `now`.
    /// Returns the number of edges removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.cache_duration;
        let mut removed = Vec::new();
        for (parent, children) in self.edges.iter_mut() {
            children.retain(|child, edge| {
                let keep = edge.stamp.is_none_or(|s| s >= horizon);
                if !keep {
                    removed.push((parent.clone(), child.clone()));
                }
                keep
            });
        }
        for (parent, child) in &removed {
            if let Some(set) = self.parents.get_mut(child) {
                set.remove(parent);
            }
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "pruned stale transforms");
        }
        removed.len()
    }

    /// `true` when `frame` appears on either end of any edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.get(frame).is_some_and(|c| !c.is_empty())
            || self.parents.get(frame).is_some_and(|p| !p.is_empty())
    }

    fn insert(&mut self, parent_frame: &str, child_frame: &str, edge: Edge) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), edge);
        self.parents
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string());
    }

    /// Neighbours of `frame` with the transform that moves one step from
    /// `frame` to the neighbour (`T_frame_neighbour`).
    fn neighbours<'a>(&'a self, frame: &'a str) -> impl Iterator<Item = (&'a str, Edge)> + 'a {
        let down = self
            .edges
            .get(frame)
            .into_iter()
            .flat_map(|children| children.iter().map(|(c, e)| (c.as_str(), *e)));
        let up = self
            .parents
            .get(frame)
            .into_iter()
            .flat_map(move |parents| {
                parents.iter().filter_map(move |p| {
                    let edge = self.edges.get(p)?.get(frame)?;
                    Some((
                        p.as_str(),
                        Edge {
                            transform: edge.transform.inverse(),
                            stamp: edge.stamp,
                        },
                    ))
                })
            });
        down.chain(up)
    }
}

impl FrameQuery for TfEngine {
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<Transform3D, OdomError> {
        let unavailable = |reason: String| OdomError::TransformUnavailable {
            target_frame: target_frame.to_string(),
            source_frame: source_frame.to_string(),
            reason,
        };

        if target_frame == source_frame {
            return Ok(Transform3D::identity());
        }
        for frame in [target_frame, source_frame] {
            if !self.has_frame(frame) {
                return Err(unavailable(format!("frame '{frame}' does not exist")));
            }
        }

        // BFS from the target; each queue item carries T_target_current.
        let mut queue: VecDeque<(&str, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut skipped_stale = false;

        queue.push_back((target_frame, Transform3D::identity()));
        visited.insert(target_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            for (next, edge) in self.neighbours(current) {
                if visited.contains(next) {
                    continue;
                }
                if !edge.valid_at(time, self.tolerance) {
                    skipped_stale = true;
                    continue;
                }
                let composed = accumulated.compose(edge.transform);
                if next == source_frame {
                    return Ok(composed);
                }
                visited.insert(next);
                queue.push_back((next, composed));
            }
        }

        let reason = if skipped_stale {
            "transform data is stale for the requested time".to_string()
        } else {
            "frames are not connected".to_string()
        };
        debug!(target_frame, source_frame, %reason, "transform lookup failed");
        Err(unavailable(reason))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SharedTfEngine
// ────────────────────────────────────────────────────────────────────────────

/// Cheaply clonable handle to a [`TfEngine`] shared between the writers that
/// publish transforms and the estimator that queries them.
#[derive(Debug, Clone, Default)]
pub struct SharedTfEngine(Arc<RwLock<TfEngine>>);

impl SharedTfEngine {
    pub fn new(engine: TfEngine) -> Self {
        Self(Arc::new(RwLock::new(engine)))
    }

    pub fn set_transform(&self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        let mut tf = self.0.write().unwrap_or_else(|e| e.into_inner());
        tf.set_transform(parent_frame, child_frame, transform);
    }

    pub fn set_transform_at(
        &self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: DateTime<Utc>,
    ) {
        let mut tf = self.0.write().unwrap_or_else(|e| e.into_inner());
        tf.set_transform_at(parent_frame, child_frame, transform, stamp);
    }

    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut tf = self.0.write().unwrap_or_else(|e| e.into_inner());
        tf.prune(now)
    }
}

impl FrameQuery for SharedTfEngine {
    fn lookup(
        &self,
        target_frame: &str,
        source_frame: &str,
        time: LookupTime,
    ) -> Result<Transform3D, OdomError> {
        let tf = self.0.read().map_err(|_| OdomError::TransformUnavailable {
            target_frame: target_frame.to_string(),
            source_frame: source_frame.to_string(),
            reason: "frame graph lock poisoned".to_string(),
        })?;
        tf.lookup(target_frame, source_frame, time)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
