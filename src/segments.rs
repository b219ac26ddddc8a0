//! Delta signatures and the trimming/coalescing of their free runs.
//!
//! A signature lists the frequency differences between successive chord
//! notes: entry `i` is the delta from note `i` to note `i + 1`, where note 0
//! is the root. Fixed entries carry the target delta; free entries become
//! optimization variables. Consecutive free entries collapse into one
//! [`FreeSegment`] whose *total* is optimized and split evenly between its
//! members. Free runs at either end of the signature are not bracketed by any
//! fixed delta, so they are trimmed away together with their notes.

use serde::{Deserialize, Serialize};

/// One entry of a delta signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeltaEntry {
    /// A fixed, positive target delta.
    Fixed(f64),
    /// A free delta, optionally carrying the value the caller currently shows
    /// for it. The placeholder never influences the fit.
    Free(Option<f64>),
}

impl DeltaEntry {
    /// A free entry without placeholder.
    pub fn free() -> Self {
        DeltaEntry::Free(None)
    }

    pub fn is_free(&self) -> bool {
        matches!(self, DeltaEntry::Free(_))
    }

    /// The fixed value, `None` for free entries.
    pub fn fixed_value(&self) -> Option<f64> {
        match *self {
            DeltaEntry::Fixed(v) => Some(v),
            DeltaEntry::Free(_) => None,
        }
    }

    /// The caller's placeholder of a free entry.
    pub fn placeholder(&self) -> Option<f64> {
        match *self {
            DeltaEntry::Fixed(_) => None,
            DeltaEntry::Free(p) => p,
        }
    }
}

impl From<Option<f64>> for DeltaEntry {
    /// `Some(v)` is fixed, `None` is free.
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => DeltaEntry::Fixed(v),
            None => DeltaEntry::free(),
        }
    }
}

/// A maximal run of entries sharing the same free/fixed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    pub is_free: bool,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// An interior free run contributing one optimization variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSegment {
    pub start: usize,
    /// Inclusive.
    pub end: usize,
}

impl FreeSegment {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }
}

/// Partitions a signature into maximal runs of equal free/fixed flag.
pub fn segment_signature(signature: &[DeltaEntry]) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    for (i, entry) in signature.iter().enumerate() {
        match segments.last_mut() {
            Some(last) if last.is_free == entry.is_free() => last.end = i,
            _ => segments.push(Segment {
                start: i,
                end: i,
                is_free: entry.is_free(),
            }),
        }
    }
    segments
}

/// The part of a chord that takes part in the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentLayout {
    /// Ratios of the included notes relative to the effective root
    /// (root excluded).
    pub ratios: Vec<f64>,
    /// The included signature; starts and ends with a fixed entry.
    pub signature: Vec<DeltaEntry>,
    /// Interior free runs, indexed into `signature`.
    pub free_segments: Vec<FreeSegment>,
    /// Index of the first included entry in the caller's signature.
    pub offset: usize,
}

impl SegmentLayout {
    /// Trims the signature to the range spanned by its fixed entries, rebases
    /// the ratios onto the note preceding that range, and collects the
    /// interior free segments.
    ///
    /// Returns `None` when no entry is fixed, in which case the model is
    /// undetermined. `intervals_from_root` and `signature` must have equal
    /// length.
    pub fn from_signature(intervals_from_root: &[f64], signature: &[DeltaEntry]) -> Option<Self> {
        debug_assert_eq!(intervals_from_root.len(), signature.len());
        let segments = segment_signature(signature);
        let first_fixed = segments.iter().find(|s| !s.is_free)?;
        let last_fixed = segments.iter().rev().find(|s| !s.is_free)?;
        let (start, end) = (first_fixed.start, last_fixed.end);

        let base = if start > 0 {
            intervals_from_root[start - 1]
        } else {
            1.0
        };
        let ratios: Vec<f64> = intervals_from_root[start..=end]
            .iter()
            .map(|r| r / base)
            .collect();
        let included = signature[start..=end].to_vec();

        let free_segments = segment_signature(&included)
            .into_iter()
            .filter(|s| s.is_free)
            .map(|s| FreeSegment {
                start: s.start,
                end: s.end,
            })
            .collect();

        Some(Self {
            ratios,
            signature: included,
            free_segments,
            offset: start,
        })
    }

    /// Number of included deltas (and notes above the effective root).
    pub fn len(&self) -> usize {
        self.signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
    }

    /// Number of optimization variables besides the scale factor.
    pub fn free_count(&self) -> usize {
        self.free_segments.len()
    }

    /// Segment index owning the included entry `index`, if it is free.
    pub fn segment_of(&self, index: usize) -> Option<usize> {
        self.free_segments.iter().position(|s| s.contains(index))
    }
}
