// 🎯 Drop-Target Resolver - Picks the tier a dragged unit lands in
//
// Overlap score per container is the rectangle intersection ratio
// (intersection / union). With more than one candidate, a container whose
// top 20% holds the pointer has its score halved, so drops near a border
// don't fall into the tier above by accident.

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// Fraction of a container's height treated as its "near the top" band
const TOP_BAND: f64 = 0.2;

const TOP_BAND_PENALTY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let width = self.right().min(other.right()) - self.left.max(other.left);
        let height = self.bottom().min(other.bottom()) - self.top.max(other.top);

        if width > 0.0 && height > 0.0 {
            width * height
        } else {
            0.0
        }
    }

    /// Intersection over union; 0.0 when the rects don't overlap
    pub fn overlap_ratio(&self, other: &Rect) -> f64 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }
        intersection / (self.area() + other.area() - intersection)
    }

    /// Pointer height inside the rect: 0.0 at the top edge, 1.0 at the bottom
    fn vertical_ratio(&self, pointer: Point) -> Option<f64> {
        if self.height <= 0.0 {
            return None;
        }
        Some((pointer.y - self.top) / self.height)
    }
}

/// A tier's drop zone on screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropContainer {
    pub tier: Tier,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    tier: Tier,
    rect: Rect,
    score: f64,
}

fn intersecting(dragged: &Rect, containers: &[DropContainer]) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = containers
        .iter()
        .filter_map(|container| {
            let score = dragged.overlap_ratio(&container.rect);
            (score > 0.0).then_some(Candidate {
                tier: container.tier,
                rect: container.rect,
                score,
            })
        })
        .collect();

    // Stable: equal overlaps keep container order
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// Resolve the single target tier for a drop, or `None` when the dragged
/// rect touches no container (no move happens).
pub fn resolve_drop(dragged: &Rect, pointer: Point, containers: &[DropContainer]) -> Option<Tier> {
    let mut candidates = intersecting(dragged, containers);

    if candidates.len() > 1 {
        for candidate in &mut candidates {
            let near_top = candidate
                .rect
                .vertical_ratio(pointer)
                .is_some_and(|ratio| ratio < TOP_BAND);
            if near_top {
                candidate.score *= TOP_BAND_PENALTY;
            }
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    let winner = candidates.first().map(|c| c.tier);
    tracing::trace!(?winner, candidates = candidates.len(), "drop resolved");
    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two stacked 200x100 tier rows: T1 on top, T2 directly below
    fn stacked() -> Vec<DropContainer> {
        vec![
            DropContainer {
                tier: Tier::T1,
                rect: Rect::new(0.0, 0.0, 200.0, 100.0),
            },
            DropContainer {
                tier: Tier::T2,
                rect: Rect::new(0.0, 100.0, 200.0, 100.0),
            },
        ]
    }

    #[test]
    fn test_overlap_ratio() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 0.0, 10.0, 10.0);

        // 50 / (100 + 100 - 50)
        assert!((a.overlap_ratio(&b) - 50.0 / 150.0).abs() < 1e-9);
        assert_eq!(a.overlap_ratio(&Rect::new(10.0, 0.0, 5.0, 5.0)), 0.0);
        assert_eq!(a.overlap_ratio(&a), 1.0);
    }

    #[test]
    fn test_no_intersection_means_no_move() {
        let dragged = Rect::new(500.0, 500.0, 50.0, 50.0);
        let pointer = Point { x: 525.0, y: 525.0 };

        assert_eq!(resolve_drop(&dragged, pointer, &stacked()), None);
        assert_eq!(resolve_drop(&dragged, pointer, &[]), None);
    }

    #[test]
    fn test_single_candidate_is_never_penalised() {
        // Pointer in the top band of the only intersecting container
        let dragged = Rect::new(0.0, 102.0, 200.0, 40.0);
        let pointer = Point { x: 100.0, y: 105.0 };

        assert_eq!(resolve_drop(&dragged, pointer, &stacked()), Some(Tier::T2));
    }

    #[test]
    fn test_lower_container_wins_despite_top_band_penalty() {
        // 15 rows over T1, 65 rows over T2
        let dragged = Rect::new(0.0, 85.0, 200.0, 80.0);
        // Top 10% of T2
        let pointer = Point { x: 100.0, y: 110.0 };

        // T1: 3000 / 33000 ~ 0.09; T2: 13000 / 23000 ~ 0.57, halved ~ 0.28
        assert_eq!(resolve_drop(&dragged, pointer, &stacked()), Some(Tier::T2));
    }

    #[test]
    fn test_top_band_penalty_flips_a_close_call() {
        // 30 rows over T1, 50 rows over T2
        let dragged = Rect::new(0.0, 70.0, 200.0, 80.0);
        let containers = stacked();

        // Raw overlap alone favours T2 (0.38 vs 0.20)
        let deep_pointer = Point { x: 100.0, y: 150.0 };
        assert_eq!(resolve_drop(&dragged, deep_pointer, &containers), Some(Tier::T2));

        // Pointer in T2's top band halves it to ~0.19, below T1's 0.20
        let band_pointer = Point { x: 100.0, y: 115.0 };
        assert_eq!(resolve_drop(&dragged, band_pointer, &containers), Some(Tier::T1));
    }

    #[test]
    fn test_ties_keep_container_order() {
        // Dragged rect straddles the border evenly, pointer below both top bands
        let dragged = Rect::new(0.0, 60.0, 200.0, 80.0);
        let pointer = Point { x: 100.0, y: 150.0 };

        assert_eq!(resolve_drop(&dragged, pointer, &stacked()), Some(Tier::T1));

        let mut reversed = stacked();
        reversed.reverse();
        assert_eq!(resolve_drop(&dragged, pointer, &reversed), Some(Tier::T2));
    }

    #[test]
    fn test_pointer_above_container_counts_as_top_band() {
        // Even split, pointer over T1: T2 sees a negative ratio and is halved
        let dragged = Rect::new(0.0, 60.0, 200.0, 80.0);
        let pointer = Point { x: 100.0, y: 60.0 };

        let mut reversed = stacked();
        reversed.reverse();
        assert_eq!(resolve_drop(&dragged, pointer, &reversed), Some(Tier::T1));
    }
}
