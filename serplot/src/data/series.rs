use super::palette::{Color, PALETTE};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Points of one named series, in non-decreasing x order.
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    slot: usize,
    points: VecDeque<Point>,
}

impl Series {
    pub(crate) fn new(name: String, slot: usize) -> Series {
        Series {
            name,
            slot,
            points: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> Color {
        PALETTE[self.slot]
    }

    /// Index of this series' color in `PALETTE`.
    pub fn color_slot(&self) -> usize {
        self.slot
    }

    pub fn points(&self) -> &VecDeque<Point> {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<Point> {
        self.points.back().copied()
    }

    pub(crate) fn push(&mut self, x: f64, y: f64) {
        self.points.push_back(Point { x, y });
    }

    /// Keeps the most recent `n` points. Returns how many were dropped.
    pub(crate) fn retain_last(&mut self, n: usize) -> usize {
        let excess = self.points.len().saturating_sub(n);
        self.points.drain(..excess);
        excess
    }

    /// Drops leading points with `x < threshold`. Returns how many were dropped.
    pub(crate) fn retain_from(&mut self, threshold: f64) -> usize {
        let excess = self.points.partition_point(|p| p.x < threshold);
        self.points.drain(..excess);
        excess
    }
}
