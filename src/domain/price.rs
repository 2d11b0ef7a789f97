//! Historical price series and the fixed-resolution time grid.
//!
//! Timestamps are Unix milliseconds throughout the engine.

use serde::{Deserialize, Serialize};

use super::error::VaultsimError;

pub const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub price: f64,
}

/// Requested time range and sampling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceWindow {
    pub start: i64,
    pub end: i64,
    pub resolution: i64,
}

impl PriceWindow {
    pub fn new(start: i64, end: i64, resolution: i64) -> Self {
        PriceWindow {
            start,
            end,
            resolution,
        }
    }

    /// Grid ticks `start, start + resolution, ...` up to and including `end`.
    pub fn ticks(&self) -> impl Iterator<Item = i64> + '_ {
        let step = self.resolution.max(1);
        std::iter::successors(Some(self.start), move |t| t.checked_add(step))
            .take_while(move |t| *t <= self.end)
    }

    pub fn tick_count(&self) -> usize {
        if self.end < self.start || self.resolution <= 0 {
            return 0;
        }
        ((self.end - self.start) / self.resolution) as usize + 1
    }
}

/// An ordered price history. Timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Builds a series from samples already in strictly increasing order.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, VaultsimError> {
        if let Some(pair) = points
            .windows(2)
            .find(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(VaultsimError::EmptyDataset {
                reason: format!(
                    "price timestamps must be strictly increasing ({} then {})",
                    pair[0].timestamp, pair[1].timestamp
                ),
            });
        }
        Ok(PriceSeries { points })
    }

    /// Sorts irregular upstream samples and drops duplicate timestamps
    /// (the last sample for a timestamp wins) and non-finite prices.
    pub fn from_unordered(mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.price.is_finite());
        points.sort_by_key(|p| p.timestamp);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => deduped.push(point),
            }
        }
        PriceSeries { points: deduped }
    }

    /// Flat series at `price` on every tick of `window`.
    pub fn constant(window: &PriceWindow, price: f64) -> Self {
        PriceSeries {
            points: window
                .ticks()
                .map(|timestamp| PricePoint { timestamp, price })
                .collect(),
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Price of the sample closest in time to `timestamp`. Ties resolve to
    /// the earlier sample.
    pub fn nearest(&self, timestamp: i64) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.timestamp < timestamp);
        let after = self.points.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.points.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp - b.timestamp <= a.timestamp - timestamp {
                    Some(b.price)
                } else {
                    Some(a.price)
                }
            }
            (Some(b), None) => Some(b.price),
            (None, Some(a)) => Some(a.price),
            (None, None) => None,
        }
    }

    /// True when the first and last samples lie within one resolution step
    /// of the window's start and end.
    pub fn covers(&self, window: &PriceWindow) -> bool {
        let step = window.resolution.max(1);
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => {
                first.timestamp <= window.start.saturating_add(step)
                    && last.timestamp >= window.end.saturating_sub(step)
            }
            _ => false,
        }
    }

    /// Maps the samples onto the fixed grid of `window` by nearest timestamp.
    /// A series that stops short of either end of the window is rejected
    /// rather than stretched.
    pub fn resample(&self, window: &PriceWindow) -> Result<PriceSeries, VaultsimError> {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return Err(VaultsimError::EmptyDataset {
                reason: "cannot resample a series with no data points".into(),
            });
        };
        if !self.covers(window) {
            return Err(VaultsimError::EmptyDataset {
                reason: format!(
                    "samples span {}..{} but the window is {}..{}",
                    first.timestamp, last.timestamp, window.start, window.end
                ),
            });
        }
        let points: Vec<PricePoint> = window
            .ticks()
            .filter_map(|timestamp| {
                self.nearest(timestamp)
                    .map(|price| PricePoint { timestamp, price })
            })
            .collect();
        if points.is_empty() {
            return Err(VaultsimError::EmptyDataset {
                reason: format!(
                    "window {}..{} produced no grid points",
                    window.start, window.end
                ),
            });
        }
        Ok(PriceSeries { points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(timestamp: i64, price: f64) -> PricePoint {
        PricePoint { timestamp, price }
    }

    #[test]
    fn window_ticks_include_end() {
        let window = PriceWindow::new(0, 3 * MS_PER_DAY, MS_PER_DAY);
        let ticks: Vec<i64> = window.ticks().collect();
        assert_eq!(
            ticks,
            vec![0, MS_PER_DAY, 2 * MS_PER_DAY, 3 * MS_PER_DAY]
        );
        assert_eq!(window.tick_count(), 4);
    }

    #[test]
    fn window_ticks_stop_before_overshoot() {
        let window = PriceWindow::new(0, 10, 4);
        let ticks: Vec<i64> = window.ticks().collect();
        assert_eq!(ticks, vec![0, 4, 8]);
        assert_eq!(window.tick_count(), 3);
    }

    #[test]
    fn new_rejects_non_increasing_timestamps() {
        let result = PriceSeries::new(vec![point(10, 1.0), point(10, 2.0)]);
        assert!(matches!(result, Err(VaultsimError::EmptyDataset { .. })));
    }

    #[test]
    fn from_unordered_sorts_and_dedupes() {
        let series = PriceSeries::from_unordered(vec![
            point(30, 3.0),
            point(10, 1.0),
            point(20, 2.0),
            point(20, 2.5),
            point(40, f64::NAN),
        ]);
        let timestamps: Vec<i64> = series.points().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
        assert!((series.nearest(20).unwrap() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn nearest_picks_closest_sample() {
        let series = PriceSeries::new(vec![point(0, 1.0), point(100, 2.0)]).unwrap();
        assert_eq!(series.nearest(-50), Some(1.0));
        assert_eq!(series.nearest(40), Some(1.0));
        assert_eq!(series.nearest(50), Some(1.0));
        assert_eq!(series.nearest(51), Some(2.0));
        assert_eq!(series.nearest(500), Some(2.0));
    }

    #[test]
    fn nearest_on_empty_series() {
        let series = PriceSeries::new(vec![]).unwrap();
        assert_eq!(series.nearest(0), None);
    }

    #[test]
    fn resample_irregular_samples_onto_grid() {
        let series = PriceSeries::new(vec![
            point(0, 1.0),
            point(MS_PER_DAY + 3_600_000, 1.5),
            point(3 * MS_PER_DAY - 1, 2.0),
        ])
        .unwrap();
        let window = PriceWindow::new(0, 3 * MS_PER_DAY, MS_PER_DAY);
        let grid = series.resample(&window).unwrap();

        let prices: Vec<f64> = grid.points().iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![1.0, 1.5, 2.0, 2.0]);
        assert_eq!(grid.first().unwrap().timestamp, 0);
        assert_eq!(grid.last().unwrap().timestamp, 3 * MS_PER_DAY);
    }

    #[test]
    fn resample_rejects_partial_coverage() {
        let window = PriceWindow::new(0, 30 * MS_PER_DAY, MS_PER_DAY);
        let head: Vec<PricePoint> = (0..10)
            .map(|d| point(d * MS_PER_DAY, 1.0 + d as f64 * 0.1))
            .collect();
        let tail: Vec<PricePoint> = (20..=30)
            .map(|d| point(d * MS_PER_DAY, 2.0))
            .collect();

        let head = PriceSeries::new(head).unwrap();
        let tail = PriceSeries::new(tail).unwrap();
        assert!(!head.covers(&window));
        assert!(!tail.covers(&window));
        assert!(matches!(head.resample(&window), Err(VaultsimError::EmptyDataset { .. })));
        assert!(tail.resample(&window).is_err());
    }

    #[test]
    fn coverage_tolerates_one_step_of_slack() {
        let window = PriceWindow::new(0, 10 * MS_PER_DAY, MS_PER_DAY);
        let series = PriceSeries::new(vec![
            point(MS_PER_DAY, 1.0),
            point(9 * MS_PER_DAY, 2.0),
        ])
        .unwrap();
        assert!(series.covers(&window));

        let late = PriceSeries::new(vec![point(MS_PER_DAY + 1, 1.0), point(10 * MS_PER_DAY, 2.0)]).unwrap();
        assert!(!late.covers(&window));
    }

    #[test]
    fn resample_empty_series_is_fatal() {
        let series = PriceSeries::new(vec![]).unwrap();
        let window = PriceWindow::new(0, MS_PER_DAY, MS_PER_DAY);
        assert!(series.resample(&window).is_err());
    }

    #[test]
    fn constant_series_covers_window() {
        let window = PriceWindow::new(0, 2 * MS_PER_DAY, MS_PER_DAY);
        let series = PriceSeries::constant(&window, 1.0);
        assert_eq!(series.len(), 3);
        assert!(series.points().iter().all(|p| p.price == 1.0));
    }
}
