use crate::project::{ScreenPoints, SeriesProjection};

/// A projected sample close to the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub series: usize,
    /// Index into the series' [`ScreenPoints`] arrays.
    pub index: usize,
    pub distance: f64,
}

/// Nearest point of one series within `radius` pixels of `(px, py)`.
///
/// `x` is sorted, so only the slice `[px - radius, px + radius]` is scanned.
pub fn nearest_point(points: &ScreenPoints, px: f64, py: f64, radius: f64) -> Option<(usize, f64)> {
    let lo = points.x.partition_point(|&x| x < px - radius);
    let hi = points.x.partition_point(|&x| x <= px + radius);
    let mut best: Option<(usize, f64)> = None;
    for i in lo..hi {
        let dx = points.x[i] - px;
        let dy = points.y[i] - py;
        let d = (dx * dx + dy * dy).sqrt();
        if d <= radius && best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}

/// Nearest point over all series accepted by `eligible`.
pub fn nearest(
    projections: &[SeriesProjection],
    px: f64,
    py: f64,
    radius: f64,
    eligible: impl Fn(usize) -> bool,
) -> Option<Hit> {
    projections
        .iter()
        .enumerate()
        .filter(|(i, _)| eligible(*i))
        .filter_map(|(series, p)| {
            nearest_point(&p.points, px, py, radius).map(|(index, distance)| Hit {
                series,
                index,
                distance,
            })
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(xy: &[(f64, f64)]) -> ScreenPoints {
        ScreenPoints {
            x: xy.iter().map(|p| p.0).collect(),
            y: xy.iter().map(|p| p.1).collect(),
            t: xy.iter().map(|p| p.0).collect(),
            v: xy.iter().map(|p| p.1).collect(),
            lead: None,
            trail: None,
        }
    }

    #[test]
    fn finds_closest_within_radius() {
        let p = points(&[(0.0, 0.0), (10.0, 5.0), (12.0, 50.0), (30.0, 5.0)]);
        assert_eq!(nearest_point(&p, 11.0, 6.0, 10.0).map(|h| h.0), Some(1));
        assert_eq!(nearest_point(&p, 21.0, 5.0, 10.0).map(|h| h.0), Some(3));
        assert!(nearest_point(&p, 20.0, 30.0, 10.0).is_none());
        assert!(nearest_point(&points(&[]), 0.0, 0.0, 10.0).is_none());
    }

    #[test]
    fn picks_best_series() {
        let a = SeriesProjection {
            points: points(&[(10.0, 10.0)]),
            ..Default::default()
        };
        let b = SeriesProjection {
            points: points(&[(10.0, 13.0)]),
            ..Default::default()
        };
        let both = [a, b];
        let hit = nearest(&both, 10.0, 14.0, 10.0, |_| true).unwrap();
        assert_eq!((hit.series, hit.index), (1, 0));
        let hit = nearest(&both, 10.0, 14.0, 10.0, |i| i == 0).unwrap();
        assert_eq!(hit.series, 0);
    }
}
