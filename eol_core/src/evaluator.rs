//! Pass/fail evaluation of measured forces against calibration points.
//!
//! Bounds at an arbitrary (temperature, stroke) come from linear
//! interpolation over a Delaunay triangulation of the spec points
//! (barycentric weights inside the enclosing triangle). Outside the convex
//! hull the nearest spec point is used. A scatter that spans no area (two
//! points, or all collinear) falls back to the global force limits.

use eol_config::{PassCriteria, SpecPoint};
use serde::Serialize;

use crate::error::EolError;
use crate::measurement::MeasuredPoint;

/// Force band at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceededBound {
    Lower,
    Upper,
}

/// A measured point outside its band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Violation {
    pub temperature: f64,
    pub stroke: f64,
    pub measured: f64,
    pub lower: f64,
    pub upper: f64,
    pub exceeded: ExceededBound,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (word, bound) = match self.exceeded {
            ExceededBound::Lower => ("below lower", self.lower),
            ExceededBound::Upper => ("above upper", self.upper),
        };
        write!(
            f,
            "{:.1}°C @ {:.1}: force {:.3} {word} bound {:.3}",
            self.temperature, self.stroke, self.measured, bound
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub passed: bool,
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl Evaluation {
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// `Ok` when passed, otherwise the evaluation error naming every
    /// violating point.
    pub fn into_result(self) -> Result<Self, EolError> {
        if self.passed {
            Ok(self)
        } else {
            Err(EolError::Evaluation {
                failed_points: self.violations.len(),
                total_points: self.checked,
                summary: self.summary(),
            })
        }
    }
}

type Triangle = [usize; 3];

#[derive(Debug, Clone)]
pub struct PassCriteriaEvaluator {
    criteria: PassCriteria,
    points: Vec<SpecPoint>,
    triangles: Vec<Triangle>,
}

impl PassCriteriaEvaluator {
    pub fn new(criteria: &PassCriteria) -> Self {
        let points = dedup(&criteria.spec_points);
        let triangles = if points.len() >= 3 {
            triangulate(&points)
        } else {
            Vec::new()
        };
        tracing::debug!(
            spec_points = points.len(),
            triangles = triangles.len(),
            "pass criteria prepared"
        );
        Self {
            criteria: criteria.clone(),
            points,
            triangles,
        }
    }

    pub const fn criteria(&self) -> &PassCriteria {
        &self.criteria
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Interpolated force band at (temperature, stroke).
    pub fn bounds_at(&self, temperature: f64, stroke: f64) -> Bounds {
        match self.points.as_slice() {
            [] => self.global(),
            [only] => Bounds {
                lower: only.lower,
                upper: only.upper,
            },
            _ if self.triangles.is_empty() => {
                tracing::debug!(
                    spec_points = self.points.len(),
                    "spec points span no area; using global force limits"
                );
                self.global()
            }
            points => self
                .interpolate(temperature, stroke)
                .unwrap_or_else(|| nearest(points, temperature, stroke)),
        }
    }

    const fn global(&self) -> Bounds {
        Bounds {
            lower: self.criteria.force_limit_min,
            upper: self.criteria.force_limit_max,
        }
    }

    fn interpolate(&self, x: f64, y: f64) -> Option<Bounds> {
        const EPS: f64 = 1e-9;
        self.triangles.iter().find_map(|&[a, b, c]| {
            let (pa, pb, pc) = (&self.points[a], &self.points[b], &self.points[c]);
            let det = (pb.stroke - pc.stroke).mul_add(
                pa.temperature - pc.temperature,
                (pc.temperature - pb.temperature) * (pa.stroke - pc.stroke),
            );
            if det.abs() < EPS {
                return None;
            }
            let l1 = (pb.stroke - pc.stroke)
                .mul_add(x - pc.temperature, (pc.temperature - pb.temperature) * (y - pc.stroke))
                / det;
            let l2 = (pc.stroke - pa.stroke)
                .mul_add(x - pc.temperature, (pa.temperature - pc.temperature) * (y - pc.stroke))
                / det;
            let l3 = 1.0 - l1 - l2;
            if l1 < -EPS || l2 < -EPS || l3 < -EPS {
                return None;
            }
            Some(Bounds {
                lower: l3.mul_add(pc.lower, l1.mul_add(pa.lower, l2 * pb.lower)),
                upper: l3.mul_add(pc.upper, l1.mul_add(pa.upper, l2 * pb.upper)),
            })
        })
    }

    /// Check every point; never stops at the first violation. Both band
    /// edges are inclusive.
    pub fn evaluate(&self, points: &[MeasuredPoint]) -> Evaluation {
        let mut violations = Vec::new();
        for p in points {
            let b = self.bounds_at(p.temperature, p.stroke);
            let exceeded = if p.force < b.lower {
                Some(ExceededBound::Lower)
            } else if p.force > b.upper {
                Some(ExceededBound::Upper)
            } else {
                None
            };
            if let Some(exceeded) = exceeded {
                tracing::info!(
                    temperature = p.temperature,
                    stroke = p.stroke,
                    force = p.force,
                    lower = b.lower,
                    upper = b.upper,
                    "point out of bounds"
                );
                violations.push(Violation {
                    temperature: p.temperature,
                    stroke: p.stroke,
                    measured: p.force,
                    lower: b.lower,
                    upper: b.upper,
                    exceeded,
                });
            }
        }
        Evaluation {
            passed: violations.is_empty(),
            checked: points.len(),
            violations,
        }
    }
}

/// Evaluate `points` against `criteria` in one call.
pub fn evaluate(points: &[MeasuredPoint], criteria: &PassCriteria) -> Evaluation {
    PassCriteriaEvaluator::new(criteria).evaluate(points)
}

/// Drop repeated coordinates, keeping the first occurrence.
fn dedup(points: &[SpecPoint]) -> Vec<SpecPoint> {
    let mut out: Vec<SpecPoint> = Vec::with_capacity(points.len());
    for p in points {
        if !out
            .iter()
            .any(|q| q.temperature == p.temperature && q.stroke == p.stroke)
        {
            out.push(*p);
        }
    }
    out
}

fn nearest(points: &[SpecPoint], x: f64, y: f64) -> Bounds {
    let mut best = &points[0];
    let mut best_d = f64::INFINITY;
    for p in points {
        let d = (p.temperature - x).hypot(p.stroke - y);
        if d < best_d {
            best = p;
            best_d = d;
        }
    }
    Bounds {
        lower: best.lower,
        upper: best.upper,
    }
}

/// Bowyer-Watson Delaunay triangulation. Returned triangles index into
/// `points` and are counter-clockwise; degenerate (zero-area) triangles are
/// dropped, so collinear input yields none.
fn triangulate(points: &[SpecPoint]) -> Vec<Triangle> {
    let mut verts: Vec<(f64, f64)> = points.iter().map(|p| (p.temperature, p.stroke)).collect();
    let n = verts.len();

    let (mut min_x, mut min_y, mut max_x, mut max_y) =
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in &verts {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(1.0);
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
    let far = 100.0 * span;
    verts.push((mid_x - far, mid_y - span));
    verts.push((mid_x, mid_y + far));
    verts.push((mid_x + far, mid_y - span));

    let mut tris: Vec<Triangle> = vec![ccw(&verts, [n, n + 1, n + 2])];
    for i in 0..n {
        let p = verts[i];
        let (bad, keep): (Vec<Triangle>, Vec<Triangle>) = tris
            .into_iter()
            .partition(|t| in_circumcircle(&verts, *t, p));

        // Boundary of the cavity: edges that belong to exactly one bad triangle.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for t in &bad {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                if let Some(pos) = edges
                    .iter()
                    .position(|&(c, d)| (c, d) == (b, a) || (c, d) == (a, b))
                {
                    edges.swap_remove(pos);
                } else {
                    edges.push((a, b));
                }
            }
        }

        tris = keep;
        tris.extend(edges.into_iter().map(|(a, b)| ccw(&verts, [a, b, i])));
    }

    tris.into_iter()
        .filter(|t| t.iter().all(|&v| v < n))
        .filter(|t| orient(&verts, *t).abs() > 1e-12 * span * span)
        .collect()
}

/// Twice the signed area; positive for counter-clockwise.
fn orient(v: &[(f64, f64)], [a, b, c]: Triangle) -> f64 {
    let (ax, ay) = v[a];
    let (bx, by) = v[b];
    let (cx, cy) = v[c];
    (bx - ax).mul_add(cy - ay, -((by - ay) * (cx - ax)))
}

fn ccw(v: &[(f64, f64)], t: Triangle) -> Triangle {
    if orient(v, t) < 0.0 { [t[0], t[2], t[1]] } else { t }
}

/// Strictly inside the circumcircle of counter-clockwise `t`.
fn in_circumcircle(v: &[(f64, f64)], t: Triangle, (px, py): (f64, f64)) -> bool {
    let [a, b, c] = t.map(|i| (v[i].0 - px, v[i].1 - py));
    let sq = |(x, y): (f64, f64)| x.mul_add(x, y * y);
    let det = sq(a) * b.0.mul_add(c.1, -(c.0 * b.1)) - sq(b) * a.0.mul_add(c.1, -(c.0 * a.1))
        + sq(c) * a.0.mul_add(b.1, -(b.0 * a.1));
    det > 1e-12
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(temperature: f64, stroke: f64, upper: f64, lower: f64) -> SpecPoint {
        SpecPoint {
            temperature,
            stroke,
            upper,
            lower,
        }
    }

    #[test]
    fn square_triangulates_into_two() {
        let pts = [
            sp(0.0, 0.0, 0.0, 0.0),
            sp(0.0, 10.0, 2.0, 0.0),
            sp(10.0, 0.0, 0.0, 2.0),
            sp(10.0, 10.0, 2.0, 2.0),
        ];
        assert_eq!(triangulate(&pts).len(), 2);
    }

    #[test]
    fn collinear_points_have_no_triangles() {
        let pts = [
            sp(0.0, 0.0, 1.0, 0.0),
            sp(5.0, 5.0, 2.0, 0.0),
            sp(10.0, 10.0, 3.0, 0.0),
        ];
        assert!(triangulate(&pts).is_empty());
    }

    #[test]
    fn triangle_orientation_is_normalised() {
        let v = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        assert!(orient(&v, ccw(&v, [0, 2, 1])) > 0.0);
    }
}
