//! # Curve Helpers
//!
//! Cubic Bézier evaluation over control-point lists, as stored by curve
//! attributes: `{"cvs": [[x, y], ...]}` with `3n + 1` points.

/// Component-wise linear interpolation; extra components of the longer list
/// are dropped.
#[must_use]
pub fn list_lerp(a: &[f64], b: &[f64], weight: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(p, q)| p * (1.0 - weight) + q * weight)
        .collect()
}

type Segment = [Vec<f64>; 4];

/// Point at `t` of one cubic segment (De Casteljau).
#[must_use]
pub fn evaluate_bezier(segment: &Segment, t: f64) -> Vec<f64> {
    let [p1, p2, p3, p4] = segment;
    let p12 = list_lerp(p1, p2, t);
    let p23 = list_lerp(p2, p3, t);
    let p34 = list_lerp(p3, p4, t);
    let p123 = list_lerp(&p12, &p23, t);
    let p234 = list_lerp(&p23, &p34, t);
    list_lerp(&p123, &p234, t)
}

/// Split a segment at `t` into two segments sharing the split point.
fn split_bezier(segment: &Segment, t: f64) -> (Segment, Segment) {
    let [p1, p2, p3, p4] = segment;
    let p12 = list_lerp(p1, p2, t);
    let p23 = list_lerp(p2, p3, t);
    let p34 = list_lerp(p3, p4, t);
    let p123 = list_lerp(&p12, &p23, t);
    let p234 = list_lerp(&p23, &p34, t);
    let mid = list_lerp(&p123, &p234, t);
    (
        [p1.clone(), p12, p123, mid.clone()],
        [mid, p234, p34, p4.clone()],
    )
}

/// Point of a segment whose x is within `epsilon` of `x` (bisection).
fn find_from_x(segment: &Segment, x: f64, epsilon: f64) -> Vec<f64> {
    let mut current = segment.clone();
    // Each split halves the parameter range; 64 halvings exhaust f64 precision.
    for _ in 0..64 {
        let (left, right) = split_bezier(&current, 0.5);
        let mid_x = right[0].first().copied().unwrap_or(0.0);
        if (mid_x - x).abs() < epsilon {
            return right[0].clone();
        }
        current = if x < mid_x { left } else { right };
    }
    current[0].clone()
}

fn segment_at(cvs: &[Vec<f64>], index: usize) -> Option<Segment> {
    let start = index.checked_mul(3)?;
    Some([
        cvs.get(start)?.clone(),
        cvs.get(start + 1)?.clone(),
        cvs.get(start + 2)?.clone(),
        cvs.get(start + 3)?.clone(),
    ])
}

/// Point at normalized parameter `param` (clamped to `[0, 1]`) along the
/// whole curve. `None` when the curve has fewer than four points.
#[must_use]
pub fn evaluate_curve(cvs: &[Vec<f64>], param: f64) -> Option<Vec<f64>> {
    let param = param.clamp(0.0, 1.0);
    let segments = (cvs.len() + 2) / 3;
    let segments = segments.checked_sub(1).filter(|s| *s > 0)?;
    let abs_param = param * segments as f64;
    let offset = (abs_param - 1e-5).floor().max(0.0) as usize;
    let t = abs_param - offset as f64;
    let segment = segment_at(cvs, offset)?;
    Some(evaluate_bezier(&segment, t))
}

/// Point of the curve whose x is `x` (clamped to `[0, 1]`), within `epsilon`.
#[must_use]
pub fn evaluate_curve_from_x(cvs: &[Vec<f64>], x: f64, epsilon: f64) -> Option<Vec<f64>> {
    let x = x.clamp(0.0, 1.0);
    if cvs.len() < 4 {
        return None;
    }
    let mut end = 0;
    for i in (0..cvs.len()).step_by(3) {
        end = i;
        if cvs[i].first().copied().unwrap_or(0.0) > x {
            break;
        }
    }
    let end = end.max(3);
    let segment = segment_at(cvs, (end - 3) / 3)?;
    Some(find_from_x(&segment, x, epsilon))
}
