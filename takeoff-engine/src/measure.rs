//! 单个实体的长度/面积计算，结果已换算为米与平方米。

use takeoff_core::{
    curve::{CircularArc, Winding, bulge_to_arc},
    document::{Entity, HatchEdge, HatchLoop, LegacyPolyline, Polyline},
    geometry::{Point2, ccw_delta, shoelace_area},
};

use crate::errors::EntityError;
use crate::keywords::{CLOSING_ALLOWANCE_M, MAX_CLOSING_TOLERANCE, MIN_CLOSING_TOLERANCE};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurement {
    pub length_m: f64,
    pub area_m2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasureContext {
    pub scale_factor: f64,
    pub arc_step_deg: f64,
}

impl MeasureContext {
    #[inline]
    pub fn closing_tolerance(&self) -> f64 {
        closing_tolerance(self.scale_factor)
    }
}

/// 近似闭合容差（绘图单位）：5 mm 现实距离按比例换算后限定在 `[1e-6, 100]`。
pub fn closing_tolerance(scale_factor: f64) -> f64 {
    (CLOSING_ALLOWANCE_M / scale_factor).clamp(MIN_CLOSING_TOLERANCE, MAX_CLOSING_TOLERANCE)
}

/// 首尾点距离不超过容差且至少 3 个顶点时视为闭合。
pub fn is_near_closed(points: &[Point2], tolerance: f64) -> bool {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() >= 3 => first.distance_to(*last) <= tolerance,
        _ => false,
    }
}

pub fn measure(entity: &Entity, ctx: &MeasureContext) -> Result<Measurement, EntityError> {
    let (length, area) = match entity {
        Entity::Line(line) => (line.start.distance_to(line.end), 0.0),
        Entity::Arc(arc) => {
            let sweep = ccw_delta(arc.start_angle, arc.end_angle);
            (arc.radius.abs() * sweep, 0.0)
        }
        Entity::Polyline(polyline) => polyline_quantities(polyline, ctx)?,
        Entity::LegacyPolyline(polyline) => legacy_quantities(polyline, ctx),
        Entity::Hatch(hatch) => {
            let area: f64 = hatch
                .loops
                .iter()
                .map(|hatch_loop| loop_area(hatch_loop, ctx.arc_step_deg))
                .sum();
            (0.0, area)
        }
        Entity::BlockReference(_) => (0.0, 0.0),
    };

    if !length.is_finite() || !area.is_finite() {
        return Err(EntityError::NonFinite(entity.kind()));
    }

    Ok(Measurement {
        length_m: length * ctx.scale_factor,
        area_m2: area * ctx.scale_factor * ctx.scale_factor,
    })
}

/// 返回绘图单位下的 (长度, 面积)。
fn polyline_quantities(
    polyline: &Polyline,
    ctx: &MeasureContext,
) -> Result<(f64, f64), EntityError> {
    let vertices = &polyline.vertices;
    if vertices.len() < 2 {
        return Ok((0.0, 0.0));
    }

    let positions: Vec<Point2> = vertices.iter().map(|v| v.position).collect();
    let closed = polyline.is_closed || is_near_closed(&positions, ctx.closing_tolerance());

    let mut length = 0.0;
    let mut outline: Vec<Point2> = Vec::with_capacity(vertices.len());
    let segment_count = if closed {
        vertices.len()
    } else {
        vertices.len() - 1
    };

    for index in 0..segment_count {
        let current = vertices[index];
        let next = vertices[(index + 1) % vertices.len()];
        outline.push(current.position);

        // 未显式闭合的近似闭合段只参与面积，且按直线处理
        let is_implicit_closing = index + 1 == vertices.len() && !polyline.is_closed;
        if is_implicit_closing {
            continue;
        }

        if current.bulge == 0.0 {
            length += current.position.distance_to(next.position);
            continue;
        }

        let arc = bulge_to_arc(current.position, next.position, current.bulge)?;
        length += arc.length();
        let samples = arc.sample(ctx.arc_step_deg);
        if samples.len() > 2 {
            outline.extend_from_slice(&samples[1..samples.len() - 1]);
        }
    }
    if !closed {
        if let Some(last) = vertices.last() {
            outline.push(last.position);
        }
    }

    let area = if closed { shoelace_area(&outline) } else { 0.0 };
    Ok((length, area))
}

fn legacy_quantities(polyline: &LegacyPolyline, ctx: &MeasureContext) -> (f64, f64) {
    let points = &polyline.vertices;
    let mut length: f64 = points.windows(2).map(|w| w[0].distance_to(w[1])).sum();
    let closed = polyline.is_closed || is_near_closed(points, ctx.closing_tolerance());
    if !closed {
        return (length, 0.0);
    }
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        if points.len() > 2 {
            length += last.distance_to(*first);
        }
    }
    (length, shoelace_area(points))
}

/// 绘图单位下单个环路的绝对面积；不支持的边直接跳过。
pub fn loop_area(hatch_loop: &HatchLoop, arc_step_deg: f64) -> f64 {
    match hatch_loop {
        HatchLoop::Vertices(points) => shoelace_area(points),
        HatchLoop::Edges(edges) => {
            let mut points: Vec<Point2> = Vec::new();
            for edge in edges {
                match edge {
                    HatchEdge::Line { start, end } => {
                        points.push(*start);
                        points.push(*end);
                    }
                    HatchEdge::Arc {
                        center,
                        radius,
                        start_angle,
                        end_angle,
                        is_counter_clockwise,
                    } => {
                        let arc = CircularArc {
                            center: *center,
                            radius: *radius,
                            start_angle: *start_angle,
                            end_angle: *end_angle,
                            winding: if *is_counter_clockwise {
                                Winding::CounterClockwise
                            } else {
                                Winding::Clockwise
                            },
                        };
                        points.extend(arc.sample(arc_step_deg));
                    }
                    HatchEdge::Unsupported(_) => {}
                }
            }
            shoelace_area(&points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_8, PI};
    use takeoff_core::document::{Arc, Hatch, Line, PolylineVertex};

    fn ctx(scale_factor: f64) -> MeasureContext {
        MeasureContext {
            scale_factor,
            arc_step_deg: 5.0,
        }
    }

    fn polyline(points: &[(f64, f64)], is_closed: bool) -> Entity {
        Entity::Polyline(Polyline {
            vertices: points
                .iter()
                .map(|&(x, y)| PolylineVertex::new(Point2::new(x, y)))
                .collect(),
            is_closed,
            layer: "DALLE".to_string(),
        })
    }

    #[test]
    fn straight_line_scales_linearly() {
        let line = Entity::Line(Line {
            start: Point2::new(0.0, 0.0),
            end: Point2::new(3000.0, 4000.0),
            layer: "MURS".to_string(),
        });
        let m = measure(&line, &ctx(0.001)).expect("line");
        assert!((m.length_m - 5.0).abs() < 1e-9);
        assert_eq!(m.area_m2, 0.0);
    }

    #[test]
    fn arc_length_is_analytic() {
        let arc = Entity::Arc(Arc {
            center: Point2::new(0.0, 0.0),
            radius: 2.0,
            start_angle: -FRAC_PI_2,
            end_angle: FRAC_PI_2,
            layer: "POUTRES".to_string(),
        });
        let m = measure(&arc, &ctx(1.0)).expect("arc");
        assert!((m.length_m - 2.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn closed_rectangle_area_scales_quadratically() {
        let rect = polyline(
            &[(0.0, 0.0), (4000.0, 0.0), (4000.0, 2500.0), (0.0, 2500.0)],
            true,
        );
        let m = measure(&rect, &ctx(0.001)).expect("rect");
        assert!((m.area_m2 - 10.0).abs() < 1e-9);
        assert!((m.length_m - 13.0).abs() < 1e-9);
    }

    #[test]
    fn semicircle_bulge_contributes_arc_length_and_area() {
        let entity = Entity::Polyline(Polyline {
            vertices: vec![
                PolylineVertex::with_bulge(Point2::new(0.0, 0.0), 1.0),
                PolylineVertex::new(Point2::new(10.0, 0.0)),
            ],
            is_closed: true,
            layer: "DALLE".to_string(),
        });
        let m = measure(&entity, &ctx(1.0)).expect("semicircle");
        // 半圆弧长 + 直径闭合段
        assert!((m.length_m - (5.0 * PI + 10.0)).abs() < 1e-9);
        let half_disc = 0.5 * PI * 25.0;
        assert!((m.area_m2 - half_disc).abs() / half_disc < 0.01);
    }

    #[test]
    fn quarter_bulge_open_polyline_has_no_area() {
        let entity = Entity::Polyline(Polyline {
            vertices: vec![
                PolylineVertex::with_bulge(Point2::new(1.0, 0.0), FRAC_PI_8.tan()),
                PolylineVertex::new(Point2::new(0.0, 1.0)),
            ],
            is_closed: false,
            layer: "MURS".to_string(),
        });
        let m = measure(&entity, &ctx(1.0)).expect("quarter");
        assert!((m.length_m - FRAC_PI_2).abs() < 1e-9);
        assert_eq!(m.area_m2, 0.0);
    }

    #[test]
    fn degenerate_bulge_segment_is_an_error() {
        let entity = Entity::Polyline(Polyline {
            vertices: vec![
                PolylineVertex::with_bulge(Point2::new(1.0, 1.0), 0.5),
                PolylineVertex::new(Point2::new(1.0, 1.0)),
            ],
            is_closed: false,
            layer: "MURS".to_string(),
        });
        assert!(matches!(
            measure(&entity, &ctx(1.0)),
            Err(EntityError::Curve(_))
        ));
    }

    #[test]
    fn closing_tolerance_is_clamped() {
        assert!((closing_tolerance(0.001) - 5.0).abs() < 1e-12);
        assert_eq!(closing_tolerance(1e-9), MAX_CLOSING_TOLERANCE);
        assert_eq!(closing_tolerance(1e9), MIN_CLOSING_TOLERANCE);
    }

    #[test]
    fn near_closed_polyline_gets_area_without_closing_length() {
        // 容差 5 个单位：首尾相距 4 视为闭合，相距 6 不视为闭合
        let near = polyline(
            &[(0.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0), (0.0, 1000.0), (0.0, 4.0)],
            false,
        );
        let m = measure(&near, &ctx(0.001)).expect("near closed");
        assert!((m.area_m2 - 1.0).abs() < 1e-9);
        assert!((m.length_m - 3.996).abs() < 1e-9);

        let open = polyline(
            &[(0.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0), (0.0, 1000.0), (0.0, 6.0)],
            false,
        );
        let m = measure(&open, &ctx(0.001)).expect("open");
        assert_eq!(m.area_m2, 0.0);
    }

    #[test]
    fn two_point_polyline_is_never_near_closed() {
        let points = [Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)];
        assert!(!is_near_closed(&points, 1.0));
    }

    #[test]
    fn legacy_polyline_adds_closing_segment_when_closed() {
        let entity = Entity::LegacyPolyline(LegacyPolyline {
            vertices: vec![
                Point2::new(0.0, 0.0),
                Point2::new(2.0, 0.0),
                Point2::new(2.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
            is_closed: true,
            layer: "FONDATIONS".to_string(),
        });
        let m = measure(&entity, &ctx(1.0)).expect("legacy");
        assert!((m.length_m - 6.0).abs() < 1e-12);
        assert!((m.area_m2 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn hatch_loops_are_summed_by_absolute_area() {
        let outer = HatchLoop::Vertices(vec![
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ]);
        let hole = HatchLoop::Vertices(vec![
            Point2::new(2.0, 2.0),
            Point2::new(2.0, 4.0),
            Point2::new(4.0, 4.0),
            Point2::new(4.0, 2.0),
        ]);
        let hatch = Entity::Hatch(Hatch {
            loops: vec![outer, hole],
            layer: "CARRELAGE".to_string(),
        });
        let m = measure(&hatch, &ctx(1.0)).expect("hatch");
        assert!((m.area_m2 - 104.0).abs() < 1e-9);
    }

    #[test]
    fn edge_loop_samples_arcs_and_skips_unsupported_edges() {
        let edges = HatchLoop::Edges(vec![
            HatchEdge::Line {
                start: Point2::new(-1.0, 0.0),
                end: Point2::new(1.0, 0.0),
            },
            HatchEdge::Arc {
                center: Point2::new(0.0, 0.0),
                radius: 1.0,
                start_angle: 0.0,
                end_angle: PI,
                is_counter_clockwise: true,
            },
            HatchEdge::Unsupported(takeoff_core::document::EdgeKind::Spline),
        ]);
        let area = loop_area(&edges, 5.0);
        let expected = 0.5 * PI;
        assert!((area - expected).abs() / expected < 0.01);
    }

    #[test]
    fn non_finite_geometry_is_rejected() {
        let line = Entity::Line(Line {
            start: Point2::new(f64::NAN, 0.0),
            end: Point2::new(1.0, 0.0),
            layer: "MURS".to_string(),
        });
        assert_eq!(
            measure(&line, &ctx(1.0)),
            Err(EntityError::NonFinite("LINE"))
        );
    }
}
