pub mod geometry {
    use std::f64::consts::TAU;

    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn distance_to(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }
    }

    impl From<DVec2> for Point2 {
        #[inline]
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        #[inline]
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        /// 构造一个“空”包围盒，首次 `include_point` 时才会变为有效范围。
        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            let min = self.min.as_vec2().min(point.as_vec2());
            let max = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min);
            self.max = Point2::from_vec(max);
        }

        #[inline]
        pub fn width(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.x() - self.min.x()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            if self.is_empty() {
                0.0
            } else {
                self.max.y() - self.min.y()
            }
        }
    }

    /// 两点间欧氏距离。
    #[inline]
    pub fn distance(a: Point2, b: Point2) -> f64 {
        a.distance_to(b)
    }

    /// 鞋带公式求简单多边形面积：`0.5 * |Σ(x_i*y_{i+1} - x_{i+1}*y_i)|`。
    ///
    /// 首点无需在末尾重复，计算时自动回绕；少于 3 个点时返回 0。
    pub fn shoelace_area(points: &[Point2]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let doubled: f64 = points
            .iter()
            .zip(points.iter().cycle().skip(1))
            .map(|(a, b)| a.x() * b.y() - b.x() * a.y())
            .sum();
        doubled.abs() * 0.5
    }

    /// 将任意弧度角归一化到 `[0, 2π)`。
    #[inline]
    pub fn normalize_angle(theta: f64) -> f64 {
        let wrapped = theta.rem_euclid(TAU);
        // rem_euclid 对极小的负数可能正好舍入到 TAU
        if wrapped >= TAU { 0.0 } else { wrapped }
    }

    /// 自 `start` 逆时针旋转到 `end` 所经过的非负角度。
    #[inline]
    pub fn ccw_delta(start: f64, end: f64) -> f64 {
        let delta = normalize_angle(end) - normalize_angle(start);
        if delta < 0.0 { delta + TAU } else { delta }
    }

}

pub mod curve {
    use std::f64::consts::PI;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{Point2, ccw_delta, distance};

    /// 圆弧离散化的默认最大角步长（度）。
    pub const DEFAULT_MAX_STEP_DEG: f64 = 5.0;
    /// 步长下限；整圆最多离散为 36000 段。
    pub const MIN_STEP_DEG: f64 = 0.01;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum Winding {
        CounterClockwise,
        Clockwise,
    }

    impl Winding {
        #[inline]
        pub fn sign(self) -> f64 {
            match self {
                Winding::CounterClockwise => 1.0,
                Winding::Clockwise => -1.0,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum CurveError {
        #[error("bulge factor must be non-zero")]
        ZeroBulge,
        #[error("bulge factor {0} is not finite")]
        NonFiniteBulge(f64),
        #[error("degenerate chord: segment endpoints coincide")]
        DegenerateChord,
        #[error("bulge factor {0} does not describe a circular arc")]
        InvalidBulgeAngle(f64),
    }

    /// 显式圆弧：角度为弧度，`winding` 决定从起始角走向终止角的方向。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct CircularArc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub winding: Winding,
    }

    impl CircularArc {
        /// 沿 `winding` 方向扫过的角度，范围 `[0, 2π)`。
        pub fn sweep(&self) -> f64 {
            match self.winding {
                Winding::CounterClockwise => ccw_delta(self.start_angle, self.end_angle),
                Winding::Clockwise => ccw_delta(self.end_angle, self.start_angle),
            }
        }

        /// 解析弧长，不含离散误差。
        #[inline]
        pub fn length(&self) -> f64 {
            self.radius.abs() * self.sweep()
        }

        #[inline]
        pub fn point_at(&self, angle: f64) -> Point2 {
            Point2::new(
                self.center.x() + self.radius * angle.cos(),
                self.center.y() + self.radius * angle.sin(),
            )
        }

        /// 按最大角步长离散圆弧，结果包含首尾两个端点。
        pub fn sample(&self, max_step_deg: f64) -> Vec<Point2> {
            let sweep = self.sweep();
            let steps = segment_count(sweep, max_step_deg);
            let signed_sweep = sweep * self.winding.sign();
            (0..=steps)
                .map(|i| {
                    let t = self.start_angle + signed_sweep * (i as f64) / (steps as f64);
                    self.point_at(t)
                })
                .collect()
        }
    }

    /// 离散段数 `max(1, ceil(sweep / step))`；非法步长回退为默认值，过小的步长按下限计。
    pub fn segment_count(sweep: f64, max_step_deg: f64) -> usize {
        let step_deg = if max_step_deg.is_finite() && max_step_deg > 0.0 {
            max_step_deg.max(MIN_STEP_DEG)
        } else {
            DEFAULT_MAX_STEP_DEG
        };
        let step = step_deg.to_radians();
        // 扣除微小余量，避免 90°/5° 之类的整除因舍入多出一段
        let raw = (sweep.abs() / step - 1e-9).ceil();
        if raw.is_finite() && raw >= 1.0 {
            raw as usize
        } else {
            1
        }
    }

    /// 将多段线 bulge 段（`bulge = tan(θ/4)`，正值为逆时针）还原为圆弧。
    ///
    /// 零 bulge 属于直线段，由调用方处理，这里直接返回错误。
    pub fn bulge_to_arc(start: Point2, end: Point2, bulge: f64) -> Result<CircularArc, CurveError> {
        if !bulge.is_finite() {
            return Err(CurveError::NonFiniteBulge(bulge));
        }
        if bulge == 0.0 {
            return Err(CurveError::ZeroBulge);
        }

        let chord = distance(start, end);
        if chord == 0.0 || !chord.is_finite() {
            return Err(CurveError::DegenerateChord);
        }

        let theta = 4.0 * bulge.atan2(1.0);
        let winding = if theta >= 0.0 {
            Winding::CounterClockwise
        } else {
            Winding::Clockwise
        };
        let theta_abs = theta.abs();

        let sin_half = (theta_abs / 2.0).sin();
        if sin_half.abs() <= f64::EPSILON {
            return Err(CurveError::InvalidBulgeAngle(bulge));
        }
        let radius = chord / (2.0 * sin_half);

        let half = chord / 2.0;
        let mut h = (radius * radius - half * half).max(0.0).sqrt();
        // 优弧（|θ| > π）的圆心位于弦的另一侧
        if theta_abs > PI {
            h = -h;
        }

        let dir = start.vector_to(end).as_vec2() / chord;
        let left_normal = glam::DVec2::new(-dir.y, dir.x);
        let mid = (start.as_vec2() + end.as_vec2()) / 2.0;
        let center = Point2::from_vec(mid + left_normal * (h * winding.sign()));

        let start_angle = (start.y() - center.y()).atan2(start.x() - center.x());
        let end_angle = (end.y() - center.y()).atan2(end.x() - center.x());

        Ok(CircularArc {
            center,
            radius,
            start_angle,
            end_angle,
            winding,
        })
    }

}

pub mod document {
    use std::collections::{BTreeMap, HashMap};

    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point2, Vector2};

    /// `$INSUNITS` 声明的绘图单位。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum DrawingUnits {
        #[default]
        Unspecified,
        Inches,
        Feet,
        Millimeters,
        Centimeters,
        Meters,
        Other(i16),
    }

    impl DrawingUnits {
        pub fn from_insunits(code: i16) -> Self {
            match code {
                0 => DrawingUnits::Unspecified,
                1 => DrawingUnits::Inches,
                2 => DrawingUnits::Feet,
                4 => DrawingUnits::Millimeters,
                5 => DrawingUnits::Centimeters,
                6 => DrawingUnits::Meters,
                other => DrawingUnits::Other(other),
            }
        }

        /// 一个绘图单位对应的米数；未声明或不常见的单位返回 `None`。
        pub fn meters_per_unit(self) -> Option<f64> {
            match self {
                DrawingUnits::Inches => Some(0.0254),
                DrawingUnits::Feet => Some(0.3048),
                DrawingUnits::Millimeters => Some(0.001),
                DrawingUnits::Centimeters => Some(0.01),
                DrawingUnits::Meters => Some(1.0),
                DrawingUnits::Unspecified | DrawingUnits::Other(_) => None,
            }
        }

        pub fn label(self) -> &'static str {
            match self {
                DrawingUnits::Unspecified => "unspecified",
                DrawingUnits::Inches => "inches",
                DrawingUnits::Feet => "feet",
                DrawingUnits::Millimeters => "millimeters",
                DrawingUnits::Centimeters => "centimeters",
                DrawingUnits::Meters => "meters",
                DrawingUnits::Other(_) => "other",
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Arc(Arc),
        Polyline(Polyline),
        LegacyPolyline(LegacyPolyline),
        Hatch(Hatch),
        BlockReference(BlockReference),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::LegacyPolyline(polyline) => &polyline.layer,
                Entity::Hatch(hatch) => &hatch.layer,
                Entity::BlockReference(reference) => &reference.layer,
            }
        }

        /// DXF 实体类型名，用于诊断信息。
        pub fn kind(&self) -> &'static str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Arc(_) => "ARC",
                Entity::Polyline(_) => "LWPOLYLINE",
                Entity::LegacyPolyline(_) => "POLYLINE",
                Entity::Hatch(_) => "HATCH",
                Entity::BlockReference(_) => "INSERT",
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
    }

    /// 圆弧实体，角度以弧度形式储存，遵循数学正方向（逆时针）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
    }

    /// 轻量多段线：每个顶点的 bulge 描述从该顶点出发的那一段。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<PolylineVertex>,
        pub is_closed: bool,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct PolylineVertex {
        pub position: Point2,
        pub bulge: f64,
    }

    impl PolylineVertex {
        #[inline]
        pub fn new(position: Point2) -> Self {
            Self {
                position,
                bulge: 0.0,
            }
        }

        #[inline]
        pub fn with_bulge(position: Point2, bulge: f64) -> Self {
            Self { position, bulge }
        }
    }

    /// 旧式 POLYLINE/VERTEX 序列，仅保留顶点链。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LegacyPolyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Hatch {
        pub loops: Vec<HatchLoop>,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchLoop {
        Vertices(Vec<Point2>),
        Edges(Vec<HatchEdge>),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum EdgeKind {
        Ellipse,
        Spline,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum HatchEdge {
        Line {
            start: Point2,
            end: Point2,
        },
        Arc {
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            is_counter_clockwise: bool,
        },
        /// 已识别但不参与面积计算的边类型。
        Unsupported(EdgeKind),
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        pub insert: Point2,
        pub scale: Vector2,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockDefinition {
        pub name: String,
        pub base_point: Point2,
        pub entities: Vec<Entity>,
    }

    /// 读取阶段因内容无效而被丢弃的实体。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RejectedEntity {
        pub kind: String,
        pub reason: String,
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Drawing {
        entities: Vec<Entity>,
        blocks: HashMap<String, BlockDefinition>,
        #[serde(default)]
        units: DrawingUnits,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        unsupported: BTreeMap<String, usize>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rejected: Vec<RejectedEntity>,
    }

    impl Drawing {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_entity(&mut self, entity: Entity) {
            self.entities.push(entity);
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) {
            self.add_entity(Entity::Line(Line {
                start,
                end,
                layer: layer.into(),
            }));
        }

        pub fn add_arc(
            &mut self,
            center: Point2,
            radius: f64,
            start_angle: f64,
            end_angle: f64,
            layer: impl Into<String>,
        ) {
            self.add_entity(Entity::Arc(Arc {
                center,
                radius,
                start_angle,
                end_angle,
                layer: layer.into(),
            }));
        }

        pub fn add_polyline<I>(&mut self, points: I, is_closed: bool, layer: impl Into<String>)
        where
            I: IntoIterator<Item = Point2>,
        {
            self.add_polyline_with_vertices(
                points.into_iter().map(PolylineVertex::new),
                is_closed,
                layer,
            );
        }

        pub fn add_polyline_with_vertices<I>(
            &mut self,
            vertices: I,
            is_closed: bool,
            layer: impl Into<String>,
        ) where
            I: IntoIterator<Item = PolylineVertex>,
        {
            self.add_entity(Entity::Polyline(Polyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                layer: layer.into(),
            }));
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            scale: Vector2,
            rotation: f64,
            layer: impl Into<String>,
        ) {
            self.add_entity(Entity::BlockReference(BlockReference {
                name: name.into(),
                insert,
                scale,
                rotation,
                layer: layer.into(),
            }));
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &Entity> {
            self.entities.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        /// 同名块定义会被后加入者覆盖。
        pub fn add_block_definition(&mut self, definition: BlockDefinition) {
            self.blocks.insert(definition.name.clone(), definition);
        }

        #[inline]
        pub fn block(&self, name: &str) -> Option<&BlockDefinition> {
            self.blocks.get(name)
        }

        #[inline]
        pub fn blocks(&self) -> impl Iterator<Item = &BlockDefinition> {
            self.blocks.values()
        }

        #[inline]
        pub fn units(&self) -> DrawingUnits {
            self.units
        }

        #[inline]
        pub fn set_units(&mut self, units: DrawingUnits) {
            self.units = units;
        }

        pub fn note_unsupported(&mut self, kind: impl Into<String>) {
            *self.unsupported.entry(kind.into()).or_insert(0) += 1;
        }

        /// 按类型名排序的未支持实体计数。
        #[inline]
        pub fn unsupported(&self) -> &BTreeMap<String, usize> {
            &self.unsupported
        }

        pub fn note_rejected(&mut self, kind: impl Into<String>, reason: impl Into<String>) {
            self.rejected.push(RejectedEntity {
                kind: kind.into(),
                reason: reason.into(),
            });
        }

        #[inline]
        pub fn rejected(&self) -> &[RejectedEntity] {
            &self.rejected
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn drawing_stores_entities_and_blocks() {
            let mut drawing = Drawing::new();
            drawing.add_line(Point2::new(0.0, 0.0), Point2::new(10.0, 0.0), "MURS");
            drawing.add_polyline(
                [
                    Point2::new(0.0, 0.0),
                    Point2::new(2.0, 2.0),
                    Point2::new(4.0, 0.0),
                ],
                true,
                "DALLES",
            );
            drawing.add_block_reference(
                "DOOR90",
                Point2::new(1.0, 1.0),
                Vector2::new(1.0, 1.0),
                0.0,
                "MENUISERIES",
            );
            drawing.add_block_definition(BlockDefinition {
                name: "DOOR90".to_string(),
                base_point: Point2::new(0.0, 0.0),
                entities: Vec::new(),
            });

            assert_eq!(drawing.entity_count(), 3);
            let kinds: Vec<_> = drawing.entities().map(Entity::kind).collect();
            assert_eq!(kinds, ["LINE", "LWPOLYLINE", "INSERT"]);
            let layers: Vec<_> = drawing.entities().map(Entity::layer_name).collect();
            assert_eq!(layers, ["MURS", "DALLES", "MENUISERIES"]);
            assert!(drawing.block("DOOR90").is_some());
            assert!(drawing.block("door90").is_none());
        }

        #[test]
        fn reader_notes_are_tallied() {
            let mut drawing = Drawing::new();
            drawing.note_unsupported("TEXT");
            drawing.note_unsupported("TEXT");
            drawing.note_unsupported("CIRCLE");
            drawing.note_rejected("LINE", "missing end point");

            let tallies: Vec<_> = drawing
                .unsupported()
                .iter()
                .map(|(kind, count)| (kind.as_str(), *count))
                .collect();
            assert_eq!(tallies, [("CIRCLE", 1), ("TEXT", 2)]);
            assert_eq!(drawing.rejected().len(), 1);
            assert_eq!(drawing.rejected()[0].kind, "LINE");
        }

        #[test]
        fn insunits_codes_map_to_meters() {
            assert_eq!(DrawingUnits::from_insunits(4), DrawingUnits::Millimeters);
            assert_eq!(
                DrawingUnits::from_insunits(4).meters_per_unit(),
                Some(0.001)
            );
            assert_eq!(DrawingUnits::from_insunits(6).meters_per_unit(), Some(1.0));
            assert_eq!(DrawingUnits::from_insunits(0).meters_per_unit(), None);
            assert_eq!(DrawingUnits::from_insunits(14), DrawingUnits::Other(14));
        }

        #[test]
        fn drawing_serializes_to_json() {
            let mut drawing = Drawing::new();
            drawing.set_units(DrawingUnits::Millimeters);
            drawing.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "MURS");
            let json = serde_json::to_value(&drawing).expect("serialize drawing");
            assert_eq!(json["units"], "Millimeters");
            assert_eq!(json["entities"].as_array().map(Vec::len), Some(1));
        }
    }
}
