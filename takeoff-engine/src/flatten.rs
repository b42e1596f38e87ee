//! 块引用展开：按深度上限递归，把块内实体变换到模型空间。

use std::borrow::Cow;
use std::f64::consts::PI;

use glam::DVec2;
use takeoff_core::{
    curve::{CircularArc, Winding},
    document::{Arc, BlockReference, Drawing, Entity, Line, Polyline, PolylineVertex},
    geometry::{Point2, Vector2},
};
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::errors::EntityError;

const UNIFORM_SCALE_EPSILON: f64 = 1e-9;

/// 块插入变换：减去基点 → 缩放 → 旋转 → 平移。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockTransform {
    pub base_point: Point2,
    pub insert: Point2,
    pub scale: Vector2,
    pub rotation: f64,
}

impl BlockTransform {
    pub fn new(reference: &BlockReference, base_point: Point2) -> Result<Self, EntityError> {
        let invalid = |reason| EntityError::InvalidTransform {
            name: reference.name.clone(),
            reason,
        };
        let scale = reference.scale.as_vec2();
        if !scale.is_finite() {
            return Err(invalid("non-finite scale"));
        }
        if scale.x == 0.0 || scale.y == 0.0 {
            return Err(invalid("zero scale"));
        }
        if !reference.rotation.is_finite() {
            return Err(invalid("non-finite rotation"));
        }
        if !reference.insert.is_finite() || !base_point.is_finite() {
            return Err(invalid("non-finite insertion point"));
        }
        Ok(Self {
            base_point,
            insert: reference.insert,
            scale: reference.scale,
            rotation: reference.rotation,
        })
    }

    pub fn apply(&self, point: Point2) -> Point2 {
        let scale = self.scale.as_vec2();
        let local = (point.as_vec2() - self.base_point.as_vec2()) * scale;
        let (sin, cos) = self.rotation.sin_cos();
        let rotated = DVec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos);
        Point2::from_vec(rotated + self.insert.as_vec2())
    }

    /// x/y 缩放异号时图形被镜像，圆弧方向随之反转。
    #[inline]
    pub fn is_mirrored(&self) -> bool {
        self.scale.x() * self.scale.y() < 0.0
    }

    /// 同号且绝对值相等的缩放保持圆为圆。
    pub fn uniform_factor(&self) -> Option<f64> {
        let (sx, sy) = (self.scale.x(), self.scale.y());
        let tolerance = UNIFORM_SCALE_EPSILON * sx.abs().max(sy.abs());
        if (sx - sy).abs() <= tolerance {
            Some(sx)
        } else {
            None
        }
    }

    pub fn apply_to_line(&self, line: &Line, layer: &str) -> Line {
        Line {
            start: self.apply(line.start),
            end: self.apply(line.end),
            layer: layer.to_string(),
        }
    }

    pub fn apply_to_polyline(&self, polyline: &Polyline, layer: &str) -> Polyline {
        let bulge_sign = if self.is_mirrored() { -1.0 } else { 1.0 };
        Polyline {
            vertices: polyline
                .vertices
                .iter()
                .map(|v| PolylineVertex::with_bulge(self.apply(v.position), v.bulge * bulge_sign))
                .collect(),
            is_closed: polyline.is_closed,
            layer: layer.to_string(),
        }
    }

    /// 等比缩放保留圆弧；其它情况在局部坐标下离散后逐点变换为折线。
    pub fn apply_to_arc(&self, arc: &Arc, layer: &str, arc_step_deg: f64) -> Entity {
        if let Some(factor) = self.uniform_factor() {
            // 负的等比缩放等价于旋转 π
            let flip = if factor < 0.0 { PI } else { 0.0 };
            return Entity::Arc(Arc {
                center: self.apply(arc.center),
                radius: arc.radius * factor.abs(),
                start_angle: arc.start_angle + self.rotation + flip,
                end_angle: arc.end_angle + self.rotation + flip,
                layer: layer.to_string(),
            });
        }

        let local = CircularArc {
            center: arc.center,
            radius: arc.radius,
            start_angle: arc.start_angle,
            end_angle: arc.end_angle,
            winding: Winding::CounterClockwise,
        };
        Entity::Polyline(Polyline {
            vertices: local
                .sample(arc_step_deg)
                .into_iter()
                .map(|point| PolylineVertex::new(self.apply(point)))
                .collect(),
            is_closed: false,
            layer: layer.to_string(),
        })
    }

    /// 嵌套块引用：插入点经父变换，旋转相加，缩放相乘。
    pub fn compose(&self, child: &BlockReference, layer: &str) -> BlockReference {
        let scale = self.scale.as_vec2() * child.scale.as_vec2();
        BlockReference {
            name: child.name.clone(),
            insert: self.apply(child.insert),
            scale: Vector2::from(scale),
            rotation: child.rotation + self.rotation,
            layer: layer.to_string(),
        }
    }
}

/// 展开后的实体，附带有效图层与来源信息。
#[derive(Debug, Clone)]
pub struct FlatEntity<'a> {
    pub entity: Cow<'a, Entity>,
    pub layer: &'a str,
    pub depth: usize,
    pub source_block: Option<&'a str>,
}

/// 图层为空或为 "0" 的子实体继承块引用的图层。
#[inline]
pub fn inherit_layer<'a>(child_layer: &'a str, parent_layer: &'a str) -> &'a str {
    let trimmed = child_layer.trim();
    if trimmed.is_empty() || trimmed == "0" {
        parent_layer
    } else {
        child_layer
    }
}

pub struct BlockFlattener<'a> {
    drawing: &'a Drawing,
    max_depth: usize,
    arc_step_deg: f64,
}

impl<'a> BlockFlattener<'a> {
    pub fn new(drawing: &'a Drawing, max_depth: usize, arc_step_deg: f64) -> Self {
        Self {
            drawing,
            max_depth,
            arc_step_deg,
        }
    }

    /// 块引用先于其子实体输出；深度达到上限后不再展开。
    pub fn flatten(&self, diagnostics: &mut Diagnostics) -> Vec<FlatEntity<'a>> {
        let drawing: &'a Drawing = self.drawing;
        let mut out = Vec::new();
        for entity in drawing.entities() {
            self.emit(
                Cow::Borrowed(entity),
                entity.layer_name(),
                0,
                None,
                &mut out,
                diagnostics,
            );
        }
        out
    }

    fn emit(
        &self,
        entity: Cow<'a, Entity>,
        layer: &'a str,
        depth: usize,
        source_block: Option<&'a str>,
        out: &mut Vec<FlatEntity<'a>>,
        diagnostics: &mut Diagnostics,
    ) {
        let reference = match entity.as_ref() {
            Entity::BlockReference(reference) => Some(reference.clone()),
            _ => None,
        };
        out.push(FlatEntity {
            entity,
            layer,
            depth,
            source_block,
        });
        if let Some(reference) = reference {
            self.expand(&reference, layer, depth, out, diagnostics);
        }
    }

    fn expand(
        &self,
        reference: &BlockReference,
        layer: &'a str,
        depth: usize,
        out: &mut Vec<FlatEntity<'a>>,
        diagnostics: &mut Diagnostics,
    ) {
        if depth >= self.max_depth {
            debug!(block = %reference.name, depth, "达到块展开深度上限，停止展开");
            return;
        }

        let drawing: &'a Drawing = self.drawing;
        let Some(block) = drawing.block(&reference.name) else {
            diagnostics.warning(format!(
                "Block instance on layer `{layer}`: {}",
                EntityError::MissingBlock(reference.name.clone())
            ));
            return;
        };

        let transform = match BlockTransform::new(reference, block.base_point) {
            Ok(transform) => transform,
            Err(err) => {
                diagnostics.warning(format!("Block instance on layer `{layer}` not expanded: {err}"));
                return;
            }
        };

        for child in &block.entities {
            let child_layer = inherit_layer(child.layer_name(), layer);
            match self.transform_child(child, &transform, &block.name, child_layer) {
                Ok(entity) => self.emit(
                    Cow::Owned(entity),
                    child_layer,
                    depth + 1,
                    Some(block.name.as_str()),
                    out,
                    diagnostics,
                ),
                Err(err) => {
                    diagnostics.warning(format!("Skipped {}: {err}", child.kind()));
                }
            }
        }
    }

    fn transform_child(
        &self,
        child: &Entity,
        transform: &BlockTransform,
        block_name: &str,
        layer: &str,
    ) -> Result<Entity, EntityError> {
        match child {
            Entity::Line(line) => Ok(Entity::Line(transform.apply_to_line(line, layer))),
            Entity::Arc(arc) => Ok(transform.apply_to_arc(arc, layer, self.arc_step_deg)),
            Entity::Polyline(polyline) => Ok(Entity::Polyline(
                transform.apply_to_polyline(polyline, layer),
            )),
            Entity::BlockReference(inner) => {
                Ok(Entity::BlockReference(transform.compose(inner, layer)))
            }
            Entity::LegacyPolyline(_) | Entity::Hatch(_) => Err(EntityError::UnsupportedInBlock {
                kind: child.kind(),
                block: block_name.to_string(),
            }),
        }
    }
}
