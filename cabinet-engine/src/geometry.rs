//! 范围折叠与单位换算。
//!
//! 每个实体只贡献其特征点：线段端点、圆/圆弧圆心、多段线全部顶点、
//! 文字与块参照的插入点。未识别实体默认不参与折叠。

use cabinet_config::{ExtractionConfig, UnknownEntityPolicy};
use cabinet_core::drawing::{Entity, Header};
use cabinet_core::geometry::{Extents, Point3};

pub const INCH_TO_MM: f64 = 25.4;

/// 物理尺寸（毫米，未取整）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width_mm: f64,
    pub height_mm: f64,
    pub depth_mm: f64,
}

/// 图纸单位到毫米的比例。已知的 `$INSUNITS` 按实际单位换算，
/// 其余情况英制乘 25.4，公制乘 1。
pub fn unit_scale(header: &Header) -> f64 {
    header
        .insunits
        .and_then(insunits_to_mm)
        .unwrap_or(if header.units_are_metric { 1.0 } else { INCH_TO_MM })
}

fn insunits_to_mm(code: i32) -> Option<f64> {
    let scale = match code {
        1 => INCH_TO_MM,
        2 => 304.8,
        3 => 1_609_344.0,
        4 => 1.0,
        5 => 10.0,
        6 => 1_000.0,
        7 => 1_000_000.0,
        8 => 2.54e-5,
        9 => 0.0254,
        10 => 914.4,
        _ => return None,
    };
    Some(scale)
}

/// 四舍五入到整毫米。
#[inline]
pub fn round_mm(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.round().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

#[derive(Debug, Clone)]
pub struct GeometryAnalyzer {
    unknown_entities: UnknownEntityPolicy,
    default_width_mm: f64,
    default_height_mm: f64,
    default_depth_mm: f64,
}

impl GeometryAnalyzer {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            unknown_entities: config.unknown_entities,
            default_width_mm: config.default_width_mm,
            default_height_mm: config.default_height_mm,
            default_depth_mm: config.default_depth_mm,
        }
    }

    pub fn entity_points(&self, entity: &Entity) -> Vec<Point3> {
        match entity {
            Entity::Line(line) => vec![line.start, line.end],
            Entity::Arc(arc) => vec![arc.center],
            Entity::Circle(circle) => vec![circle.center],
            Entity::Polyline(polyline) => polyline.vertices.clone(),
            Entity::Text(text) => vec![text.position],
            Entity::Insert(insert) => vec![insert.position],
            Entity::Unknown(_) => match self.unknown_entities {
                UnknownEntityPolicy::Ignore => Vec::new(),
                UnknownEntityPolicy::LegacyOriginLine => vec![Point3::ORIGIN, Point3::ORIGIN],
            },
        }
    }

    /// 没有任何点时返回 `None`，由调用方使用默认尺寸。
    pub fn extents<'a, I>(&self, entities: I) -> Option<Extents>
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        let extents: Extents = entities
            .into_iter()
            .flat_map(|entity| self.entity_points(entity))
            .collect();
        (!extents.is_empty()).then_some(extents)
    }

    pub fn dimensions(&self, extents: Option<&Extents>, scale: f64) -> Dimensions {
        let Some(extents) = extents else {
            return Dimensions {
                width_mm: self.default_width_mm,
                height_mm: self.default_height_mm,
                depth_mm: self.default_depth_mm,
            };
        };
        let depth = extents.depth();
        Dimensions {
            width_mm: extents.width() * scale,
            height_mm: extents.height() * scale,
            depth_mm: if depth > 0.0 {
                depth * scale
            } else {
                self.default_depth_mm
            },
        }
    }
}

impl Default for GeometryAnalyzer {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}
