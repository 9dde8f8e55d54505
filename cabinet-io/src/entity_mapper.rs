//! 将原始组码记录映射为封闭的 `Entity` 变体集合。
//!
//! 缺失的数值字段一律取 0，缺失的图层取默认图层 `"0"`；
//! 无法识别的类型映射为 `Entity::Unknown`，绝不伪造成其他变体。

use cabinet_core::drawing::{
    Arc, Circle, DEFAULT_LAYER, Entity, Insert, Line, Polyline, Text, UnknownEntity,
};
use cabinet_core::geometry::Point3;

/// 一个实体的原始组码/值对，POLYLINE 额外携带其 VERTEX 子记录。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntity {
    pub kind: String,
    pub pairs: Vec<(i32, String)>,
    pub vertices: Vec<RawEntity>,
}

impl RawEntity {
    pub fn new(kind: impl Into<String>, pairs: Vec<(i32, String)>) -> Self {
        Self {
            kind: kind.into(),
            pairs,
            vertices: Vec::new(),
        }
    }

    /// 组码首次出现的值。
    pub fn value(&self, code: i32) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, value)| value.as_str())
    }

    pub fn f64_or(&self, code: i32, default: f64) -> f64 {
        self.value(code).and_then(parse_finite).unwrap_or(default)
    }

    #[inline]
    pub fn f64(&self, code: i32) -> f64 {
        self.f64_or(code, 0.0)
    }

    pub fn i32(&self, code: i32) -> i32 {
        self.value(code)
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .unwrap_or(0)
    }

    fn point(&self, x: i32, y: i32, z: i32) -> Point3 {
        Point3::new(self.f64(x), self.f64(y), self.f64(z))
    }

    fn layer(&self) -> String {
        self.value(8)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_LAYER)
            .to_string()
    }
}

/// 每条原始记录恰好产生一个实体。
pub fn map_entity(raw: &RawEntity) -> Entity {
    let layer = raw.layer();
    match raw.kind.as_str() {
        "LINE" => Entity::Line(Line {
            start: raw.point(10, 20, 30),
            end: raw.point(11, 21, 31),
            layer,
        }),
        "ARC" => Entity::Arc(Arc {
            center: raw.point(10, 20, 30),
            radius: raw.f64(40),
            start_angle: raw.f64(50),
            end_angle: raw.f64(51),
            layer,
        }),
        "CIRCLE" => Entity::Circle(Circle {
            center: raw.point(10, 20, 30),
            radius: raw.f64(40),
            layer,
        }),
        "LWPOLYLINE" => Entity::Polyline(Polyline {
            vertices: lwpolyline_vertices(raw),
            is_closed: raw.i32(70) & 0x01 == 0x01,
            layer,
        }),
        "POLYLINE" => Entity::Polyline(Polyline {
            vertices: raw
                .vertices
                .iter()
                .map(|vertex| vertex.point(10, 20, 30))
                .collect(),
            is_closed: raw.i32(70) & 0x01 == 0x01,
            layer,
        }),
        "TEXT" | "MTEXT" => Entity::Text(Text {
            position: raw.point(10, 20, 30),
            text: text_content(raw),
            height: raw.f64(40),
            rotation: raw.f64(50),
            layer,
        }),
        // 缩放缺省为 1，与 DXF 语义一致。
        "INSERT" => Entity::Insert(Insert {
            name: raw.value(2).map(str::trim).unwrap_or_default().to_string(),
            position: raw.point(10, 20, 30),
            scale: Point3::new(raw.f64_or(41, 1.0), raw.f64_or(42, 1.0), raw.f64_or(43, 1.0)),
            rotation: raw.f64(50),
            layer,
        }),
        other => Entity::Unknown(UnknownEntity {
            source_type: other.to_string(),
            layer,
        }),
    }
}

/// NaN 与无穷视同缺失。
fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// LWPOLYLINE 的顶点由成对出现的 10/20 组码给出，组码 38 为整体标高。
fn lwpolyline_vertices(raw: &RawEntity) -> Vec<Point3> {
    let elevation = raw.f64(38);
    let mut coords: Vec<(f64, f64)> = Vec::new();
    for (code, value) in &raw.pairs {
        let parsed = parse_finite(value).unwrap_or(0.0);
        match code {
            10 => coords.push((parsed, 0.0)),
            20 => match coords.last_mut() {
                Some(last) => last.1 = parsed,
                None => coords.push((0.0, parsed)),
            },
            _ => {}
        }
    }
    coords
        .into_iter()
        .map(|(x, y)| Point3::new(x, y, elevation))
        .collect()
}

fn text_content(raw: &RawEntity) -> String {
    raw.pairs
        .iter()
        .filter(|(code, _)| *code == 3 || *code == 1)
        .map(|(_, value)| decode_text(value))
        .collect()
}

fn decode_text(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('P') | Some('p') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}
