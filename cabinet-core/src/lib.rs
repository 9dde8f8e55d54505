pub mod geometry {
    use glam::DVec3;
    use serde::{Deserialize, Serialize};

    /// 三维点，内部以 `glam::DVec3` 表示。DXF 平面图的 Z 通常为 0。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        pub const ORIGIN: Point3 = Point3(DVec3::ZERO);

        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_vec(vec: DVec3) -> Self {
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
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }
    }

    impl Default for Point3 {
        fn default() -> Self {
            Self::ORIGIN
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self::from_vec(value)
        }
    }

    /// 轴对齐包围盒（图纸单位）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Extents {
        min: Point3,
        max: Point3,
    }

    impl Extents {
        #[inline]
        pub fn new(min: Point3, max: Point3) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
                max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        /// X 或 Y 方向 min > max 即视为空；Z 允许退化。
        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point3 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point3 {
            self.max
        }

        pub fn include_point(&mut self, point: Point3) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point3::from_vec(self.min.as_vec3().min(point.as_vec3()));
            self.max = Point3::from_vec(self.max.as_vec3().max(point.as_vec3()));
        }

        pub fn include_extents(&mut self, other: &Extents) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        #[inline]
        pub fn depth(&self) -> f64 {
            self.max.z() - self.min.z()
        }

        /// 以 min 角为锚点按 X/Y 比例缩放，用于块参照的缩放系数。
        pub fn scaled(&self, scale_x: f64, scale_y: f64) -> Extents {
            if self.is_empty() {
                return *self;
            }
            let min = self.min;
            let max = Point3::new(
                min.x() + self.width() * scale_x.abs(),
                min.y() + self.height() * scale_y.abs(),
                self.max.z(),
            );
            Extents::new(min, max)
        }
    }

    impl FromIterator<Point3> for Extents {
        fn from_iter<I: IntoIterator<Item = Point3>>(iter: I) -> Self {
            let mut extents = Extents::empty();
            for point in iter {
                extents.include_point(point);
            }
            extents
        }
    }
}

pub mod drawing {
    use serde::{Deserialize, Serialize};

    use crate::geometry::Point3;

    /// 图层组码 8 缺失时使用的默认图层名。
    pub const DEFAULT_LAYER: &str = "0";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Header {
        pub version: Option<String>,
        pub units_are_metric: bool,
        /// `$INSUNITS` 的非零取值，用于精确换算英尺、码等单位。
        #[serde(default)]
        pub insunits: Option<i32>,
        pub extents: Option<crate::geometry::Extents>,
    }

    impl Default for Header {
        fn default() -> Self {
            Self {
                version: None,
                units_are_metric: true,
                insunits: None,
                extents: None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LayerInfo {
        pub name: String,
        pub color_index: i16,
        pub visible: bool,
    }

    impl LayerInfo {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                color_index: 7,
                visible: true,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Block {
        pub name: String,
        pub entities: Vec<Entity>,
        pub base_point: Point3,
    }

    /// 单个文件解析后的结构化结果，生成后不再修改。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct ParsedDrawing {
        pub header: Header,
        pub layers: Vec<LayerInfo>,
        pub blocks: Vec<Block>,
        pub entities: Vec<Entity>,
    }

    impl ParsedDrawing {
        pub fn block(&self, name: &str) -> Option<&Block> {
            self.blocks.iter().find(|block| block.name == name)
        }

        pub fn inserts(&self) -> impl Iterator<Item = &Insert> {
            self.entities.iter().filter_map(|entity| match entity {
                Entity::Insert(insert) => Some(insert),
                _ => None,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Arc(Arc),
        Circle(Circle),
        Polyline(Polyline),
        Text(Text),
        Insert(Insert),
        /// 未识别的实体类型，保留原始类型名，不参与几何计算。
        Unknown(UnknownEntity),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::Insert(insert) => &insert.layer,
                Entity::Unknown(unknown) => &unknown.layer,
            }
        }

        /// DXF 类型名，用于实体计数。
        pub fn type_name(&self) -> &str {
            match self {
                Entity::Line(_) => "LINE",
                Entity::Arc(_) => "ARC",
                Entity::Circle(_) => "CIRCLE",
                Entity::Polyline(_) => "POLYLINE",
                Entity::Text(_) => "TEXT",
                Entity::Insert(_) => "INSERT",
                Entity::Unknown(unknown) => &unknown.source_type,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point3,
        pub end: Point3,
        pub layer: String,
    }

    /// 圆弧，角度按 DXF 原样以度保存。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point3,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point3,
        pub radius: f64,
        pub layer: String,
    }

    /// LWPOLYLINE 与 POLYLINE 统一为同一结构。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point3>,
        pub is_closed: bool,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub position: Point3,
        pub text: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Insert {
        pub name: String,
        pub position: Point3,
        pub scale: Point3,
        pub rotation: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct UnknownEntity {
        pub source_type: String,
        pub layer: String,
    }
}

pub mod catalog {
    use std::collections::BTreeMap;
    use std::fmt;

    use serde::{Deserialize, Serialize};

    pub const MAX_DOORS: u8 = 4;
    pub const MAX_DRAWERS: u8 = 8;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub enum CabinetCategory {
        #[default]
        Base,
        Wall,
        Tall,
        Accessory,
    }

    impl fmt::Display for CabinetCategory {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let label = match self {
                CabinetCategory::Base => "Base",
                CabinetCategory::Wall => "Wall",
                CabinetCategory::Tall => "Tall",
                CabinetCategory::Accessory => "Accessory",
            };
            f.write_str(label)
        }
    }

    /// 单个柜体的提取结果，交由目录导入方消费。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExtractedCabinetData {
        pub filename: String,
        pub name: String,
        pub category: CabinetCategory,
        pub cabinet_type: String,
        pub width: u32,
        pub height: u32,
        pub depth: u32,
        pub door_count: u8,
        pub drawer_count: u8,
        pub is_corner: bool,
        pub is_blind: bool,
        pub is_sink: bool,
        pub has_false_front: bool,
        pub has_adjustable_shelves: bool,
        pub layers: Vec<String>,
        pub entity_counts: BTreeMap<String, usize>,
    }

    #[inline]
    pub fn clamp_doors(count: u32) -> u8 {
        count.min(MAX_DOORS as u32) as u8
    }

    #[inline]
    pub fn clamp_drawers(count: u32) -> u8 {
        count.min(MAX_DRAWERS as u32) as u8
    }

    /// 一次批处理（一个或多个压缩包）的汇总结果。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProcessingResult {
        pub success: bool,
        pub cabinets: Vec<ExtractedCabinetData>,
        pub errors: Vec<String>,
        pub total_files: usize,
        pub processed_files: usize,
    }

    impl ProcessingResult {
        pub fn new(
            cabinets: Vec<ExtractedCabinetData>,
            errors: Vec<String>,
            total_files: usize,
            processed_files: usize,
        ) -> Self {
            Self {
                success: processed_files > 0,
                cabinets,
                errors,
                total_files,
                processed_files,
            }
        }

        pub fn empty() -> Self {
            Self::new(Vec::new(), Vec::new(), 0, 0)
        }

        /// 仅含一条错误的结果，例如压缩包本身无法打开。
        pub fn failed(error: impl Into<String>) -> Self {
            Self::new(Vec::new(), vec![error.into()], 0, 0)
        }

        /// 合并两个结果，`success` 依据合并后的计数重新计算。
        pub fn combine(self, other: ProcessingResult) -> Self {
            let mut cabinets = self.cabinets;
            cabinets.extend(other.cabinets);
            let mut errors = self.errors;
            errors.extend(other.errors);
            Self::new(
                cabinets,
                errors,
                self.total_files + other.total_files,
                self.processed_files + other.processed_files,
            )
        }

        pub fn with_error_prefix(self, prefix: &str) -> Self {
            let errors = self
                .errors
                .into_iter()
                .map(|error| format!("{prefix}: {error}"))
                .collect();
            Self { errors, ..self }
        }
    }

    impl Default for ProcessingResult {
        fn default() -> Self {
            Self::empty()
        }
    }
}
