//! 提取层级链：块 → 块参照 → 图层 → 整图。
//!
//! 每个层级实现 [`ExtractionStrategy`]，由 [`ExtractionPipeline`] 按注册顺序尝试，
//! 第一个产出非空结果的层级即为最终结果，后续层级不再执行。

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use cabinet_config::ExtractionConfig;
use cabinet_core::catalog::ExtractedCabinetData;
use cabinet_core::drawing::{Block, Entity, ParsedDrawing};
use cabinet_core::geometry::Extents;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::geometry::{GeometryAnalyzer, round_mm, unit_scale};
use crate::heuristics::{FeatureInput, entity_layers, infer_features};

/// CAD 保留块（模型空间、匿名块等）的名称前缀。
const RESERVED_BLOCK_PREFIX: char = '*';

static LAYER_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"cabinet|carcass|carcase|base|wall|tall|pantry|upper|overhead|drawer|door|sink|corner|vanity|gable|unit",
    )
    .expect("layer keyword pattern is valid")
});

/// 一次提取所需的只读上下文。
pub struct ExtractionContext<'a> {
    pub filename: &'a str,
    pub drawing: &'a ParsedDrawing,
    pub builder: &'a CabinetBuilder,
}

pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, context: &ExtractionContext<'_>) -> Vec<ExtractedCabinetData>;
}

/// 一个待评估的柜体候选。
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub filename: String,
    pub name: String,
    pub entities: Vec<&'a Entity>,
    /// 预先给定的范围（图纸头部），存在时跳过实体折叠。
    pub extents: Option<Extents>,
    /// 块参照的 X/Y 缩放。
    pub scale: (f64, f64),
    pub permissive_shelves: bool,
}

impl<'a> Candidate<'a> {
    pub fn new(filename: String, name: impl Into<String>, entities: Vec<&'a Entity>) -> Self {
        Self {
            filename,
            name: name.into(),
            entities,
            extents: None,
            scale: (1.0, 1.0),
            permissive_shelves: false,
        }
    }
}

/// 把候选转换为柜体记录：范围、单位换算、尺寸过滤与特征推断。
#[derive(Debug, Clone)]
pub struct CabinetBuilder {
    analyzer: GeometryAnalyzer,
    min_dimension_mm: f64,
    min_entities: usize,
}

impl CabinetBuilder {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            analyzer: GeometryAnalyzer::new(config),
            min_dimension_mm: config.min_dimension_mm,
            min_entities: config.min_entities,
        }
    }

    #[inline]
    pub fn min_entities(&self) -> usize {
        self.min_entities
    }

    /// 尺寸不足的候选返回 `None`，属于预期噪声，不计为错误。
    pub fn build(
        &self,
        drawing: &ParsedDrawing,
        candidate: Candidate<'_>,
    ) -> Option<ExtractedCabinetData> {
        let (scale_x, scale_y) = candidate.scale;
        let extents = candidate
            .extents
            .or_else(|| self.analyzer.extents(candidate.entities.iter().copied()))
            .map(|extents| extents.scaled(scale_x, scale_y));
        let dimensions = self
            .analyzer
            .dimensions(extents.as_ref(), unit_scale(&drawing.header));

        if dimensions.width_mm < self.min_dimension_mm
            || dimensions.height_mm < self.min_dimension_mm
        {
            debug!(
                candidate = %candidate.name,
                width_mm = dimensions.width_mm,
                height_mm = dimensions.height_mm,
                "rejecting candidate below minimum dimension"
            );
            return None;
        }
        let width = round_mm(dimensions.width_mm);
        let height = round_mm(dimensions.height_mm);
        let depth = round_mm(dimensions.depth_mm).max(1);

        let layers = entity_layers(&candidate.entities);
        let features = infer_features(&FeatureInput {
            name_hint: &candidate.name,
            entities: &candidate.entities,
            layers: &layers,
            permissive_shelves: candidate.permissive_shelves,
        });

        let mut entity_counts = BTreeMap::new();
        for entity in &candidate.entities {
            *entity_counts
                .entry(entity.type_name().to_string())
                .or_insert(0) += 1;
        }

        Some(ExtractedCabinetData {
            filename: candidate.filename,
            name: candidate.name,
            category: features.category,
            cabinet_type: features.cabinet_type,
            width,
            height,
            depth,
            door_count: features.door_count,
            drawer_count: features.drawer_count,
            is_corner: features.is_corner,
            is_blind: features.is_blind,
            is_sink: features.is_sink,
            has_false_front: features.has_false_front,
            has_adjustable_shelves: features.has_adjustable_shelves,
            layers,
            entity_counts,
        })
    }
}

impl Default for CabinetBuilder {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

fn is_layout_block(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("model") || lower.contains("paper")
}

fn block_candidate<'a>(filename: &str, block: &'a Block) -> Candidate<'a> {
    Candidate::new(
        format!("{filename}::{}", block.name),
        block.name.clone(),
        block.entities.iter().collect(),
    )
}

/// 每个具名块各成一个柜体。
pub struct BlockStrategy;

impl ExtractionStrategy for BlockStrategy {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> Vec<ExtractedCabinetData> {
        let builder = context.builder;
        context
            .drawing
            .blocks
            .iter()
            .filter(|block| {
                !block.name.starts_with(RESERVED_BLOCK_PREFIX) && !is_layout_block(&block.name)
            })
            .filter(|block| block.entities.len() >= builder.min_entities())
            .filter_map(|block| {
                builder.build(context.drawing, block_candidate(context.filename, block))
            })
            .collect()
    }
}

/// 沿模型空间中的块参照回到块定义，按块名去重。
pub struct InsertStrategy;

impl ExtractionStrategy for InsertStrategy {
    fn name(&self) -> &'static str {
        "inserts"
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> Vec<ExtractedCabinetData> {
        let builder = context.builder;
        let mut seen = HashSet::new();
        let mut cabinets = Vec::new();
        for insert in context.drawing.inserts() {
            if !seen.insert(insert.name.as_str()) {
                continue;
            }
            let Some(block) = context.drawing.block(&insert.name) else {
                debug!(block = %insert.name, "insert references an undefined block");
                continue;
            };
            if is_layout_block(&block.name) || block.entities.len() < builder.min_entities() {
                continue;
            }
            let mut candidate = block_candidate(context.filename, block);
            candidate.scale = (insert.scale.x(), insert.scale.y());
            cabinets.extend(builder.build(context.drawing, candidate));
        }
        cabinets
    }
}

/// 名称含柜体关键字的图层各成一个柜体。
pub struct LayerStrategy;

impl LayerStrategy {
    /// 图层表中的图层，加上仅被实体引用的图层，保持首次出现顺序。
    fn candidate_layers(drawing: &ParsedDrawing) -> Vec<&str> {
        let mut seen = HashSet::new();
        drawing
            .layers
            .iter()
            .map(|layer| layer.name.as_str())
            .chain(drawing.entities.iter().map(Entity::layer_name))
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

impl ExtractionStrategy for LayerStrategy {
    fn name(&self) -> &'static str {
        "layers"
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> Vec<ExtractedCabinetData> {
        let builder = context.builder;
        let drawing = context.drawing;
        Self::candidate_layers(drawing)
            .into_iter()
            .filter(|layer| LAYER_KEYWORDS.is_match(&layer.to_lowercase()))
            .filter_map(|layer| {
                let entities: Vec<&Entity> = drawing
                    .entities
                    .iter()
                    .filter(|entity| entity.layer_name() == layer)
                    .collect();
                if entities.len() < builder.min_entities() {
                    return None;
                }
                let candidate =
                    Candidate::new(format!("{}::{layer}", context.filename), layer, entities);
                builder.build(drawing, candidate)
            })
            .collect()
    }
}

/// 把整张图纸视为一个柜体，名称取文件名主干。
pub struct WholeDrawingStrategy;

impl ExtractionStrategy for WholeDrawingStrategy {
    fn name(&self) -> &'static str {
        "whole-drawing"
    }

    fn extract(&self, context: &ExtractionContext<'_>) -> Vec<ExtractedCabinetData> {
        let drawing = context.drawing;
        let name = Path::new(context.filename)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| context.filename.to_string());
        let mut candidate = Candidate::new(
            context.filename.to_string(),
            name,
            drawing.entities.iter().collect(),
        );
        candidate.extents = drawing.header.extents;
        candidate.permissive_shelves = true;
        context.builder.build(drawing, candidate).into_iter().collect()
    }
}

/// 有序、短路的层级链。
pub struct ExtractionPipeline {
    builder: CabinetBuilder,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl ExtractionPipeline {
    /// 不含任何层级的空链。
    pub fn empty(config: &ExtractionConfig) -> Self {
        Self {
            builder: CabinetBuilder::new(config),
            strategies: Vec::new(),
        }
    }

    pub fn new(config: &ExtractionConfig) -> Self {
        let mut pipeline = Self::empty(config);
        pipeline.register(BlockStrategy);
        pipeline.register(InsertStrategy);
        pipeline.register(LayerStrategy);
        pipeline.register(WholeDrawingStrategy);
        pipeline
    }

    pub fn register<S: ExtractionStrategy + 'static>(&mut self, strategy: S) {
        self.strategies.push(Box::new(strategy));
    }

    pub fn strategy_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.iter().map(|strategy| strategy.name())
    }

    pub fn extract(&self, filename: &str, drawing: &ParsedDrawing) -> Vec<ExtractedCabinetData> {
        let context = ExtractionContext {
            filename,
            drawing,
            builder: &self.builder,
        };
        for strategy in &self.strategies {
            let cabinets = strategy.extract(&context);
            if !cabinets.is_empty() {
                info!(
                    file = %filename,
                    tier = strategy.name(),
                    cabinets = cabinets.len(),
                    "extracted cabinets"
                );
                return cabinets;
            }
            debug!(file = %filename, tier = strategy.name(), "tier produced nothing");
        }
        Vec::new()
    }
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabinet_core::catalog::CabinetCategory;
    use cabinet_core::drawing::{Circle, Header, Insert, LayerInfo, Line, Text};
    use cabinet_core::geometry::Point3;

    fn line(x0: f64, y0: f64, x1: f64, y1: f64, layer: &str) -> Entity {
        Entity::Line(Line {
            start: Point3::new(x0, y0, 0.0),
            end: Point3::new(x1, y1, 0.0),
            layer: layer.to_string(),
        })
    }

    fn frame(width: f64, height: f64, layer: &str) -> Vec<Entity> {
        vec![
            line(0.0, 0.0, width, 0.0, layer),
            line(width, 0.0, width, height, layer),
            line(width, height, 0.0, height, layer),
            line(0.0, height, 0.0, 0.0, layer),
        ]
    }

    fn block(name: &str, entities: Vec<Entity>) -> Block {
        Block {
            name: name.to_string(),
            entities,
            base_point: Point3::ORIGIN,
        }
    }

    fn insert(name: &str, scale: f64) -> Entity {
        Entity::Insert(Insert {
            name: name.to_string(),
            position: Point3::new(2000.0, 0.0, 0.0),
            scale: Point3::new(scale, scale, 1.0),
            rotation: 0.0,
            layer: "0".to_string(),
        })
    }

    #[test]
    fn pipeline_registers_tiers_in_order() {
        let pipeline = ExtractionPipeline::default();
        let names: Vec<_> = pipeline.strategy_names().collect();
        assert_eq!(names, vec!["blocks", "inserts", "layers", "whole-drawing"]);
    }

    #[test]
    fn blocks_win_over_layers_and_whole_drawing() {
        let drawing = ParsedDrawing {
            blocks: vec![
                block("*Model_Space", frame(5000.0, 5000.0, "0")),
                block("Layout Paper", frame(5000.0, 5000.0, "0")),
                block("Base 600", frame(600.0, 870.0, "CARCASS")),
                block("Title Tag", frame(80.0, 40.0, "0")),
                block("Sparse", frame(900.0, 900.0, "0")[..2].to_vec()),
            ],
            entities: frame(3000.0, 2400.0, "BASE-CABINETS"),
            ..ParsedDrawing::default()
        };
        let cabinets = ExtractionPipeline::default().extract("kitchen.dxf", &drawing);
        assert_eq!(cabinets.len(), 1);
        let cabinet = &cabinets[0];
        assert_eq!(cabinet.filename, "kitchen.dxf::Base 600");
        assert_eq!((cabinet.width, cabinet.height, cabinet.depth), (600, 870, 580));
        assert_eq!(cabinet.layers, vec!["CARCASS"]);
        assert_eq!(cabinet.entity_counts.get("LINE"), Some(&4));
    }

    #[test]
    fn inserts_resolve_anonymous_blocks_and_apply_scale() {
        let drawing = ParsedDrawing {
            blocks: vec![block("*U12", frame(300.0, 435.0, "0"))],
            entities: vec![insert("*U12", 2.0), insert("*U12", 3.0), insert("Missing", 1.0)],
            ..ParsedDrawing::default()
        };
        let cabinets = ExtractionPipeline::default().extract("vanity.dxf", &drawing);
        assert_eq!(cabinets.len(), 1);
        assert_eq!(cabinets[0].filename, "vanity.dxf::*U12");
        assert_eq!((cabinets[0].width, cabinets[0].height), (600, 870));
    }

    #[test]
    fn layers_with_keywords_become_cabinets() {
        let mut entities = frame(600.0, 720.0, "WALL-UNITS");
        entities.extend(frame(400.0, 400.0, "NOTES"));
        entities.extend(frame(50.0, 50.0, "DOOR-SWING"));
        entities.push(Entity::Text(Text {
            position: Point3::new(10.0, 10.0, 0.0),
            text: "W600".to_string(),
            height: 2.5,
            rotation: 0.0,
            layer: "WALL-UNITS".to_string(),
        }));
        let drawing = ParsedDrawing {
            layers: vec![LayerInfo::new("0"), LayerInfo::new("NOTES")],
            entities,
            ..ParsedDrawing::default()
        };
        let cabinets = ExtractionPipeline::default().extract("plan.dxf", &drawing);
        assert_eq!(cabinets.len(), 1);
        let wall = &cabinets[0];
        assert_eq!(wall.name, "WALL-UNITS");
        assert_eq!(wall.filename, "plan.dxf::WALL-UNITS");
        assert_eq!(wall.category, CabinetCategory::Wall);
        assert_eq!(wall.entity_counts.get("TEXT"), Some(&1));
    }

    #[test]
    fn whole_drawing_uses_header_extents_and_file_stem() {
        let mut header = Header::default();
        header.units_are_metric = false;
        header.extents = Some(Extents::new(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(30.0, 36.0, 0.0),
        ));
        let drawing = ParsedDrawing {
            header,
            entities: vec![line(12.0, 1.0, 28.0, 1.0, "0")],
            ..ParsedDrawing::default()
        };
        let cabinets = ExtractionPipeline::default().extract("parts/B20.dxf", &drawing);
        assert_eq!(cabinets.len(), 1);
        let cabinet = &cabinets[0];
        assert_eq!(cabinet.name, "B20");
        assert_eq!(cabinet.filename, "parts/B20.dxf");
        assert_eq!((cabinet.width, cabinet.height), (508, 914));
        assert!(cabinet.has_adjustable_shelves);
    }

    #[test]
    fn empty_drawing_falls_back_to_default_box() {
        let cabinets = ExtractionPipeline::default().extract("blank.dxf", &ParsedDrawing::default());
        assert_eq!(cabinets.len(), 1);
        assert_eq!(
            (cabinets[0].width, cabinets[0].height, cabinets[0].depth),
            (600, 870, 580)
        );
        assert_eq!(cabinets[0].door_count, 1);
    }

    #[test]
    fn tiny_whole_drawing_yields_nothing() {
        let drawing = ParsedDrawing {
            entities: vec![
                line(0.0, 0.0, 40.0, 0.0, "0"),
                Entity::Circle(Circle {
                    center: Point3::new(20.0, 20.0, 0.0),
                    radius: 5.0,
                    layer: "0".to_string(),
                }),
            ],
            ..ParsedDrawing::default()
        };
        assert!(ExtractionPipeline::default().extract("tag.dxf", &drawing).is_empty());
    }

    #[test]
    fn minimum_dimension_is_checked_before_rounding() {
        let drawing = ParsedDrawing {
            blocks: vec![
                block("Filler 99.6", frame(99.6, 720.0, "0")),
                block("Filler 100", frame(100.0, 720.0, "0")),
            ],
            ..ParsedDrawing::default()
        };
        let cabinets = ExtractionPipeline::default().extract("fillers.dxf", &drawing);
        let names: Vec<&str> = cabinets.iter().map(|cabinet| cabinet.name.as_str()).collect();
        assert_eq!(names, vec!["Filler 100"]);
        assert_eq!(cabinets[0].category, CabinetCategory::Accessory);
    }

    #[test]
    fn custom_pipeline_can_drop_tiers() {
        let mut pipeline = ExtractionPipeline::empty(&ExtractionConfig::default());
        pipeline.register(LayerStrategy);
        let drawing = ParsedDrawing {
            blocks: vec![block("Base 600", frame(600.0, 870.0, "0"))],
            ..ParsedDrawing::default()
        };
        assert!(pipeline.extract("kitchen.dxf", &drawing).is_empty());
    }
}
