//! 柜体特征推断。
//!
//! 名称/图层文本上的规则优先于几何推断。分类、类型、门数关键字都由
//! 有序规则表表达：按声明顺序尝试，第一条命中的规则决定结果。
//!
//! 优先级：
//! 1. 分类：wall → tall → base → accessory，缺省 Base
//! 2. 类型标签：sink, corner, blind, drawer, pantry, appliance, fridge, rangehood，缺省 Standard
//! 3. 门数：显式数字 → double/door 关键字 → 闭合矩形计数（至少 1）
//! 4. 抽屉数：显式数字 → 水平分隔线计数减一
//! 5. 转角、盲角、水槽、假面板、活动层板标志

use std::collections::HashSet;

use cabinet_core::catalog::{CabinetCategory, clamp_doors, clamp_drawers};
use cabinet_core::drawing::Entity;
use once_cell::sync::Lazy;
use regex::Regex;

/// 一条规则：模式命中即得到对应分类结果。
#[derive(Debug, Clone)]
pub struct Rule<T> {
    pattern: Regex,
    value: T,
}

impl<T> Rule<T> {
    pub fn new(pattern: &str, value: T) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            value,
        })
    }

    #[inline]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }
}

/// 有序规则表。
#[derive(Debug, Clone)]
pub struct RuleSet<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleSet<T> {
    pub fn new(rules: Vec<(&str, T)>) -> Result<Self, regex::Error> {
        let rules = rules
            .into_iter()
            .map(|(pattern, value)| Rule::new(pattern, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn first_match(&self, text: &str) -> Option<&T> {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(Rule::value)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub static CATEGORY_RULES: Lazy<RuleSet<CabinetCategory>> = Lazy::new(|| {
    RuleSet::new(vec![
        (r"wall|overhead|upper", CabinetCategory::Wall),
        (r"tall|pantry|full-height|tower", CabinetCategory::Tall),
        (r"base|floor|sink|drawer|corner", CabinetCategory::Base),
        (
            r"filler|kickboard|plinth|cornice|pelmet|end[- ]?panel",
            CabinetCategory::Accessory,
        ),
    ])
    .expect("category patterns are valid")
});

pub static CABINET_TYPE_RULES: Lazy<RuleSet<&'static str>> = Lazy::new(|| {
    RuleSet::new(vec![
        (r"sink", "Sink"),
        (r"corner", "Corner"),
        (r"blind", "Blind"),
        (r"drawer", "Drawer"),
        (r"pantry", "Pantry"),
        (r"oven|appliance", "Appliance"),
        (r"fridge|refrigerator", "Fridge"),
        (r"rangehood|range hood", "Rangehood"),
    ])
    .expect("cabinet type patterns are valid")
});

pub static DOOR_KEYWORD_RULES: Lazy<RuleSet<u32>> = Lazy::new(|| {
    RuleSet::new(vec![(r"\bdouble\b", 2), (r"\bdoors?\b", 1)])
        .expect("door keyword patterns are valid")
});

static EXPLICIT_DOORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*-?\s*doors?\b").expect("door count pattern is valid"));
static EXPLICIT_DRAWERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*-?\s*drawers?\b").expect("drawer count pattern is valid"));
static CORNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"corner").expect("valid pattern"));
static BLIND: Lazy<Regex> = Lazy::new(|| Regex::new(r"blind").expect("valid pattern"));
static SINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"sink").expect("valid pattern"));
static FALSE_FRONT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"false[- ]?front|tilt[- ]?out").expect("valid pattern"));
static SHELVES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"shelf|shelves|adjustable").expect("valid pattern"));

/// 抽屉分隔线：X 方向跨度超过该值（图纸单位）。
const DRAWER_LINE_MIN_SPAN: f64 = 100.0;
/// 抽屉分隔线：Y 方向偏差小于该值。
const DRAWER_LINE_MAX_SKEW: f64 = 1.0;
/// 平面图中水槽开孔的最小半径。
const SINK_CUTOUT_MIN_RADIUS: f64 = 100.0;
/// L 形轮廓至少的顶点数。
const CORNER_OUTLINE_MIN_VERTICES: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct FeatureInput<'a> {
    /// 当前提取层级下最具体的名称：块名、图层名或文件名。
    pub name_hint: &'a str,
    pub entities: &'a [&'a Entity],
    pub layers: &'a [String],
    /// 整图兜底层级：非抽屉柜默认带活动层板。
    pub permissive_shelves: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabinetFeatures {
    pub category: CabinetCategory,
    pub cabinet_type: String,
    pub door_count: u8,
    pub drawer_count: u8,
    pub is_corner: bool,
    pub is_blind: bool,
    pub is_sink: bool,
    pub has_false_front: bool,
    pub has_adjustable_shelves: bool,
}

/// 名称与图层合并后的小写文本，供所有关键字规则使用。
pub fn feature_text(name_hint: &str, layers: &[String]) -> String {
    let mut text = name_hint.to_lowercase();
    for layer in layers {
        text.push(' ');
        text.push_str(&layer.to_lowercase());
    }
    text
}

pub fn infer_features(input: &FeatureInput<'_>) -> CabinetFeatures {
    let text = feature_text(input.name_hint, input.layers);

    let category = CATEGORY_RULES
        .first_match(&text)
        .copied()
        .unwrap_or_default();
    let cabinet_type = CABINET_TYPE_RULES
        .first_match(&text)
        .copied()
        .unwrap_or("Standard")
        .to_string();

    let door_count = explicit_count(&EXPLICIT_DOORS, &text)
        .or_else(|| DOOR_KEYWORD_RULES.first_match(&text).copied())
        .unwrap_or_else(|| count_door_panels(input.entities).max(1));
    let drawer_count = explicit_count(&EXPLICIT_DRAWERS, &text)
        .unwrap_or_else(|| count_drawer_dividers(input.entities));

    let is_corner = CORNER.is_match(&text) || has_l_shaped_outline(input.entities);
    let is_blind = BLIND.is_match(&text);
    let is_sink = SINK.is_match(&text) || has_sink_cutout(input.entities);
    let has_false_front = is_sink && FALSE_FRONT.is_match(&text);
    let drawer_cabinet = cabinet_type == "Drawer" || drawer_count > 0;
    let has_adjustable_shelves =
        SHELVES.is_match(&text) || (input.permissive_shelves && !drawer_cabinet);

    CabinetFeatures {
        category,
        cabinet_type,
        door_count: clamp_doors(door_count),
        drawer_count: clamp_drawers(drawer_count),
        is_corner,
        is_blind,
        is_sink,
        has_false_front,
        has_adjustable_shelves,
    }
}

fn explicit_count(pattern: &Regex, text: &str) -> Option<u32> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|digits| digits.as_str().parse::<u32>().unwrap_or(u32::MAX))
}

/// 闭合矩形且高度大于宽度一半，视为门板轮廓。
fn count_door_panels(entities: &[&Entity]) -> u32 {
    entities
        .iter()
        .filter(|entity| match entity {
            Entity::Polyline(polyline) if polyline.is_closed => {
                let corners = distinct_vertex_count(&polyline.vertices);
                if corners != 4 {
                    return false;
                }
                let (min_x, max_x, min_y, max_y) = polyline.vertices.iter().fold(
                    (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
                    |(min_x, max_x, min_y, max_y), p| {
                        (min_x.min(p.x()), max_x.max(p.x()), min_y.min(p.y()), max_y.max(p.y()))
                    },
                );
                let width = max_x - min_x;
                let height = max_y - min_y;
                width > 0.0 && height > 0.5 * width
            }
            _ => false,
        })
        .count() as u32
}

/// 首尾重合的闭合多段线只计一次。
fn distinct_vertex_count(vertices: &[cabinet_core::geometry::Point3]) -> usize {
    match (vertices.first(), vertices.last()) {
        (Some(first), Some(last)) if vertices.len() > 1 && first == last => vertices.len() - 1,
        _ => vertices.len(),
    }
}

/// 水平线条数减一（顶/底边本身不是分隔线）。
fn count_drawer_dividers(entities: &[&Entity]) -> u32 {
    let horizontal = entities
        .iter()
        .filter(|entity| match entity {
            Entity::Line(line) => {
                (line.end.x() - line.start.x()).abs() > DRAWER_LINE_MIN_SPAN
                    && (line.end.y() - line.start.y()).abs() < DRAWER_LINE_MAX_SKEW
            }
            _ => false,
        })
        .count() as u32;
    horizontal.saturating_sub(1)
}

fn has_l_shaped_outline(entities: &[&Entity]) -> bool {
    entities.iter().any(|entity| match entity {
        Entity::Polyline(polyline) => polyline.vertices.len() >= CORNER_OUTLINE_MIN_VERTICES,
        _ => false,
    })
}

fn has_sink_cutout(entities: &[&Entity]) -> bool {
    entities.iter().any(|entity| match entity {
        Entity::Circle(circle) => circle.radius > SINK_CUTOUT_MIN_RADIUS,
        _ => false,
    })
}

/// 去重后的实体图层名，保持首次出现顺序。
pub fn entity_layers(entities: &[&Entity]) -> Vec<String> {
    let mut seen = HashSet::new();
    entities
        .iter()
        .map(|entity| entity.layer_name())
        .filter(|layer| seen.insert(*layer))
        .map(str::to_string)
        .collect()
}
