//! ASCII DXF 文本解析：组码/值对 → `ParsedDrawing`。
//!
//! 只读取柜体提取需要的部分：HEADER 中的单位与范围、TABLES 中的图层表、
//! BLOCKS 中的块定义以及 ENTITIES。其余段落整体跳过。

pub mod entity_mapper;

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Lines;

use cabinet_core::drawing::{Block, Entity, Header, LayerInfo, ParsedDrawing};
use cabinet_core::geometry::{Extents, Point3};
use thiserror::Error;
use tracing::debug;

pub use entity_mapper::{RawEntity, map_entity};

/// 结构性错误。单个实体字段缺失不会走到这里，而是退化为 0。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("document contains no group code pairs")]
    Empty,
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("section {section} is not terminated")]
    UnterminatedSection { section: String },
    #[error("line {line}: unexpected token {token:?}, expected SECTION or EOF")]
    UnexpectedToken { line: usize, token: String },
}

/// 解析整份 DXF 文本，绝不 panic。
pub fn parse_dxf(source: &str) -> Result<ParsedDrawing, ParseFailure> {
    DxfParser::new(source).parse()
}

pub struct DxfParser<'a> {
    reader: DxfReader<'a>,
}

impl<'a> DxfParser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
        }
    }

    pub fn parse(mut self) -> Result<ParsedDrawing, ParseFailure> {
        let mut drawing = ParsedDrawing::default();
        let mut saw_pair = false;
        while let Some((code, value)) = self.reader.next_pair()? {
            saw_pair = true;
            if code != 0 {
                return Err(ParseFailure::Malformed {
                    line: self.reader.line_number(),
                    message: format!("unexpected group code {code} outside of a section"),
                });
            }
            match value.trim() {
                "SECTION" => {
                    let name = match self.reader.next_pair()? {
                        Some((2, name)) => name.trim().to_string(),
                        Some((code, _)) => {
                            return Err(ParseFailure::Malformed {
                                line: self.reader.line_number(),
                                message: format!("SECTION name uses group code {code}, expected 2"),
                            });
                        }
                        None => {
                            return Err(ParseFailure::UnterminatedSection {
                                section: "SECTION".to_string(),
                            });
                        }
                    };
                    match name.as_str() {
                        "HEADER" => drawing.header = self.parse_header()?,
                        "TABLES" => drawing.layers = self.parse_tables()?,
                        "BLOCKS" => drawing.blocks = self.parse_blocks()?,
                        "ENTITIES" => drawing.entities = self.parse_entities("ENTITIES")?,
                        other => {
                            debug!(section = other, "skipping DXF section");
                            self.skip_section(other)?;
                        }
                    }
                }
                "EOF" => break,
                token => {
                    return Err(ParseFailure::UnexpectedToken {
                        line: self.reader.line_number(),
                        token: token.to_string(),
                    });
                }
            }
        }
        if !saw_pair {
            return Err(ParseFailure::Empty);
        }
        Ok(drawing)
    }

    fn skip_section(&mut self, section: &str) -> Result<(), ParseFailure> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => return Ok(()),
                Some(_) => continue,
                None => {
                    return Err(ParseFailure::UnterminatedSection {
                        section: section.to_string(),
                    });
                }
            }
        }
    }

    fn parse_header(&mut self) -> Result<Header, ParseFailure> {
        let mut variables: HashMap<String, Vec<(i32, String)>> = HashMap::new();
        let mut current: Option<String> = None;
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value.trim() == "ENDSEC" => break,
                Some((9, name)) => {
                    let name = name.trim().to_string();
                    variables.entry(name.clone()).or_default();
                    current = Some(name);
                }
                Some((code, value)) => {
                    if let Some(values) = current.as_ref().and_then(|name| variables.get_mut(name)) {
                        values.push((code, value));
                    }
                }
                None => {
                    return Err(ParseFailure::UnterminatedSection {
                        section: "HEADER".to_string(),
                    });
                }
            }
        }
        Ok(header_from_variables(&variables))
    }

    fn parse_tables(&mut self) -> Result<Vec<LayerInfo>, ParseFailure> {
        let mut layers = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDSEC" => break,
                    "LAYER" => {
                        let record = RawEntity::new("LAYER", self.read_record()?);
                        if let Some(layer) = layer_from_record(&record) {
                            layers.push(layer);
                        }
                    }
                    _ => {
                        self.read_record()?;
                    }
                },
                Some(_) => continue,
                None => {
                    return Err(ParseFailure::UnterminatedSection {
                        section: "TABLES".to_string(),
                    });
                }
            }
        }
        Ok(layers)
    }

    fn parse_blocks(&mut self) -> Result<Vec<Block>, ParseFailure> {
        let mut blocks = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDSEC" => break,
                    "BLOCK" => {
                        if let Some(block) = self.parse_block_definition()? {
                            blocks.push(block);
                        }
                    }
                    _ => {
                        // 游离的 ENDBLK 等记录
                        self.read_record()?;
                    }
                },
                Some(_) => continue,
                None => {
                    return Err(ParseFailure::UnterminatedSection {
                        section: "BLOCKS".to_string(),
                    });
                }
            }
        }
        Ok(blocks)
    }

    fn parse_block_definition(&mut self) -> Result<Option<Block>, ParseFailure> {
        let header = RawEntity::new("BLOCK", self.read_record()?);
        let name = header
            .value(2)
            .or_else(|| header.value(3))
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let base_point = Point3::new(header.f64(10), header.f64(20), header.f64(30));

        let mut entities = Vec::new();
        loop {
            match self.reader.peek_pair()? {
                Some((0, value)) => match value.trim() {
                    "ENDBLK" => {
                        self.reader.next_pair()?;
                        self.read_record()?;
                        break;
                    }
                    // 缺少 ENDBLK 时由外层 BLOCKS 循环处理 ENDSEC
                    "ENDSEC" => {
                        debug!(block = %name, "block closed by ENDSEC without ENDBLK");
                        break;
                    }
                    _ => {
                        let (_, kind) = self.reader.next_pair()?.unwrap_or_default();
                        if let Some(entity) = self.read_entity(kind.trim())? {
                            entities.push(entity);
                        }
                    }
                },
                Some(_) => {
                    self.reader.next_pair()?;
                }
                None => {
                    return Err(ParseFailure::UnterminatedSection {
                        section: format!("BLOCK {name}"),
                    });
                }
            }
        }

        if name.is_empty() {
            debug!("skipping block definition without a name");
            return Ok(None);
        }
        Ok(Some(Block {
            name,
            entities,
            base_point,
        }))
    }

    fn parse_entities(&mut self, section: &str) -> Result<Vec<Entity>, ParseFailure> {
        let mut entities = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    let kind = value.trim();
                    if kind == "ENDSEC" {
                        break;
                    }
                    if let Some(entity) = self.read_entity(kind)? {
                        entities.push(entity);
                    }
                }
                Some((code, _)) => {
                    return Err(ParseFailure::Malformed {
                        line: self.reader.line_number(),
                        message: format!("{section} section has group code {code}, expected 0"),
                    });
                }
                None => {
                    return Err(ParseFailure::UnterminatedSection {
                        section: section.to_string(),
                    });
                }
            }
        }
        Ok(entities)
    }

    /// 读取一个实体的组码记录并映射；游离的 SEQEND 返回 `None`。
    fn read_entity(&mut self, kind: &str) -> Result<Option<Entity>, ParseFailure> {
        if kind == "SEQEND" {
            self.read_record()?;
            return Ok(None);
        }
        let mut raw = RawEntity::new(kind, self.read_record()?);
        if kind == "POLYLINE" {
            raw.vertices = self.read_polyline_vertices()?;
        }
        let entity = map_entity(&raw);
        if let Entity::Unknown(unknown) = &entity {
            debug!(kind = %unknown.source_type, "unrecognized entity type kept as Unknown");
        }
        Ok(Some(entity))
    }

    fn read_polyline_vertices(&mut self) -> Result<Vec<RawEntity>, ParseFailure> {
        let mut vertices = Vec::new();
        loop {
            let next_kind = match self.reader.peek_pair()? {
                Some((0, value)) => value.trim().to_string(),
                _ => break,
            };
            match next_kind.as_str() {
                "VERTEX" => {
                    self.reader.next_pair()?;
                    vertices.push(RawEntity::new("VERTEX", self.read_record()?));
                }
                "SEQEND" => {
                    self.reader.next_pair()?;
                    self.read_record()?;
                    break;
                }
                _ => break,
            }
        }
        Ok(vertices)
    }

    /// 读取直到下一个组码 0（不消费该组码）。
    fn read_record(&mut self) -> Result<Vec<(i32, String)>, ParseFailure> {
        let mut pairs = Vec::new();
        loop {
            match self.reader.peek_pair()? {
                Some((0, _)) | None => break,
                Some(_) => {
                    if let Some(pair) = self.reader.next_pair()? {
                        pairs.push(pair);
                    }
                }
            }
        }
        Ok(pairs)
    }
}

/// 英制 `$INSUNITS`：英寸、英尺、英里、微英寸、密耳、码。
const IMPERIAL_INSUNITS: [i32; 6] = [1, 2, 3, 8, 9, 10];

fn header_from_variables(variables: &HashMap<String, Vec<(i32, String)>>) -> Header {
    let record = |name: &str| {
        variables
            .get(name)
            .map(|pairs| RawEntity::new(name, pairs.clone()))
    };

    let version = record("$ACADVER")
        .and_then(|raw| raw.value(1).map(|value| value.trim().to_string()))
        .filter(|value| !value.is_empty());

    let insunits = record("$INSUNITS")
        .filter(|raw| raw.value(70).is_some())
        .map(|raw| raw.i32(70))
        .filter(|code| *code != 0);
    let units_are_metric = match insunits {
        Some(code) => !IMPERIAL_INSUNITS.contains(&code),
        None => match record("$MEASUREMENT").filter(|raw| raw.value(70).is_some()) {
            Some(raw) => raw.i32(70) != 0,
            None => true,
        },
    };

    let extents = match (record("$EXTMIN"), record("$EXTMAX")) {
        (Some(min), Some(max)) => {
            let min = Point3::new(min.f64(10), min.f64(20), min.f64(30));
            let max = Point3::new(max.f64(10), max.f64(20), max.f64(30));
            let extents = Extents::new(min, max);
            if extents.is_empty() {
                debug!("ignoring inverted header extents");
                None
            } else {
                Some(extents)
            }
        }
        _ => None,
    };

    Header {
        version,
        units_are_metric,
        insunits,
        extents,
    }
}

fn layer_from_record(record: &RawEntity) -> Option<LayerInfo> {
    let name = record.value(2)?.trim();
    if name.is_empty() {
        return None;
    }
    let color = record.i32(62);
    let frozen = record.i32(70) & 0x01 == 0x01;
    Some(LayerInfo {
        name: name.to_string(),
        color_index: i16::try_from(color.unsigned_abs()).unwrap_or(i16::MAX),
        visible: color >= 0 && !frozen,
    })
}

/// 按两行一组读取组码/值对，支持单步前瞻。
pub struct DxfReader<'a> {
    lines: Peekable<Lines<'a>>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    pub fn new(source: &'a str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            lines: source.lines().peekable(),
            buffer: None,
            line_number: 0,
        }
    }

    #[inline]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn peek_pair(&mut self) -> Result<Option<(i32, String)>, ParseFailure> {
        if self.buffer.is_none() {
            self.buffer = self.read_pair()?;
        }
        Ok(self.buffer.clone())
    }

    pub fn next_pair(&mut self) -> Result<Option<(i32, String)>, ParseFailure> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }
        self.read_pair()
    }

    fn read_pair(&mut self) -> Result<Option<(i32, String)>, ParseFailure> {
        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 文件末尾的空行不视为组码
                    if line.trim().is_empty() && self.rest_is_blank() {
                        return Ok(None);
                    }
                    break line;
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(ParseFailure::Malformed {
                    line: self.line_number,
                    message: "group code has no value line".to_string(),
                });
            }
        };

        let code = code_line
            .trim()
            .parse::<i32>()
            .map_err(|_| ParseFailure::Malformed {
                line: self.line_number - 1,
                message: format!("group code {:?} is not an integer", code_line.trim()),
            })?;
        let value = value_line.trim_end_matches('\r').to_string();
        Ok(Some((code, value)))
    }

    fn rest_is_blank(&mut self) -> bool {
        while let Some(line) = self.lines.peek() {
            if !line.trim().is_empty() {
                return false;
            }
            self.lines.next();
            self.line_number += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_pairs_and_peeks() {
        let mut reader = DxfReader::new("  0\r\nSECTION\r\n  2\r\nENTITIES\r\n");
        assert_eq!(reader.peek_pair().unwrap(), Some((0, "SECTION".to_string())));
        assert_eq!(reader.next_pair().unwrap(), Some((0, "SECTION".to_string())));
        assert_eq!(reader.next_pair().unwrap(), Some((2, "ENTITIES".to_string())));
        assert_eq!(reader.next_pair().unwrap(), None);
    }

    #[test]
    fn reader_rejects_non_numeric_code() {
        let mut reader = DxfReader::new("zero\nSECTION\n");
        match reader.next_pair() {
            Err(ParseFailure::Malformed { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn reader_rejects_dangling_code() {
        let mut reader = DxfReader::new("0\nSECTION\n2");
        reader.next_pair().unwrap();
        assert!(matches!(
            reader.next_pair(),
            Err(ParseFailure::Malformed { .. })
        ));
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let drawing = parse_dxf("0\nEOF\n\n\n").expect("parse");
        assert!(drawing.entities.is_empty());
        assert!(drawing.header.units_are_metric);
    }

    #[test]
    fn empty_text_is_a_failure() {
        assert_eq!(parse_dxf(""), Err(ParseFailure::Empty));
        assert_eq!(parse_dxf("\n\n"), Err(ParseFailure::Empty));
    }

    #[test]
    fn insunits_wins_over_measurement() {
        let text = "0\nSECTION\n2\nHEADER\n9\n$MEASUREMENT\n70\n1\n9\n$INSUNITS\n70\n1\n0\nENDSEC\n0\nEOF\n";
        let drawing = parse_dxf(text).expect("parse");
        assert!(!drawing.header.units_are_metric);

        let text = "0\nSECTION\n2\nHEADER\n9\n$MEASUREMENT\n70\n0\n9\n$INSUNITS\n70\n0\n0\nENDSEC\n0\nEOF\n";
        let drawing = parse_dxf(text).expect("parse");
        assert!(!drawing.header.units_are_metric);
    }

    #[test]
    fn imperial_insunits_codes_are_kept() {
        for (code, metric) in [(2, false), (9, false), (10, false), (4, true), (6, true)] {
            let text = format!(
                "0\nSECTION\n2\nHEADER\n9\n$MEASUREMENT\n70\n1\n9\n$INSUNITS\n70\n{code}\n0\nENDSEC\n0\nEOF\n"
            );
            let header = parse_dxf(&text).expect("parse").header;
            assert_eq!(header.units_are_metric, metric, "INSUNITS {code}");
            assert_eq!(header.insunits, Some(code));
        }
        let unitless = "0\nSECTION\n2\nHEADER\n9\n$INSUNITS\n70\n0\n0\nENDSEC\n0\nEOF\n";
        assert_eq!(parse_dxf(unitless).expect("parse").header.insunits, None);
    }

    #[test]
    fn extreme_layer_colors_do_not_overflow() {
        let text = "0\nSECTION\n2\nTABLES\n0\nTABLE\n2\nLAYER\n\
                    0\nLAYER\n2\nX\n62\n-2147483648\n70\n0\n\
                    0\nLAYER\n2\nY\n62\n2147483647\n70\n0\n\
                    0\nENDTAB\n0\nENDSEC\n0\nEOF\n";
        let drawing = parse_dxf(text).expect("parse");
        assert_eq!(drawing.layers.len(), 2);
        assert_eq!(drawing.layers[0].color_index, i16::MAX);
        assert!(!drawing.layers[0].visible);
        assert_eq!(drawing.layers[1].color_index, i16::MAX);
        assert!(drawing.layers[1].visible);
    }

    #[test]
    fn sentinel_extents_are_dropped() {
        let text = "0\nSECTION\n2\nHEADER\n\
                    9\n$EXTMIN\n10\n1e20\n20\n1e20\n30\n1e20\n\
                    9\n$EXTMAX\n10\n-1e20\n20\n-1e20\n30\n-1e20\n\
                    0\nENDSEC\n0\nEOF\n";
        let drawing = parse_dxf(text).expect("parse");
        assert!(drawing.header.extents.is_none());
    }
}
