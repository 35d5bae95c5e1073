use std::fs;
use std::path::{Path, PathBuf};

use dxfview_core::{
    document::{
        Arc, Circle, DEFAULT_COLOR, DEFAULT_LAYER, DEFAULT_SPLINE_DEGREE, DEFAULT_TEXT_HEIGHT,
        Dimension, DrawingDocument, Ellipse, Entity, EntityKind, Line, Polyline, Spline, Text,
    },
    geometry::Point2,
};
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid UTF-8 in DXF content from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: std::str::Utf8Error,
    },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<DrawingDocument, IoError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的 DXF 字节流，非 UTF-8 内容视为读取失败。
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<DrawingDocument, IoError> {
        let text = std::str::from_utf8(bytes).map_err(|source| IoError::Decode {
            origin: "<memory>".to_string(),
            source,
        })?;
        Ok(parse_str(text))
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<DrawingDocument, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let text = std::str::from_utf8(&data).map_err(|source| IoError::Decode {
            origin: path.display().to_string(),
            source,
        })?;
        let document = parse_str(text);
        info!(
            path = %path.display(),
            entity_count = document.entity_count(),
            layer_count = document.layers().len(),
            "DXF 文档加载完成"
        );
        Ok(document)
    }
}

/// 解析 ASCII DXF 文本。纯函数：相同输入总是得到相同文档。
///
/// 不完整或无法识别的实体会被静默跳过；没有 ENTITIES 段时返回空文档。
pub fn parse_str(source: &str) -> DrawingDocument {
    let lines = tokenize(source);
    let Some(section) = locate_entities(&lines) else {
        debug!(line_count = lines.len(), "未找到 ENTITIES 段，返回空文档");
        return DrawingDocument::empty();
    };
    let parser = DxfParser::new(&lines, section);
    DrawingDocument::assemble(parser.parse_entities())
}

/// 按行切分、去除首尾空白并丢弃空行。组码行与值行在结果中交替出现。
pub fn tokenize(source: &str) -> Vec<&str> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// ENTITIES 段的行区间 `[start, end)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub start: usize,
    pub end: usize,
}

/// 定位 `2/ENTITIES` 与其后的 `0/ENDSEC`。缺少 ENDSEC 时区间延伸到输入末尾。
pub fn locate_entities(lines: &[&str]) -> Option<SectionSpan> {
    let mut start = None;
    for (index, pair) in lines.windows(2).enumerate() {
        match (pair[0], pair[1], start) {
            ("2", "ENTITIES", None) => start = Some(index + 2),
            ("0", "ENDSEC", Some(start)) => {
                return Some(SectionSpan { start, end: index });
            }
            _ => {}
        }
    }
    start.map(|start| SectionSpan {
        start,
        end: lines.len(),
    })
}

/// 实体内部的只读组码游标：每次前进两行，遇到下一个 `0` 组码或上限即停止。
#[derive(Debug, Clone)]
pub struct PairCursor<'a> {
    lines: &'a [&'a str],
    position: usize,
    limit: usize,
}

impl<'a> PairCursor<'a> {
    /// `marker` 为实体起始 `0` 组码所在行，游标从其后的第一对开始。
    pub fn new(lines: &'a [&'a str], marker: usize, limit: usize) -> Self {
        Self {
            lines,
            position: marker + 2,
            limit: limit.min(lines.len()),
        }
    }

    /// 下一个尚未消费的行号。
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    fn pair_at(&self, index: usize) -> Option<(Option<i32>, &'a str)> {
        if index + 1 < self.limit {
            Some((self.lines[index].parse::<i32>().ok(), self.lines[index + 1]))
        } else {
            None
        }
    }

    /// 读取下一对 `(组码, 值)`。组码行无法解析为整数时整对跳过。
    pub fn next_pair(&mut self) -> Option<(i32, &'a str)> {
        loop {
            let (code, value) = self.pair_at(self.position)?;
            match code {
                Some(0) => return None,
                Some(code) => {
                    self.position += 2;
                    return Some((code, value));
                }
                None => {
                    trace!(line = self.position, raw = self.lines[self.position], "跳过无法解析的组码");
                    self.position += 2;
                }
            }
        }
    }

    /// 若当前停在 `0` 组码上，返回其值（下一个记录的类型名）。
    pub fn marker(&self) -> Option<&'a str> {
        match self.pair_at(self.position)? {
            (Some(0), value) => Some(value),
            _ => None,
        }
    }

    /// 越过当前的 `0` 组码，进入子记录（如 VERTEX）。
    pub fn enter_marker(&mut self) {
        if self.marker().is_some() {
            self.position += 2;
        }
    }

    /// 在不移动游标的前提下，为刚读到的 `x_code` 寻找最近的 `y_code`。
    ///
    /// 途中遇到另一个 `x_code` 或 `0` 组码则视为配对失败。
    pub fn find_paired(&self, x_code: i32, y_code: i32) -> Option<&'a str> {
        let mut index = self.position;
        while let Some((code, value)) = self.pair_at(index) {
            match code {
                Some(code) if code == y_code => return Some(value),
                Some(code) if code == x_code || code == 0 => return None,
                _ => index += 2,
            }
        }
        None
    }
}

type Extractor = fn(&mut PairCursor<'_>) -> Option<Entity>;

/// 类型名到提取函数的映射。`window` 为扫描上限（行数），`None` 表示只受段尾限制。
struct KindExtractor {
    tag: &'static str,
    kind: EntityKind,
    window: Option<usize>,
    extract: Extractor,
}

const FIELD_WINDOW: usize = 100;
const DIMENSION_WINDOW: usize = 150;

const EXTRACTORS: &[KindExtractor] = &[
    KindExtractor {
        tag: "LINE",
        kind: EntityKind::Line,
        window: Some(FIELD_WINDOW),
        extract: extract_line,
    },
    KindExtractor {
        tag: "CIRCLE",
        kind: EntityKind::Circle,
        window: Some(FIELD_WINDOW),
        extract: extract_circle,
    },
    KindExtractor {
        tag: "ARC",
        kind: EntityKind::Arc,
        window: Some(FIELD_WINDOW),
        extract: extract_arc,
    },
    KindExtractor {
        tag: "LWPOLYLINE",
        kind: EntityKind::Polyline,
        window: None,
        extract: extract_lwpolyline,
    },
    KindExtractor {
        tag: "POLYLINE",
        kind: EntityKind::Polyline,
        window: None,
        extract: extract_polyline,
    },
    KindExtractor {
        tag: "TEXT",
        kind: EntityKind::Text,
        window: Some(FIELD_WINDOW),
        extract: extract_text,
    },
    KindExtractor {
        tag: "MTEXT",
        kind: EntityKind::Text,
        window: Some(FIELD_WINDOW),
        extract: extract_mtext,
    },
    KindExtractor {
        tag: "DIMENSION",
        kind: EntityKind::Dimension,
        window: Some(DIMENSION_WINDOW),
        extract: extract_dimension,
    },
    KindExtractor {
        tag: "ELLIPSE",
        kind: EntityKind::Ellipse,
        window: Some(FIELD_WINDOW),
        extract: extract_ellipse,
    },
    KindExtractor {
        tag: "SPLINE",
        kind: EntityKind::Spline,
        window: None,
        extract: extract_spline,
    },
];

fn extractor_for(tag: &str) -> Option<&'static KindExtractor> {
    EXTRACTORS.iter().find(|extractor| extractor.tag == tag)
}

/// 解析上下文：分好的行与 ENTITIES 段区间，构造后不再修改。
struct DxfParser<'a> {
    lines: &'a [&'a str],
    section: SectionSpan,
}

impl<'a> DxfParser<'a> {
    fn new(lines: &'a [&'a str], section: SectionSpan) -> Self {
        Self { lines, section }
    }

    fn parse_entities(&self) -> Vec<Entity> {
        let mut entities = Vec::new();
        let mut index = self.section.start;
        while index < self.section.end {
            if self.lines[index] != "0" || index + 1 >= self.section.end {
                index += 1;
                continue;
            }

            let tag = self.lines[index + 1];
            match extractor_for(tag) {
                Some(extractor) => match self.run_extractor(extractor, index) {
                    Some(entity) => entities.push(entity),
                    None => {
                        debug!(
                            kind = %extractor.kind,
                            tag,
                            line = index,
                            "实体缺少必需字段，已跳过"
                        );
                    }
                },
                None => trace!(tag, line = index, "跳过未识别的实体类型"),
            }
            // 逐行前进，组码错位时仍能对齐到下一个实体标记。
            index += 1;
        }
        entities
    }

    fn run_extractor(&self, extractor: &KindExtractor, marker: usize) -> Option<Entity> {
        let limit = match extractor.window {
            Some(window) => (marker + window).min(self.section.end),
            None => self.section.end,
        };
        let mut cursor = PairCursor::new(self.lines, marker, limit);
        (extractor.extract)(&mut cursor)
    }
}

/// 所有实体共有的图层与颜色。
struct CommonFields {
    layer: String,
    color: i32,
}

impl Default for CommonFields {
    fn default() -> Self {
        Self {
            layer: DEFAULT_LAYER.to_string(),
            color: DEFAULT_COLOR,
        }
    }
}

impl CommonFields {
    fn absorb(&mut self, code: i32, value: &str) {
        match code {
            8 => self.layer = value.to_string(),
            62 => {
                if let Some(color) = parse_i32(value) {
                    self.color = color;
                }
            }
            _ => {}
        }
    }
}

fn extract_line(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut start_x = None;
    let mut start_y = None;
    let mut end_x = None;
    let mut end_y = None;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            10 => start_x = parse_f64(value),
            20 => start_y = parse_f64(value),
            11 => end_x = parse_f64(value),
            21 => end_y = parse_f64(value),
            _ => common.absorb(code, value),
        }
    }

    Some(Entity::Line(Line {
        start: Point2::new(start_x?, start_y?),
        end: Point2::new(end_x?, end_y?),
        layer: common.layer,
        color: common.color,
    }))
}

fn extract_circle(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut center_x = None;
    let mut center_y = None;
    let mut radius = None;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            10 => center_x = parse_f64(value),
            20 => center_y = parse_f64(value),
            40 => radius = parse_f64(value),
            _ => common.absorb(code, value),
        }
    }

    Some(Entity::Circle(Circle {
        center: Point2::new(center_x?, center_y?),
        radius: radius?,
        layer: common.layer,
        color: common.color,
    }))
}

fn extract_arc(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut center_x = None;
    let mut center_y = None;
    let mut radius = None;
    let mut start_angle = None;
    let mut end_angle = None;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            10 => center_x = parse_f64(value),
            20 => center_y = parse_f64(value),
            40 => radius = parse_f64(value),
            50 => start_angle = parse_f64(value),
            51 => end_angle = parse_f64(value),
            _ => common.absorb(code, value),
        }
    }

    Some(Entity::Arc(Arc {
        center: Point2::new(center_x?, center_y?),
        radius: radius?,
        start_angle: start_angle?,
        end_angle: end_angle?,
        layer: common.layer,
        color: common.color,
    }))
}

/// 顶点以组码 10/20 成对出现，中间允许夹杂 bulge、宽度等其他组码。
const VERTEX_X: i32 = 10;
const VERTEX_Y: i32 = 20;

fn paired_vertex(cursor: &PairCursor<'_>, raw_x: &str) -> Option<Point2> {
    let x = parse_f64(raw_x)?;
    let y = parse_f64(cursor.find_paired(VERTEX_X, VERTEX_Y)?)?;
    Some(Point2::new(x, y))
}

fn is_closed(raw_flags: &str) -> bool {
    parse_i32(raw_flags).is_some_and(|flags| flags & 0x01 == 0x01)
}

fn extract_lwpolyline(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut closed = false;
    let mut points = Vec::new();
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            70 => closed = is_closed(value),
            VERTEX_X => {
                if let Some(point) = paired_vertex(cursor, value) {
                    points.push(point);
                }
            }
            _ => common.absorb(code, value),
        }
    }

    if points.is_empty() {
        return None;
    }
    Some(Entity::Polyline(Polyline {
        points,
        closed,
        layer: common.layer,
        color: common.color,
    }))
}

/// 旧式 POLYLINE：头部之后跟随若干 `0/VERTEX` 记录，以 `0/SEQEND` 结束。
fn extract_polyline(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut closed = false;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            70 => closed = is_closed(value),
            // 头部的 10/20/30 只是高程占位点
            10 | 20 | 30 => {}
            _ => common.absorb(code, value),
        }
    }

    let mut points = Vec::new();
    while let Some(marker) = cursor.marker() {
        match marker {
            "VERTEX" => {
                cursor.enter_marker();
                while let Some((code, value)) = cursor.next_pair() {
                    if code == VERTEX_X {
                        if let Some(point) = paired_vertex(cursor, value) {
                            points.push(point);
                        }
                    }
                }
            }
            "SEQEND" => {
                cursor.enter_marker();
                while cursor.next_pair().is_some() {}
                break;
            }
            _ => break,
        }
    }

    if points.is_empty() {
        return None;
    }
    Some(Entity::Polyline(Polyline {
        points,
        closed,
        layer: common.layer,
        color: common.color,
    }))
}

fn extract_text(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut x = None;
    let mut y = None;
    let mut height = None;
    let mut rotation = None;
    let mut text = None;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            10 => x = parse_f64(value),
            20 => y = parse_f64(value),
            40 => height = parse_f64(value),
            50 => rotation = parse_f64(value),
            1 => text = Some(value.to_string()),
            _ => common.absorb(code, value),
        }
    }

    let text = text.filter(|content| !content.is_empty())?;
    Some(Entity::Text(Text {
        position: Point2::new(x?, y?),
        text,
        height: text_height(height),
        rotation: rotation.unwrap_or(0.0),
        layer: common.layer,
        color: common.color,
    }))
}

/// MTEXT：组码 3 为前置分块，组码 1 为最后一块；方向向量 11/21 在缺少 50 时决定旋转角。
fn extract_mtext(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut x = None;
    let mut y = None;
    let mut height = None;
    let mut rotation = None;
    let mut direction_x = None;
    let mut direction_y = None;
    let mut chunks: Vec<&str> = Vec::new();
    let mut tail: Option<&str> = None;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            10 => x = parse_f64(value),
            20 => y = parse_f64(value),
            11 => direction_x = parse_f64(value),
            21 => direction_y = parse_f64(value),
            40 => height = parse_f64(value),
            50 => rotation = parse_f64(value),
            3 => chunks.push(value),
            1 => tail = Some(value),
            _ => common.absorb(code, value),
        }
    }

    let mut raw = chunks.concat();
    raw.push_str(tail?);
    let text = decode_mtext_content(&raw);
    if text.is_empty() {
        return None;
    }

    let rotation = rotation
        .or_else(|| match (direction_x, direction_y) {
            (Some(dx), Some(dy)) => Some(dy.atan2(dx).to_degrees()),
            _ => None,
        })
        .unwrap_or(0.0);

    Some(Entity::Text(Text {
        position: Point2::new(x?, y?),
        text,
        height: text_height(height),
        rotation,
        layer: common.layer,
        color: common.color,
    }))
}

fn text_height(raw: Option<f64>) -> f64 {
    raw.filter(|height| *height != 0.0)
        .unwrap_or(DEFAULT_TEXT_HEIGHT)
}

fn extract_dimension(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut start_x = None;
    let mut start_y = None;
    let mut end_x = None;
    let mut end_y = None;
    let mut text = String::new();
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            13 => start_x = parse_f64(value),
            23 => start_y = parse_f64(value),
            14 => end_x = parse_f64(value),
            24 => end_y = parse_f64(value),
            1 => text = value.to_string(),
            _ => common.absorb(code, value),
        }
    }

    Some(Entity::Dimension(Dimension {
        start: Point2::new(start_x?, start_y?),
        end: Point2::new(end_x?, end_y?),
        text,
        layer: common.layer,
        color: common.color,
    }))
}

fn extract_ellipse(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut center_x = None;
    let mut center_y = None;
    let mut major_x = None;
    let mut major_y = None;
    let mut ratio = None;
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            10 => center_x = parse_f64(value),
            20 => center_y = parse_f64(value),
            11 => major_x = parse_f64(value),
            21 => major_y = parse_f64(value),
            40 => ratio = parse_f64(value),
            _ => common.absorb(code, value),
        }
    }

    Some(Entity::Ellipse(Ellipse::from_major_endpoint(
        Point2::new(center_x?, center_y?),
        major_x?,
        major_y?,
        ratio.unwrap_or(1.0),
        common.layer,
        common.color,
    )))
}

/// 只收集控制点（10/20）；拟合点、节点与权重不参与显示。
fn extract_spline(cursor: &mut PairCursor<'_>) -> Option<Entity> {
    let mut common = CommonFields::default();
    let mut degree = DEFAULT_SPLINE_DEGREE;
    let mut control_points = Vec::new();
    while let Some((code, value)) = cursor.next_pair() {
        match code {
            71 => {
                if let Some(parsed) = parse_i32(value) {
                    degree = parsed;
                }
            }
            VERTEX_X => {
                if let Some(point) = paired_vertex(cursor, value) {
                    control_points.push(point);
                }
            }
            _ => common.absorb(code, value),
        }
    }

    if control_points.is_empty() {
        return None;
    }
    Some(Entity::Spline(Spline {
        control_points,
        degree,
        layer: common.layer,
        color: common.color,
    }))
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// 整数组码偶尔以 `1.0` 之类的形式写出，按截断处理。
fn parse_i32(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    raw.parse::<i32>()
        .ok()
        .or_else(|| parse_f64(raw).map(|value| value.trunc() as i32))
}

fn decode_mtext_content(raw: &str) -> String {
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
