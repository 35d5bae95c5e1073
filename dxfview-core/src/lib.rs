pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，序列化为 `{ "x": .., "y": .. }`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(from = "PointRepr", into = "PointRepr")]
    pub struct Point2(pub DVec2);

    #[derive(Serialize, Deserialize)]
    struct PointRepr {
        x: f64,
        y: f64,
    }

    impl From<PointRepr> for Point2 {
        fn from(value: PointRepr) -> Self {
            Self::new(value.x, value.y)
        }
    }

    impl From<Point2> for PointRepr {
        fn from(value: Point2) -> Self {
            Self {
                x: value.x(),
                y: value.y(),
            }
        }
    }

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
        pub fn offset(self, dx: f64, dy: f64) -> Self {
            Self(self.0 + DVec2::new(dx, dy))
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 轴对齐边界框，序列化字段为 `min_x/min_y/max_x/max_y`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(from = "BoundsRepr", into = "BoundsRepr")]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    #[derive(Serialize, Deserialize)]
    struct BoundsRepr {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    }

    impl From<BoundsRepr> for Bounds2D {
        fn from(value: BoundsRepr) -> Self {
            Self::from_extents(value.min_x, value.min_y, value.max_x, value.max_y)
        }
    }

    impl From<Bounds2D> for BoundsRepr {
        fn from(value: Bounds2D) -> Self {
            Self {
                min_x: value.min_x(),
                min_y: value.min_y(),
                max_x: value.max_x(),
                max_y: value.max_y(),
            }
        }
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn from_extents(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
            Self::new(Point2::new(min_x, min_y), Point2::new(max_x, max_y))
        }

        /// 累加起点：`{+∞, +∞, −∞, −∞}`。
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

        #[inline]
        pub fn min_x(&self) -> f64 {
            self.min.x()
        }

        #[inline]
        pub fn min_y(&self) -> f64 {
            self.min.y()
        }

        #[inline]
        pub fn max_x(&self) -> f64 {
            self.max.x()
        }

        #[inline]
        pub fn max_y(&self) -> f64 {
            self.max.y()
        }

        #[inline]
        pub fn width(&self) -> f64 {
            self.max.x() - self.min.x()
        }

        #[inline]
        pub fn height(&self) -> f64 {
            self.max.y() - self.min.y()
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        pub fn include_bounds(&mut self, other: &Bounds2D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 四边各向外扩展 `amount`。
        #[inline]
        pub fn expanded(&self, amount: f64) -> Self {
            let delta = DVec2::splat(amount);
            Self {
                min: Point2::from_vec(self.min.as_vec2() - delta),
                max: Point2::from_vec(self.max.as_vec2() + delta),
            }
        }
    }
}

pub mod document {
    use std::collections::{BTreeMap, BTreeSet};
    use std::fmt;

    use serde::{Deserialize, Serialize};

    use crate::extent::BoundsAccumulator;
    use crate::geometry::{Bounds2D, Point2};

    pub const DEFAULT_LAYER: &str = "0";
    /// ACI 7：白/黑，随背景反色。
    pub const DEFAULT_COLOR: i32 = 7;
    pub const DEFAULT_TEXT_HEIGHT: f64 = 1.0;
    pub const DEFAULT_SPLINE_DEGREE: i32 = 3;

    /// 解析结果中出现的实体种类，同时作为种类统计的键。
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    #[serde(rename_all = "lowercase")]
    pub enum EntityKind {
        Line,
        Circle,
        Arc,
        Polyline,
        Text,
        Dimension,
        Ellipse,
        Spline,
    }

    impl EntityKind {
        pub fn as_str(self) -> &'static str {
            match self {
                EntityKind::Line => "line",
                EntityKind::Circle => "circle",
                EntityKind::Arc => "arc",
                EntityKind::Polyline => "polyline",
                EntityKind::Text => "text",
                EntityKind::Dimension => "dimension",
                EntityKind::Ellipse => "ellipse",
                EntityKind::Spline => "spline",
            }
        }
    }

    impl fmt::Display for EntityKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "lowercase")]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Arc(Arc),
        Polyline(Polyline),
        Text(Text),
        Dimension(Dimension),
        Ellipse(Ellipse),
        Spline(Spline),
    }

    impl Entity {
        #[inline]
        pub fn kind(&self) -> EntityKind {
            match self {
                Entity::Line(_) => EntityKind::Line,
                Entity::Circle(_) => EntityKind::Circle,
                Entity::Arc(_) => EntityKind::Arc,
                Entity::Polyline(_) => EntityKind::Polyline,
                Entity::Text(_) => EntityKind::Text,
                Entity::Dimension(_) => EntityKind::Dimension,
                Entity::Ellipse(_) => EntityKind::Ellipse,
                Entity::Spline(_) => EntityKind::Spline,
            }
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Arc(arc) => &arc.layer,
                Entity::Polyline(polyline) => &polyline.layer,
                Entity::Text(text) => &text.layer,
                Entity::Dimension(dimension) => &dimension.layer,
                Entity::Ellipse(ellipse) => &ellipse.layer,
                Entity::Spline(spline) => &spline.layer,
            }
        }

        #[inline]
        pub fn color(&self) -> i32 {
            match self {
                Entity::Line(line) => line.color,
                Entity::Circle(circle) => circle.color,
                Entity::Arc(arc) => arc.color,
                Entity::Polyline(polyline) => polyline.color,
                Entity::Text(text) => text.color,
                Entity::Dimension(dimension) => dimension.color,
                Entity::Ellipse(ellipse) => ellipse.color,
                Entity::Spline(spline) => spline.color,
            }
        }

        /// 计算实体的 2D 轴对齐范围（未加边距）。文字退化为插入点，椭圆取近似外框。
        pub fn bounds(&self) -> Option<Bounds2D> {
            let mut bounds = Bounds2D::empty();
            match self {
                Entity::Line(line) => {
                    bounds.include_point(line.start);
                    bounds.include_point(line.end);
                }
                Entity::Circle(circle) => {
                    let radius = circle.radius.abs();
                    bounds.include_point(circle.center.offset(-radius, -radius));
                    bounds.include_point(circle.center.offset(radius, radius));
                }
                Entity::Arc(arc) => {
                    crate::extent::arc_bounds(arc, &mut bounds);
                }
                Entity::Polyline(polyline) => {
                    for point in &polyline.points {
                        bounds.include_point(*point);
                    }
                }
                Entity::Text(text) => {
                    bounds.include_point(text.position);
                }
                Entity::Dimension(dimension) => {
                    bounds.include_point(dimension.start);
                    bounds.include_point(dimension.end);
                }
                Entity::Ellipse(ellipse) => {
                    // 不考虑旋转，沿用长轴/短轴长度的近似外框。
                    bounds.include_point(
                        ellipse
                            .center
                            .offset(-ellipse.major_axis, -ellipse.minor_axis),
                    );
                    bounds.include_point(
                        ellipse.center.offset(ellipse.major_axis, ellipse.minor_axis),
                    );
                }
                Entity::Spline(spline) => {
                    for point in &spline.control_points {
                        bounds.include_point(*point);
                    }
                }
            }
            if bounds.is_empty() {
                None
            } else {
                Some(bounds)
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
        pub color: i32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
        pub color: i32,
    }

    /// 圆弧实体，角度以度为单位按原样保存；`end_angle < start_angle` 表示跨越 0°。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Arc {
        pub center: Point2,
        pub radius: f64,
        pub start_angle: f64,
        pub end_angle: f64,
        pub layer: String,
        pub color: i32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polyline {
        pub points: Vec<Point2>,
        pub closed: bool,
        pub layer: String,
        pub color: i32,
    }

    /// TEXT 与 MTEXT 统一为该结构；`rotation` 单位为度。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Text {
        pub position: Point2,
        pub text: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
        pub color: i32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Dimension {
        pub start: Point2,
        pub end: Point2,
        pub text: String,
        pub layer: String,
        pub color: i32,
    }

    /// 椭圆实体。`major_axis`/`minor_axis` 为轴长，`rotation` 为长轴方向角（度）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Ellipse {
        pub center: Point2,
        pub major_axis: f64,
        pub minor_axis: f64,
        pub rotation: f64,
        pub layer: String,
        pub color: i32,
    }

    impl Ellipse {
        /// 由圆心、长轴端点向量（相对圆心）与短长轴比推导椭圆。
        pub fn from_major_endpoint(
            center: Point2,
            major_x: f64,
            major_y: f64,
            ratio: f64,
            layer: impl Into<String>,
            color: i32,
        ) -> Self {
            let major_axis = major_x.hypot(major_y);
            Self {
                center,
                major_axis,
                minor_axis: major_axis * ratio,
                rotation: major_y.atan2(major_x).to_degrees(),
                layer: layer.into(),
                color,
            }
        }
    }

    /// 样条仅保留控制多边形，不做曲线求值。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Spline {
        pub control_points: Vec<Point2>,
        pub degree: i32,
        pub layer: String,
        pub color: i32,
    }

    /// 一次解析的完整结果。组装后不再修改。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DrawingDocument {
        entities: Vec<Entity>,
        entity_count: usize,
        entity_types: BTreeMap<EntityKind, usize>,
        layers: Vec<String>,
        bounds: Bounds2D,
    }

    impl Default for DrawingDocument {
        fn default() -> Self {
            Self::empty()
        }
    }

    impl DrawingDocument {
        /// 没有 ENTITIES 段或没有任何实体时的默认结果。
        pub fn empty() -> Self {
            Self {
                entities: Vec::new(),
                entity_count: 0,
                entity_types: BTreeMap::new(),
                layers: Vec::new(),
                bounds: crate::extent::default_view(),
            }
        }

        /// 按遇到顺序组装实体，并派生数量、种类统计、图层列表与加边距后的范围。
        pub fn assemble(entities: Vec<Entity>) -> Self {
            let mut accumulator = BoundsAccumulator::new();
            let mut entity_types = BTreeMap::new();
            let mut layers = BTreeSet::new();
            for entity in &entities {
                accumulator.include(entity);
                *entity_types.entry(entity.kind()).or_insert(0) += 1;
                let layer = entity.layer_name();
                if !layer.is_empty() {
                    layers.insert(layer.to_string());
                }
            }

            Self {
                entity_count: entities.len(),
                entities,
                entity_types,
                layers: layers.into_iter().collect(),
                bounds: accumulator.finish(),
            }
        }

        pub fn entities(&self) -> &[Entity] {
            &self.entities
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entity_count
        }

        pub fn entity_types(&self) -> &BTreeMap<EntityKind, usize> {
            &self.entity_types
        }

        /// 指定种类的实体数量，未出现时为 0。
        pub fn count_of(&self, kind: EntityKind) -> usize {
            self.entity_types.get(&kind).copied().unwrap_or(0)
        }

        pub fn layers(&self) -> &[String] {
            &self.layers
        }

        #[inline]
        pub fn bounds(&self) -> Bounds2D {
            self.bounds
        }

        pub fn is_empty(&self) -> bool {
            self.entities.is_empty()
        }
    }
}

pub mod extent {
    use crate::document::{Arc, Entity};
    use crate::geometry::{Bounds2D, Point2};

    pub const PADDING_RATIO: f64 = 0.05;
    pub const MIN_PADDING: f64 = 5.0;

    /// 基准角（度）与对应的单位方向，避免 `cos(90°)` 之类的舍入误差。
    const CARDINALS: [(f64, f64, f64); 4] = [
        (0.0, 1.0, 0.0),
        (90.0, 0.0, 1.0),
        (180.0, -1.0, 0.0),
        (270.0, 0.0, -1.0),
    ];

    /// 空文档的视图范围 `{0, 0, 100, 100}`。
    pub fn default_view() -> Bounds2D {
        Bounds2D::from_extents(0.0, 0.0, 100.0, 100.0)
    }

    /// `max(0.05 × 宽, 0.05 × 高, 5)`。
    pub fn padding_for(bounds: &Bounds2D) -> f64 {
        (bounds.width() * PADDING_RATIO)
            .max(bounds.height() * PADDING_RATIO)
            .max(MIN_PADDING)
    }

    /// 返回落在圆弧角度范围内的基准角（0/90/180/270）。
    ///
    /// 若 `end < start`，先将 `end` 加 360 视为跨越 0° 的圆弧；
    /// 基准角 `a` 满足 `start ≤ a ≤ end` 或 `start ≤ a + 360 ≤ end` 即计入。
    pub fn arc_cardinal_angles(start: f64, end: f64) -> Vec<f64> {
        let end = if end < start { end + 360.0 } else { end };
        CARDINALS
            .iter()
            .map(|(angle, _, _)| *angle)
            .filter(|angle| {
                (start <= *angle && *angle <= end)
                    || (start <= angle + 360.0 && angle + 360.0 <= end)
            })
            .collect()
    }

    pub fn arc_point(center: Point2, radius: f64, angle_deg: f64) -> Point2 {
        let radians = angle_deg.to_radians();
        center.offset(radius * radians.cos(), radius * radians.sin())
    }

    pub(crate) fn arc_bounds(arc: &Arc, bounds: &mut Bounds2D) {
        bounds.include_point(arc_point(arc.center, arc.radius, arc.start_angle));
        bounds.include_point(arc_point(arc.center, arc.radius, arc.end_angle));

        for angle in arc_cardinal_angles(arc.start_angle, arc.end_angle) {
            if let Some((_, dx, dy)) = CARDINALS.iter().find(|(base, _, _)| *base == angle) {
                bounds.include_point(arc.center.offset(arc.radius * dx, arc.radius * dy));
            }
        }
    }

    /// 逐个实体累加范围，结束时套用空文档默认值或边距策略。
    #[derive(Debug, Clone)]
    pub struct BoundsAccumulator {
        bounds: Bounds2D,
    }

    impl Default for BoundsAccumulator {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BoundsAccumulator {
        pub fn new() -> Self {
            Self {
                bounds: Bounds2D::empty(),
            }
        }

        pub fn include(&mut self, entity: &Entity) {
            if let Some(entity_bounds) = entity.bounds() {
                self.bounds.include_bounds(&entity_bounds);
            }
        }

        /// 未加边距的累加范围；尚无实体时为 `None`。
        pub fn raw(&self) -> Option<Bounds2D> {
            if self.bounds.is_empty() {
                None
            } else {
                Some(self.bounds)
            }
        }

        pub fn finish(self) -> Bounds2D {
            match self.raw() {
                Some(raw) => raw.expanded(padding_for(&raw)),
                None => default_view(),
            }
        }
    }
}
