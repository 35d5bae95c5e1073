use std::io::Write;
use std::path::PathBuf;

use dxfview_core::{
    document::{Entity, EntityKind},
    geometry::{Bounds2D, Point2},
};
use dxfview_io::{DocumentLoader, DxfFacade, IoError, parse_str};
use glam::DVec2;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn assert_point(actual: Point2, expected: (f64, f64)) {
    assert!(
        actual
            .as_vec2()
            .abs_diff_eq(DVec2::new(expected.0, expected.1), 1e-9),
        "点坐标不符：{actual:?} != {expected:?}"
    );
}

fn assert_bounds(actual: Bounds2D, expected: (f64, f64, f64, f64)) {
    let values = [actual.min_x(), actual.min_y(), actual.max_x(), actual.max_y()];
    let expected = [expected.0, expected.1, expected.2, expected.3];
    for (value, wanted) in values.iter().zip(expected.iter()) {
        assert!((value - wanted).abs() < 1e-9, "范围不符：{actual:?} != {expected:?}");
    }
}

#[test]
fn load_all_entities_fixture() {
    let loader = DxfFacade::new();
    let doc = loader
        .load(&fixture("all_entities.dxf"))
        .expect("读取 DXF 失败");

    assert_eq!(doc.entity_count(), 9);
    assert_eq!(doc.entities().len(), doc.entity_count());
    assert_eq!(doc.count_of(EntityKind::Line), 1);
    assert_eq!(doc.count_of(EntityKind::Circle), 1);
    assert_eq!(doc.count_of(EntityKind::Arc), 1);
    assert_eq!(doc.count_of(EntityKind::Polyline), 1);
    assert_eq!(doc.count_of(EntityKind::Text), 2);
    assert_eq!(doc.count_of(EntityKind::Dimension), 1);
    assert_eq!(doc.count_of(EntityKind::Ellipse), 1);
    assert_eq!(doc.count_of(EntityKind::Spline), 1);

    assert_eq!(
        doc.layers(),
        ["0", "Arcs", "Dims", "Notes", "Text", "Walls"],
        "INSERT 所在图层不应出现"
    );
    assert_bounds(doc.bounds(), (-5.0, -15.0, 105.0, 95.0));
}

#[test]
fn entities_keep_source_order_and_fields() {
    let doc = DxfFacade::new()
        .load(&fixture("all_entities.dxf"))
        .expect("读取 DXF 失败");
    let kinds: Vec<EntityKind> = doc.entities().iter().map(Entity::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Line,
            EntityKind::Circle,
            EntityKind::Arc,
            EntityKind::Polyline,
            EntityKind::Text,
            EntityKind::Text,
            EntityKind::Dimension,
            EntityKind::Ellipse,
            EntityKind::Spline,
        ]
    );

    match &doc.entities()[0] {
        Entity::Line(line) => {
            assert_eq!(line.layer, "Walls");
            assert_eq!(line.color, 1);
            assert_point(line.start, (0.0, 0.0));
            assert_point(line.end, (100.0, 0.0));
        }
        other => panic!("期望直线，实际为 {other:?}"),
    }

    match &doc.entities()[1] {
        Entity::Circle(circle) => {
            assert_eq!(circle.layer, "0", "图层名为 0 时不应截断实体");
            assert_eq!(circle.color, 7);
            assert!((circle.radius - 10.0).abs() < 1e-9);
        }
        other => panic!("期望圆，实际为 {other:?}"),
    }

    match &doc.entities()[4] {
        Entity::Text(text) => {
            assert_eq!(text.text, "Hello");
            assert_eq!(text.color, 3);
            assert!((text.height - 2.5).abs() < 1e-9);
            assert!(text.rotation.abs() < 1e-9);
        }
        other => panic!("期望文字，实际为 {other:?}"),
    }

    match &doc.entities()[5] {
        Entity::Text(mtext) => {
            assert_eq!(mtext.text, "First\nSecond");
            assert_eq!(mtext.layer, "Notes");
            assert_point(mtext.position, (20.0, 20.0));
            assert!((mtext.rotation - 90.0).abs() < 1e-9, "方向向量应换算为旋转角");
        }
        other => panic!("期望多行文字，实际为 {other:?}"),
    }

    match &doc.entities()[6] {
        Entity::Dimension(dimension) => {
            assert_eq!(dimension.text, "100");
            assert_point(dimension.start, (0.0, -10.0));
            assert_point(dimension.end, (100.0, -10.0));
        }
        other => panic!("期望标注，实际为 {other:?}"),
    }

    match &doc.entities()[7] {
        Entity::Ellipse(ellipse) => {
            assert!((ellipse.major_axis - 20.0).abs() < 1e-9);
            assert!((ellipse.minor_axis - 10.0).abs() < 1e-9);
            assert!(ellipse.rotation.abs() < 1e-9);
        }
        other => panic!("期望椭圆，实际为 {other:?}"),
    }

    match &doc.entities()[8] {
        Entity::Spline(spline) => {
            assert_eq!(spline.degree, 3);
            assert_eq!(spline.control_points.len(), 3);
            assert_point(spline.control_points[1], (30.0, 90.0));
        }
        other => panic!("期望样条，实际为 {other:?}"),
    }
}

#[test]
fn legacy_polyline_collects_vertex_records() {
    let doc = DxfFacade::new()
        .load(&fixture("legacy_polyline.dxf"))
        .expect("读取旧式多段线失败");

    assert_eq!(doc.entity_count(), 2, "SEQEND 之后的直线也应被解析");
    match &doc.entities()[0] {
        Entity::Polyline(polyline) => {
            assert!(polyline.closed);
            assert_eq!(polyline.layer, "Outline");
            assert_eq!(
                polyline.points,
                vec![
                    Point2::new(1.0, 1.0),
                    Point2::new(4.0, 1.0),
                    Point2::new(4.0, 5.0)
                ],
                "头部的占位点不应计入顶点"
            );
        }
        other => panic!("期望多段线，实际为 {other:?}"),
    }
    assert_eq!(doc.layers(), ["After", "Outline"]);
    assert_bounds(doc.bounds(), (-4.0, -4.0, 17.0, 17.0));
}

#[test]
fn arc_crossing_zero_includes_east_extreme() {
    let doc = DxfFacade::new()
        .load(&fixture("arc_wraparound.dxf"))
        .expect("读取圆弧失败");

    let raw_min_x = 10.0 * 10f64.to_radians().cos();
    let raw_y = 10.0 * 10f64.to_radians().sin();
    assert_bounds(
        doc.bounds(),
        (raw_min_x - 5.0, -raw_y - 5.0, 15.0, raw_y + 5.0),
    );
}

#[test]
fn lwpolyline_vertices_pair_across_bulge_and_width_codes() {
    let doc = DxfFacade::new()
        .load(&fixture("bulge_polyline.dxf"))
        .expect("读取带 bulge 的 DXF 失败");

    let mut polylines = doc.entities().iter().filter_map(|entity| match entity {
        Entity::Polyline(polyline) => Some(polyline),
        _ => None,
    });
    let polyline = polylines.next().expect("未找到多段线实体");
    assert!(polylines.next().is_none(), "期望仅有一个多段线实体");

    assert!(polyline.closed);
    assert_eq!(polyline.color, 5);
    assert_eq!(polyline.points.len(), 3);
    assert_point(polyline.points[0], (0.0, 0.0));
    assert_point(polyline.points[1], (10.0, 0.0));
    assert_point(polyline.points[2], (10.0, 10.0));
}

#[test]
fn missing_entities_section_yields_default_view() {
    let doc = DxfFacade::new()
        .load(&fixture("header_only.dxf"))
        .expect("读取 DXF 失败");

    assert!(doc.is_empty());
    assert!(doc.entity_types().is_empty());
    assert!(doc.layers().is_empty());
    assert_eq!(doc.bounds(), Bounds2D::from_extents(0.0, 0.0, 100.0, 100.0));
}

#[test]
fn empty_input_yields_default_view() {
    for source in ["", "\n\n  \n", "garbage without structure"] {
        let doc = parse_str(source);
        assert_eq!(doc.entity_count(), 0);
        assert_eq!(doc.bounds(), Bounds2D::from_extents(0.0, 0.0, 100.0, 100.0));
    }
}

#[test]
fn parsing_is_idempotent() {
    let source = std::fs::read_to_string(fixture("all_entities.dxf")).expect("读取夹具失败");
    assert_eq!(parse_str(&source), parse_str(&source));
}

#[test]
fn load_bytes_matches_load() {
    let path = fixture("legacy_polyline.dxf");
    let bytes = std::fs::read(&path).expect("读取夹具失败");
    let loader = DxfFacade::new();
    assert_eq!(
        loader.load_bytes(&bytes).expect("解析字节失败"),
        loader.load(&path).expect("读取文件失败")
    );
}

#[test]
fn non_utf8_file_reports_decode_error() {
    let mut file = tempfile::NamedTempFile::new().expect("创建临时文件失败");
    file.write_all(b"0\nSECTION\n2\nENTITIES\n0\nTEXT\n1\n\xff\xfe\n0\nENDSEC\n")
        .expect("写入临时文件失败");

    let err = DxfFacade::new()
        .load(file.path())
        .expect_err("非 UTF-8 内容应报错");
    assert!(matches!(err, IoError::Decode { .. }), "错误类型不符：{err:?}");
}

#[test]
fn missing_file_reports_read_error() {
    let err = DxfFacade::new()
        .load(&fixture("does_not_exist.dxf"))
        .expect_err("不存在的文件应报错");
    match err {
        IoError::ReadError { path, .. } => assert!(path.ends_with("does_not_exist.dxf")),
        other => panic!("错误类型不符：{other:?}"),
    }
}

#[test]
fn document_serializes_to_viewer_shape() {
    let doc = DxfFacade::new()
        .load(&fixture("legacy_polyline.dxf"))
        .expect("读取 DXF 失败");
    let json = serde_json::to_value(&doc).expect("序列化失败");

    assert_eq!(json["entity_count"], 2);
    assert_eq!(json["entity_types"]["polyline"], 1);
    assert_eq!(json["entity_types"]["line"], 1);
    assert_eq!(json["layers"], serde_json::json!(["After", "Outline"]));
    assert_eq!(json["entities"][0]["type"], "polyline");
    assert_eq!(json["entities"][0]["closed"], true);
    assert_eq!(json["entities"][0]["points"][0]["x"], 1.0);
    assert_eq!(json["entities"][1]["type"], "line");
    assert_eq!(json["bounds"]["min_x"], -4.0);
    assert_eq!(json["bounds"]["max_y"], 17.0);
}
