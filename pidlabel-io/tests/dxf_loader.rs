use std::path::PathBuf;

use pidlabel_core::document::{Entity, EntityKind};
use pidlabel_io::{DocumentLoader, DxfFacade, IoError};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_label_sheet_keeps_entities_in_document_order() {
    let loader = DxfFacade::new();
    let doc = loader.load(&fixture("label_sheet.dxf")).expect("读取 DXF 失败");

    let kinds: Vec<EntityKind> = doc.entities().map(|(_, entity)| entity.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Face,
            EntityKind::Text,
            EntityKind::Text,
            EntityKind::Text,
            EntityKind::Insert,
            EntityKind::Polyline,
            EntityKind::Line,
            EntityKind::Polyline,
            EntityKind::Insert,
        ],
        "MTEXT 应被跳过，其余实体保持文件顺序"
    );

    let texts: Vec<&str> = doc
        .query(EntityKind::Text)
        .filter_map(|(_, entity)| match entity {
            Entity::Text(text) => Some(text.content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["6\"-AD-12345678-A11", "-AD-12345678", "-A11"]);
}

#[test]
fn text_carries_handle_rotation_and_alignment() {
    let loader = DxfFacade::new();
    let doc = loader.load(&fixture("label_sheet.dxf")).expect("读取 DXF 失败");

    let mut texts = doc.query(EntityKind::Text).filter_map(|(_, entity)| match entity {
        Entity::Text(text) => Some(text),
        _ => None,
    });

    let full = texts.next().expect("未找到完整标签文字");
    assert_eq!(full.handle.as_deref(), Some("101"));
    assert_eq!(full.layer, "PIPE-LABEL");
    assert!((full.rotation_degrees() - 2.0).abs() < 1e-9);
    assert!((full.height - 2.5).abs() < 1e-9);
    assert_eq!(full.style.as_deref(), Some("Standard"));
    assert_eq!(full.horizontal_align, 0);
    assert!(full.alignment.is_none());

    let _prefix = texts.next().expect("未找到前缀文字");
    let suffix = texts.next().expect("未找到后缀文字");
    assert_eq!(suffix.horizontal_align, 1);
    assert!((suffix.width_factor - 0.8).abs() < 1e-9);
    let alignment = suffix.alignment.expect("后缀应带第二对齐点");
    assert!((alignment.x() - 302.0).abs() < 1e-9);
    assert!((alignment.y() - 146.0).abs() < 1e-9);
}

#[test]
fn insert_attributes_and_block_definitions_are_loaded() {
    let loader = DxfFacade::new();
    let doc = loader.load(&fixture("label_sheet.dxf")).expect("读取 DXF 失败");

    let reference = doc
        .query(EntityKind::Insert)
        .find_map(|(_, entity)| match entity {
            Entity::BlockReference(reference) if reference.name == "Pipeline_Tag" => {
                Some(reference)
            }
            _ => None,
        })
        .expect("未找到管线标签块参照");
    assert!((reference.rotation_degrees() - 90.0).abs() < 1e-9);
    assert_eq!(reference.attributes.len(), 2);
    assert_eq!(reference.attributes[0].tag, "LINE_NO");
    assert_eq!(reference.attributes[0].text, "4\"-P-A1234567-B");
    assert_eq!(reference.attributes[0].handle.as_deref(), Some("106"));
    assert_eq!(reference.attributes[1].text, " ");

    assert!(doc.block("FW TIT").is_some());
    assert!(doc.block("Pipeline_Tag").is_some());
    assert!(doc.block("*Model_Space").is_none(), "匿名块不应被收集");

    let title = doc
        .query(EntityKind::Insert)
        .find_map(|(_, entity)| match entity {
            Entity::BlockReference(reference) if reference.name == "FW TIT" => Some(reference),
            _ => None,
        })
        .expect("未找到图签块参照");
    let bounds = doc.block_reference_bounds(title).expect("图签范围");
    assert!((bounds.min().x() - 650.0).abs() < 1e-9);
    assert!((bounds.max().x() - 830.0).abs() < 1e-9);
    assert!((bounds.max().y() - 70.0).abs() < 1e-9);
}

#[test]
fn polylines_keep_closed_flag_and_bulge() {
    let loader = DxfFacade::new();
    let doc = loader.load(&fixture("label_sheet.dxf")).expect("读取 DXF 失败");

    let polylines: Vec<_> = doc
        .query(EntityKind::Polyline)
        .filter_map(|(_, entity)| match entity {
            Entity::Polyline(polyline) => Some(polyline),
            _ => None,
        })
        .collect();
    assert_eq!(polylines.len(), 2);

    let border = polylines[0];
    assert!(border.is_closed);
    assert_eq!(border.vertices.len(), 4);

    let pipe = polylines[1];
    assert!(!pipe.is_closed);
    assert_eq!(pipe.vertices.len(), 3);
    assert!((pipe.vertices[1].bulge - 0.5).abs() < 1e-9);
    assert_eq!(pipe.handle.as_deref(), Some("10B"));
}

#[test]
fn document_snapshot_serializes_to_json() {
    let loader = DxfFacade::new();
    let doc = loader.load(&fixture("label_sheet.dxf")).expect("读取 DXF 失败");
    let json = serde_json::to_value(&doc).expect("文档序列化失败");
    let entities = json
        .get("entities")
        .and_then(|value| value.as_array())
        .expect("快照应包含实体数组");
    assert_eq!(entities.len(), 9);
}

#[test]
fn missing_mandatory_code_is_invalid_document() {
    let loader = DxfFacade::new();
    let err = loader
        .load(&fixture("missing_height.dxf"))
        .expect_err("缺少文字高度应失败");
    match err {
        IoError::InvalidDocument(message) => assert!(message.contains("组码 40"), "{message}"),
        other => panic!("期望 InvalidDocument，实际为 {other:?}"),
    }
}

#[test]
fn duplicate_group_code_is_invalid_document() {
    let loader = DxfFacade::new();
    let err = loader
        .load(&fixture("duplicate_code.dxf"))
        .expect_err("重复组码应失败");
    assert!(matches!(err, IoError::InvalidDocument(_)));
}

#[test]
fn missing_file_is_read_error() {
    let loader = DxfFacade::new();
    let err = loader
        .load(&fixture("does_not_exist.dxf"))
        .expect_err("不存在的文件应失败");
    assert!(matches!(err, IoError::Read { .. }));
}

#[test]
fn ansi_encoded_text_is_decoded_lossily() {
    let mut data: Vec<u8> = Vec::new();
    data.extend_from_slice(b"  0\nSECTION\n  2\nENTITIES\n  0\nTEXT\n  8\n0\n 10\n1.0\n 20\n2.0\n 40\n2.5\n  1\n");
    // cp1252 编码的 "±"
    data.extend_from_slice(&[0xB1]);
    data.extend_from_slice(b"5 MM\n  0\nENDSEC\n  0\nEOF\n");

    let doc = DxfFacade::new().parse_bytes(&data).expect("ANSI 文本应可解析");
    let text = doc
        .query(EntityKind::Text)
        .find_map(|(_, entity)| match entity {
            Entity::Text(text) => Some(text.content.clone()),
            _ => None,
        })
        .expect("未找到文字");
    assert!(text.ends_with("5 MM"));
    assert!(text.contains('\u{fffd}'));
}
