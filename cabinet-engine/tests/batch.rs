use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;

use cabinet_config::{ArchiveConfig, ExtractionConfig};
use cabinet_core::catalog::CabinetCategory;
use cabinet_engine::{BatchProcessor, BlockStrategy, CancellationToken, ExtractionPipeline};
use cabinet_io::parse_dxf;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("cabinet-io")
        .join("tests")
        .join("data")
        .join(name);
    fs::read_to_string(path).expect("读取 DXF 夹具失败")
}

fn build_zip(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in members {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .expect("add directory");
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start file");
            writer.write_all(content.as_bytes()).expect("write member");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

fn rectangle_dxf(layer: &str, width: u32, height: u32) -> String {
    format!(
        "0\nSECTION\n2\nENTITIES\n0\nLWPOLYLINE\n8\n{layer}\n70\n1\n\
         10\n0\n20\n0\n10\n{width}\n20\n0\n10\n{width}\n20\n{height}\n10\n0\n20\n{height}\n\
         0\nENDSEC\n0\nEOF\n"
    )
}

#[test]
fn one_corrupt_member_does_not_abort_the_batch() {
    let valid: Vec<String> = [300, 450, 600, 750, 900]
        .iter()
        .map(|width| rectangle_dxf("0", *width, 870))
        .collect();
    let names = ["B300.dxf", "B450.dxf", "B600.dxf", "B750.dxf", "B900.dxf"];
    let mut members: Vec<(&str, &str)> = names
        .iter()
        .zip(&valid)
        .map(|(name, text)| (*name, text.as_str()))
        .collect();
    members.insert(2, ("corrupt.dxf", "\u{0}\u{1}PK garbage"));
    let bytes = build_zip(&members);

    let result = BatchProcessor::default().process_archive(
        "kitchen.zip",
        &bytes,
        &CancellationToken::new(),
    );
    assert!(result.success);
    assert_eq!(result.total_files, 6);
    assert_eq!(result.processed_files, 5);
    assert_eq!(result.errors, vec!["Failed to parse: corrupt.dxf"]);
    let widths: Vec<u32> = result.cabinets.iter().map(|cabinet| cabinet.width).collect();
    assert_eq!(widths, vec![300, 450, 600, 750, 900]);
}

#[test]
fn directories_and_other_files_are_skipped() {
    let text = rectangle_dxf("0", 600, 870);
    let bytes = build_zip(&[
        ("drawings/", ""),
        ("drawings/B600.DXF", text.as_str()),
        ("drawings/readme.txt", "not a drawing"),
    ]);
    let result = BatchProcessor::default().process_archive(
        "orders.zip",
        &bytes,
        &CancellationToken::new(),
    );
    assert_eq!(result.total_files, 1);
    assert_eq!(result.cabinets.len(), 1);
    assert_eq!(result.cabinets[0].name, "B600");
    assert!(result.errors.is_empty());
}

#[test]
fn archive_config_controls_member_filter() {
    let text = rectangle_dxf("0", 600, 870);
    let bytes = build_zip(&[("B600.dxf", text.as_str()), ("B600.cad", text.as_str())]);
    let archive = ArchiveConfig {
        extensions: vec!["dxf".to_string(), "cad".to_string()],
    };
    let processor = BatchProcessor::new(&ExtractionConfig::default(), &archive);
    let result = processor.process_archive("orders.zip", &bytes, &CancellationToken::new());
    assert_eq!(result.total_files, 2);
    assert_eq!(result.processed_files, 2);
}

#[test]
fn drawings_without_cabinets_are_informational() {
    let text = rectangle_dxf("0", 40, 20);
    let bytes = build_zip(&[("tag.dxf", text.as_str())]);
    let result = BatchProcessor::default().process_archive(
        "orders.zip",
        &bytes,
        &CancellationToken::new(),
    );
    assert!(result.success);
    assert_eq!(result.processed_files, 1);
    assert!(result.cabinets.is_empty());
    assert_eq!(result.errors, vec!["tag.dxf: No cabinets found"]);
}

#[test]
fn multiple_archives_prefix_errors_with_archive_name() {
    let text = rectangle_dxf("0", 600, 870);
    let first = build_zip(&[("B600.dxf", text.as_str())]);
    let second = build_zip(&[("broken.dxf", "nonsense")]);
    let archives: Vec<(&str, &[u8])> = vec![
        ("first.zip", first.as_slice()),
        ("second.zip", second.as_slice()),
        ("third.zip", &b"definitely not a zip"[..]),
    ];
    let result = BatchProcessor::default().process_archives(archives, &CancellationToken::new());
    assert!(result.success);
    assert_eq!(result.total_files, 2);
    assert_eq!(result.processed_files, 1);
    assert_eq!(result.cabinets.len(), 1);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0], "second.zip: Failed to parse: broken.dxf");
    assert!(result.errors[1].starts_with("third.zip: Error processing third.zip: "));
}

#[test]
fn cancelled_batches_stop_between_files() {
    let text = rectangle_dxf("0", 600, 870);
    let bytes = build_zip(&[
        ("a.dxf", text.as_str()),
        ("b.dxf", text.as_str()),
        ("c.dxf", text.as_str()),
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = BatchProcessor::default().process_archive("orders.zip", &bytes, &cancel);
    assert!(!result.success);
    assert_eq!(result.total_files, 3);
    assert_eq!(result.processed_files, 0);
    assert_eq!(result.errors, vec!["Cancelled: 3 file(s) not processed"]);
}

#[test]
fn kitchen_blocks_only_use_the_block_tier() {
    let text = fixture("kitchen_blocks.dxf");
    let result = BatchProcessor::default().process_dxf("kitchen.dxf", &text);
    assert_eq!(result.cabinets.len(), 2);

    let sink = &result.cabinets[0];
    assert_eq!(sink.filename, "kitchen.dxf::Base Cabinet 2 Drawer Sink");
    assert_eq!(sink.category, CabinetCategory::Base);
    assert_eq!(sink.cabinet_type, "Sink");
    assert_eq!(sink.drawer_count, 2);
    assert!(sink.is_sink);
    assert_eq!((sink.width, sink.height, sink.depth), (900, 870, 580));

    let wall = &result.cabinets[1];
    assert_eq!(wall.name, "Wall Cabinet Double");
    assert_eq!(wall.category, CabinetCategory::Wall);
    assert_eq!(wall.door_count, 2);
    assert_eq!((wall.width, wall.height), (600, 720));
    assert!(result.cabinets.iter().all(|cabinet| cabinet.filename.contains("::")));
}

#[test]
fn layered_fixture_uses_layer_tier() {
    let text = fixture("layered_units.dxf");
    let result = BatchProcessor::default().process_dxf("layered.dxf", &text);
    let summary: Vec<(&str, CabinetCategory, u32, u32)> = result
        .cabinets
        .iter()
        .map(|cabinet| {
            (
                cabinet.name.as_str(),
                cabinet.category,
                cabinet.width,
                cabinet.height,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("BASE-CABINET-600", CabinetCategory::Base, 600, 870),
            ("TALL-PANTRY", CabinetCategory::Tall, 600, 2100),
        ]
    );
    assert_eq!(result.cabinets[1].cabinet_type, "Pantry");
}

#[test]
fn custom_pipeline_limits_the_tiers_tried() {
    let extraction = ExtractionConfig::default();
    let mut pipeline = ExtractionPipeline::empty(&extraction);
    pipeline.register(BlockStrategy);
    let processor = BatchProcessor::with_pipeline(pipeline, &ArchiveConfig::default());

    let layered = processor.process_dxf("layered.dxf", &fixture("layered_units.dxf"));
    assert!(layered.success);
    assert!(layered.cabinets.is_empty());
    assert_eq!(layered.errors, vec!["layered.dxf: No cabinets found"]);

    let kitchen = processor.process_dxf("kitchen.dxf", &fixture("kitchen_blocks.dxf"));
    assert_eq!(kitchen.cabinets.len(), 2);
}

#[test]
fn imperial_header_extents_convert_to_millimeters() {
    let text = fixture("imperial_extents.dxf");
    let result = BatchProcessor::default().process_dxf("imperial_extents.dxf", &text);
    assert_eq!(result.cabinets.len(), 1);
    let cabinet = &result.cabinets[0];
    assert_eq!(cabinet.name, "imperial_extents");
    assert_eq!(cabinet.width, 508);
    assert_eq!(cabinet.height, 1016);
    assert_eq!(cabinet.entity_counts.get("LINE"), Some(&2));
    assert_eq!(cabinet.entity_counts.get("ARC"), Some(&1));
}

#[test]
fn extraction_is_deterministic() {
    let text = fixture("kitchen_blocks.dxf");
    let pipeline = ExtractionPipeline::default();
    let first = pipeline.extract("kitchen.dxf", &parse_dxf(&text).expect("parse"));
    let second = pipeline.extract("kitchen.dxf", &parse_dxf(&text).expect("parse"));
    assert_eq!(first, second);
}
