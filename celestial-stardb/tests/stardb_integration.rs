use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use approx::assert_relative_eq;
use celestial_stardb::loader::{write_star_file, FIRST_AUTO_CATALOG_NUMBER};
use celestial_stardb::xindex::{convert_ascii, read_entries};
use celestial_stardb::{
    BinaryStarRecord, CrossIndex, CrossIndexCatalog, Disposition, ErrorKind, FieldValue,
    MemoryNameDatabase, OctreeConfig, OctreeStats, Star, StarLoader, StcRecord, ViewParams,
};
use nalgebra::{UnitQuaternion, Vector3};

fn star_file(records: &[BinaryStarRecord]) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_star_file(&mut bytes, records).unwrap();
    bytes
}

/// A cube of stars on an integer grid, numbered from 1.
fn grid_records(side: i32, spacing: f32) -> Vec<BinaryStarRecord> {
    let mut records = Vec::new();
    let half = side / 2;
    for x in -half..=half {
        for y in -half..=half {
            for z in -half..=half {
                let n = records.len() as u32 + 1;
                records.push(BinaryStarRecord {
                    catalog_number: n,
                    position: Vector3::new(x as f32, y as f32, z as f32) * spacing,
                    abs_mag: (n % 12) as f32 - 2.0,
                    details_index: (n % 7) as u16,
                });
            }
        }
    }
    records
}

fn collect_visible(db: &celestial_stardb::StarDatabase, view: &ViewParams) -> Vec<u32> {
    let mut found = Vec::new();
    db.find_visible_stars(
        &mut |s: &Star, _: f32, _: f32| found.push(s.catalog_number()),
        view,
        None,
    );
    found
}

#[test]
fn test_file_round_trip_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stars.dat");
    let records = grid_records(9, 4.0);
    std::fs::write(&path, star_file(&records)).unwrap();

    let mut loader = StarLoader::new();
    assert_eq!(loader.load_binary_file(&path).unwrap(), records.len());
    let (db, report) = loader.finish();
    assert!(report.failed.is_empty());
    assert_eq!(db.len(), records.len());

    let mut seen = HashSet::new();
    for star in db.stars() {
        assert!(seen.insert(star.catalog_number()), "duplicate catalog number");
        let found = db.find(star.catalog_number()).unwrap();
        assert_eq!(found.position(), star.position());
    }
    for record in &records {
        let star = db.find(record.catalog_number).unwrap();
        assert_eq!(star.position(), record.position);
        assert_eq!(star.absolute_magnitude(), record.abs_mag);
    }
    assert!(db.find(0).is_none());
}

#[test]
fn test_text_records_amend_binary_catalog() {
    let records = vec![BinaryStarRecord {
        catalog_number: 32349,
        position: Vector3::new(-1.6, 8.1, -2.4),
        abs_mag: 1.5,
        details_index: 3,
    }];
    let mut loader = StarLoader::new();
    loader.load_binary(star_file(&records).as_slice()).unwrap();

    let json = r#"[
        {"disposition": "Modify", "catalog_number": 32349,
         "fields": {"SpectralType": "A1V", "AbsMag": 1.42}},
        {"fields": {"Position": [4.0, 0.0, 0.0], "AbsMag": 8.0}},
        {"fields": {"Position": [5.0, 0.0, 0.0], "AbsMag": 9.0}},
        {"disposition": "Replace", "catalog_number": 1, "fields": {"AbsMag": 1.0}}
    ]"#;
    let records: Vec<StcRecord> = serde_json::from_str(json).unwrap();
    let report = loader.load_records(&records);
    assert_eq!(report.accepted.len(), 3);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, 3);
    assert_eq!(report.rejected[0].1.kind(), ErrorKind::Validation);

    // Automatic numbers are strictly decreasing
    assert_eq!(report.accepted[1], FIRST_AUTO_CATALOG_NUMBER);
    assert!(report.accepted[2] < report.accepted[1]);

    let (db, _) = loader.finish();
    let sirius = db.find(32349).unwrap();
    assert_eq!(sirius.position(), Vector3::new(-1.6, 8.1, -2.4));
    assert_relative_eq!(sirius.absolute_magnitude(), 1.42);
    assert_eq!(sirius.details().spectral_type(), Some("A1V"));
    assert_eq!(
        sirius.details().attribute("PackedDetails"),
        Some(&FieldValue::Number(3.0))
    );
}

#[test]
fn test_text_before_binary_is_rejected() {
    let mut loader = StarLoader::new();
    loader
        .load_record(
            &StcRecord::new(Disposition::Add, Some(1))
                .with_position(1.0, 0.0, 0.0)
                .with_abs_mag(1.0),
        )
        .unwrap();
    let err = loader
        .load_binary(star_file(&grid_records(1, 1.0)).as_slice())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(loader.len(), 1);
}

#[test]
fn test_barycenter_systems() {
    let json = r#"[
        {"catalog_number": 71681, "fields": {"OrbitBarycenter": 71683, "Position": [0.0, 0.0, -0.0003], "AbsMag": 5.7}},
        {"catalog_number": 71682, "fields": {"OrbitBarycenter": 999999, "AbsMag": 4.0}},
        {"catalog_number": 71683, "is_barycenter": true, "fields": {"Position": [-1.6, -1.4, -3.8]}},
        {"catalog_number": 70890, "fields": {"Position": [-1.5, -1.2, -3.8], "AbsMag": 15.5}}
    ]"#;
    let records: Vec<StcRecord> = serde_json::from_str(json).unwrap();
    let mut loader = StarLoader::new();
    assert!(loader.load_records(&records).is_clean());

    let (db, report) = loader.finish();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind(), ErrorKind::UnresolvedReference);
    assert!(db.find(71682).is_none());

    let b = db.find(71681).unwrap();
    assert_relative_eq!(b.position().z, -3.8003, epsilon = 1e-4);

    // The barycenter is found by radius but never drawn
    let mut near = Vec::new();
    db.find_close_stars(
        &mut |s: &Star, _: f32, _: f32| near.push(s.catalog_number()),
        &Vector3::zeros(),
        5.0,
    );
    near.sort_unstable();
    assert_eq!(near, vec![70890, 71681, 71683]);

    let view = ViewParams::looking_at(
        Vector3::zeros(),
        Vector3::new(-1.6, -1.4, -3.8),
        Vector3::z(),
        0.5,
        1.0,
        20.0,
    )
    .unwrap();
    let mut visible = collect_visible(&db, &view);
    visible.sort_unstable();
    assert_eq!(visible, vec![70890, 71681]);
}

#[test]
fn test_visibility_ahead_and_behind() {
    let mut loader = StarLoader::new();
    for (n, z) in [(1, -10.0), (2, 10.0)] {
        loader
            .load_record(
                &StcRecord::new(Disposition::Add, Some(n))
                    .with_position(0.0, 0.0, z)
                    .with_abs_mag(0.0),
            )
            .unwrap();
    }
    let (db, _) = loader.finish();

    let mut view = ViewParams {
        position: Vector3::zeros(),
        orientation: UnitQuaternion::identity(),
        fov_y: 45f32.to_radians(),
        aspect_ratio: 1.0,
        limiting_mag: 6.0,
    };
    assert_eq!(collect_visible(&db, &view), vec![1]);

    view.fov_y = 170f32.to_radians();
    assert_eq!(collect_visible(&db, &view), vec![1]);
}

#[test]
fn test_visible_query_matches_brute_force_on_grid() {
    let records = grid_records(21, 3.0);
    let mut loader = StarLoader::new();
    loader.load_binary(star_file(&records).as_slice()).unwrap();
    let (db, _) = loader.finish_with_config(&OctreeConfig {
        max_stars_per_node: 16,
        max_depth: 8,
    });

    let view = ViewParams::looking_at(
        Vector3::new(1.5, 0.5, 2.0),
        Vector3::new(20.0, 12.0, -9.0),
        Vector3::z(),
        0.8,
        1.6,
        3.0,
    )
    .unwrap();

    let frustum = view.frustum();
    let mut expected: Vec<u32> = db
        .stars()
        .iter()
        .filter(|s| frustum.contains_point(&s.position()))
        .filter(|s| s.apparent_magnitude_from(&view.position) <= view.limiting_mag)
        .map(Star::catalog_number)
        .collect();
    expected.sort_unstable();

    let mut stats = OctreeStats::default();
    let mut found = Vec::new();
    db.find_visible_stars(
        &mut |s: &Star, _: f32, _: f32| found.push(s.catalog_number()),
        &view,
        Some(&mut stats),
    );
    found.sort_unstable();

    assert!(!expected.is_empty());
    assert_eq!(found, expected);
    assert!(stats.stars_tested < db.len());
}

#[test]
fn test_close_stars_closed_interval() {
    let mut loader = StarLoader::new();
    loader
        .load_binary(star_file(&grid_records(5, 2.0)).as_slice())
        .unwrap();
    let (db, _) = loader.finish();

    let center = Vector3::zeros();
    let count = |radius: f32| {
        let mut n = 0;
        db.find_close_stars(&mut |_: &Star, _: f32, _: f32| n += 1, &center, radius);
        n
    };
    // Origin, then the six axis neighbours at exactly 2 ly
    assert_eq!(count(0.0), 1);
    assert_eq!(count(2.0), 7);
    assert_eq!(count(1.999), 1);
    assert_eq!(count(2.0 * 2f32.sqrt() + 1e-4), 19);
}

#[test]
fn test_cross_index_from_ascii() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hd.dat");

    let ascii = "48915 32349\n8890 11767\n 224750 120000\n8890 99\n";
    let mut file = File::create(&path).unwrap();
    assert_eq!(convert_ascii(ascii.as_bytes(), &mut file).unwrap(), 4);
    drop(file);

    let entries = read_entries(BufReader::new(File::open(&path).unwrap())).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].catalog_number, 48915);

    let index = CrossIndex::read(File::open(&path).unwrap()).unwrap();
    assert_eq!(index.lookup(8890), Some(11767));
    assert_eq!(index.lookup(224750), Some(120000));
    assert_eq!(index.lookup(48915), Some(32349));
    assert_eq!(index.lookup(1), None);
    assert_eq!(index.lookup(300000), None);

    let mut loader = StarLoader::new();
    loader
        .load_cross_index(CrossIndexCatalog::HenryDraper, File::open(&path).unwrap())
        .unwrap();
    let record = StcRecord::new(Disposition::Add, None)
        .with("CatalogRef", FieldValue::Text("HD 8890".into()))
        .with_position(0.0, 0.0, -433.0)
        .with_abs_mag(-3.6);
    assert_eq!(loader.load_record(&record).unwrap(), 11767);

    let (mut db, _) = loader.finish();
    assert_eq!(
        db.search_cross_index(CrossIndexCatalog::HenryDraper, 8890)
            .map(Star::catalog_number),
        Some(11767)
    );
    assert!(db
        .search_cross_index(CrossIndexCatalog::HenryDraper, 48915)
        .is_none());

    let mut names = MemoryNameDatabase::new();
    names.add(11767, "Polaris");
    db.set_name_database(Arc::new(names));
    let polaris = db.find_by_name("polaris", false).unwrap();
    assert_eq!(
        db.star_name_list(polaris, celestial_stardb::MAX_STAR_NAMES),
        "Polaris / HIP 11767 / HD 8890"
    );
    assert_eq!(db.find_by_name("HD 8890", false).map(Star::catalog_number), Some(11767));
}

#[test]
fn test_converter_layout_and_failures() {
    let mut out = Vec::new();
    convert_ascii("1 2\n3 4\n".as_bytes(), &mut out).unwrap();
    assert_eq!(out.len(), 26);

    let mut out = Vec::new();
    let err = convert_ascii("1 2\n5".as_bytes(), &mut out).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.to_string().contains("record #1"));
    assert!(out.is_empty());
}
