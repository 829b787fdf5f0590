use celestial_stardb::{Star, StarLoader, ViewParams};
use nalgebra::Vector3;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .expect("Usage: visible_stars <stars.dat>");

    let mut loader = StarLoader::new();
    let added = loader.load_binary_file(&path)?;
    let (db, report) = loader.finish();
    println!("Loaded {} stars ({} dropped)", added, report.failed.len());

    // Looking toward Orion from the Sun
    let view = ViewParams::looking_at(
        Vector3::zeros(),
        Vector3::new(25.0, 450.0, -20.0),
        Vector3::z(),
        30f32.to_radians(),
        1.5,
        4.0,
    )
    .expect("observer and target differ");

    let mut visible = Vec::new();
    db.find_visible_stars(
        &mut |star: &Star, distance: f32, app_mag: f32| {
            visible.push((star.catalog_number(), distance, app_mag))
        },
        &view,
        None,
    );
    visible.sort_by(|a, b| a.2.total_cmp(&b.2));

    println!("\n{} stars brighter than mag {:.1}:\n", visible.len(), view.limiting_mag);
    for (catalog_number, distance, app_mag) in visible.iter().take(20) {
        let star = db.find(*catalog_number).expect("delivered stars are in the index");
        println!(
            "  {:<24}  mag {:5.2}  {:8.1} ly",
            db.star_name(star, false),
            app_mag,
            distance,
        );
    }

    Ok(())
}
