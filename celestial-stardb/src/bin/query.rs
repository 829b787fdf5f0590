use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use celestial_stardb::{
    CrossIndexCatalog, MemoryNameDatabase, OctreeConfig, OctreeStats, Star, StarDatabase,
    StarLoader, StcRecord, ViewParams, MAX_STAR_NAMES,
};
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Vector3;

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Parser)]
#[command(name = "query-stardb")]
#[command(about = "Load a star database and query it")]
#[command(version)]
struct Cli {
    /// Binary star file (CELSTARS)
    #[arg(long)]
    stars: Option<PathBuf>,

    /// JSON file holding an array of star records, applied after --stars
    #[arg(long)]
    records: Vec<PathBuf>,

    /// HD cross index (CELINDEX)
    #[arg(long)]
    hd: Option<PathBuf>,

    /// SAO cross index (CELINDEX)
    #[arg(long)]
    sao: Option<PathBuf>,

    /// Gliese cross index (CELINDEX)
    #[arg(long)]
    gliese: Option<PathBuf>,

    /// Star names, one `number:name[:name...]` line per star
    #[arg(long)]
    names: Option<PathBuf>,

    /// Octree leaf capacity
    #[arg(long, default_value = "64")]
    max_stars_per_node: usize,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print database information
    Info,
    /// Look a star up by catalog number or name
    Find {
        /// Catalog number, name, or designation such as "HD 48915"
        star: String,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// List every name of a star
    Name {
        /// Catalog number
        catalog_number: u32,
        /// Maximum number of names
        #[arg(long, default_value_t = MAX_STAR_NAMES)]
        max: usize,
    },
    /// List stars visible from a point
    Visible {
        /// Observer position in light years, as x,y,z
        #[arg(long, value_parser = parse_vector, default_value = "0,0,0")]
        from: Vector3<f32>,
        /// Point to look at, as x,y,z
        #[arg(long, value_parser = parse_vector, default_value = "0,0,-1")]
        toward: Vector3<f32>,
        /// Vertical field of view in degrees
        #[arg(long, default_value = "45.0")]
        fov: f32,
        /// Width over height
        #[arg(long, default_value = "1.0")]
        aspect: f32,
        /// Limiting apparent magnitude
        #[arg(long, default_value = "6.0")]
        mag_max: f32,
        /// Maximum number of results, brightest first
        #[arg(long)]
        limit: Option<usize>,
        /// Print query timing and traversal counters
        #[arg(long)]
        timing: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// List stars within a radius of a point
    Near {
        /// Center in light years, as x,y,z
        #[arg(value_parser = parse_vector)]
        position: Vector3<f32>,
        /// Search radius in light years
        #[arg(long, default_value = "10.0")]
        radius: f32,
        /// Maximum number of results, nearest first
        #[arg(long)]
        limit: Option<usize>,
        /// Print query timing
        #[arg(long)]
        timing: bool,
        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

struct Hit {
    star: Star,
    distance: f32,
    app_mag: f32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let db = load_database(&cli)?;

    match cli.command {
        Commands::Info => {
            println!("Stars: {}", db.len());
            println!(
                "Octree: {} nodes, depth {}",
                db.octree().node_count(),
                db.octree().depth()
            );
            for catalog in CrossIndexCatalog::ALL {
                if let Some(index) = db.cross_index(catalog) {
                    println!("{} cross index: {} entries", catalog, index.len());
                }
            }
        }
        Commands::Find { star, format } => {
            let found = match star.trim().parse::<u32>() {
                Ok(n) => db.find(n),
                Err(_) => db.find_by_name(&star, true),
            };
            let Some(found) = found else {
                anyhow::bail!("No star matching '{}'", star);
            };
            let origin = Vector3::zeros();
            let hit = Hit {
                star: found.clone(),
                distance: found.position().norm(),
                app_mag: found.apparent_magnitude_from(&origin),
            };
            print_hits(&db, &[hit], format);
        }
        Commands::Name {
            catalog_number,
            max,
        } => {
            let star = db
                .find(catalog_number)
                .with_context(|| format!("No star with catalog number {}", catalog_number))?;
            println!("{}", db.star_name_list(star, max));
        }
        Commands::Visible {
            from,
            toward,
            fov,
            aspect,
            mag_max,
            limit,
            timing,
            format,
        } => {
            let up = if (toward - from).cross(&Vector3::y()).norm_squared() > 0.0 {
                Vector3::y()
            } else {
                Vector3::z()
            };
            let view =
                ViewParams::looking_at(from, toward, up, fov.to_radians(), aspect, mag_max)
                    .context("Observer and target must differ")?;

            let start = Instant::now();
            let mut stats = OctreeStats::default();
            let mut hits = Vec::new();
            db.find_visible_stars(
                &mut |star: &Star, distance: f32, app_mag: f32| {
                    hits.push(Hit {
                        star: star.clone(),
                        distance,
                        app_mag,
                    })
                },
                &view,
                Some(&mut stats),
            );
            hits.sort_by(|a, b| a.app_mag.total_cmp(&b.app_mag));
            if let Some(limit) = limit {
                hits.truncate(limit);
            }

            if timing {
                eprintln!(
                    "Query completed in {:.2} ms ({} nodes visited, {} stars tested, depth {})",
                    start.elapsed().as_secs_f64() * 1000.0,
                    stats.nodes_visited,
                    stats.stars_tested,
                    stats.max_depth
                );
            }
            print_hits(&db, &hits, format);
        }
        Commands::Near {
            position,
            radius,
            limit,
            timing,
            format,
        } => {
            let start = Instant::now();
            let mut hits = Vec::new();
            db.find_close_stars(
                &mut |star: &Star, distance: f32, app_mag: f32| {
                    hits.push(Hit {
                        star: star.clone(),
                        distance,
                        app_mag,
                    })
                },
                &position,
                radius,
            );
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            if let Some(limit) = limit {
                hits.truncate(limit);
            }

            if timing {
                eprintln!(
                    "Query completed in {:.2} ms",
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            print_hits(&db, &hits, format);
        }
    }

    Ok(())
}

fn load_database(cli: &Cli) -> anyhow::Result<StarDatabase> {
    let mut loader = StarLoader::new();

    for (catalog, path) in [
        (CrossIndexCatalog::HenryDraper, &cli.hd),
        (CrossIndexCatalog::Sao, &cli.sao),
        (CrossIndexCatalog::Gliese, &cli.gliese),
    ] {
        if let Some(path) = path {
            let file = File::open(path)
                .with_context(|| format!("Cannot open cross index {}", path.display()))?;
            loader
                .load_cross_index(catalog, BufReader::new(file))
                .with_context(|| format!("Cannot read cross index {}", path.display()))?;
        }
    }

    if let Some(path) = &cli.stars {
        loader
            .load_binary_file(path)
            .with_context(|| format!("Cannot load star file {}", path.display()))?;
    }

    for path in &cli.records {
        let file =
            File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let records: Vec<StcRecord> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Cannot parse star records in {}", path.display()))?;
        let report = loader.load_records(&records);
        for (i, err) in &report.rejected {
            eprintln!("{}: record #{} rejected: {}", path.display(), i, err);
        }
    }

    let config = OctreeConfig {
        max_stars_per_node: cli.max_stars_per_node,
        ..OctreeConfig::default()
    };
    let (mut db, report) = loader.finish_with_config(&config);
    for err in &report.failed {
        eprintln!("Dropped: {}", err);
    }

    if let Some(path) = &cli.names {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read star names {}", path.display()))?;
        db.set_name_database(Arc::new(MemoryNameDatabase::parse(&text)));
    }

    Ok(db)
}

fn print_hits(db: &StarDatabase, hits: &[Hit], format: OutputFormat) {
    match format {
        OutputFormat::Table => print_table(db, hits),
        OutputFormat::Json => print_json(db, hits),
        OutputFormat::Csv => print_csv(db, hits),
    }
}

fn print_table(db: &StarDatabase, hits: &[Hit]) {
    for (i, hit) in hits.iter().enumerate() {
        let p = hit.star.position();
        println!(
            "{:4}: {:>10} {:<24} Pos=({:9.3}, {:9.3}, {:9.3}) AbsMag={:6.2} AppMag={:6.2} Dist={:.3} ly",
            i + 1,
            hit.star.catalog_number(),
            db.star_name(&hit.star, true),
            p.x,
            p.y,
            p.z,
            hit.star.absolute_magnitude(),
            hit.app_mag,
            hit.distance
        );
    }

    if hits.is_empty() {
        println!("No stars found matching the search criteria.");
    } else {
        println!("\nTotal results: {}", hits.len());
    }
}

#[derive(serde::Serialize)]
struct JsonStar {
    catalog_number: u32,
    name: String,
    position: [f32; 3],
    abs_mag: f32,
    app_mag: f32,
    distance_ly: f32,
    spectral_type: Option<String>,
}

fn print_json(db: &StarDatabase, hits: &[Hit]) {
    let stars: Vec<JsonStar> = hits
        .iter()
        .map(|h| {
            let p = h.star.position();
            JsonStar {
                catalog_number: h.star.catalog_number(),
                name: db.star_name(&h.star, true),
                position: [p.x, p.y, p.z],
                abs_mag: h.star.absolute_magnitude(),
                app_mag: h.app_mag,
                distance_ly: h.distance,
                spectral_type: h.star.details().spectral_type().map(str::to_string),
            }
        })
        .collect();

    match serde_json::to_string_pretty(&stars) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Cannot encode results: {}", e),
    }
}

fn print_csv(db: &StarDatabase, hits: &[Hit]) {
    println!("catalog_number,name,x,y,z,abs_mag,app_mag,distance_ly");
    for h in hits {
        let p = h.star.position();
        println!(
            "{},\"{}\",{},{},{},{},{},{}",
            h.star.catalog_number(),
            db.star_name(&h.star, true).replace('"', "\"\""),
            p.x,
            p.y,
            p.z,
            h.star.absolute_magnitude(),
            h.app_mag,
            h.distance
        );
    }
}

fn parse_vector(s: &str) -> Result<Vector3<f32>, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected x,y,z, got '{}'", s));
    }
    let mut v = [0.0f32; 3];
    for (slot, part) in v.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|e| format!("invalid coordinate '{}': {}", part, e))?;
    }
    Ok(Vector3::from(v))
}
