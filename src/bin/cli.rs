// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe BVH CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use nalgebra::{Matrix4, Point3, Vector3};
use polyframe_bvh::bvh::debug::{estimate_memory_in_bytes, extremes, json_structure, validate_bounds};
use polyframe_bvh::geometry::{Ray, Side};
use polyframe_bvh::{io, Brush, Evaluator, KernelConfig, MeshBvh, Operation, SplitStrategy};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "polyframe-bvh")]
#[command(about = "Polyframe BVH - mesh spatial queries and CSG booleans", long_about = None)]
struct Cli {
    /// Verbose output (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to polyframe-bvh.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Split strategy override (center, average, sah)
    #[arg(long, global = true)]
    strategy: Option<SplitStrategy>,

    /// Leaf size override
    #[arg(long, global = true)]
    max_leaf: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a BVH for an STL file and print its statistics
    Stats {
        input: PathBuf,

        /// Print the node structure as JSON instead
        #[arg(long)]
        json: bool,

        /// Save the serialized BVH
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Cast a ray against an STL file
    Raycast {
        input: PathBuf,

        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        origin: Vector3<f64>,

        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        direction: Vector3<f64>,

        /// Report every hit instead of the first
        #[arg(long)]
        all: bool,
    },

    /// Find the closest surface point to a query point
    Closest {
        input: PathBuf,

        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        point: Vector3<f64>,
    },

    /// Combine two STL files with a boolean operation
    Csg {
        a: PathBuf,
        b: PathBuf,

        /// addition, subtraction, reverse-subtraction, difference, intersection,
        /// hollow-subtraction, hollow-intersection
        #[arg(long, default_value = "subtraction")]
        op: Operation,

        /// Translation applied to b
        #[arg(long, value_parser = parse_vector, allow_hyphen_values = true)]
        offset: Option<Vector3<f64>>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Show version information
    Version,
}

fn parse_vector(s: &str) -> std::result::Result<Vector3<f64>, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{}: {}", p.trim(), e)))
        .collect::<std::result::Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z but got {}", s)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match &cli.config {
        Some(path) => KernelConfig::from_file(path)?,
        None => KernelConfig::load()?,
    };
    if let Some(strategy) = cli.strategy {
        config.bvh.strategy = strategy;
    }
    if let Some(max_leaf) = cli.max_leaf {
        config.bvh.max_leaf_triangles = max_leaf;
    }

    match &cli.command {
        Commands::Stats { input, json, output } => {
            stats_command(input, *json, output.as_deref(), &config)?;
        }
        Commands::Raycast {
            input,
            origin,
            direction,
            all,
        } => {
            raycast_command(input, origin, direction, *all, &config)?;
        }
        Commands::Closest { input, point } => {
            closest_command(input, point, &config)?;
        }
        Commands::Csg {
            a,
            b,
            op,
            offset,
            output,
        } => {
            csg_command(a, b, *op, offset.as_ref(), output, &config)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
        }
        Commands::Version => {
            println!("Polyframe BVH v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn load_with_bvh(input: &Path, config: &KernelConfig) -> Result<(polyframe_bvh::Mesh, MeshBvh)> {
    let mut mesh = io::load_stl(input)?;
    let start = Instant::now();
    let bvh = MeshBvh::build(&mut mesh, &config.bvh)?;
    log::info!(
        "Built BVH for {} triangles in {:.2?}",
        mesh.triangle_count(),
        start.elapsed()
    );
    Ok((mesh, bvh))
}

fn stats_command(
    input: &Path,
    json: bool,
    output: Option<&Path>,
    config: &KernelConfig,
) -> Result<()> {
    let (mesh, bvh) = load_with_bvh(input, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json_structure(&bvh))?);
    } else {
        println!("{}", "═".repeat(60).bright_black());
        println!("{} {}", "BVH".bold(), input.display().to_string().cyan());
        println!("{}", "═".repeat(60).bright_black());
        println!("  {} {}", "Triangles:".bright_black(), mesh.triangle_count().to_string().cyan());
        println!("  {} {:?}", "Strategy:".bright_black(), config.bvh.strategy);
        println!(
            "  {} {} bytes",
            "Memory:".bright_black(),
            estimate_memory_in_bytes(&bvh).to_string().cyan()
        );
        for (i, root) in extremes(&bvh).iter().enumerate() {
            println!("  {} {}", "Root".bold(), i);
            println!(
                "    {} {} ({} leaves)",
                "Nodes:".bright_black(),
                root.node_count,
                root.leaf_node_count
            );
            println!("    {} {}..{}", "Depth:".bright_black(), root.depth.min, root.depth.max);
            println!(
                "    {} {}..{}",
                "Leaf triangles:".bright_black(),
                root.triangles.min,
                root.triangles.max
            );
            println!("    {} {:?}", "Splits (x, y, z):".bright_black(), root.splits);
            println!(
                "    {} {}",
                "SAH score:".bright_black(),
                format!("{:.3}", root.surface_area_score).yellow()
            );
        }
        let valid = validate_bounds(&bvh, &mesh);
        println!(
            "  {} {}",
            "Bounds:".bright_black(),
            if valid { "valid".green() } else { "INVALID".red() }
        );
        if bvh.depth_limit_reached() {
            println!("  {} depth limit reached", "Warning:".yellow());
        }
    }

    if let Some(output) = output {
        io::save_bvh(&bvh, &mesh, output)?;
        println!("  {} {}", "Saved:".bright_black(), output.display().to_string().cyan());
    }
    Ok(())
}

fn raycast_command(
    input: &Path,
    origin: &Vector3<f64>,
    direction: &Vector3<f64>,
    all: bool,
    config: &KernelConfig,
) -> Result<()> {
    if direction.norm() == 0.0 {
        bail!("Ray direction must not be zero");
    }
    let (mesh, bvh) = load_with_bvh(input, config)?;
    let ray = Ray::new(Point3::from(*origin), *direction);

    let hits = if all {
        bvh.raycast(&mesh, &ray, Side::Double, 0.0, f64::INFINITY)
    } else {
        bvh.raycast_first(&mesh, &ray, Side::Double, 0.0, f64::INFINITY)
            .into_iter()
            .collect()
    };

    if hits.is_empty() {
        println!("{}", "No hit".yellow());
    }
    for hit in &hits {
        println!(
            "{} face {} at ({:.6}, {:.6}, {:.6}) distance {:.6}",
            "Hit".green(),
            hit.face_index,
            hit.point.x,
            hit.point.y,
            hit.point.z,
            hit.distance
        );
    }
    Ok(())
}

fn closest_command(input: &Path, point: &Vector3<f64>, config: &KernelConfig) -> Result<()> {
    let (mesh, bvh) = load_with_bvh(input, config)?;
    match bvh.closest_point_to_point(&mesh, &Point3::from(*point), 0.0, f64::INFINITY) {
        Some(hit) => println!(
            "{} face {} at ({:.6}, {:.6}, {:.6}) distance {:.6}",
            "Closest".green(),
            hit.face_index,
            hit.point.x,
            hit.point.y,
            hit.point.z,
            hit.distance
        ),
        None => println!("{}", "No triangles".yellow()),
    }
    Ok(())
}

fn csg_command(
    a: &Path,
    b: &Path,
    op: Operation,
    offset: Option<&Vector3<f64>>,
    output: &Path,
    config: &KernelConfig,
) -> Result<()> {
    let mut brush_a = Brush::new(io::load_stl(a)?);
    let mut brush_b = Brush::new(io::load_stl(b)?);
    if let Some(offset) = offset {
        brush_b.set_matrix(Matrix4::new_translation(offset));
    }

    let start = Instant::now();
    let mut evaluator = Evaluator::new(config.csg.clone());
    let result = evaluator
        .evaluate(&mut brush_a, &mut brush_b, op)
        .with_context(|| format!("Failed to evaluate {}", op))?;
    let elapsed = start.elapsed();

    io::save_stl(&result, output)?;
    println!(
        "{} {} {} {} -> {} ({} triangles, {:.2?})",
        "✓".green(),
        a.display(),
        op.to_string().bold(),
        b.display(),
        output.display().to_string().cyan(),
        result.triangle_count(),
        elapsed
    );
    Ok(())
}
