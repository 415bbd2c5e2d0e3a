use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::process;

use clap::ErrorKind;
use clap::Parser;
use log::LevelFilter;
use simplelog::ColorChoice;
use simplelog::ConfigBuilder;
use simplelog::LevelPadding;
use simplelog::TermLogger;
use simplelog::TerminalMode;

use tessera::command_line_options::CommandLineOptions;
use tessera::config::DEFAULT_RADIUS;
use tessera::config::MAX_REGIONS;
use tessera::config::TOLERANCE;
use tessera::container::ParticleRef;
use tessera::error::fatal_error;
use tessera::prelude::*;

fn main() {
    let opts = match CommandLineOptions::try_parse() {
        Ok(opts) => opts,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{}", e);
            return;
        }
        Err(e) => {
            eprint!("{}", e);
            process::exit(ExitCode::CommandLineError as i32);
        }
    };
    init_logging(opts.verbosity);
    check_bounds(&opts);
    if opts.init_mem == 0 {
        fatal_error("The memory allocation must be positive", ExitCode::CommandLineError);
    }
    let domain = DomainBox::new(
        Extent::new(
            Point3d::new(opts.x_min, opts.y_min, opts.z_min),
            Point3d::new(opts.x_max, opts.y_max, opts.z_max),
        ),
        opts.periodicity(),
    );

    // Choose the grid size: directly specified, derived from a length
    // scale, or estimated by staging the whole input stream.
    let (dims, provenance, staged) = if let Some(grid) = &opts.grid {
        if grid.iter().any(|&n| n == 0) {
            fatal_error(
                "The computational grid must be greater than zero in each direction",
                ExitCode::CommandLineError,
            );
        }
        ((grid[0], grid[1], grid[2]), "directly specified", None)
    } else if let Some(length_scale) = opts.length_scale {
        if length_scale < TOLERANCE {
            fatal_error("The length scale must be positive", ExitCode::CommandLineError);
        }
        let inv = 0.6 / length_scale;
        let side = domain.side_lengths();
        let (nx, ny, nz) = (side.x * inv + 1.0, side.y * inv + 1.0, side.z * inv + 1.0);
        if nx * ny * nz > MAX_REGIONS as Float {
            fatal_error(
                "Number of computational blocks exceeds the maximum allowed",
                ExitCode::MemoryError,
            );
        }
        (
            (nx as usize, ny as usize, nz as usize),
            "estimated using length scale",
            None,
        )
    } else {
        let mut staged = PreContainer::new(domain.clone(), opts.radical);
        staged.import(open_input(&opts.input));
        (staged.guess_optimal(), "estimated from file", Some(staged))
    };

    let mut container = Container::new(domain, dims, opts.init_mem, opts.radical);
    add_walls(&mut container, &opts);

    let mut order = opts.ordered.then(ParticleOrder::new);
    match staged {
        Some(staged) => match &mut order {
            Some(order) => staged.setup_ordered(order, &mut container),
            None => staged.setup(&mut container),
        },
        None => {
            let reader = open_input(&opts.input);
            match &mut order {
                Some(order) => container.import_ordered(order, reader),
                None => container.import(reader),
            }
        }
    }

    let template = match &opts.custom {
        Some(custom) => OutputTemplate::parse(custom),
        None => OutputTemplate::default_for(opts.radical),
    };
    let base = if opts.input == "-" { "stdin" } else { opts.input.as_str() };
    let mut stdout_used = false;
    let main_out = if template.is_empty() {
        None
    } else {
        let name = opts.output.clone().unwrap_or_else(|| format!("{}.vor", base));
        Some(open_output(&name, &mut stdout_used))
    };
    let gnuplot_out = opts
        .gnuplot_file
        .clone()
        .or_else(|| opts.gnuplot.then(|| format!("{}.gnu", base)))
        .map(|name| open_output(&name, &mut stdout_used));
    let pov_particles_out = opts
        .pov_particles
        .clone()
        .or_else(|| opts.pov.then(|| format!("{}_p.pov", base)))
        .map(|name| open_output(&name, &mut stdout_used));
    let pov_cells_out = opts
        .pov_cells
        .clone()
        .or_else(|| opts.pov.then(|| format!("{}_v.pot", base)))
        .map(|name| open_output(&name, &mut stdout_used));

    let verbose = opts.verbosity > 0;
    let (cell_volume, cell_count) = write_outputs(
        &container,
        &template,
        order.as_ref(),
        main_out,
        gnuplot_out,
        pov_particles_out,
        pov_cells_out,
        verbose,
    )
    .unwrap_or_else(|e| fatal_error(&format!("Error writing output: {}", e), ExitCode::FileError));

    if verbose {
        let (nx, ny, nz) = container.grid_dimensions();
        let total = container.total_particles();
        log::info!(
            "Container geometry        : [{}:{}] [{}:{}] [{}:{}]",
            opts.x_min, opts.x_max, opts.y_min, opts.y_max, opts.z_min, opts.z_max
        );
        log::info!(
            "Computational grid size   : {} by {} by {} ({})",
            nx, ny, nz, provenance
        );
        log::info!("Filename                  : {}", base);
        log::info!(
            "Output string             : {}{}",
            template,
            if opts.custom.is_none() { " (default)" } else { "" }
        );
        log::info!(
            "Total imported particles  : {} ({:.2} per grid block)",
            total,
            total as Float / (nx * ny * nz) as Float
        );
        log::info!("Total V. cells computed   : {}", cell_count);
        log::info!(
            "Total container volume    : {}",
            container.domain().volume()
        );
        log::info!("Total V. cell volume      : {}", cell_volume);
    }
}

fn init_logging(verbosity: usize) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_level_padding(LevelPadding::Right)
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("Failed to initialize logger");
}

fn check_bounds(opts: &CommandLineOptions) {
    for (axis, min, max) in [
        ("x", opts.x_min, opts.x_max),
        ("y", opts.y_min, opts.y_max),
        ("z", opts.z_min, opts.z_max),
    ] {
        if max <= min {
            fatal_error(
                &format!("Minimum {} coordinate exceeds maximum {} coordinate", axis, axis),
                ExitCode::CommandLineError,
            );
        }
    }
}

fn add_walls(container: &mut Container, opts: &CommandLineOptions) {
    for w in opts.wall_box.chunks(6) {
        container.add_wall(Box::new(PlaneWall::new(Point3d::new(-1.0, 0.0, 0.0), -w[0])));
        container.add_wall(Box::new(PlaneWall::new(Point3d::new(1.0, 0.0, 0.0), w[1])));
        container.add_wall(Box::new(PlaneWall::new(Point3d::new(0.0, -1.0, 0.0), -w[2])));
        container.add_wall(Box::new(PlaneWall::new(Point3d::new(0.0, 1.0, 0.0), w[3])));
        container.add_wall(Box::new(PlaneWall::new(Point3d::new(0.0, 0.0, -1.0), -w[4])));
        container.add_wall(Box::new(PlaneWall::new(Point3d::new(0.0, 0.0, 1.0), w[5])));
    }
    for w in opts.wall_sphere.chunks(4) {
        container.add_wall(Box::new(SphereWall::new(
            Point3d::new(w[0], w[1], w[2]),
            w[3],
        )));
    }
    for w in opts.wall_plane.chunks(4) {
        container.add_wall(Box::new(PlaneWall::new(
            Point3d::new(w[0], w[1], w[2]),
            w[3],
        )));
    }
    for w in opts.wall_cylinder.chunks(7) {
        container.add_wall(Box::new(CylinderWall::new(
            Point3d::new(w[0], w[1], w[2]),
            Point3d::new(w[3], w[4], w[5]),
            w[6],
        )));
    }
    for w in opts.wall_cone.chunks(7) {
        container.add_wall(Box::new(ConeWall::new(
            Point3d::new(w[0], w[1], w[2]),
            Point3d::new(w[3], w[4], w[5]),
            w[6],
        )));
    }
}

fn open_input(name: &str) -> Box<dyn BufRead> {
    if name == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        let file = File::open(name).unwrap_or_else(|_| {
            fatal_error(&format!("Unable to open file '{}'", name), ExitCode::FileError)
        });
        Box::new(BufReader::new(file))
    }
}

fn open_output(name: &str, stdout_used: &mut bool) -> Box<dyn Write> {
    if name == "-" {
        if *stdout_used {
            fatal_error(
                "Standard output specified for more than one output file",
                ExitCode::CommandLineError,
            );
        }
        *stdout_used = true;
        Box::new(io::stdout())
    } else {
        let file = File::create(name).unwrap_or_else(|_| {
            fatal_error(&format!("Unable to open file '{}'", name), ExitCode::FileError)
        });
        Box::new(BufWriter::new(file))
    }
}

// Computes every cell once and feeds each requested output sink. With only
// the main output requested, cells are computed on the rayon thread pool
// instead, one private workspace per thread.
#[allow(clippy::too_many_arguments)]
fn write_outputs(
    container: &Container,
    template: &OutputTemplate,
    order: Option<&ParticleOrder>,
    mut main_out: Option<Box<dyn Write>>,
    mut gnuplot_out: Option<Box<dyn Write>>,
    mut pov_particles_out: Option<Box<dyn Write>>,
    mut pov_cells_out: Option<Box<dyn Write>>,
    verbose: bool,
) -> io::Result<(Float, usize)> {
    let aux = gnuplot_out.is_some() || pov_particles_out.is_some() || pov_cells_out.is_some();
    if !aux && order.is_none() && !verbose {
        if let Some(out) = &mut main_out {
            container.par_print_custom(template, out)?;
            out.flush()?;
        }
        return Ok((0.0, 0));
    }
    let track = template.contains_neighbors();
    let mut workspace = Workspace::new(container);
    let mut volume = 0.0;
    let mut count = 0;
    let refs: Vec<ParticleRef> = match order {
        Some(order) => container.particles_ordered(order).collect(),
        None => container.particles().collect(),
    };
    for p in refs {
        let Some(cell) = container.compute_cell(&mut workspace, p.ijk, p.q, track) else {
            continue;
        };
        let radius = if container.radical() { p.radius } else { DEFAULT_RADIUS };
        if let Some(out) = &mut main_out {
            template.write_cell(out, &cell, p.id, p.pos, radius)?;
        }
        if let Some(out) = &mut gnuplot_out {
            cell.draw_gnuplot(p.pos, out)?;
        }
        if let Some(out) = &mut pov_particles_out {
            writeln!(out, "// id {}", p.id)?;
            if container.radical() {
                writeln!(out, "sphere{{<{},{},{}>,{}}}", p.pos.x, p.pos.y, p.pos.z, p.radius)?;
            } else {
                writeln!(out, "sphere{{<{},{},{}>,s}}", p.pos.x, p.pos.y, p.pos.z)?;
            }
        }
        if let Some(out) = &mut pov_cells_out {
            writeln!(out, "// cell {}", p.id)?;
            cell.draw_pov(p.pos, out)?;
        }
        volume += cell.volume();
        count += 1;
    }
    for out in [main_out, gnuplot_out, pov_particles_out, pov_cells_out].iter_mut().flatten() {
        out.flush()?;
    }
    Ok((volume, count))
}
