/// Compiler executable

use wbspc::{
    bsp::{compiler, format::BspFile},
    map::Map,
    options::{self, Args},
    threads::ThreadPool,
    Error,
};

const USAGE: &str = "usage: wbspc [options] file.map [-o file.bsp]";

/// Run the compilation the command line asks for
fn run(args: &Args) -> Result<(), Error> {
    let text = std::fs::read_to_string(&args.map_path)?;
    let map = Map::parse(&text)?;
    log::info!("{}: {} entities", args.map_path.display(), map.entities.len());

    let file = if args.options.only_ents {
        let mut file = BspFile::load(&mut std::fs::File::open(&args.output_path)?)?;
        compiler::update_entities(&mut file, &map, &args.options)?;
        file
    } else {
        let pool = ThreadPool::new(args.options.threads)?;
        compiler::compile(&map, &args.options, &pool)?
    };

    let mut output = std::io::BufWriter::new(std::fs::File::create(&args.output_path)?);
    file.save(&mut output)?;
    std::io::Write::flush(&mut output)?;
    log::info!("{} written", args.output_path.display());

    Ok(())
}

fn main() {
    let args = match options::parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}\n{}", err, USAGE);
            std::process::exit(1);
        }
    };

    let level = match args.verbosity {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        _ => log::Level::Debug,
    };
    if let Err(err) = simple_logger::init_with_level(level) {
        eprintln!("logger initialization failed: {}", err);
    }

    let start = std::time::Instant::now();

    if let Err(err) = run(&args) {
        log::error!("{}", err);
        std::process::exit(1);
    }

    log::info!("done in {:.2}s", start.elapsed().as_secs_f64());
}

// main.rs
