///! Compiler configuration and command line parsing

use std::path::PathBuf;

use glam::DVec3;

use crate::error::Error;

/// Radiosity stage options
#[derive(Clone, Debug)]
pub struct LightOptions {
    /// Count of radiosity bounces
    pub bounce: usize,

    /// Use 5 samples per lightmap texel
    pub extra_samples: bool,

    /// Final light multiplier
    pub light_scale: f64,

    /// Surface emitter intensity multiplier
    pub direct_scale: f64,

    /// Light entity intensity multiplier
    pub entity_scale: f64,

    /// Ambient light added to every sample
    pub ambient: DVec3,

    /// Maximal channel value of the final light
    pub max_light: f64,

    /// Patch subdivision size
    pub patch_size: f64,

    /// Lightmap texel is `1 << light_quant` texture units
    pub light_quant: u32,

    /// Default patch reflectivity
    pub reflectivity: f64,

    /// Use day lighting settings
    pub day: bool,

    /// Skip visibility (accepted for compatibility)
    pub no_pvs: bool,
}

impl Default for LightOptions {
    fn default() -> Self {
        Self {
            bounce: 8,
            extra_samples: false,
            light_scale: 1.0,
            direct_scale: 0.4,
            entity_scale: 1.0,
            ambient: DVec3::ZERO,
            max_light: 196.0,
            patch_size: 64.0,
            light_quant: 4,
            reflectivity: 0.5,
            day: false,
            no_pvs: false,
        }
    }
}

/// Block range, in 512-unit blocks
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRange {
    /// Minimal x block
    pub xl: i32,

    /// Minimal y block
    pub yl: i32,

    /// Maximal x block
    pub xh: i32,

    /// Maximal y block
    pub yh: i32,
}

impl Default for BlockRange {
    fn default() -> Self {
        Self { xl: -8, yl: -8, xh: 7, yh: 7 }
    }
}

/// Whole compiler configuration. Immutable during compilation.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Worker thread count, 0 means all cores
    pub threads: usize,

    /// Don't chop overlapping brushes
    pub no_csg: bool,

    /// Don't merge coplanar faces
    pub no_merge: bool,

    /// Don't share vertices between faces
    pub no_weld: bool,

    /// Don't subdivide faces
    pub no_subdiv: bool,

    /// Don't fix T-junctions
    pub no_tjunc: bool,

    /// Don't share edges between faces
    pub no_share: bool,

    /// Drop detail brushes
    pub no_detail: bool,

    /// Drop water brushes
    pub no_water: bool,

    /// Treat detail brushes as structural
    pub full_detail: bool,

    /// Drop downward facing faces
    pub backclip: bool,

    /// Brushes below this volume are reported
    pub micro_volume: f64,

    /// Level region
    pub block: BlockRange,

    /// Only update entity string of an existing BSP
    pub only_ents: bool,

    /// Maximal face extent along texture axis
    pub subdivide_size: f64,

    /// Skip radiosity stage
    pub no_rad: bool,

    /// Radiosity options
    pub light: LightOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            no_csg: false,
            no_merge: false,
            no_weld: false,
            no_subdiv: false,
            no_tjunc: false,
            no_share: false,
            no_detail: false,
            no_water: false,
            full_detail: false,
            backclip: false,
            micro_volume: 1.0,
            block: BlockRange::default(),
            only_ents: false,
            subdivide_size: 1024.0,
            no_rad: false,
            light: LightOptions::default(),
        }
    }
}

/// Parsed command line
#[derive(Clone, Debug)]
pub struct Args {
    /// Compiler options
    pub options: CompileOptions,

    /// Source map path
    pub map_path: PathBuf,

    /// Output path
    pub output_path: PathBuf,

    /// 0 - warnings only, 1 - info, 2 - debug
    pub verbosity: u8,
}

/// Take next argument and parse it
fn next_value<T: std::str::FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T, Error> {
    let value = args
        .next()
        .ok_or_else(|| Error::InvalidArgument(format!("{} expects a value", flag)))?;

    value
        .parse::<T>()
        .map_err(|_| Error::InvalidArgument(format!("{} {}", flag, value)))
}

/// Parse command line (without program name)
pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, Error> {
    let mut options = CompileOptions::default();
    let mut verbosity = 0;
    let mut map_path = None;
    let mut output_path = None;

    let mut args = args.into_iter();

    'arg_loop: while let Some(arg) = args.next() {
        if !arg.starts_with('-') {
            if map_path.is_some() {
                return Err(Error::InvalidArgument(arg));
            }
            map_path = Some(PathBuf::from(arg));
            continue 'arg_loop;
        }

        match arg.as_str() {
            "-threads" => options.threads = next_value(&mut args, &arg)?,
            "-nocsg" => options.no_csg = true,
            "-nomerge" => options.no_merge = true,
            "-noweld" => options.no_weld = true,
            "-nosubdiv" => options.no_subdiv = true,
            "-notjunc" => options.no_tjunc = true,
            "-noshare" => options.no_share = true,
            "-nodetail" => options.no_detail = true,
            "-nowater" => options.no_water = true,
            "-fulldetail" => options.full_detail = true,
            "-backclip" => options.backclip = true,
            "-micro" => options.micro_volume = next_value(&mut args, &arg)?,
            "-block" => {
                let x = next_value(&mut args, &arg)?;
                let y = next_value(&mut args, &arg)?;
                options.block = BlockRange { xl: x, yl: y, xh: x, yh: y };
            }
            "-blocks" => {
                options.block = BlockRange {
                    xl: next_value(&mut args, &arg)?,
                    yl: next_value(&mut args, &arg)?,
                    xh: next_value(&mut args, &arg)?,
                    yh: next_value(&mut args, &arg)?,
                };
            }
            "-onlyents" => options.only_ents = true,
            "-subdivide" => options.subdivide_size = next_value(&mut args, &arg)?,
            "-norad" => options.no_rad = true,
            "-bounce" => options.light.bounce = next_value(&mut args, &arg)?,
            "-extra" => options.light.extra_samples = true,
            "-scale" => options.light.light_scale = next_value(&mut args, &arg)?,
            "-direct" => options.light.direct_scale = next_value(&mut args, &arg)?,
            "-entity" => options.light.entity_scale = next_value(&mut args, &arg)?,
            "-ambient" => {
                options.light.ambient = DVec3::new(
                    next_value(&mut args, &arg)?,
                    next_value(&mut args, &arg)?,
                    next_value(&mut args, &arg)?,
                );
            }
            "-maxlight" => options.light.max_light = next_value(&mut args, &arg)?,
            "-patchsize" => options.light.patch_size = next_value(&mut args, &arg)?,
            "-quant" => {
                let quant: u32 = next_value(&mut args, &arg)?;
                if !(1..=6).contains(&quant) {
                    return Err(Error::InvalidArgument(format!("-quant {}", quant)));
                }
                options.light.light_quant = quant;
            }
            "-nopvs" => options.light.no_pvs = true,
            "-day" => options.light.day = true,
            "-v" => verbosity = 1,
            "-vv" => verbosity = 2,
            "-o" => output_path = Some(PathBuf::from(next_value::<String>(&mut args, &arg)?)),
            _ => return Err(Error::InvalidArgument(arg)),
        }
    }

    let Some(map_path) = map_path else {
        return Err(Error::InvalidArgument("no map file given".to_string()));
    };

    let output_path = output_path.unwrap_or_else(|| map_path.with_extension("bsp"));

    Ok(Args { options, map_path, output_path, verbosity })
}


// options.rs
