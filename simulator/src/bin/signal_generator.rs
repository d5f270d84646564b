//! Synthetic microwave sky map generator
//!
//! Evaluates foreground emission presets at one frequency, converts the map
//! to the requested unit, rotates it into the output frame and writes a
//! HEALPix FITS file. Without arguments it produces the 40 GHz `s1`
//! synchrotron map at nside 512 in `uK_CMB`, equatorial coordinates, at
//! `../input_maps/map_40GHz.fits`.

use clap::Parser;
use simulator::models::{preset, preset_names};
use simulator::pipeline::run;
use simulator::shared_args::SkyArgs;

#[derive(Parser, Debug)]
#[command(
    name = "signal_generator",
    about = "Generates a synthetic microwave sky map and writes it as a HEALPix FITS file",
    long_about = None
)]
struct Args {
    #[command(flatten)]
    sky: SkyArgs,

    /// List the available emission presets and exit
    #[arg(long)]
    list_presets: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_presets {
        for name in preset_names() {
            let p = preset(name)?;
            println!("{:<4} {}", p.name, p.description);
            for template in p.templates() {
                println!("       {template}");
            }
        }
        return Ok(());
    }

    let config = args.sky.resolve()?;
    let summary = run(&config)?;

    println!(
        "Wrote {} values (nside {}, {}, frame {}) to {}",
        summary.values_written,
        summary.nside,
        summary.unit,
        summary.coord,
        summary.output.display()
    );
    for path in &summary.previews {
        println!("Preview: {}", path.display());
    }

    Ok(())
}
