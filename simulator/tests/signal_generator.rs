//! End-to-end runs of the map generator against synthetic templates

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use approx::assert_relative_eq;
use image::GenericImageView;
use shared::healpix::{pix2vec, Nside};
use shared::CoordSystem;
use simulator::data::TemplateStore;
use simulator::io::fits::{read_healpix_map, FitsError};
use simulator::models::preset;
use simulator::pipeline::{run, run_with_store, PipelineError, SimulationConfig};
use simulator::{write_healpix_map, BrightnessUnit, SkyMap, Stokes, WriteOptions};
use tempfile::{tempdir, TempDir};

/// Templates with a galactic-latitude gradient in I and uniform Q/U
fn write_templates(dir: &Path, presets: &[&str], nside: Nside) {
    for name in presets {
        for template in preset(name).unwrap().templates() {
            let npix = nside.npix();
            let values: Vec<f64> = if template.contains("beta") {
                vec![-3.0; npix]
            } else if template.contains("temp") {
                vec![20.0; npix]
            } else if template.contains("_q_") {
                vec![2.0; npix]
            } else if template.contains("_u_") {
                vec![0.0; npix]
            } else {
                (0..npix)
                    .map(|p| 50.0 + 10.0 * pix2vec(nside, p).unwrap().z)
                    .collect()
            };
            let zeros = vec![0.0; npix];
            let map = SkyMap::from_stokes(
                nside,
                &values,
                &zeros,
                &zeros,
                BrightnessUnit::MicroKRj,
                CoordSystem::Galactic,
            )
            .unwrap();
            write_healpix_map(
                dir.join(template),
                &map,
                &WriteOptions::new(CoordSystem::Galactic),
            )
            .unwrap();
        }
    }
}

fn setup(nside: u32) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_templates(&data, &["s1"], Nside::new(nside).unwrap());
    (dir, data)
}

fn offline_config(data: &Path, output: PathBuf, nside: u32) -> SimulationConfig {
    SimulationConfig {
        nside,
        output: Some(output),
        data_dir: Some(data.to_path_buf()),
        offline: true,
        ..SimulationConfig::default()
    }
}

#[test]
fn test_output_has_three_rows_per_pixel() {
    let (dir, data) = setup(16);
    let output = dir.path().join("input_maps/map_40GHz.fits");
    let summary = run(&offline_config(&data, output.clone(), 16)).unwrap();

    assert_eq!(summary.values_written, 3 * 12 * 16 * 16);
    assert!(fs::metadata(&output).unwrap().len() > 0);

    let file = read_healpix_map(&output).unwrap();
    assert_eq!(file.columns.len(), 3);
    let total: usize = file.columns.iter().map(|c| c.values.len()).sum();
    assert_eq!(total, summary.values_written);
}

#[test]
fn test_header_declares_equatorial_frame_and_cmb_unit() {
    let (dir, data) = setup(8);
    let output = dir.path().join("map.fits");
    run(&offline_config(&data, output.clone(), 8)).unwrap();

    let file = read_healpix_map(&output).unwrap();
    assert_eq!(file.coord, Some(CoordSystem::Equatorial));
    for column in &file.columns {
        assert_eq!(column.unit.as_deref(), Some("uK_CMB"));
    }
}

#[test]
fn test_gradient_is_rotated_into_equatorial_frame() {
    let (dir, data) = setup(32);
    let output = dir.path().join("map.fits");
    run(&offline_config(&data, output.clone(), 32)).unwrap();

    let map = read_healpix_map(&output)
        .unwrap()
        .into_sky_map(BrightnessUnit::MicroKCmb, CoordSystem::Equatorial)
        .unwrap();
    let nside = map.nside();
    let i = map.stokes(Stokes::I);

    // North galactic pole at RA 192.86, Dec 27.13
    let (ra, dec) = (192.859_48_f64.to_radians(), 27.128_25_f64.to_radians());
    let ngp = nalgebra::Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin());

    let (brightest, _) = i
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (p, &v)| {
            if v > best.1 {
                (p, v)
            } else {
                best
            }
        });
    let direction = pix2vec(nside, brightest).unwrap();
    assert!(direction.dot(&ngp) > 0.99);

    let pol = map.polarized_intensity();
    let first = pol[0];
    assert!(pol.iter().all(|&p| (p - first).abs() < 1e-9 * first.abs().max(1.0)));
}

#[test]
fn test_rerun_overwrites_with_identical_bytes() {
    let (dir, data) = setup(8);
    let output = dir.path().join("map.fits");
    let config = offline_config(&data, output.clone(), 8);

    run(&config).unwrap();
    let first = fs::read(&output).unwrap();
    run(&config).unwrap();
    let second = fs::read(&output).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_existing_output_is_kept_without_overwrite() {
    let (dir, data) = setup(8);
    let output = dir.path().join("map.fits");
    fs::write(&output, b"keep me").unwrap();

    let config = SimulationConfig {
        overwrite: false,
        ..offline_config(&data, output.clone(), 8)
    };
    let err = run(&config).unwrap_err();
    assert!(matches!(err, PipelineError::Fits(FitsError::AlreadyExists(_))));
    assert_eq!(fs::read(&output).unwrap(), b"keep me");
}

#[test]
fn test_templates_at_other_resolution_are_regridded() {
    let (dir, data) = setup(16);
    let store = TemplateStore::local_only(&data).unwrap();
    let output = dir.path().join("low.fits");
    let summary = run_with_store(&offline_config(&data, output, 4), &store).unwrap();
    assert_eq!(summary.nside.get(), 4);
    assert_eq!(summary.values_written, 3 * 192);
}

#[test]
fn test_unit_conversion_factor_in_output() {
    let (dir, data) = setup(8);
    let rj = SimulationConfig {
        output_unit: BrightnessUnit::MicroKRj,
        ..offline_config(&data, dir.path().join("rj.fits"), 8)
    };
    let cmb = offline_config(&data, dir.path().join("cmb.fits"), 8);
    run(&rj).unwrap();
    run(&cmb).unwrap();

    let rj_file = read_healpix_map(dir.path().join("rj.fits")).unwrap();
    let cmb_file = read_healpix_map(dir.path().join("cmb.fits")).unwrap();
    for (a, b) in rj_file.columns[0]
        .values
        .iter()
        .zip(&cmb_file.columns[0].values)
    {
        assert_relative_eq!(b / a, 1.0418, epsilon = 1e-3);
    }
}

#[test]
fn test_binary_runs_offline() {
    let (dir, data) = setup(8);
    let output = dir.path().join("bin/map_40GHz.fits");
    let status = Command::new(env!("CARGO_BIN_EXE_signal_generator"))
        .args(["--nside", "8", "--offline", "--data-dir"])
        .arg(&data)
        .arg("--output")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(output.exists());

    let status = Command::new(env!("CARGO_BIN_EXE_signal_generator"))
        .args(["--nside", "8", "--offline", "--no-overwrite", "--data-dir"])
        .arg(&data)
        .arg("--output")
        .arg(&output)
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn test_binary_fails_on_unknown_preset() {
    let dir = tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_signal_generator"))
        .args(["--preset", "z3", "--offline", "--nside", "8", "--data-dir"])
        .arg(dir.path())
        .arg("--output")
        .arg(dir.path().join("never.fits"))
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(!dir.path().join("never.fits").exists());
}

#[test]
fn test_preview_artifacts() {
    let (_dir, data) = setup(16);
    let output = shared::test_util::output_path("signal_generator", "map_40GHz_nside16.fits");
    let config = SimulationConfig {
        preview: true,
        ..offline_config(&data, output.clone(), 16)
    };
    let summary = run(&config).unwrap();

    assert_eq!(
        summary.previews,
        [
            output.with_file_name("map_40GHz_nside16_I.png"),
            output.with_file_name("map_40GHz_nside16_P.png"),
        ]
    );
    for path in &summary.previews {
        let img = image::open(path).unwrap();
        assert_eq!(img.dimensions(), (800, 400));
    }
}
