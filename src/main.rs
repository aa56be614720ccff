use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use frpc::conformance::{self, ConformanceReport};
use frpc::{config, get_implementation, Image, TemplateRole, VerifInterface};
use log::{info, warn};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "frpc")]
#[command(version, about = "Driver for the 1:1 face verification engine")]
struct Cli {
    /// Configuration directory handed to `initialize`
    #[arg(short, long, global = true, default_value = ".")]
    config_dir: PathBuf,

    /// Device index selected after initialization
    #[arg(short, long, global = true)]
    gpu: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a template from an image file
    Template {
        image: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Role::Verification)]
        role: Role,
        /// Output file (defaults to template-<uuid>.bin)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare a verification template against an enrollment template
    Match { verif: PathBuf, enroll: PathBuf },
    /// Run the conformance scenarios against the bound engine
    Check {
        /// Extra sample images; synthetic rasters are used when omitted
        #[arg(short, long = "image")]
        images: Vec<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a settings file with default values into the config directory
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Enrollment,
    Verification,
}

impl From<Role> for TemplateRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Enrollment => TemplateRole::Enrollment,
            Role::Verification => TemplateRole::Verification,
        }
    }
}

#[derive(Serialize)]
struct TemplateSummary<'a> {
    status: &'a frpc::ReturnStatus,
    template: &'a Path,
    bytes: usize,
    left_eye: Option<(u16, u16)>,
    right_eye: Option<(u16, u16)>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    info!("engine: {}", frpc::bound_engine_name());

    match cli.command {
        Commands::InitConfig => init_config(&cli.config_dir),
        Commands::Check { images, json } => check(&cli.config_dir, &images, json),
        Commands::Template {
            image,
            role,
            output,
        } => {
            let engine = ready_engine(&cli.config_dir, cli.gpu)?;
            template(engine.as_ref(), &image, role.into(), output)
        }
        Commands::Match { verif, enroll } => {
            let engine = ready_engine(&cli.config_dir, cli.gpu)?;
            compare(engine.as_ref(), &verif, &enroll)
        }
    }
}

fn ready_engine(config_dir: &Path, gpu: Option<u8>) -> Result<std::sync::Arc<dyn VerifInterface>> {
    let engine = get_implementation();
    let status = engine.initialize(config_dir);
    if !status.is_success() {
        bail!("initialize failed: {}", status);
    }
    if let Some(gpu) = gpu {
        let status = engine.set_gpu(gpu);
        if !status.is_success() {
            bail!("set_gpu({}) failed: {}", gpu, status);
        }
    }
    Ok(engine)
}

/// Decode an image file into a 24-bit raster.
fn load_face(path: &Path) -> Result<Image> {
    let img = image::open(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    let (Ok(width), Ok(height)) = (u16::try_from(w), u16::try_from(h)) else {
        bail!("{} is {}x{}, larger than {} pixels per side", path.display(), w, h, u16::MAX);
    };
    Ok(Image::new(width, height, 24, img.into_raw()))
}

fn template(
    engine: &dyn VerifInterface,
    image: &Path,
    role: TemplateRole,
    output: Option<PathBuf>,
) -> Result<()> {
    let face = load_face(image)?;
    let outcome = engine.create_template(&face, role);
    if !outcome.status.is_success() {
        warn!("{} template: {}", role, outcome.status);
    }

    let output =
        output.unwrap_or_else(|| PathBuf::from(format!("template-{}.bin", uuid::Uuid::new_v4())));
    fs::write(&output, &outcome.template)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let summary = TemplateSummary {
        status: &outcome.status,
        template: &output,
        bytes: outcome.template.len(),
        left_eye: outcome.eyes.left(),
        right_eye: outcome.eyes.right(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn compare(engine: &dyn VerifInterface, verif: &Path, enroll: &Path) -> Result<()> {
    let probe = fs::read(verif).with_context(|| format!("Failed to read {}", verif.display()))?;
    let reference =
        fs::read(enroll).with_context(|| format!("Failed to read {}", enroll.display()))?;

    let outcome = engine.match_templates(&probe, &reference);
    if outcome.status.is_success() {
        info!("✓ similarity {:.4}", outcome.similarity);
    } else {
        warn!("match: {}", outcome.status);
    }
    println!("{}", outcome.similarity);
    Ok(())
}

fn check(config_dir: &Path, images: &[PathBuf], json: bool) -> Result<()> {
    let samples = if images.is_empty() {
        conformance::synthetic_samples()
    } else {
        images.iter().map(|p| load_face(p)).collect::<Result<Vec<_>>>()?
    };

    let engine = get_implementation();
    let report = conformance::run_checks(engine.as_ref(), config_dir, &samples);
    print_report(&report, json)?;

    if !report.passed() {
        bail!("conformance check failed");
    }
    Ok(())
}

fn print_report(report: &ConformanceReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        for check in &report.checks {
            println!("{}", check);
        }
    }
    Ok(())
}

fn init_config(config_dir: &Path) -> Result<()> {
    let path = config_dir.join(*config::CONFIG_FILE_NAME);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    config::save_config(&config::EngineConfig::default(), config_dir)?;
    info!("✓ wrote {}", path.display());
    Ok(())
}
