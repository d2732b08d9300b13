// telebuf-cli/src/main.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use telebuf_common::export::{export_buffer, in_namespace};
use telebuf_common::{read_arrow_ipc, ArrowExporter, CropRequest, Namespace, Variable};

mod session;
use session::{record, RecordOptions};

#[derive(Parser)]
#[command(name = "telebuf")]
#[command(about = "Telebuf: shared ring buffer for simulation telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a synthetic pendulum session with consumer threads attached
    Record {
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value_t = 2000)]
        ticks: usize,

        /// Slots per variable, defaults to TELEBUF_BUFFER_SIZE
        #[arg(short, long)]
        size: Option<usize>,

        #[arg(short, long, default_value_t = 2)]
        consumers: usize,

        #[arg(long, default_value_t = 0)]
        playback: usize,

        /// Do not sleep between ticks
        #[arg(long)]
        fast: bool,
    },

    /// Summarize a recording
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Keep only the slots [from, to] of a recording
    Crop {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        from: usize,

        #[arg(long)]
        to: usize,

        /// Keep only the variables under this registry, e.g. `root.pendulum`
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Record { output, ticks, size, consumers, playback, fast } => {
            let options = RecordOptions {
                ticks,
                size,
                consumers,
                playback_ticks: playback,
                realtime: !fast,
            };
            let report = record(&options, output.as_deref())?;
            println!("\n✅ Recording done:");
            println!("⏱️  Ticks:                {}", report.ticks);
            println!("📈 Variables:            {}", report.variables);
            println!("📦 Buffer size:          {}", report.buffer_size);
            println!("🎯 Active window:        {}", report.active_length);
            println!("📐 Bytes per frame:      {}", report.frame_bytes);
            println!("📥 Push cycles applied:  {}", report.pushes_applied);
            println!("🧭 Final q:              {:.4}", report.final_q);
            for (index, consumer) in report.consumers.iter().enumerate() {
                println!(
                    "👀 Consumer {index}: {} pulls, {} samples (largest {}), {} pushes",
                    consumer.pulls, consumer.samples, consumer.largest_window, consumer.pushes
                );
            }
            if let Some(path) = output {
                println!("💾 Written to:           {}", path.display());
            }
        }

        Commands::Inspect { input } => {
            let buffer = read_arrow_ipc(&input)?;
            let properties = buffer.properties();
            println!("\n🔍 {}", input.display());
            println!("📦 Size:           {}", properties.size());
            println!("🎯 In/out points:  {} .. {}", properties.in_point(), properties.out_point());
            println!("📍 Current index:  {}", properties.current_index());
            println!("📐 Bytes per frame: {}", buffer.frame_memory_size());
            for column in buffer.active_window_columns() {
                let values = column.data.to_f64_vec();
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = values.iter().sum::<f64>() / values.len().max(1) as f64;
                println!(
                    "   {:<32} {:<8} min {:>12.4} max {:>12.4} mean {:>12.4}",
                    column.name,
                    column.kind.value_type(),
                    min,
                    max,
                    mean
                );
            }
        }

        Commands::Crop { input, output, from, to, namespace } => {
            let mut buffer = read_arrow_ipc(&input)?;
            let size = buffer.properties().size();
            anyhow::ensure!(
                from < size && to < size,
                "crop bounds [{from}, {to}] outside recording of {size} samples"
            );
            buffer.crop(CropRequest::new(from, to));
            let namespace = namespace.map(|n| Namespace::parse(&n));
            let filter = namespace.as_ref().map(in_namespace);
            export_buffer(
                &buffer,
                &mut ArrowExporter::new(&output),
                filter.as_ref().map(|keep| keep as &dyn Fn(&Variable) -> bool),
            )?;
            println!("\n✂️  Cropped {} → {} samples, written to {}", size, buffer.properties().size(), output.display());
        }
    }

    Ok(())
}
