//! Scopebus CLI: poke the message bus and drive pipelines by hand

use anyhow::{bail, Context};
use base64::Engine;
use clap::{Parser, Subcommand};
use scopebus_core::{Device, Message, ParamValue, Params, RawFrame};
use scopebus_llm::{OllamaProvider, QueryClient, QueryRequest};
use scopebus_pipelines::{create_pipeline, FrameInput, ScopebusConfig, PIPELINE_IDS};
use scopebus_udp::{MulticastGroup, UdpReceiver, UdpSender};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scopebus", about = "Scopebus - multicast text bus and model queries for video pipelines")]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(short, long, global = true, default_value = "scopebus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message to the group
    Send {
        #[arg(short, long, default_value_t = MulticastGroup::DEFAULT_PORT)]
        port: u16,
        /// Sent as JSON if it parses, else as plain text
        text: String,
    },
    /// Print the latest message on a port until interrupted
    Listen {
        #[arg(short, long, default_value_t = MulticastGroup::DEFAULT_PORT)]
        port: u16,
        #[arg(long, default_value = "100")]
        interval_ms: u64,
    },
    /// One-shot query against the configured Ollama server
    Ask {
        /// Image to attach (switches to the vision model)
        #[arg(short, long)]
        image: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long)]
        system: Option<String>,
        prompt: String,
    },
    /// Drive a pipeline with synthetic frames
    Simulate {
        pipeline: String,
        #[arg(long, default_value = "10")]
        fps: u32,
        #[arg(long, default_value = "10")]
        seconds: f64,
        #[arg(long, default_value = "cpu")]
        device: String,
        /// Parameter as key=value, repeatable
        #[arg(short = 'P', long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((key.trim().to_string(), ParamValue::infer(value.trim())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scopebus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ScopebusConfig::load(&cli.config);

    match cli.command {
        Commands::Send { port, text } => {
            let sender = UdpSender::with_group(port, config.multicast_group())?;
            if !sender.send(Message::parse(&text)) {
                bail!("send to port {port} failed");
            }
        }

        Commands::Listen { port, interval_ms } => {
            let mut receiver = UdpReceiver::with_group(port, config.multicast_group())
                .with_context(|| format!("listening on port {port}"))?;
            info!(port, "listening, ctrl-c to stop");
            let mut tick = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Some(msg) = receiver.poll() {
                            info!(port, "{}", String::from_utf8_lossy(&msg.encode()));
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            receiver.close();
        }

        Commands::Ask {
            image,
            model,
            system,
            prompt,
        } => {
            let mut request = QueryRequest::new(prompt);
            if let Some(system) = system {
                request = request.with_system(system);
            }
            let default_model = if let Some(path) = &image {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                request = request.with_image(base64::engine::general_purpose::STANDARD.encode(bytes));
                &config.ollama.vlm_model
            } else {
                &config.ollama.llm_model
            };
            let model = model.unwrap_or_else(|| default_model.clone());

            let provider =
                OllamaProvider::with_timeout(&config.ollama.url, model, config.request_timeout())?;
            let client = QueryClient::new(Arc::new(provider))?;
            client.fire_async(request, None);
            while client.is_pending() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if client.stats().failed > 0 {
                bail!("query to {} failed, see log", config.ollama.url);
            }
            println!("{}", client.last_response());
        }

        Commands::Simulate {
            pipeline,
            fps,
            seconds,
            device,
            params,
        } => {
            if !PIPELINE_IDS.contains(&pipeline.as_str()) {
                bail!("unknown pipeline '{pipeline}', expected one of: {}", PIPELINE_IDS.join(", "));
            }
            let device: Device = device.parse()?;
            let params: Params = params.into_iter().collect();
            let mut stage = create_pipeline(&pipeline, &config, &params, device)?;
            let frame_count = stage.prepare(&params).input_size;

            let fps = fps.max(1);
            let ticks = (seconds.max(0.0) * f64::from(fps)).ceil() as u64;
            let mut clock = tokio::time::interval(Duration::from_secs(1) / fps);
            info!(pipeline = %pipeline, fps, ticks, "simulating");

            for tick in 0..ticks {
                clock.tick().await;
                let shade = (tick % 256) as u8;
                let video = vec![RawFrame::filled(64, 64, 3, shade)?; frame_count];
                let out = match stage.call(FrameInput::new(video).with_params(params.clone())) {
                    Ok(out) => out,
                    Err(e) => {
                        warn!(tick, error = %e, "pipeline call failed");
                        continue;
                    }
                };
                info!(
                    tick,
                    shape = ?out.video.shape(),
                    prompts = ?out.prompts.iter().map(|p| p.text.as_str()).collect::<Vec<_>>(),
                    transition = out.transition.is_some(),
                    overlay = out.overlay_text.as_deref().unwrap_or(""),
                    forwarded = out.extra.len(),
                    "frame"
                );
            }
            stage.shutdown();
        }

        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}
