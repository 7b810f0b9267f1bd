//! Infographic CLI - client for the Infographic Engine HTTP API

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "infographic")]
#[command(about = "Infographic Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL
    #[arg(long, env = "INFOGRAPHIC_URL", default_value = DEFAULT_SERVER_URL)]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate infographic variants for a prompt
    Generate {
        /// What the infographic is about
        prompt: String,

        /// Style hint
        #[arg(short, long)]
        style: Option<String>,

        /// Number of variants (server default: 3)
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Directory the SVGs are written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Seconds to wait for the whole batch
        #[arg(long, default_value = "600")]
        timeout: u64,
    },

    /// Check that the server is up
    Health,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    success: bool,
    message: String,
    #[serde(default)]
    variants: Vec<Variant>,
    #[serde(default)]
    generation_time: f64,
    #[serde(default)]
    output_directory: String,
}

#[derive(Debug, Deserialize)]
struct Variant {
    variant_id: u32,
    success: bool,
    svg_content_base64: Option<String>,
    file_size: Option<usize>,
    message: String,
}

#[derive(Tabled)]
struct VariantRow {
    #[tabled(rename = "Variant")]
    variant_id: u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "File / Message")]
    detail: String,
}

/// Decode successful variants into `dir`; returns one row per variant
fn write_variants(dir: &Path, variants: &[Variant]) -> Result<Vec<VariantRow>> {
    let mut rows = Vec::with_capacity(variants.len());

    for variant in variants {
        let row = match (&variant.svg_content_base64, variant.success) {
            (Some(encoded), true) => {
                let svg = BASE64
                    .decode(encoded)
                    .with_context(|| format!("variant {} is not valid base64", variant.variant_id))?;
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("cannot create {}", dir.display()))?;
                let path = dir.join(format!("variant_{}.svg", variant.variant_id));
                std::fs::write(&path, &svg)
                    .with_context(|| format!("cannot write {}", path.display()))?;

                VariantRow {
                    variant_id: variant.variant_id,
                    status: "ok".to_string(),
                    size: format!("{} B", variant.file_size.unwrap_or(svg.len())),
                    detail: path.display().to_string(),
                }
            }
            _ => VariantRow {
                variant_id: variant.variant_id,
                status: "failed".to_string(),
                size: "-".to_string(),
                detail: variant.message.clone(),
            },
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Local directory for a batch, named after the server's batch directory
fn batch_dir(out: &Path, output_directory: &str) -> PathBuf {
    let name = Path::new(output_directory)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "infographics".into());
    out.join(name)
}

async fn generate(
    url: &str,
    prompt: String,
    style: Option<String>,
    count: Option<u32>,
    out: PathBuf,
    timeout: u64,
) -> Result<()> {
    let mut body = json!({ "prompt": prompt });
    if let Some(style) = style {
        body["style_preference"] = json!(style);
    }
    if let Some(count) = count {
        body["variant_count"] = json!(count);
    }

    println!("{}", "Generating infographics...".cyan().bold());

    let response = reqwest::Client::new()
        .post(format!("{}/generate-infographics", url.trim_end_matches('/')))
        .timeout(Duration::from_secs(timeout))
        .json(&body)
        .send()
        .await
        .context("Failed to connect to server")?;

    let status = response.status();
    let result: GenerateResponse = response
        .json()
        .await
        .context("Failed to parse response")?;

    if !status.is_success() || !result.success {
        anyhow::bail!("{} (HTTP {})", result.message, status.as_u16());
    }

    let dir = batch_dir(&out, &result.output_directory);
    let rows = write_variants(&dir, &result.variants)?;
    let succeeded = result.variants.iter().filter(|v| v.success).count();

    println!();
    println!("{}", Table::new(rows));
    println!();

    let summary = format!("{} ({:.1}s)", result.message, result.generation_time);
    if succeeded == 0 {
        println!("{}", summary.yellow().bold());
    } else {
        println!("{}", format!("✓ {}", summary).green().bold());
        println!("  {} {}", "Saved to:".bold(), dir.display());
    }
    Ok(())
}

async fn health(url: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .get(format!("{}/health", url.trim_end_matches('/')))
        .timeout(Duration::from_secs(5))
        .send()
        .await;

    match response {
        Ok(response) if response.status().is_success() => {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            println!("  {} {}", "Server:".bold(), url);
            println!("  {} {}", "Status:".bold(), "ONLINE".green());
            if let Some(service) = body["service"].as_str() {
                println!("  {} {}", "Service:".bold(), service);
            }
            Ok(())
        }
        Ok(response) => {
            println!("  {} {}", "Status:".bold(), "UNHEALTHY".red());
            anyhow::bail!("server answered HTTP {}", response.status().as_u16())
        }
        Err(e) => {
            println!("  {} {}", "Status:".bold(), "OFFLINE".red());
            Err(e).context("Failed to connect to server")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            prompt,
            style,
            count,
            out,
            timeout,
        } => generate(&cli.url, prompt, style, count, out, timeout).await,
        Commands::Health => health(&cli.url).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: u32, svg: Option<&str>) -> Variant {
        Variant {
            variant_id: id,
            success: svg.is_some(),
            svg_content_base64: svg.map(|s| BASE64.encode(s)),
            file_size: svg.map(str::len),
            message: if svg.is_some() {
                "Success".to_string()
            } else {
                "Extraction timeout (120s)".to_string()
            },
        }
    }

    #[test]
    fn writes_only_successful_variants() {
        let dir = tempfile::TempDir::new().unwrap();
        let rows = write_variants(dir.path(), &[variant(1, Some("<svg/>")), variant(2, None)]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "ok");
        assert_eq!(rows[1].status, "failed");
        assert_eq!(rows[1].detail, "Extraction timeout (120s)");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("variant_1.svg")).unwrap(),
            "<svg/>"
        );
        assert!(!dir.path().join("variant_2.svg").exists());
    }

    #[test]
    fn batch_dir_mirrors_server_name() {
        assert_eq!(
            batch_dir(Path::new("out"), "generated/batch_1_abc_topic"),
            PathBuf::from("out/batch_1_abc_topic")
        );
        assert_eq!(batch_dir(Path::new("out"), ""), PathBuf::from("out/infographics"));
    }

    #[test]
    fn parses_server_response() {
        let raw = r#"{"success":true,"message":"Successfully generated 1/1 infographic variants",
            "variants":[{"variant_id":1,"success":true,"svg_content_base64":"PHN2Zy8+","file_size":6,
            "message":"Success: 6 bytes","svg_file_path":"generated/x/variant_1/infographic.svg"}],
            "generation_time":1.5,"output_directory":"generated/x"}"#;
        let response: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(response.success);
        assert_eq!(response.variants[0].file_size, Some(6));
    }
}
