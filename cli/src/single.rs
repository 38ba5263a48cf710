//! One-shot commands: ping, analyze, generate, update, check-key.

use anyhow::{anyhow, bail, Context, Result};
use imgseo_core::client::{MetaApi, MetaApiClient};
use imgseo_core::config::{ClientSettings, ServerSettings};
use imgseo_core::gemini::create_provider;
use imgseo_core::http::ReqwestTransport;
use imgseo_core::types::{UpdateRequest, WorkItem};

type Client = MetaApiClient<ReqwestTransport>;

pub async fn ping(client: &Client, settings: &ClientSettings) -> Result<()> {
    let status = client.ping().await.map_err(|f| {
        anyhow!("{} is not reachable: {}", settings.server_url, f.display_message())
    })?;
    println!("{} is up (version {})", settings.server_url, status.version);
    if !status.key_configured {
        println!("No API key is configured on the server; generation is unavailable.");
    }
    Ok(())
}

pub async fn analyze(client: &Client, page_id: u64) -> Result<()> {
    let response = client
        .page_images(page_id)
        .await
        .map_err(|f| anyhow!(f.display_message()))?;

    if response.images.is_empty() {
        println!("No media-library images found on page {}.", page_id);
        return Ok(());
    }

    println!("{} images on page {}:", response.images.len(), page_id);
    for image in &response.images {
        println!("{:>8}  {}", image.image_id, image.filename);
        println!("          title: {}", or_dash(&image.title));
        println!("          alt:   {}", or_dash(&image.alt));
    }
    Ok(())
}

pub async fn generate(client: &Client, image_id: u64, focus: &str, secondary: &str) -> Result<()> {
    let item = WorkItem::new(image_id).with_keywords(focus, secondary);
    let meta = client
        .generate(&item)
        .await
        .map_err(|f| anyhow!("Image {}: {}", image_id, f.display_message()))?;

    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

pub async fn update(
    client: &Client,
    image_id: u64,
    title: Option<String>,
    alt: Option<String>,
) -> Result<()> {
    if title.is_none() && alt.is_none() {
        bail!("Nothing to update: pass --title and/or --alt");
    }

    let request = UpdateRequest {
        image_id,
        new_title: title,
        new_alt: alt,
    };
    let response = client
        .update(&request)
        .await
        .map_err(|f| anyhow!("Image {}: {}", image_id, f.display_message()))?;

    println!("{}", response.message);
    println!("  title: {}", or_dash(&response.updated_title));
    println!("  alt:   {}", or_dash(&response.updated_alt));
    Ok(())
}

/// Verify the provider key configured in the server environment.
pub async fn check_key() -> Result<()> {
    let settings = ServerSettings::from_env().context("Invalid server configuration")?;
    let provider = create_provider(&settings)?
        .ok_or_else(|| anyhow!("Please enter an API Key (IMGSEO_GEMINI_API_KEY)."))?;

    let status = provider.check_key().await?;
    let message = status.message(provider.model_name());
    if !status.is_ok() {
        bail!(message);
    }
    println!("{}", message);
    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
