use anyhow::Result;
use std::path::Path;

use super::{success, JobContext};
use crate::render;

/// Render the device's config-context template and optionally write it to `output`
pub async fn run(ctx: &JobContext, device_name: &str, output: Option<&Path>) -> Result<String> {
    let device = ctx.nautobot.get_device_by_name(device_name).await?;
    let name = device.display_name();

    let config_context = ctx
        .nautobot
        .get_config_context(&device.id)
        .await?
        .ok_or_else(|| {
            tracing::warn!("No config context found for device {}", name);
            anyhow::anyhow!("No config context found for device {}", name)
        })?;

    let source = render::load_template(&ctx.config.templates_dir, render::CONTEXT_TEMPLATE_FILE)?;
    let context = render::context_from_config(&device, &config_context)?;
    let rendered = render::render_str(render::CONTEXT_TEMPLATE_FILE, &source, &context)?;

    tracing::info!("Rendered configuration for {}:", name);
    tracing::info!("{}", super::heavy_rule());
    for line in rendered.lines() {
        tracing::info!("{}", line);
    }
    tracing::info!("{}", super::heavy_rule());

    if let Some(path) = output {
        tokio::fs::write(path, &rendered)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
        tracing::info!("Saved rendered configuration to {}", path.display());
    }

    success(&format!("Configuration rendered successfully for {}", name));
    Ok(rendered)
}
