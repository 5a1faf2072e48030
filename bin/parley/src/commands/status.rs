use parley_agent::CapabilityProbe;
use parley_core::{Config, Paths, Readiness, AUTO_LANGUAGE};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("parley status");
    println!("=============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found, using defaults)" }
    );

    let config = Config::load_or_default(&paths)?;
    println!("Backend:   {}", config.backend.provider);
    if config.backend.provider == "ollama" {
        println!("Model:     {}", config.backend.model);
    }
    println!();

    let provider = parley_providers::create_provider(&config)?;
    let probe = CapabilityProbe::new(provider);

    println!("Capabilities:");
    for (capability, readiness) in probe.snapshot().await {
        let status = match readiness {
            Readiness::ReadyImmediate => "✓ ready",
            Readiness::ReadyAfterProvision => "↓ ready after download",
            Readiness::Unavailable => "✗ unavailable",
        };
        println!("  {:<14} {}", capability.as_str(), status);
    }

    println!();
    println!("Translation targets:");
    for lang in &config.pipeline.languages {
        let support = probe.check_pair_support(AUTO_LANGUAGE, &lang.code).await;
        println!(
            "  {} → {:<3} {:<11} {}",
            AUTO_LANGUAGE,
            lang.code,
            lang.name,
            if support.is_supported() { "✓" } else { "✗" }
        );
    }

    if !config_exists {
        println!();
        println!("Run `parley onboard` to write a config file.");
    }

    Ok(())
}
