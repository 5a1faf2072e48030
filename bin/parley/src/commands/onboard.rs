use parley_core::{Config, Paths};
use std::io::{self, Write};

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();

    // Check if config exists
    if paths.config_file().exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    paths.ensure_dirs()?;
    Config::default().save(&paths.config_file())?;
    println!("✓ Created config: {}", paths.config_file().display());

    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} and set providers.remote.apiKey / apiBase (or export PARLEY_API_KEY),",
        paths.config_file().display()
    );
    println!("     or set backend.provider to \"ollama\" for on-device models");
    println!("  2. Run `parley status` to check capability readiness");
    println!("  3. Run `parley chat` to start chatting");

    Ok(())
}
